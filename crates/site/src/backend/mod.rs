//! Backend capability contract consumed by the identity & sync core.
//!
//! # Architecture
//!
//! - [`Backend`] is the only seam between the core and the storage/auth
//!   provider; every component takes an `Option<Arc<dyn Backend>>`
//! - Live updates are delivered through a [`Subscription`], a disposable
//!   handle whose drop unsubscribes exactly once
//! - Documents are flat string-to-string mappings ([`Fields`])
//!
//! # Implementations
//!
//! - [`RestBackend`] - identity-toolkit auth plus a document REST API;
//!   live subscriptions are polled
//! - [`MemoryBackend`] - deterministic in-process backend with fault
//!   injection, for local development and tests

mod error;
pub mod memory;
pub mod rest;
mod subscription;

use std::sync::Arc;

use async_trait::async_trait;
use leadline_core::{CollectionPath, DocumentPath, Fields, RecordId, VisitorId};

pub use error::BackendError;
pub use memory::{Fault, MemoryBackend};
pub use rest::RestBackend;
pub use subscription::Subscription;

use crate::config::BackendConfig;

/// Shared, read-only handle to the configured backend.
pub type SharedBackend = Arc<dyn Backend>;

/// Build the backend selected by configuration.
///
/// Returns `None` in degraded mode (`BACKEND_MODE=none`).
///
/// # Errors
///
/// Returns error if the REST client fails to build.
pub fn from_config(config: &BackendConfig) -> Result<Option<SharedBackend>, BackendError> {
    let backend: SharedBackend = match config {
        BackendConfig::None => return Ok(None),
        BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        BackendConfig::Rest(rest) => Arc::new(RestBackend::new(rest)?),
    };
    Ok(Some(backend))
}

/// A signed-in principal as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: VisitorId,
    pub anonymous: bool,
}

impl Principal {
    #[must_use]
    pub fn new(uid: impl Into<VisitorId>, anonymous: bool) -> Self {
        Self {
            uid: uid.into(),
            anonymous,
        }
    }
}

/// An existing document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub fields: Fields,
    /// Monotonically increasing per document; newer writes have larger revisions.
    pub revision: u64,
}

/// One delivery on a document subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Snapshot(DocumentSnapshot),
    Missing,
    /// Terminal: nothing is delivered after an error.
    Error(BackendError),
}

/// Options for [`Backend::set_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    /// Only overwrite the given fields, keeping any others.
    pub merge: bool,
}

impl SetOptions {
    #[must_use]
    pub const fn merge() -> Self {
        Self { merge: true }
    }
}

/// Storage and auth capabilities the core depends on.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Sign in without credentials.
    async fn sign_in_anonymously(&self) -> Result<Principal, BackendError>;

    /// Sign in with a one-time credential token.
    async fn sign_in_with_token(&self, token: &str) -> Result<Principal, BackendError>;

    /// Watch the signed-in principal.
    ///
    /// Emits the current principal (or `None`) immediately, then once per
    /// sign-in or sign-out.
    fn on_auth_state_changed(&self) -> Subscription<Option<Principal>>;

    /// Read a document once.
    async fn get_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Option<DocumentSnapshot>, BackendError>;

    /// Write a document, replacing it or merging into it.
    async fn set_document(
        &self,
        path: &DocumentPath,
        fields: &Fields,
        options: SetOptions,
    ) -> Result<(), BackendError>;

    /// Watch a document.
    ///
    /// Emits the current state immediately, then on every change, in the
    /// order the backend observed them.
    fn subscribe_document(&self, path: &DocumentPath) -> Subscription<DocumentEvent>;

    /// Append a new document to a collection in a single write.
    async fn add_record(
        &self,
        collection: &CollectionPath,
        record: &Fields,
    ) -> Result<RecordId, BackendError>;
}
