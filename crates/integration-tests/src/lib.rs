//! Integration tests for Leadline.
//!
//! End-to-end scenarios run the identity manager, config store and lead
//! submitter together against the in-memory backend, on tokio's paused
//! clock so retry backoff costs no wall time.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p leadline-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `identity_bootstrap` - sign-in, fallback and subscription release
//! - `shared_config` - defaults, remote authority, stale snapshots
//! - `lead_submission` - readiness gating, retry and failure messages

use std::sync::Arc;

use leadline_core::{AppId, LeadForm};
use leadline_site::backend::{MemoryBackend, SharedBackend};
use leadline_site::sync::{IdentityManager, IdentityOptions, RetryPolicy};

/// Application id used by every scenario.
#[must_use]
pub fn app_id() -> AppId {
    AppId::parse("integration").unwrap_or_default()
}

/// Share a memory backend while keeping a handle for inspection.
#[must_use]
pub fn shared(backend: &MemoryBackend) -> SharedBackend {
    Arc::new(backend.clone())
}

/// Start an identity manager with default retry and no token.
#[must_use]
pub fn identity(backend: &MemoryBackend) -> IdentityManager {
    IdentityManager::start(Some(shared(backend)), IdentityOptions::default())
}

/// The inquiry used throughout the end-to-end scenarios.
#[must_use]
pub fn acme_form() -> LeadForm {
    LeadForm {
        name: "Acme".to_string(),
        company: "Acme Co".to_string(),
        email: "a@acme.com".to_string(),
        phone: String::new(),
        inquiry: "Quote Request".to_string(),
    }
}

/// Default policy: 6 attempts, 1s doubling.
#[must_use]
pub fn retry() -> RetryPolicy {
    RetryPolicy::default()
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
