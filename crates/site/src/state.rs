//! Application state shared across handlers.

use std::sync::Arc;

use leadline_core::{IdentityState, LeadForm, SharedConfigView};

use crate::backend::SharedBackend;
use crate::config::SiteConfig;
use crate::sync::{
    IdentityManager, IdentityOptions, LeadSubmitter, SharedConfigStore, SubmitError,
    SubmitReceipt,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It owns the session's
/// identity manager and config store; when the last clone is dropped their
/// backend subscriptions are released.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: SiteConfig,
    backend: Option<SharedBackend>,
    identity: IdentityManager,
    site_config: SharedConfigStore,
    leads: LeadSubmitter,
}

impl AppState {
    /// Start the identity bootstrap and config mirroring for this session.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(config: SiteConfig, backend: Option<SharedBackend>) -> Self {
        let identity = IdentityManager::start(
            backend.clone(),
            IdentityOptions {
                initial_token: config.initial_auth_token.clone(),
                retry: config.retry,
            },
        );
        let site_config = SharedConfigStore::start(
            backend.clone(),
            identity.subscribe(),
            config.app_id.shared_config_document(),
            config.retry,
        );
        let leads = LeadSubmitter::new(config.app_id.clone(), config.retry);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                identity,
                site_config,
                leads,
            }),
        }
    }

    /// Get a reference to the site configuration.
    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.inner.config
    }

    /// Get the configured backend, if any.
    #[must_use]
    pub fn backend(&self) -> Option<&SharedBackend> {
        self.inner.backend.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityManager {
        &self.inner.identity
    }

    /// Current shared config view; never empty.
    #[must_use]
    pub fn site_config(&self) -> SharedConfigView {
        self.inner.site_config.current()
    }

    #[must_use]
    pub fn identity_state(&self) -> IdentityState {
        self.inner.identity.current()
    }

    /// Submit a lead under the current identity.
    ///
    /// # Errors
    ///
    /// See [`LeadSubmitter::submit`].
    pub async fn submit_lead(&self, form: LeadForm) -> Result<SubmitReceipt, SubmitError> {
        let identity = self.identity_state();
        self.inner
            .leads
            .submit(&identity, self.backend(), form)
            .await
    }
}
