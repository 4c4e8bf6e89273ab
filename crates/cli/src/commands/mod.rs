//! CLI commands.
//!
//! # Environment Variables
//!
//! Same as the site binary; see `leadline_site::config`. A backend is
//! required (`BACKEND_MODE` of `rest` or `memory`).

pub mod config;
pub mod seed;
pub mod submit;

use leadline_core::{IdentityState, LeadFormError};
use leadline_site::backend::{self, BackendError, SharedBackend};
use leadline_site::config::{ConfigError, SiteConfig};
use leadline_site::sync::{IdentityManager, IdentityOptions, SubmitError};
use thiserror::Error;
use tracing::info;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `BACKEND_MODE` is `none`.
    #[error("No backend configured (set BACKEND_MODE or BACKEND_PROJECT_ID)")]
    NoBackend,

    /// Backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Lead form rejected before submission.
    #[error("Invalid lead: {0}")]
    InvalidForm(#[from] LeadFormError),

    /// Lead submission failed.
    #[error("{}", .0.user_message())]
    Submit(#[source] SubmitError),

    /// Output could not be rendered.
    #[error("Output error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A connected session: configuration, backend and a ready identity.
pub struct Session {
    pub config: SiteConfig,
    pub backend: SharedBackend,
    pub identity: IdentityState,
    // Held so the auth subscription lives as long as the session.
    _manager: IdentityManager,
}

impl Session {
    /// Load configuration and establish an identity.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid or no backend is configured.
    pub async fn connect() -> Result<Self, CliError> {
        let config = SiteConfig::from_env()?;
        let backend = backend::from_config(&config.backend)?.ok_or(CliError::NoBackend)?;
        info!(backend = config.backend.kind(), app_id = %config.app_id, "Connecting");

        let manager = IdentityManager::start(
            Some(backend.clone()),
            IdentityOptions {
                initial_token: config.initial_auth_token.clone(),
                retry: config.retry,
            },
        );
        let identity = manager.wait_ready().await;
        if let Some(current) = identity.identity() {
            info!(visitor = %current.id, source = %current.source, "Identity ready");
        }

        Ok(Self {
            config,
            backend,
            identity,
            _manager: manager,
        })
    }
}
