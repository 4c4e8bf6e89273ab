//! Lead submission into the visitor's private collection.

use chrono::Utc;
use leadline_core::{AppId, IdentityState, LeadForm, LeadRecord};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::backend::{Backend, BackendError, SharedBackend};
use crate::sync::RetryPolicy;

const CONFIRMATION_MESSAGE: &str = "Thank you! Your inquiry has been received and our team will be in touch shortly.";
const NOT_READY_MESSAGE: &str =
    "We're still getting things ready. Please try again in a moment.";
const FAILURE_MESSAGE: &str =
    "Sorry, we couldn't send your inquiry right now. Please try again later.";

/// Why a submission did not persist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// No backend or no ready identity; nothing was sent.
    #[error("identity is not ready")]
    NotReady,

    /// The backend rejected every attempt.
    #[error("backend write failed: {0}")]
    Backend(#[from] BackendError),
}

impl SubmitError {
    /// Human-readable message safe to show the visitor.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::NotReady => NOT_READY_MESSAGE,
            Self::Backend(_) => FAILURE_MESSAGE,
        }
    }
}

/// Confirmation returned for a persisted lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub message: &'static str,
}

/// Appends lead records under the visitor's identity.
#[derive(Debug, Clone)]
pub struct LeadSubmitter {
    app_id: AppId,
    retry: RetryPolicy,
}

impl LeadSubmitter {
    #[must_use]
    pub const fn new(app_id: AppId, retry: RetryPolicy) -> Self {
        Self { app_id, retry }
    }

    /// Persist `form` as a new lead owned by the current identity.
    ///
    /// The record is timestamped once, before the first attempt, so retries
    /// write identical content.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::NotReady`] without any remote call when the
    /// identity is not ready or there is no backend, and
    /// [`SubmitError::Backend`] once every attempt has failed.
    pub async fn submit(
        &self,
        identity: &IdentityState,
        backend: Option<&SharedBackend>,
        form: LeadForm,
    ) -> Result<SubmitReceipt, SubmitError> {
        let (Some(backend), Some(current)) = (backend, identity.identity()) else {
            warn!(ready = identity.is_ready(), "Lead submitted before the site was ready");
            return Err(SubmitError::NotReady);
        };

        if current.is_fallback() {
            // Attempted anyway; the backend decides whether to accept it.
            warn!(visitor = %current.id, "Submitting lead under a fallback identity");
        }

        let collection = self.app_id.lead_collection(&current.id);
        let fields = LeadRecord::new(form, Utc::now()).to_fields();

        let backend: &dyn Backend = backend.as_ref();
        let (path, record) = (&collection, &fields);
        match self
            .retry
            .run("add_record", move || backend.add_record(path, record))
            .await
        {
            Ok(record_id) => {
                info!(collection = %collection, record = %record_id, "Lead recorded");
                Ok(SubmitReceipt {
                    message: CONFIRMATION_MESSAGE,
                })
            }
            Err(err) => {
                error!(
                    collection = %collection,
                    attempts = self.retry.attempts(),
                    error = %err,
                    "Failed to record lead"
                );
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use leadline_core::{Identity, IdentitySource, VisitorId};

    use super::*;
    use crate::backend::{Fault, MemoryBackend};

    fn acme() -> LeadForm {
        LeadForm {
            name: "Acme".to_string(),
            company: "Acme Co".to_string(),
            email: "a@acme.com".to_string(),
            phone: String::new(),
            inquiry: "Quote Request".to_string(),
        }
    }

    fn ready(id: &str, source: IdentitySource) -> IdentityState {
        IdentityState::Ready(Some(Identity::new(VisitorId::new(id), source)))
    }

    fn submitter() -> LeadSubmitter {
        LeadSubmitter::new(AppId::parse("test").unwrap(), RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_not_ready_makes_no_remote_calls() {
        let backend = MemoryBackend::new();
        let shared: SharedBackend = Arc::new(backend.clone());

        for state in [
            IdentityState::Uninitialized,
            IdentityState::Initializing,
            IdentityState::Ready(None),
        ] {
            let result = submitter().submit(&state, Some(&shared), acme()).await;
            assert_eq!(result, Err(SubmitError::NotReady));
        }
        assert_eq!(backend.remote_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_backend_is_not_ready() {
        let state = ready("u1", IdentitySource::Anonymous);
        let result = submitter().submit(&state, None, acme()).await;
        assert_eq!(result, Err(SubmitError::NotReady));
        assert!(!SubmitError::NotReady.user_message().is_empty());
    }

    #[tokio::test]
    async fn test_writes_record_under_identity() {
        let backend = MemoryBackend::new();
        let shared: SharedBackend = Arc::new(backend.clone());
        let state = ready("u1", IdentitySource::Anonymous);

        let receipt = submitter()
            .submit(&state, Some(&shared), acme())
            .await
            .unwrap();
        assert!(!receipt.message.is_empty());

        let records = backend.records(&leadline_core::CollectionPath::new(
            "artifacts/test/users/u1/leads",
        ));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Acme");
        assert_eq!(records[0]["status"], "New");
        assert!(chrono::DateTime::parse_from_rfc3339(&records[0]["timestamp"]).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let backend = MemoryBackend::new();
        backend.fail_add_record(Fault::times(2, BackendError::Network("blip".to_string())));
        let shared: SharedBackend = Arc::new(backend.clone());
        let state = ready("u1", IdentitySource::Anonymous);

        let result = submitter().submit(&state, Some(&shared), acme()).await;

        assert!(result.is_ok());
        assert_eq!(backend.add_record_calls(), 3);
        assert_eq!(backend.record_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_hide_raw_error() {
        let backend = MemoryBackend::new();
        let raw = BackendError::Network("connection reset by peer".to_string());
        backend.fail_add_record(Fault::always(raw.clone()));
        let shared: SharedBackend = Arc::new(backend.clone());
        let state = ready("u1", IdentitySource::Anonymous);

        let err = submitter()
            .submit(&state, Some(&shared), acme())
            .await
            .unwrap_err();

        assert_eq!(err, SubmitError::Backend(raw.clone()));
        assert_eq!(backend.add_record_calls(), 6);
        assert_eq!(backend.record_count(), 0);
        assert!(!err.user_message().is_empty());
        assert_ne!(err.user_message(), raw.to_string());
        assert!(!err.user_message().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_fallback_identity_still_attempts_write() {
        let backend = MemoryBackend::new();
        let shared: SharedBackend = Arc::new(backend.clone());
        let state = ready("local-1", IdentitySource::Fallback);

        let result = submitter().submit(&state, Some(&shared), acme()).await;

        assert!(result.is_ok());
        assert_eq!(backend.add_record_calls(), 1);
    }
}
