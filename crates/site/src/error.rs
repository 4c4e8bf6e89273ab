//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. Handlers map it onto the same
//! `{success, message}` JSON body the contact form renders.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use leadline_core::LeadFormError;
use serde::Serialize;
use thiserror::Error;

use crate::sync::SubmitError;

/// Application-level error type for the site.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body was not a JSON form.
    #[error("Malformed request body: {0}")]
    MalformedBody(#[from] JsonRejection),

    /// Submitted form failed validation.
    #[error("Invalid form: {0}")]
    InvalidForm(#[from] LeadFormError),

    /// Lead submission failed.
    #[error("Submission failed: {0}")]
    Submit(#[from] SubmitError),
}

/// JSON body for form-style responses.
#[derive(Debug, Serialize)]
pub struct FormResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::MalformedBody(_) | Self::InvalidForm(_) => StatusCode::BAD_REQUEST,
            Self::Submit(SubmitError::NotReady) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Submit(SubmitError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the visitor.
    fn public_message(&self) -> String {
        match self {
            // Parser output names fields and offsets; keep it in the logs
            Self::MalformedBody(_) => "Please fill in the contact form and try again.".to_string(),
            Self::InvalidForm(LeadFormError::MissingName) => "Please enter your name.".to_string(),
            Self::InvalidForm(_) => "Please enter a valid email address.".to_string(),
            // Don't expose backend error details to clients
            Self::Submit(err) => err.user_message().to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::MalformedBody(rejection) = &self {
            tracing::debug!(error = %rejection.body_text(), "Rejected contact body");
        }

        // Capture server errors to Sentry
        if matches!(self, Self::Submit(SubmitError::Backend(_))) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (
            self.status(),
            Json(FormResponse {
                success: false,
                message: self.public_message(),
            }),
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;

    #[test]
    fn test_app_error_display() {
        let err = AppError::InvalidForm(LeadFormError::MissingName);
        assert_eq!(err.to_string(), "Invalid form: name is required");

        let err = AppError::Submit(SubmitError::NotReady);
        assert_eq!(err.to_string(), "Submission failed: identity is not ready");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::InvalidForm(LeadFormError::InvalidEmail)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Submit(SubmitError::NotReady)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Submit(SubmitError::Backend(BackendError::Network(
                "reset".to_string()
            )))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_backend_detail() {
        let err = AppError::Submit(SubmitError::Backend(BackendError::Permission(
            "rules denied write to artifacts/x".to_string(),
        )));
        assert!(!err.public_message().contains("artifacts"));
    }
}
