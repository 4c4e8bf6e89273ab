//! Contact form route handler.
//!
//! Stores inquiries as lead records in the visitor's private collection.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use leadline_core::LeadForm;
use tracing::{Span, field, instrument};

use crate::error::{FormResponse, Result};
use crate::state::AppState;

/// Submit a lead.
///
/// POST /contact
///
/// Responds with `{success, message}`: 200 once stored, 400 for a body that
/// is not a form or fails validation, 503 while the site is still
/// establishing its identity and 500 when the backend rejected every attempt.
#[instrument(skip_all, fields(inquiry = field::Empty))]
pub async fn submit(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LeadForm>, JsonRejection>,
) -> Result<Json<FormResponse>> {
    let Json(form) = payload?;
    let form = form.normalized();
    Span::current().record("inquiry", form.inquiry.as_str());
    form.validate()?;

    let receipt = state.submit_lead(form).await?;

    Ok(Json(FormResponse {
        success: true,
        message: receipt.message.to_string(),
    }))
}
