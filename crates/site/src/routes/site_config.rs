//! Shared site configuration (display metrics).

use axum::{Json, extract::State};
use leadline_core::SharedConfigView;

use crate::state::AppState;

/// Current shared config view.
///
/// GET /api/site-config
///
/// Always answers; falls back to the compiled-in defaults when the backend
/// is unavailable or the document does not exist.
pub async fn show(State(state): State<AppState>) -> Json<SharedConfigView> {
    Json(state.site_config())
}
