pub mod admin;
pub mod webhook;

use axum::routing::{any, get};
use axum::Router;

use crate::state::AppState;

/// Build the full API router: a public health probe, and the webhook
/// trigger surface mounted at the root so a trigger's `endpoint_path`
/// (e.g. `/hooks/daily-digest`) is matched verbatim.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(admin::health))
        .route("/*path", any(webhook::handle))
}
