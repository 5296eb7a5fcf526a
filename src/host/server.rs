//! HTTP routes the dev server mounts next to its own middleware.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::client::COMPLETION_PATH;
use crate::host::HmrTiming;

/// Live registry snapshot; mounted in development only.
pub const ENTRIES_PATH: &str = "/__vite_timing_entries";

/// Routes for the completion callback and, in development, the registry
/// snapshot. Merge it into the host's router.
pub fn router(timing: HmrTiming) -> Router {
    let mut router = Router::new().route(COMPLETION_PATH, post(complete_hmr));
    if timing.config().mode.is_development() {
        router = router.route(ENTRIES_PATH, get(list_entries));
    }
    router.with_state(timing)
}

/// Always answers, whatever the body holds.
async fn complete_hmr(State(timing): State<HmrTiming>, body: Bytes) -> Response {
    let reply = timing.handle_completion_body(&body);
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
    (status, Json(reply.body)).into_response()
}

async fn list_entries(State(timing): State<HmrTiming>) -> Response {
    match timing.debug_entries() {
        Some(entries) => Json(entries).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
