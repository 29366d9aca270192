//! HTTP surface: REST + SSE under `/api/v1`, plus the VNC WebSocket.

pub mod chat;
pub mod sandbox;
pub mod sessions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use serde_json::{json, Value};

use fm_domain::Error;

use crate::state::AppState;

/// How often the list/shell/file SSE endpoints poll, in seconds.
pub(crate) const POLL_INTERVAL_SECS: u64 = 5;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/sessions",
            put(sessions::create_session)
                .get(sessions::list_sessions)
                .post(sessions::list_sessions_sse),
        )
        .route(
            "/api/v1/sessions/:session_id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/api/v1/sessions/:session_id/stop", post(sessions::stop_session))
        .route("/api/v1/sessions/:session_id/chat", post(chat::chat))
        .route("/api/v1/sessions/:session_id/shell", post(sandbox::view_shell))
        .route("/api/v1/sessions/:session_id/file", post(sandbox::view_file))
        .route("/api/v1/sessions/:session_id/vnc", get(sandbox::vnc_websocket))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Success envelope: `{code: 0, msg: "success", data}`.
pub(crate) fn success(data: Value) -> Json<Value> {
    Json(json!({ "code": 0, "msg": "success", "data": data }))
}

/// Error envelope: `{code, msg, data: null}` with the HTTP status
/// matched to the error kind.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let code = kind.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::warn!(code, error = %self.0, "request failed");
        (
            status,
            Json(json!({ "code": code, "msg": self.0.to_string(), "data": null })),
        )
            .into_response()
    }
}

pub(crate) type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let Json(body) = success(json!({ "session_id": "abc" }));
        assert_eq!(body["code"], 0);
        assert_eq!(body["msg"], "success");
        assert_eq!(body["data"]["session_id"], "abc");
    }
}
