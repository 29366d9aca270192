//! Session CRUD and the polled session-list SSE.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use fm_domain::event::AgentEvent;
use fm_domain::session::Session;

use super::{success, ApiResult, POLL_INTERVAL_SECS};
use crate::state::AppState;

// ── PUT /api/v1/sessions ───────────────────────────────────────────

pub async fn create_session(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let session = state.service.create_session()?;
    Ok(success(json!({ "session_id": session.id })))
}

// ── GET /api/v1/sessions/{id} ──────────────────────────────────────

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = state.service.get_session(&session_id)?;
    let events: Vec<Value> = session.events.iter().map(event_envelope).collect();
    Ok(success(json!({
        "session_id": session.id,
        "title": session.title,
        "events": events,
    })))
}

// ── GET /api/v1/sessions ───────────────────────────────────────────

pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(success(session_list(&state)))
}

// ── POST /api/v1/sessions (SSE, polled) ────────────────────────────

pub async fn list_sessions_sse(State(state): State<AppState>) -> impl IntoResponse {
    let stream = async_stream::stream! {
        loop {
            let data = session_list(&state).to_string();
            yield Ok::<_, std::convert::Infallible>(
                Event::default().event("sessions").data(data),
            );
            tokio::time::sleep(std::time::Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── POST /api/v1/sessions/{id}/stop ────────────────────────────────

pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.service.stop_session(&session_id).await?;
    Ok(success(json!({})))
}

// ── DELETE /api/v1/sessions/{id} ───────────────────────────────────

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.service.delete_session(&session_id).await?;
    Ok(success(json!({})))
}

// ── Shared rendering ───────────────────────────────────────────────

/// The wire shape of one persisted event: the SSE envelope, so history
/// reads and live streams agree.
pub(crate) fn event_envelope(event: &AgentEvent) -> Value {
    json!({
        "event": event.name(),
        "data": event,
    })
}

fn session_list(state: &AppState) -> Value {
    let sessions: Vec<Value> = state
        .service
        .get_all_sessions()
        .iter()
        .map(session_item)
        .collect();
    json!({ "sessions": sessions })
}

fn session_item(session: &Session) -> Value {
    json!({
        "session_id": session.id,
        "title": session.title,
        "status": session.status,
        "unread_message_count": session.unread_message_count,
        "latest_message": session.latest_message,
        "latest_message_at": session.latest_message_at.map(|at| at.timestamp()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fm_domain::event::MessageRole;

    #[test]
    fn event_envelope_carries_name_and_payload() {
        let mut event = AgentEvent::message(MessageRole::Assistant, "hi");
        event.event_id = 7;
        let envelope = event_envelope(&event);
        assert_eq!(envelope["event"], "message");
        assert_eq!(envelope["data"]["event_id"], 7);
        assert_eq!(envelope["data"]["content"], "hi");
        assert_eq!(envelope["data"]["type"], "message");
    }
}
