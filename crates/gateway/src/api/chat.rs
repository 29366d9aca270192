//! The chat endpoint: user input in, typed SSE events out.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// User message. Absent on reconnect-only requests.
    #[serde(default)]
    pub message: Option<String>,
    /// Unix-second timestamp of the message.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Last event id the client observed; the stream resumes after it.
    #[serde(default)]
    pub event_id: Option<u64>,
}

// ── POST /api/v1/sessions/{id}/chat (SSE) ──────────────────────────

pub async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    let timestamp = body
        .timestamp
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    let mut events = state
        .service
        .chat(session_id, body.message, timestamp, body.event_id);

    let stream = async_stream::stream! {
        while let Some(event) = events.next().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok::<_, std::convert::Infallible>(
                Event::default().event(event.name()).data(data),
            );
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
