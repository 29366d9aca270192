//! Sandbox views: shell/file snapshot SSE and the VNC WebSocket bridge.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use super::POLL_INTERVAL_SECS;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShellViewRequest {
    /// Shell session id inside the sandbox.
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FileViewRequest {
    /// Absolute path of the file inside the sandbox.
    pub file: String,
}

// ── POST /api/v1/sessions/{id}/shell (SSE, polled) ─────────────────

pub async fn view_shell(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ShellViewRequest>,
) -> impl IntoResponse {
    let stream = async_stream::stream! {
        loop {
            match state.service.shell_view(&session_id, &body.session_id).await {
                Ok(data) => {
                    yield Ok::<_, std::convert::Infallible>(
                        Event::default().event("shell").data(data.to_string()),
                    );
                }
                Err(e) => {
                    yield Ok(Event::default()
                        .event("error")
                        .data(serde_json::json!({ "error": e.to_string() }).to_string()));
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── POST /api/v1/sessions/{id}/file (SSE, polled) ──────────────────

pub async fn view_file(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<FileViewRequest>,
) -> impl IntoResponse {
    let stream = async_stream::stream! {
        loop {
            match state.service.file_view(&session_id, &body.file).await {
                Ok(data) => {
                    yield Ok::<_, std::convert::Infallible>(
                        Event::default().event("file").data(data.to_string()),
                    );
                }
                Err(e) => {
                    yield Ok(Event::default()
                        .event("error")
                        .data(serde_json::json!({ "error": e.to_string() }).to_string()));
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── GET /api/v1/sessions/{id}/vnc (WebSocket, binary) ──────────────

pub async fn vnc_websocket(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade
        .protocols(["binary"])
        .on_upgrade(move |socket| bridge_vnc(state, session_id, socket))
}

/// Forward bytes in both directions between the client WebSocket and
/// the sandbox's VNC endpoint until either side closes.
async fn bridge_vnc(state: AppState, session_id: String, client: WebSocket) {
    let url = match state.service.vnc_url(&session_id).await {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "VNC target unavailable");
            close_with_error(client, &e.to_string()).await;
            return;
        }
    };

    tracing::info!(session_id = %session_id, url = %url, "connecting to sandbox VNC");
    let sandbox_ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "VNC connect failed");
            close_with_error(client, &format!("unable to connect to sandbox: {e}")).await;
            return;
        }
    };

    let (mut client_tx, mut client_rx) = client.split();
    let (mut sandbox_tx, mut sandbox_rx) = sandbox_ws.split();

    let to_sandbox = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let forward = match message {
                WsMessage::Binary(data) => TungsteniteMessage::Binary(data),
                WsMessage::Close(_) => break,
                _ => continue,
            };
            if sandbox_tx.send(forward).await.is_err() {
                break;
            }
        }
    };

    let to_client = async {
        while let Some(Ok(message)) = sandbox_rx.next().await {
            let forward = match message {
                TungsteniteMessage::Binary(data) => WsMessage::Binary(data),
                TungsteniteMessage::Close(_) => break,
                _ => continue,
            };
            if client_tx.send(forward).await.is_err() {
                break;
            }
        }
    };

    // Either direction closing tears the bridge down.
    tokio::select! {
        _ = to_sandbox => {}
        _ = to_client => {}
    }
    tracing::info!(session_id = %session_id, "VNC bridge closed");
}

async fn close_with_error(mut client: WebSocket, reason: &str) {
    let frame = axum::extract::ws::CloseFrame {
        code: 1011,
        reason: reason.to_string().into(),
    };
    let _ = client.send(WsMessage::Close(Some(frame))).await;
}
