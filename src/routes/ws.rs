// WebSocket stream of poll cycle outputs

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::models::CycleOutput;
use crate::version::{NAME, VERSION};
use crate::worker::WorkerStatus;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Decrements the /ws/current connection count on drop (connect = +1, drop = -1).
struct WsCurrentGuard(Arc<WorkerStatus>);

impl Drop for WsCurrentGuard {
    fn drop(&mut self) {
        self.0.ws_current_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

pub(super) async fn ws_current(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let tx = state.cycle_tx.clone();
    let status = state.status.clone();
    ws.on_upgrade(move |socket| async move {
        let mut rx = tx.subscribe();
        if let Err(e) = stream_current(socket, &mut rx, status).await {
            tracing::info!("Current stream error: {}", e);
        }
    })
}

async fn send_text(socket: &mut WebSocket, json: String) -> bool {
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    matches!(r, Ok(Ok(())))
}

async fn stream_current(
    mut socket: WebSocket,
    rx: &mut broadcast::Receiver<CycleOutput>,
    status: Arc<WorkerStatus>,
) -> anyhow::Result<()> {
    status.ws_current_connections.fetch_add(1, Ordering::Relaxed);
    let _guard = WsCurrentGuard(status);
    tracing::info!("Client connected to current stream");

    let welcome = serde_json::json!({ "type": "info", "name": NAME, "version": VERSION });
    if !send_text(&mut socket, serde_json::to_string(&welcome)?).await {
        return Ok(());
    }

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(output) => {
                        let json = serde_json::to_string(&output)?;
                        if !send_text(&mut socket, json).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket /ws/current client lagged, skipped {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }
    Ok(())
}
