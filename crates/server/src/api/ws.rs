//! WebSocket streams of job snapshots.
//!
//! `/ws` carries every job: a full snapshot on connect, then each update the
//! notification hub publishes. `/ws/downloads/{id}` follows one job and
//! closes once it reaches a terminal status.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use yoink_core::{Job, ServiceError};

use super::error::{service_error, ApiError};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket message sent to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Every job currently in the registry.
    Snapshot { jobs: Vec<Job> },
    /// A job changed.
    JobUpdate { job: Job },
}

type WsSender = SplitSink<WebSocket, Message>;

async fn send_message(sender: &mut WsSender, msg: &WsMessage, stream: &str) -> Result<(), ()> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize WsMessage: {}", e);
            return Ok(());
        }
    };
    WS_MESSAGES_SENT.with_label_values(&[stream]).inc();
    sender.send(Message::Text(json.into())).await.map_err(|_| {
        debug!("WebSocket send failed, client disconnected");
    })
}

fn snapshot(state: &AppState) -> WsMessage {
    let mut jobs: Vec<Job> = state.service().list_all().into_values().collect();
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    WsMessage::Snapshot { jobs }
}

/// Drain client frames until the client closes or errors.
async fn drain_client(mut receiver: futures::stream::SplitStream<WebSocket>) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Ping(data)) => {
                // Pong is handled automatically by axum
                debug!("Received ping: {:?}", data);
            }
            Ok(Message::Text(text)) => {
                debug!("Received text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }
}

// ============================================================================
// All jobs
// ============================================================================

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, receiver) = socket.split();

    // Subscribe before the snapshot so no update falls between the two.
    let mut rx = state.service().hub().subscribe_all();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let send_state = Arc::clone(&state);
    let mut send_task = tokio::spawn(async move {
        if send_message(&mut sender, &snapshot(&send_state), "all").await.is_err() {
            return;
        }
        loop {
            match rx.recv().await {
                Ok(job) => {
                    if send_message(&mut sender, &WsMessage::JobUpdate { job }, "all")
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                    // Resynchronize with a fresh snapshot
                    if send_message(&mut sender, &snapshot(&send_state), "all")
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });
    let mut recv_task = tokio::spawn(drain_client(receiver));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

// ============================================================================
// Single job
// ============================================================================

/// Follow one job. Unknown ids are rejected before the upgrade.
pub async fn job_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (initial, rx) = state
        .service()
        .hub()
        .subscribe(&id)
        .map_err(|e| service_error(ServiceError::Job(e)))?;

    Ok(ws.on_upgrade(move |socket| handle_job_socket(socket, state, initial, rx)))
}

async fn handle_job_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    initial: Job,
    mut rx: mpsc::Receiver<Job>,
) {
    let (mut sender, receiver) = socket.split();
    let job_id = initial.id.clone();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(job_id = %job_id, "WebSocket client following job");

    let mut send_task = tokio::spawn(async move {
        let mut last = initial;
        if send_message(&mut sender, &WsMessage::JobUpdate { job: last.clone() }, "job")
            .await
            .is_err()
        {
            return;
        }

        while !last.status.is_terminal() {
            match rx.recv().await {
                Some(job) => {
                    if send_message(&mut sender, &WsMessage::JobUpdate { job: job.clone() }, "job")
                        .await
                        .is_err()
                    {
                        return;
                    }
                    last = job;
                }
                None => {
                    // The hub dropped us, possibly after skipping the terminal
                    // update on a full buffer. Read the final state directly.
                    if let Ok(job) = state.service().status(&last.id) {
                        if job != last {
                            let _ = send_message(&mut sender, &WsMessage::JobUpdate { job }, "job")
                                .await;
                        }
                    }
                    break;
                }
            }
        }

        let _ = sender.send(Message::Close(None)).await;
    });
    let mut recv_task = tokio::spawn(drain_client(receiver));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!(job_id = %job_id, "WebSocket job stream closed");
}
