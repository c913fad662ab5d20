//! Live task feed over WebSocket.
//!
//! - Client connects with `?token=<jwt>` (browsers can't set headers on upgrade)
//! - Server sends a JSON snapshot of the caller's tasks, then one JSON
//!   message per change to those tasks
//! - Client frames are ignored apart from Close

use crate::auth::{resolve_user, AppState, SharedState};
use crate::error::ApiError;
use crate::models::{Change, LiveMessage, User};
use crate::store::StoreError;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub token: String,
}

// ── WS upgrade handler ────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<LiveQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = resolve_user(&state, &query.token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

// ── Socket lifecycle ───────────────────────────────────────────

async fn handle_socket(socket: WebSocket, state: SharedState, user: User) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (mut changes, snapshot) = match attach(&state, user.id) {
        Ok(attached) => attached,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "live snapshot failed");
            return;
        }
    };
    let Some(text) = encode(&snapshot) else { return };
    if ws_tx.send(Message::Text(text)).await.is_err() {
        return; // client already gone
    }
    tracing::debug!(user_id = %user.id, "live subscriber attached");

    // Forward this user's changes.
    let user_id = user.id;
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = next_for_user(&mut changes, user_id).await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Drain incoming frames until the client closes.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // Wait for either side to finish.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::debug!(user_id = %user_id, "live subscriber detached");
}

/// Subscribe, then read the snapshot. Any change committed after the
/// snapshot read is already queued on the receiver.
fn attach(state: &AppState, user_id: Uuid) -> Result<(Receiver<Change>, LiveMessage), StoreError> {
    let changes = state.changes.subscribe();
    let tasks = state.store.list_tasks_by_user(user_id)?;
    Ok((changes, LiveMessage::Snapshot { tasks }))
}

/// Next encoded message for `user_id`. `None` once the channel closes.
async fn next_for_user(changes: &mut Receiver<Change>, user_id: Uuid) -> Option<String> {
    loop {
        match changes.recv().await {
            Ok(change) => {
                if let Some(text) = outgoing(&change, user_id) {
                    return Some(text);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(user_id = %user_id, skipped, "live subscriber lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

fn outgoing(change: &Change, user_id: Uuid) -> Option<String> {
    if change.user_id != user_id {
        return None;
    }
    encode(&change.event)
}

fn encode(msg: &LiveMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "live message encoding failed");
            None
        }
    }
}
