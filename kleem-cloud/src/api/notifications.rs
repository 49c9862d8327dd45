//! Notification WebSocket endpoint
//!
//! GET /api/notifications/ws?user_id=<id>
//!
//! On connect the user's recent backlog is replayed, then every new
//! notification is pushed as a JSON text frame.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::Notification;
use shared::error::AppError;
use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    user_id: Option<String>,
}

/// GET /api/notifications/ws?user_id=<id>
///
/// `user_id` is checked before the upgrade handshake.
pub async fn handle_notifications_ws(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(user_id) = query
        .user_id
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
    else {
        return AppError::validation("user_id is required")
            .with_detail("field", "user_id")
            .into_response();
    };

    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| notifications_session(socket, state, user_id))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn notifications_session(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sink, mut stream) = socket.split();

    tracing::info!(user_id = %user_id, "Notifications WS connected");

    let (backlog, mut hub_rx) = state.hub.subscribe(&user_id);
    for notification in &backlog {
        if send_notification(&mut sink, notification).await.is_err() {
            return;
        }
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // skip immediate

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }

            event = hub_rx.recv() => {
                match event {
                    Ok(notification) => {
                        if send_notification(&mut sink, &notification).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(user_id = %user_id, lagged = n, "Notification subscriber lagged, replaying backlog");
                        let (backlog, rx) = state.hub.subscribe(&user_id);
                        hub_rx = rx;
                        let mut failed = false;
                        for notification in &backlog {
                            if send_notification(&mut sink, notification).await.is_err() {
                                failed = true;
                                break;
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(user_id = %user_id, error = %e, "Notifications WS read error");
                        break;
                    }
                    // Clients only listen; pongs and stray frames are ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!(user_id = %user_id, "Notifications WS disconnected");
}

async fn send_notification<S>(sink: &mut S, notification: &Notification) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(notification).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialize notification");
    })?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
