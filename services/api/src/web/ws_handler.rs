//! services/api/src/web/ws_handler.rs
//!
//! The WebSocket endpoint that streams lesson generation progress. Each
//! connection holds its own set of subscribed lesson ids and receives every
//! published event for those lessons.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use lesson_core::domain::LessonId;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

type WsSender = SplitSink<WebSocket, Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();
    let mut events = app_state.events.subscribe();
    let mut subscriptions: HashSet<LessonId> = HashSet::new();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive failed");
                        break;
                    }
                };
                let reply =
                    handle_client_message(&app_state, &mut subscriptions, text.as_str()).await;
                if send(&mut sender, &reply).await.is_err() {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) if subscriptions.contains(&event.lesson_id) => {
                        if send(&mut sender, &ServerMessage::LessonEvent(event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client fell behind, events skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!(
        subscriptions = subscriptions.len(),
        "WebSocket connection closed"
    );
}

async fn handle_client_message(
    app_state: &AppState,
    subscriptions: &mut HashSet<LessonId>,
    text: &str,
) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { lesson_id }) => {
            subscriptions.insert(lesson_id);
            let status = app_state.db.get_lesson(lesson_id).await.ok().map(|l| l.status);
            debug!(lesson_id, ?status, "Client subscribed");
            ServerMessage::Subscribed { lesson_id, status }
        }
        Ok(ClientMessage::Unsubscribe { lesson_id }) => {
            subscriptions.remove(&lesson_id);
            debug!(lesson_id, "Client unsubscribed");
            ServerMessage::Unsubscribed { lesson_id }
        }
        Err(e) => ServerMessage::Error {
            message: format!("Invalid message: {}", e),
        },
    }
}

async fn send(sender: &mut WsSender, message: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}
