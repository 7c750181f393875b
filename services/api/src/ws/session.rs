//! Manages the WebSocket connection lifecycle for a tutoring session.

use super::protocol::{self, ServerMessage};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, instrument, warn};
use tutor_core::{Flow, Inbound, SessionController, SessionEvent};

/// Outbound events buffered between the controller and the socket writer.
const EVENT_BUFFER: usize = 32;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
///
/// The session task is tracked so shutdown can wait for its teardown.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    if state.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    }
    let tasks = state.tasks.clone();
    ws.on_upgrade(move |socket| tasks.track_future(handle_socket(socket, state)))
}

/// Main handler for an individual WebSocket connection.
///
/// Starts a `SessionController`, feeds it inbound messages one at a time, and
/// always runs its teardown, whether the learner ended the session, the socket
/// closed, the connection failed, or the server is shutting down.
#[instrument(name = "ws_session", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("New WebSocket connection.");

    let (socket_tx, socket_rx) = socket.split();
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let writer = tokio::spawn(forward_events(events_rx, socket_tx).in_current_span());

    match SessionController::start(state.tutor.clone(), events_tx.clone()).await {
        Ok(mut controller) => {
            run_session(&mut controller, socket_rx, &state.shutdown).await;
            controller.finish().await;
        }
        Err(e) => {
            error!(error = %e, "Could not load learner profile; closing connection.");
            let _ = events_tx
                .send(SessionEvent::Error {
                    message: format!("Could not start session: {e}"),
                })
                .await;
        }
    }

    // Closing the channel lets the writer flush and close the socket.
    drop(events_tx);
    if let Err(e) = writer.await {
        error!(error = ?e, "Socket writer task panicked.");
    }
    info!("WebSocket connection closed.");
}

/// The receive loop. Returns when the session should be torn down.
///
/// Cancellation is only observed between messages, so a turn in flight
/// completes before teardown.
async fn run_session(
    controller: &mut SessionController,
    mut socket_rx: SplitStream<WebSocket>,
    shutdown: &CancellationToken,
) {
    loop {
        let msg_result = tokio::select! {
            msg = socket_rx.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = shutdown.cancelled() => {
                info!("Server shutting down; ending session.");
                return;
            }
        };
        let inbound = match msg_result {
            Ok(Message::Text(text)) => protocol::decode(text.as_str()),
            Ok(Message::Binary(_)) => Inbound::Malformed {
                reason: "binary frames are not supported; send JSON text".to_string(),
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close frame.");
                return;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                warn!(error = ?e, "Error receiving from client WebSocket.");
                return;
            }
        };
        if controller.handle(inbound).await == Flow::Close {
            return;
        }
    }
    info!("Client disconnected.");
}

/// Serializes controller events onto the socket until the channel closes.
async fn forward_events(
    mut events_rx: mpsc::Receiver<SessionEvent>,
    mut socket_tx: SplitSink<WebSocket, Message>,
) {
    while let Some(event) = events_rx.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, event.into()).await {
            warn!(error = ?e, "Failed to send message to client; dropping remaining events.");
            // Keep draining so the controller never blocks on a dead client.
            while events_rx.recv().await.is_some() {}
            return;
        }
    }
    let _ = socket_tx.close().await;
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
