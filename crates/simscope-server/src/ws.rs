//! `WebSocket` connection adapter.
//!
//! Clients connect to `GET /ws`. Each connection gets its own session:
//!
//! - the reader (this task) decodes text frames and queues them for the
//!   session actor, dropping malformed frames and unknown types;
//! - the actor ([`run_session`]) applies them to the engine one at a time;
//! - the writer task encodes the actor's replies and sends them.
//!
//! The first frame a client receives is `vega_specs`. When the client
//! disconnects the actor is aborted and its history dropped. When the
//! actor sends a fatal `error`, or a reply cannot be encoded, the writer
//! closes the socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use simscope_core::Model;
use simscope_core::codec;
use simscope_types::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::session::run_session;
use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` session.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_session<M: Model>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<M>>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Wire up reader, actor, and writer for one connection and wait for
/// either side to finish.
async fn handle_socket<M: Model>(socket: WebSocket, state: Arc<AppState<M>>) {
    let session_id = Uuid::now_v7();
    let active = state.session_opened();
    info!(%session_id, active, "Session opened");

    let (sink, stream) = socket.split();
    let (inbox_tx, inbox_rx) = mpsc::channel::<ClientMessage>(state.queue_capacity());
    let (outbox_tx, outbox_rx) = mpsc::channel::<ServerMessage>(state.queue_capacity());

    let mut writer = tokio::spawn(write_frames(session_id, sink, outbox_rx));

    if outbox_tx.send(state.hello()).await.is_ok() {
        let actor = tokio::spawn(run_session(
            session_id,
            state.new_engine(),
            inbox_rx,
            outbox_tx,
        ));

        tokio::select! {
            () = read_frames(session_id, stream, inbox_tx) => {}
            _ = &mut writer => {}
        }
        actor.abort();
    }
    writer.abort();

    let active = state.session_closed();
    info!(%session_id, active, "Session closed");
}

/// Decode incoming frames and queue them in arrival order.
async fn read_frames(
    session_id: Uuid,
    mut stream: SplitStream<WebSocket>,
    inbox: mpsc::Sender<ClientMessage>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match codec::decode(text.as_str()) {
                Ok(Some(message)) => {
                    if inbox.send(message).await.is_err() {
                        debug!(%session_id, "Session actor stopped");
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%session_id, error = %e, "Dropping malformed message");
                }
            },
            Ok(Message::Close(_)) => {
                debug!(%session_id, "Client closed the connection");
                return;
            }
            Ok(_) => {
                // Binary frames carry nothing; ping/pong is handled by axum.
            }
            Err(e) => {
                debug!(%session_id, "WebSocket error: {e}");
                return;
            }
        }
    }
}

/// Encode and send replies until the actor stops or the socket fails.
async fn write_frames(
    session_id: Uuid,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = outbox.recv().await {
        let encoded = codec::encode(&message);
        if let Err(e) = &encoded {
            error!(%session_id, "Failed to serialize server message: {e}");
        }
        let frames = frames_for(encoded, message.is_terminal());
        let closing = frames.iter().any(|f| matches!(f, Message::Close(_)));
        for frame in frames {
            if sink.send(frame).await.is_err() {
                debug!(%session_id, "WebSocket client disconnected (send failed)");
                return;
            }
        }
        if closing {
            return;
        }
    }
}

/// The frames that carry one encoded reply.
///
/// A terminal reply is followed by a close frame. A reply that failed to
/// encode ends the session: the client gets an `error` and a close frame
/// in its place.
fn frames_for(encoded: Result<String, serde_json::Error>, terminal: bool) -> Vec<Message> {
    match encoded {
        Ok(text) if terminal => vec![Message::Text(text.into()), Message::Close(None)],
        Ok(text) => vec![Message::Text(text.into())],
        Err(e) => {
            let fatal = ServerMessage::Error {
                message: format!("failed to encode reply: {e}"),
            };
            match codec::encode(&fatal) {
                Ok(text) => vec![Message::Text(text.into()), Message::Close(None)],
                Err(_) => vec![Message::Close(None)],
            }
        }
    }
}
