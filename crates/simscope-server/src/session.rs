//! The per-connection session actor.
//!
//! One actor owns one [`SessionEngine`] and drains that connection's
//! inbox strictly in order, so at most one engine operation is ever in
//! flight and a message that arrives mid-operation simply waits in the
//! queue. Operations are CPU-bound and synchronous; each one runs on the
//! blocking pool with the engine moved in and handed back.

use simscope_core::codec;
use simscope_core::{Model, SessionEngine};
use simscope_types::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

/// Run `engine` until the inbox closes, the outbox closes, or an
/// operation fails fatally.
///
/// A fatal failure sends one `error` message before returning; the
/// writer closes the connection after it.
pub async fn run_session<M: Model>(
    session_id: Uuid,
    mut engine: SessionEngine<M>,
    mut inbox: mpsc::Receiver<ClientMessage>,
    outbox: mpsc::Sender<ServerMessage>,
) {
    while let Some(message) = inbox.recv().await {
        let kind = message.kind();
        let joined = tokio::task::spawn_blocking(move || {
            let result = codec::apply(&mut engine, message);
            (engine, result)
        })
        .await;

        let result = match joined {
            Ok((returned, result)) => {
                engine = returned;
                result
            }
            Err(e) => {
                error!(%session_id, request = kind, error = %e, "Session operation panicked");
                send_fatal(&outbox, String::from("internal error")).await;
                return;
            }
        };

        match result {
            Ok(replies) => {
                debug!(
                    %session_id,
                    request = kind,
                    replies = replies.len(),
                    step = engine.current_step(),
                    "Request handled"
                );
                for reply in replies {
                    if outbox.send(reply).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                error!(%session_id, request = kind, error = %e, "Fatal session error");
                send_fatal(&outbox, e.to_string()).await;
                return;
            }
        }
    }
    debug!(%session_id, "Session inbox closed");
}

async fn send_fatal(outbox: &mpsc::Sender<ServerMessage>, message: String) {
    if outbox.send(ServerMessage::Error { message }).await.is_err() {
        debug!("Connection already gone, dropping error message");
    }
}
