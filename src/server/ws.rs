//! Per-connection websocket task
//!
//! One task per signaling client. The read half parses inbound JSON and
//! dispatches into the relay; a spawned writer drains the session's
//! bounded channel into the socket, so slow sockets never block routing.
//! The session is torn down on any close path: socket close, read error
//! or writer failure.

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{SessionId, SignalingMessage};
use crate::server::router::AppState;

pub(crate) async fn handle_session(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel(state.channel_capacity);
    let session_id = state.relay.registry().register(tx.clone()).await;
    state.relay.stats().session_opened();

    // The id message is the first thing the client sees; it goes through
    // the same channel as everything else to preserve ordering.
    if tx
        .send(SignalingMessage::Id {
            client_id: session_id.clone(),
        })
        .await
        .is_err()
    {
        state.relay.handle_disconnect(&session_id).await;
        state.relay.stats().session_closed();
        return;
    }

    let writer_id = session_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(session_id = %writer_id, error = %e, "Failed to encode message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(Utf8Bytes::from(text))).await.is_err() {
                tracing::debug!(session_id = %writer_id, "Socket write failed, writer stopping");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &session_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary: ignored
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "Socket read error");
                        break;
                    }
                }
            }
        }
    }

    writer.abort();
    state.relay.handle_disconnect(&session_id).await;
    state.store.remove_session(&session_id).await;
    state.relay.stats().session_closed();
    tracing::info!(session_id = %session_id, "Session closed");
}

async fn handle_text(state: &AppState, session_id: &SessionId, text: &str) {
    let msg: SignalingMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            // Malformed frames are the client's problem, not the relay's.
            tracing::warn!(session_id = %session_id, error = %e, "Unparseable message, skipped");
            return;
        }
    };

    tracing::trace!(session_id = %session_id, kind = msg.kind(), "Message received");
    match msg {
        SignalingMessage::Join => state.relay.handle_join(session_id).await,
        msg if msg.is_directed() => state.relay.route(session_id, msg).await,
        msg => {
            tracing::debug!(
                session_id = %session_id,
                kind = msg.kind(),
                "Undirected client message ignored"
            );
        }
    }
}
