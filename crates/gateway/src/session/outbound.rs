//! Outbound WebSocket plumbing.
//!
//! Everything leaving the session goes through one mpsc channel into a
//! single writer task, so background jobs and the turn pipeline can send
//! concurrently without sharing the sink.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;

use voco_protocol::ws::ServerMessage;

#[derive(Debug)]
pub enum Outbound {
    /// A typed server message.
    Json(ServerMessage),
    /// A pre-serialized frame (raw JSON-RPC requests).
    Raw(String),
    /// PCM-16 TTS audio.
    Audio(Vec<u8>),
    /// Close the socket with a code and stop the writer.
    Close(u16, String),
}

/// Forward outbound frames to the WebSocket sink until the channel closes,
/// the socket errors, or a `Close` frame is sent.
pub async fn writer_task(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(out) = rx.recv().await {
        let msg = match out {
            Outbound::Json(server_msg) => match serde_json::to_string(&server_msg) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::warn!(error = %e, "unserializable server message");
                    continue;
                }
            },
            Outbound::Raw(json) => Message::Text(json),
            Outbound::Audio(bytes) => Message::Binary(bytes),
            Outbound::Close(code, reason) => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        };
        if sink.send(msg).await.is_err() {
            break;
        }
    }
}
