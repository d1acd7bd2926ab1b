//! Session supervisor — the WebSocket endpoint.
//!
//! Flow:
//! 1. Client connects to `/ws/voco-stream?token=<shared-token>`
//! 2. When a session token is configured, a mismatch closes with 4001
//! 3. A session id is minted and a `TurnOrchestrator` runs the connection
//! 4. On orchestrator exit the socket closes gracefully (1011 on error)

use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

use voco_domain::ids;

use crate::session::{writer_task, Outbound, TurnOrchestrator};
use crate::state::AppState;

/// Constant-time token comparison against the startup-computed hash.
/// Hashing normalizes lengths so ct_eq always compares 32 bytes.
fn token_matches(expected_hash: &[u8], provided: &str) -> bool {
    let provided_hash = Sha256::digest(provided.as_bytes());
    provided_hash.ct_eq(expected_hash).into()
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Shared session token; required only when the server has one
    /// configured.
    pub token: Option<String>,
}

pub async fn voco_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let (sink, stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(64);
    let writer = tokio::spawn(writer_task(sink, out_rx));

    // ── Auth ─────────────────────────────────────────────────────
    if let Some(expected_hash) = &state.session_token_hash {
        let provided = token.as_deref().unwrap_or("");
        if !token_matches(expected_hash, provided) {
            tracing::warn!("rejecting connection: invalid session token");
            let _ = out_tx
                .send(Outbound::Close(4001, "invalid session token".into()))
                .await;
            drop(out_tx);
            let _ = writer.await;
            return;
        }
    }

    // ── Session ──────────────────────────────────────────────────
    let session_id = ids::generate_session_id();
    tracing::info!(session_id = %session_id, "client connected");

    let mut orchestrator =
        match TurnOrchestrator::new(state, session_id.clone(), stream, out_tx.clone()) {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "session setup failed");
                let _ = out_tx
                    .send(Outbound::Close(1011, "session setup failed".into()))
                    .await;
                drop(out_tx);
                let _ = writer.await;
                return;
            }
        };

    match orchestrator.run().await {
        Ok(()) => {
            tracing::info!(session_id = %session_id, "session ended");
            let _ = out_tx.send(Outbound::Close(1000, String::new())).await;
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "session errored");
            let _ = out_tx.send(Outbound::Close(1011, "internal error".into())).await;
        }
    }
    drop(orchestrator);
    drop(out_tx);
    // Background jobs may still hold writer clones briefly; the writer ends
    // once every sender is gone or the close frame was sent.
    let _ = writer.await;
}
