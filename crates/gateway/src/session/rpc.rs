//! Pending-RPC table.
//!
//! Maps a call id to a oneshot future resolved when the client's JSON-RPC
//! reply arrives on the WebSocket. Resolved entries are removed at resolve
//! time; unresolved entries older than the TTL are swept periodically so a
//! client that never answers cannot leak futures.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

struct PendingRpc {
    tx: oneshot::Sender<String>,
    created_at: Instant,
}

#[derive(Default)]
pub struct PendingRpcTable {
    entries: Mutex<HashMap<String, PendingRpc>>,
}

impl PendingRpcTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a future for `call_id`, replacing any stale entry with the
    /// same id (the old receiver resolves with an error).
    pub fn register(&self, call_id: &str) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let prev = self.entries.lock().insert(
            call_id.to_string(),
            PendingRpc {
                tx,
                created_at: Instant::now(),
            },
        );
        if prev.is_some() {
            tracing::warn!(call_id, "replaced existing pending RPC future");
        }
        rx
    }

    /// Resolve a future with the raw reply text. A reply whose id has no
    /// pending future is ignored without side effect.
    pub fn resolve(&self, call_id: &str, raw_reply: &str) -> bool {
        match self.entries.lock().remove(call_id) {
            Some(pending) => {
                let _ = pending.tx.send(raw_reply.to_string());
                true
            }
            None => {
                tracing::debug!(call_id, "reply for unknown call id ignored");
                false
            }
        }
    }

    /// Drop a registration (e.g. after a background wait timed out).
    pub fn remove(&self, call_id: &str) {
        self.entries.lock().remove(call_id);
    }

    /// Remove unresolved entries older than `ttl`. Returns how many were
    /// swept; their receivers resolve with an error.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, pending| now.duration_since(pending.created_at) < ttl);
        let swept = before - entries.len();
        if swept > 0 {
            tracing::info!(swept, remaining = entries.len(), "swept stale RPC futures");
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_wakes_registered_future() {
        let table = PendingRpcTable::new();
        let rx = table.register("call-1");

        assert!(table.resolve("call-1", r#"{"id":"call-1","result":"ok"}"#));
        let raw = rx.await.unwrap();
        assert!(raw.contains("\"result\":\"ok\""));
        assert!(table.is_empty(), "resolved futures never linger");
    }

    #[test]
    fn unknown_reply_is_ignored() {
        let table = PendingRpcTable::new();
        assert!(!table.resolve("ghost", "{}"));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_stale_entries() {
        let table = PendingRpcTable::new();
        let rx = table.register("old-call");
        // TTL of zero makes every entry stale.
        assert_eq!(table.sweep(Duration::ZERO), 1);
        assert!(table.is_empty());
        assert!(rx.await.is_err(), "swept receiver resolves with error");
    }

    #[test]
    fn sweep_keeps_fresh_entries() {
        let table = PendingRpcTable::new();
        let _rx = table.register("fresh");
        assert_eq!(table.sweep(Duration::from_secs(300)), 0);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn reregistering_replaces_previous() {
        let table = PendingRpcTable::new();
        let old_rx = table.register("dup");
        let new_rx = table.register("dup");
        assert_eq!(table.len(), 1);

        table.resolve("dup", "reply");
        assert!(old_rx.await.is_err());
        assert_eq!(new_rx.await.unwrap(), "reply");
    }
}
