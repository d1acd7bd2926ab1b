//! Child-process transport.
//!
//! Mirrors the engine's pending-RPC architecture: a dedicated reader task
//! owns the child's stdout and resolves replies into oneshot futures keyed
//! by request id. Concurrent callers therefore never serialize whole
//! request/response cycles against each other, and a server that streams
//! notifications between replies cannot wedge an unrelated call. When the
//! process dies the reader fails every outstanding request at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::oneshot;

use voco_domain::config::ToolServerConfig;

use crate::protocol::{self, Outgoing, ReplyBody, ServerLine};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("tool server closed the connection")]
    Closed,

    #[error("stdin write failed: {0}")]
    Write(std::io::Error),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("request could not be serialized: {0}")]
    Encode(#[from] serde_json::Error),
}

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<ReplyBody>>>>;

pub struct StdioTransport {
    server_id: String,
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Child>,
    pending: PendingReplies,
    reader: tokio::task::JoinHandle<()>,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
}

impl StdioTransport {
    /// Spawn the configured child process and start its reader task.
    pub fn spawn(config: &ToolServerConfig) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let spawn_err = |source| TransportError::Spawn {
            command: config.command.clone(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_err)?;
        let stdin = child.stdin.take().ok_or_else(|| {
            spawn_err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin not captured",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            spawn_err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdout not captured",
            ))
        })?;

        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(
            config.id.clone(),
            BufReader::new(stdout),
            pending.clone(),
            alive.clone(),
        ));

        Ok(Self {
            server_id: config.id.clone(),
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(child),
            pending,
            reader,
            next_id: AtomicU64::new(1),
            alive,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a request and await its reply. The caller picks the deadline;
    /// on timeout the pending slot is dropped so a late reply is ignored.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<ReplyBody, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = Outgoing::request(id, method, params).to_line()?;
        tracing::debug!(server_id = %self.server_id, id, method, "tool server request");
        if let Err(e) = self.write_line(&frame).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(body)) => Ok(body),
            // The reader dropped the sender: the process died mid-flight.
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    pub async fn notify(&self, method: &str) -> Result<(), TransportError> {
        let frame = Outgoing::notification(method).to_line()?;
        self.write_line(&frame).await
    }

    /// Close stdin, give the process a moment to exit, then kill it. The
    /// reader ends on its own at stdout EOF.
    pub async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server_id = %self.server_id, ?status, "tool server exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(server_id = %self.server_id, error = %e, "error waiting for tool server");
            }
            Err(_) => {
                tracing::warn!(server_id = %self.server_id, "tool server still running, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(server_id = %self.server_id, error = %e, "failed to kill tool server");
                }
            }
        }
        self.reader.abort();
    }

    async fn write_line(&self, frame: &str) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(TransportError::Write)?;
        stdin.flush().await.map_err(TransportError::Write)
    }
}

/// Reader task: owns stdout, routes replies to their pending futures, and
/// skips everything else (notifications, servers that log to stdout). Ends
/// on EOF or a read error, failing every outstanding request.
async fn read_loop(
    server_id: String,
    mut stdout: BufReader<ChildStdout>,
    pending: PendingReplies,
    alive: Arc<AtomicBool>,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match stdout.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if line.trim().is_empty() {
            continue;
        }
        match protocol::parse_server_line(&line) {
            ServerLine::Reply { id, body } => match pending.lock().remove(&id) {
                Some(tx) => {
                    let _ = tx.send(body);
                }
                None => {
                    tracing::debug!(server_id = %server_id, id, "reply for unknown or expired request");
                }
            },
            ServerLine::Other => {
                tracing::trace!(server_id = %server_id, "skipping non-reply line");
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Drop the senders: everyone still waiting sees the connection close.
    pending.lock().clear();
    tracing::debug!(server_id = %server_id, "tool server reader ended");
}
