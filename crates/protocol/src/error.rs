//! Structured error envelope surfaced to the client.
//!
//! Every error the client sees follows one JSON shape so the desktop UI can
//! render actionable toasts and logs stay machine-parseable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Transcription provider returned an unusable result after retries.
    #[serde(rename = "E_STT_FAILED")]
    SttFailed,
    /// Synthesis stream errored or produced zero chunks.
    #[serde(rename = "E_TTS_FAILED")]
    TtsFailed,
    /// A client-side tool RPC exceeded its deadline.
    #[serde(rename = "E_RPC_TIMEOUT")]
    RpcTimeout,
    /// Reasoning graph invocation raised.
    #[serde(rename = "E_GRAPH_FAILED")]
    GraphFailed,
    /// Provider credentials rejected.
    #[serde(rename = "E_AUTH_EXPIRED")]
    AuthExpired,
    /// Upstream LLM returned rate-limit / overload.
    #[serde(rename = "E_MODEL_OVERLOADED")]
    ModelOverloaded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable: true,
            session_id: session_id.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn unrecoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}
