//! Errors the engine surfaces at turn boundaries.
//!
//! Variants follow the places a turn can actually fail — the speech
//! providers, the model adapter, the checkpoint store, the client RPC
//! bridge — so the gateway maps them onto wire error codes by matching
//! variants, never by string inspection.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Transcription provider returned an unusable result after retries.
    #[error("transcription failed: {0}")]
    Stt(String),

    /// Synthesis socket failed or the provider produced no audio.
    #[error("speech synthesis failed: {0}")]
    Tts(String),

    /// The upstream model rejected the request or returned garbage.
    #[error("model {model}: {message}")]
    Model { model: String, message: String },

    /// Provider credentials rejected.
    #[error("credentials rejected: {0}")]
    AuthExpired(String),

    /// Upstream rate limit or overload.
    #[error("model overloaded: {0}")]
    Overloaded(String),

    /// A client-side tool RPC exceeded its deadline.
    #[error("client rpc {call_id} timed out after {seconds} seconds")]
    RpcTimeout { call_id: String, seconds: u64 },

    /// The per-session checkpoint store could not be opened or written.
    #[error("checkpoint store {path}: {message}")]
    Checkpoint { path: String, message: String },

    #[error("config: {0}")]
    Config(String),

    /// Filesystem failure, tagged with the operation that hit it.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Serialization failure, tagged with the payload that hit it.
    #[error("{context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_timeout_display_names_the_call() {
        let e = Error::RpcTimeout {
            call_id: "call-7".into(),
            seconds: 30,
        };
        let text = e.to_string();
        assert!(text.contains("call-7"));
        assert!(text.contains("timed out after 30 seconds"));
    }

    #[test]
    fn io_display_carries_context() {
        let e = Error::io(
            "writing checkpoint",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(e.to_string().starts_with("writing checkpoint:"));
    }
}
