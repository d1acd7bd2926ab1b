//! Text-to-speech over the provider's streaming WebSocket.
//!
//! Chunks flow through a bounded channel; the sender side closing the
//! channel is the end sentinel, which keeps cancellation simple — dropping
//! the receiver tears the socket task down on its next send.

use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use voco_domain::config::TtsConfig;
use voco_domain::error::{Error, Result};

/// Synthesis facade; the orchestrator depends on this, not the vendor.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize `text`, yielding raw PCM-16 chunks as they arrive.
    /// The channel closes when synthesis completes or errors.
    async fn synthesize_stream(&self, text: &str) -> Result<mpsc::Receiver<Vec<u8>>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cartesia adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CartesiaTts {
    config: TtsConfig,
}

impl CartesiaTts {
    pub fn new(config: TtsConfig) -> Self {
        Self { config }
    }

    fn ws_url(&self, api_key: &str) -> String {
        format!(
            "{}?api_key={}&cartesia_version={}",
            self.config.ws_url, api_key, self.config.api_version
        )
    }

    fn synthesis_payload(&self, text: &str, context_id: &str) -> Value {
        serde_json::json!({
            "model_id": self.config.model,
            "transcript": text,
            "voice": {
                "mode": "id",
                "id": self.config.resolve_voice(),
            },
            "output_format": {
                "container": "raw",
                "encoding": "pcm_s16le",
                "sample_rate": self.config.sample_rate,
            },
            "context_id": context_id,
            "continue": false,
        })
    }
}

#[async_trait]
impl TextToSpeech for CartesiaTts {
    async fn synthesize_stream(&self, text: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        let api_key = std::env::var(&self.config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            return Err(Error::Tts(format!(
                "{} is not set",
                self.config.api_key_env
            )));
        }

        let url = self.ws_url(&api_key);
        let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::Tts(format!("connect failed: {e}")))?;

        let context_id = uuid::Uuid::new_v4().to_string();
        let payload = self.synthesis_payload(text, &context_id);
        socket
            .send(WsMessage::Text(payload.to_string()))
            .await
            .map_err(|e| Error::Tts(format!("synthesis request failed: {e}")))?;

        tracing::info!(text_len = text.len(), "TTS synthesis started");

        let (tx, rx) = mpsc::channel::<Vec<u8>>(32);
        tokio::spawn(async move {
            while let Some(frame) = socket.next().await {
                let frame = match frame {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(error = %e, "TTS socket error");
                        break;
                    }
                };
                match frame {
                    WsMessage::Binary(bytes) => {
                        if tx.send(bytes).await.is_err() {
                            break; // receiver dropped — cancelled
                        }
                    }
                    WsMessage::Text(text) => match parse_chunk_message(&text) {
                        ChunkMessage::Data(bytes) => {
                            if tx.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        ChunkMessage::Done => break,
                        ChunkMessage::ProviderError(msg) => {
                            tracing::error!(error = %msg, "TTS provider error");
                            break;
                        }
                        ChunkMessage::Ignore => {}
                    },
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            // tx drops here: end sentinel for the consumer.
        });

        Ok(rx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum ChunkMessage {
    Data(Vec<u8>),
    Done,
    ProviderError(String),
    Ignore,
}

fn parse_chunk_message(text: &str) -> ChunkMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return ChunkMessage::Ignore,
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some("done") => return ChunkMessage::Done,
        Some("error") => return ChunkMessage::ProviderError(value.to_string()),
        _ => {}
    }
    if let Some(data) = value.get("data").and_then(|d| d.as_str()) {
        match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(bytes) => return ChunkMessage::Data(bytes),
            Err(e) => {
                tracing::debug!(error = %e, "undecodable TTS data chunk");
                return ChunkMessage::Ignore;
            }
        }
    }
    ChunkMessage::Ignore
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tts() -> CartesiaTts {
        CartesiaTts::new(TtsConfig::default())
    }

    #[test]
    fn payload_carries_output_format() {
        let payload = tts().synthesis_payload("hello", "ctx-1");
        assert_eq!(payload["transcript"], "hello");
        assert_eq!(payload["output_format"]["encoding"], "pcm_s16le");
        assert_eq!(payload["output_format"]["sample_rate"], 16_000);
        assert_eq!(payload["continue"], false);
    }

    #[test]
    fn parse_done_message() {
        assert!(matches!(
            parse_chunk_message(r#"{"type":"done"}"#),
            ChunkMessage::Done
        ));
    }

    #[test]
    fn parse_error_message() {
        assert!(matches!(
            parse_chunk_message(r#"{"type":"error","message":"bad voice"}"#),
            ChunkMessage::ProviderError(_)
        ));
    }

    #[test]
    fn parse_base64_data_chunk() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3, 4]);
        let raw = format!(r#"{{"data":"{encoded}"}}"#);
        match parse_chunk_message(&raw) {
            ChunkMessage::Data(bytes) => assert_eq!(bytes, vec![1, 2, 3, 4]),
            _ => panic!("expected data chunk"),
        }
    }

    #[test]
    fn parse_junk_is_ignored() {
        assert!(matches!(parse_chunk_message("junk"), ChunkMessage::Ignore));
        assert!(matches!(
            parse_chunk_message(r#"{"type":"metadata"}"#),
            ChunkMessage::Ignore
        ));
    }

    #[test]
    fn ws_url_carries_key_and_version() {
        let url = tts().ws_url("sk-123");
        assert!(url.starts_with("wss://api.cartesia.ai/tts/websocket?api_key=sk-123"));
        assert!(url.contains("cartesia_version=2024-06-10"));
    }
}
