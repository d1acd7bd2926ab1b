//! Speech-to-text over the provider's pre-recorded endpoint.
//!
//! A full turn's audio is available once VAD fires turn-end, so the simple
//! pre-recorded POST beats holding a streaming socket open per session.

use async_trait::async_trait;
use serde_json::Value;

use voco_domain::config::SttConfig;
use voco_domain::error::{Error, Result};

/// Transcription facade; the orchestrator depends on this, not the vendor.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a complete PCM-16 LE mono buffer to text.
    ///
    /// An empty string means "nothing intelligible" and drops the turn;
    /// errors mean the provider failed after retries.
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deepgram adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DeepgramStt {
    client: reqwest::Client,
    base_url: String,
    api_key_env: String,
    model: String,
    sample_rate: u32,
    max_attempts: u32,
}

impl DeepgramStt {
    pub fn new(config: &SttConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Stt(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
            sample_rate: config.sample_rate,
            max_attempts: config.max_attempts.max(1),
        })
    }

    fn request_url(&self) -> String {
        format!(
            "{}?encoding=linear16&sample_rate={}&channels=1&model={}&smart_format=true",
            self.base_url, self.sample_rate, self.model
        )
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let api_key = std::env::var(&self.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(env = %self.api_key_env, "STT key not set — skipping transcription");
            return Ok(String::new());
        }

        let url = self.request_url();
        let mut last_error: Option<Error> = None;

        for attempt in 1..=self.max_attempts {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Token {api_key}"))
                .header("Content-Type", "audio/raw")
                .body(audio.to_vec())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let body: Value = resp
                        .json()
                        .await
                        .map_err(|e| Error::Stt(format!("malformed provider response: {e}")))?;
                    return Ok(extract_transcript(&body));
                }
                Ok(resp) if resp.status().is_client_error() => {
                    // 4xx: not retried.
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(Error::Stt(format!("HTTP {status}: {body}")));
                }
                Ok(resp) => {
                    let status = resp.status();
                    tracing::warn!(%status, attempt, max = self.max_attempts, "STT server error");
                    last_error = Some(Error::Stt(format!("HTTP {status}")));
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, max = self.max_attempts, "STT network error");
                    last_error = Some(Error::Stt(e.to_string()));
                }
            }

            if attempt < self.max_attempts {
                // Linear backoff.
                tokio::time::sleep(std::time::Duration::from_secs(attempt as u64)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Stt("no attempt produced a response".into())))
    }
}

/// Pull the first transcript out of the provider's response shape.
/// Missing or malformed paths yield an empty string, not an error.
pub fn extract_transcript(body: &Value) -> String {
    body.get("results")
        .and_then(|r| r.get("channels"))
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("alternatives"))
        .and_then(|a| a.get(0))
        .and_then(|a| a.get("transcript"))
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}
