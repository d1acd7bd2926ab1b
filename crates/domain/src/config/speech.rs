use serde::{Deserialize, Serialize};

/// Speech-to-text provider settings (pre-recorded endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "d_stt_base_url")]
    pub base_url: String,
    #[serde(default = "d_stt_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_stt_model")]
    pub model: String,
    #[serde(default = "d_sample_rate")]
    pub sample_rate: u32,
    /// Total attempts for transient failures (5xx / network), linear backoff.
    #[serde(default = "d_stt_attempts")]
    pub max_attempts: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: d_stt_base_url(),
            api_key_env: d_stt_api_key_env(),
            model: d_stt_model(),
            sample_rate: d_sample_rate(),
            max_attempts: d_stt_attempts(),
        }
    }
}

/// Text-to-speech provider settings (streaming WebSocket endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "d_tts_ws_url")]
    pub ws_url: String,
    #[serde(default = "d_tts_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_tts_api_version")]
    pub api_version: String,
    #[serde(default = "d_tts_model")]
    pub model: String,
    #[serde(default = "d_tts_voice")]
    pub voice_id: String,
    /// Env var that overrides `voice_id` when set.
    #[serde(default = "d_tts_voice_env")]
    pub voice_env: String,
    #[serde(default = "d_sample_rate")]
    pub sample_rate: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            ws_url: d_tts_ws_url(),
            api_key_env: d_tts_api_key_env(),
            api_version: d_tts_api_version(),
            model: d_tts_model(),
            voice_id: d_tts_voice(),
            voice_env: d_tts_voice_env(),
            sample_rate: d_sample_rate(),
        }
    }
}

impl TtsConfig {
    /// Voice id, honoring the env override.
    pub fn resolve_voice(&self) -> String {
        match std::env::var(&self.voice_env) {
            Ok(v) if !v.is_empty() => v,
            _ => self.voice_id.clone(),
        }
    }
}

fn d_stt_base_url() -> String {
    "https://api.deepgram.com/v1/listen".into()
}

fn d_stt_api_key_env() -> String {
    "DEEPGRAM_API_KEY".into()
}

fn d_stt_model() -> String {
    "nova-2".into()
}

fn d_stt_attempts() -> u32 {
    3
}

fn d_tts_ws_url() -> String {
    "wss://api.cartesia.ai/tts/websocket".into()
}

fn d_tts_api_key_env() -> String {
    "CARTESIA_API_KEY".into()
}

fn d_tts_api_version() -> String {
    "2024-06-10".into()
}

fn d_tts_model() -> String {
    "sonic-english".into()
}

fn d_tts_voice() -> String {
    // "Jessica"
    "248be419-c632-4f23-adf6-5706a7c7d403".into()
}

fn d_tts_voice_env() -> String {
    "TTS_VOICE".into()
}

fn d_sample_rate() -> u32 {
    16_000
}
