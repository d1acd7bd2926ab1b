use serde::{Deserialize, Serialize};

/// LLM provider settings.
///
/// The engine binds two model tiers: `fast` for the one-token router and
/// quick conversational turns, `full` for everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_fast_model")]
    pub fast_model: String,
    #[serde(default = "d_full_model")]
    pub full_model: String,
    /// Token budget for the trimmed message list.
    #[serde(default = "d_max_context_tokens")]
    pub max_context_tokens: u32,
    #[serde(default = "d_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            fast_model: d_fast_model(),
            full_model: d_full_model(),
            max_context_tokens: d_max_context_tokens(),
            max_output_tokens: d_max_output_tokens(),
            request_timeout_secs: d_request_timeout_secs(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.anthropic.com".into()
}

fn d_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}

fn d_fast_model() -> String {
    "claude-haiku-4-5".into()
}

fn d_full_model() -> String {
    "claude-sonnet-4-5".into()
}

fn d_max_context_tokens() -> u32 {
    160_000
}

fn d_max_output_tokens() -> u32 {
    4_096
}

fn d_request_timeout_secs() -> u64 {
    120
}
