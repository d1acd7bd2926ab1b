mod audio;
mod llm;
mod server;
mod speech;
mod tool_servers;
mod turn;

pub use audio::*;
pub use llm::*;
pub use server::*;
pub use speech::*;
pub use tool_servers::*;
pub use turn::*;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths;

/// Environment keys the client may mutate via `update_env` (and the
/// `auth_sync` side effects). Everything else is rejected.
pub const ALLOWED_ENV_KEYS: &[&str] = &[
    "DEEPGRAM_API_KEY",
    "CARTESIA_API_KEY",
    "GITHUB_TOKEN",
    "TTS_VOICE",
    "GOOGLE_API_KEY",
    "TAVILY_API_KEY",
    "VOCO_PROJECT_PATH",
];

/// Check whether a key may be written through the client-facing env surface.
pub fn env_key_allowed(key: &str) -> bool {
    ALLOWED_ENV_KEYS.contains(&key)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tool_servers: ToolServersConfig,
    #[serde(default)]
    pub turn: TurnConfig,
}

impl Config {
    /// Load the native config file from the app-data path, then apply
    /// in-process environment overrides (env always wins).
    pub fn load() -> Result<Self> {
        let path = paths::config_file();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| Error::io("reading config file", e))?;
            toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables take precedence over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VOCO_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("VOCO_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(path) = std::env::var("VOCO_PROJECT_PATH") {
            if !path.is_empty() {
                self.turn.default_project_path = path;
            }
        }
        if let Ok(model) = std::env::var("VOCO_FULL_MODEL") {
            if !model.is_empty() {
                self.llm.full_model = model;
            }
        }
        if let Ok(model) = std::env::var("VOCO_FAST_MODEL") {
            if !model.is_empty() {
                self.llm.fast_model = model;
            }
        }
    }

    /// Validate the configuration, returning warnings and errors.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue::error("server.port", "port must be non-zero"));
        }
        if self.audio.speech_threshold <= 0.0 || self.audio.speech_threshold >= 1.0 {
            issues.push(ConfigIssue::error(
                "audio.speech_threshold",
                "must be in (0, 1)",
            ));
        }
        if self.audio.silence_frames_for_turn_end == 0 {
            issues.push(ConfigIssue::error(
                "audio.silence_frames_for_turn_end",
                "must be at least 1",
            ));
        }
        if std::env::var(&self.stt.api_key_env).unwrap_or_default().is_empty() {
            issues.push(ConfigIssue::warning(
                "stt.api_key_env",
                format!("{} is not set — voice turns will fail", self.stt.api_key_env),
            ));
        }
        if std::env::var(&self.tts.api_key_env).unwrap_or_default().is_empty() {
            issues.push(ConfigIssue::warning(
                "tts.api_key_env",
                format!("{} is not set — responses will be text-only", self.tts.api_key_env),
            ));
        }
        if self.llm.max_context_tokens < 10_000 {
            issues.push(ConfigIssue::warning(
                "llm.max_context_tokens",
                "context budget is unusually small",
            ));
        }
        if self.turn.max_checkpoints == 0 {
            issues.push(ConfigIssue::error(
                "turn.max_checkpoints",
                "must keep at least one checkpoint",
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}
