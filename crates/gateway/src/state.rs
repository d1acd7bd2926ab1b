use std::sync::Arc;

use parking_lot::RwLock;

use voco_audio::{SpeechToText, TextToSpeech, VadModelSource};
use voco_domain::config::Config;
use voco_mcp_client::McpManager;
use voco_providers::ModelRegistry;
use voco_tools::ToolRegistry;

/// Shared application state.
///
/// Everything here is process-global and shared read-mostly across
/// sessions: model weights, provider clients, the tool catalog. Per-session
/// mutable state lives in the session's `TurnOrchestrator`, never here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Audio ─────────────────────────────────────────────────────
    /// VAD weights, loaded once; each session instantiates its own model.
    pub vad_source: Arc<dyn VadModelSource>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,

    // ── Reasoning ─────────────────────────────────────────────────
    pub models: Arc<ModelRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub mcp: Arc<McpManager>,

    // ── Sandbox preview ───────────────────────────────────────────
    /// HTML served at GET /sandbox; last writer wins.
    pub sandbox: Arc<RwLock<String>>,

    // ── Security (startup-computed) ───────────────────────────────
    /// SHA-256 hash of the shared session token. `None` = open access.
    pub session_token_hash: Option<Vec<u8>>,
}
