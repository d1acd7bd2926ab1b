use serde::{Deserialize, Serialize};

/// Turn-pipeline timeouts and per-session retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Soft deadline on the WebSocket receive loop.
    #[serde(default = "d_receive_timeout_secs")]
    pub receive_timeout_secs: u64,
    /// Hard deadline on HITL decision waits.
    #[serde(default = "d_hitl_timeout_secs")]
    pub hitl_timeout_secs: u64,
    /// Deadline on the in-band screen-frame reply.
    #[serde(default = "d_screen_timeout_secs")]
    pub screen_timeout_secs: u64,
    /// Deadline on the in-band security-scan reply.
    #[serde(default = "d_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Deadline a background job waits for its RPC reply.
    #[serde(default = "d_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Age beyond which unresolved pending-RPC futures are swept.
    #[serde(default = "d_future_ttl_secs")]
    pub future_ttl_secs: u64,
    /// Sweep period for the stale-future sweeper.
    #[serde(default = "d_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Checkpoint snapshots kept per session.
    #[serde(default = "d_max_checkpoints")]
    pub max_checkpoints: usize,
    /// Project root used when the client never sent one.
    #[serde(default)]
    pub default_project_path: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            receive_timeout_secs: d_receive_timeout_secs(),
            hitl_timeout_secs: d_hitl_timeout_secs(),
            screen_timeout_secs: d_screen_timeout_secs(),
            scan_timeout_secs: d_scan_timeout_secs(),
            rpc_timeout_secs: d_rpc_timeout_secs(),
            future_ttl_secs: d_future_ttl_secs(),
            sweep_interval_secs: d_sweep_interval_secs(),
            max_checkpoints: d_max_checkpoints(),
            default_project_path: String::new(),
        }
    }
}

fn d_receive_timeout_secs() -> u64 {
    30
}

fn d_hitl_timeout_secs() -> u64 {
    120
}

fn d_screen_timeout_secs() -> u64 {
    10
}

fn d_scan_timeout_secs() -> u64 {
    30
}

fn d_rpc_timeout_secs() -> u64 {
    30
}

fn d_future_ttl_secs() -> u64 {
    300
}

fn d_sweep_interval_secs() -> u64 {
    60
}

fn d_max_checkpoints() -> usize {
    50
}
