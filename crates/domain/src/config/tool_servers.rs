use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// External tool-server connections.
///
/// Each server is a child process speaking newline-delimited JSON-RPC on
/// stdio. Tools it advertises are registered dynamically at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolServersConfig {
    #[serde(default)]
    pub servers: Vec<ToolServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Unique server id; dynamic tool names are prefixed with it.
    pub id: String,
    /// Executable to spawn.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}
