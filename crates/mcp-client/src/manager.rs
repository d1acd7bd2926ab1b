//! Tool-server manager: connection lifecycle, discovery, dispatch.
//!
//! A server that fails to connect is logged and skipped — the rest of the
//! catalog stays usable. Dynamic tool names are prefixed with the owning
//! server id, and invocation always resolves to a string so the graph can
//! wrap the outcome in a Tool message no matter what went wrong.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use voco_domain::config::{ToolServerConfig, ToolServersConfig};
use voco_domain::tool::ToolDefinition;

use crate::protocol::{self, DiscoveredTool, ReplyBody};
use crate::transport::{StdioTransport, TransportError};

/// Deadline for handshake and tool-call requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("handshake: {0}")]
    Handshake(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct McpServer {
    id: String,
    tools: Vec<DiscoveredTool>,
    transport: StdioTransport,
}

impl McpServer {
    /// Spawn the process, perform the handshake, list tools.
    async fn initialize(config: &ToolServerConfig) -> Result<Self, McpError> {
        let transport = StdioTransport::spawn(config)?;

        let reply = transport
            .request("initialize", Some(protocol::initialize_params()), REQUEST_TIMEOUT)
            .await?;
        if let ReplyBody::Error { code, message } = reply {
            return Err(McpError::Handshake(format!(
                "initialize failed ({code}): {message}"
            )));
        }
        transport.notify("notifications/initialized").await?;

        let tools = match transport.request("tools/list", None, REQUEST_TIMEOUT).await? {
            ReplyBody::Result(result) => protocol::parse_tool_list(&result, &config.id),
            ReplyBody::Error { code, message } => {
                tracing::warn!(
                    server_id = %config.id,
                    code,
                    message = %message,
                    "tools/list failed, server will have no tools"
                );
                Vec::new()
            }
        };

        tracing::info!(
            server_id = %config.id,
            tool_count = tools.len(),
            "tool server initialized"
        );

        Ok(Self {
            id: config.id.clone(),
            tools,
            transport,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct McpManager {
    servers: HashMap<String, McpServer>,
}

impl McpManager {
    pub fn empty() -> Self {
        Self {
            servers: HashMap::new(),
        }
    }

    /// Connect to every declared server; failures are logged and skipped.
    pub async fn from_config(config: &ToolServersConfig) -> Self {
        let mut servers = HashMap::new();
        for server_config in &config.servers {
            tracing::info!(
                server_id = %server_config.id,
                command = %server_config.command,
                "connecting to tool server"
            );
            match McpServer::initialize(server_config).await {
                Ok(server) => {
                    servers.insert(server_config.id.clone(), server);
                }
                Err(e) => {
                    tracing::warn!(
                        server_id = %server_config.id,
                        error = %e,
                        "failed to connect tool server, skipping"
                    );
                }
            }
        }
        Self { servers }
    }

    /// Dynamic tool definitions for the registry, already prefixed.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .servers
            .values()
            .filter(|s| s.transport.is_alive())
            .flat_map(|server| server.tools.iter().map(|t| t.definition.clone()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Invoke a prefixed dynamic tool. Always returns a string: the joined
    /// result text on success, the protocol error marker when the server
    /// flagged one, an execution error marker otherwise.
    pub async fn invoke_text(&self, prefixed_name: &str, arguments: Value) -> String {
        let Some((server, bare_name)) = self.resolve(prefixed_name) else {
            return format!("Error executing tool {prefixed_name}: unknown tool server.");
        };

        let params = serde_json::json!({
            "name": bare_name,
            "arguments": arguments,
        });
        match server
            .transport
            .request("tools/call", Some(params), REQUEST_TIMEOUT)
            .await
        {
            Ok(ReplyBody::Result(result)) => protocol::render_call_result(&result),
            Ok(ReplyBody::Error { code, message }) => {
                tracing::warn!(tool = %prefixed_name, code, message = %message, "tool call rejected");
                format!(
                    "Error executing tool {prefixed_name}: server error {code}: {message}. \
                     Please inform the user."
                )
            }
            Err(e) => {
                tracing::error!(tool = %prefixed_name, error = %e, "tool server call failed");
                format!("Error executing tool {prefixed_name}: {e}. Please inform the user.")
            }
        }
    }

    /// Whether a prefixed name belongs to a connected server.
    pub fn owns(&self, prefixed_name: &str) -> bool {
        self.resolve(prefixed_name).is_some()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn tool_count(&self) -> usize {
        self.servers.values().map(|s| s.tools.len()).sum()
    }

    /// Split `"{server}_{tool}"` back into the owning server and the bare
    /// tool name the server dispatches on.
    fn resolve<'a>(&'a self, prefixed_name: &'a str) -> Option<(&'a McpServer, &'a str)> {
        for (id, server) in &self.servers {
            let Some(bare) = prefixed_name.strip_prefix(id.as_str()) else {
                continue;
            };
            let Some(bare) = bare.strip_prefix('_') else {
                continue;
            };
            if server.tools.iter().any(|t| t.name == bare) {
                return Some((server, bare));
            }
        }
        None
    }

    /// Shut all servers down concurrently.
    pub async fn shutdown(&self) {
        let futs: Vec<_> = self
            .servers
            .values()
            .map(|s| s.transport.shutdown())
            .collect();
        futures_util::future::join_all(futs).await;
        tracing::info!("all tool server connections closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manager_owns_nothing() {
        let manager = McpManager::empty();
        assert!(!manager.owns("notes_search"));
        assert_eq!(manager.tool_count(), 0);
        assert!(manager.tool_definitions().is_empty());
    }

    #[tokio::test]
    async fn invoke_unknown_tool_yields_error_string() {
        let manager = McpManager::empty();
        let result = manager.invoke_text("notes_search", serde_json::json!({})).await;
        assert!(result.starts_with("Error executing tool notes_search:"));
    }

    #[tokio::test]
    async fn from_config_skips_unspawnable_server() {
        let config = ToolServersConfig {
            servers: vec![ToolServerConfig {
                id: "ghost".into(),
                command: "/nonexistent/definitely-not-a-binary".into(),
                args: vec![],
                env: Default::default(),
            }],
        };
        let manager = McpManager::from_config(&config).await;
        assert_eq!(manager.server_count(), 0);
    }
}
