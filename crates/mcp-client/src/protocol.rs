//! Wire framing for the tool-server protocol.
//!
//! One JSON object per line in both directions. Outbound traffic is a
//! single shape — a request when `id` is set, a notification when it is
//! not; voco only ever sends four methods (`initialize`,
//! `notifications/initialized`, `tools/list`, `tools/call`), so the frame
//! type stays deliberately small. Inbound lines are classified by
//! [`parse_server_line`]; the reader drops anything that is not a reply to
//! one of our ids. Tool discovery and call results are translated here,
//! straight into the registry's shapes: [`DiscoveredTool`] wraps a voco
//! [`ToolDefinition`], and [`render_call_result`] produces the
//! always-a-string contract the graph wraps in Tool messages.

use serde::Serialize;
use serde_json::Value;

use voco_domain::tool::ToolDefinition;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One outbound line. `id: None` makes it a notification.
#[derive(Debug, Clone, Serialize)]
pub struct Outgoing {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Outgoing {
    pub fn request(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.into(),
            params: None,
        }
    }

    /// The newline-terminated wire form.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Handshake parameters. Capabilities stay empty — voco only consumes
/// tools, it offers nothing back to the server.
pub fn initialize_params() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "voco-engine",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a reply carried.
#[derive(Debug, Clone)]
pub enum ReplyBody {
    Result(Value),
    Error { code: i64, message: String },
}

/// Classification of one inbound line.
#[derive(Debug)]
pub enum ServerLine {
    /// A reply to one of our request ids.
    Reply { id: u64, body: ReplyBody },
    /// Notification, server-initiated request, or JSON noise — skipped.
    Other,
}

pub fn parse_server_line(line: &str) -> ServerLine {
    let value: Value = match serde_json::from_str(line.trim()) {
        Ok(v) => v,
        Err(_) => return ServerLine::Other,
    };
    let Some(id) = value.get("id").and_then(|i| i.as_u64()) else {
        return ServerLine::Other;
    };
    if let Some(error) = value.get("error") {
        return ServerLine::Reply {
            id,
            body: ReplyBody::Error {
                code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            },
        };
    }
    // A server-initiated request carries an id and a method; voco never
    // answers those.
    if value.get("method").is_some() {
        return ServerLine::Other;
    }
    ServerLine::Reply {
        id,
        body: ReplyBody::Result(value.get("result").cloned().unwrap_or(Value::Null)),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool discovery / call results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool advertised by a server: the bare name the server dispatches on,
/// plus the prefixed definition the registry hands to the model.
#[derive(Debug, Clone)]
pub struct DiscoveredTool {
    pub name: String,
    pub definition: ToolDefinition,
}

/// Pull the advertised tools out of a `tools/list` result.
///
/// Entries without a name are skipped; a missing description or input
/// schema gets a usable default. The JSON-schema-shaped `inputSchema`
/// carries over directly as the definition's argument schema.
pub fn parse_tool_list(result: &Value, server_id: &str) -> Vec<DiscoveredTool> {
    let Some(tools) = result.get("tools").and_then(|t| t.as_array()) else {
        return Vec::new();
    };

    tools
        .iter()
        .filter_map(|tool| {
            let name = tool.get("name").and_then(|n| n.as_str())?;
            let description = tool
                .get("description")
                .and_then(|d| d.as_str())
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!("Tool '{name}' from the {server_id} tool server.")
                });
            let parameters = tool.get("inputSchema").cloned().unwrap_or_else(|| {
                serde_json::json!({ "type": "object", "properties": {} })
            });
            Some(DiscoveredTool {
                name: name.to_string(),
                definition: ToolDefinition {
                    name: format!("{server_id}_{name}"),
                    description,
                    parameters,
                },
            })
        })
        .collect()
}

/// Flatten a `tools/call` result into voco's string contract.
///
/// Text blocks are joined, non-text blocks become placeholders, and the
/// protocol-level error flag turns the whole thing into the
/// `"Tool returned an error: …"` marker the graph expects.
pub fn render_call_result(result: &Value) -> String {
    let is_error = result
        .get("isError")
        .and_then(|e| e.as_bool())
        .unwrap_or(false);

    let parts: Vec<String> = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .map(|block| match block.get("type").and_then(|t| t.as_str()) {
                    Some("text") => block
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or("")
                        .to_string(),
                    Some(other) => format!("[{other} content]"),
                    None => String::new(),
                })
                .collect()
        })
        .unwrap_or_default();

    let text = if parts.is_empty() {
        "(no output)".to_string()
    } else {
        parts.join("\n")
    };

    if is_error {
        format!("Tool returned an error: {text}")
    } else {
        text
    }
}
