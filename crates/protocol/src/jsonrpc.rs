//! JSON-RPC 2.0 framing for requests dispatched to the desktop client.
//!
//! Ids are strings (`"write_<proposal>"`, tool call ids) rather than
//! counters, because the reply demultiplexer keys pending futures by the
//! same id the model's tool call carried.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<RpcMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.into(),
            method: method.into(),
            params,
            meta: None,
        }
    }

    pub fn with_trace(mut self, trace_id: String) -> Self {
        if !trace_id.is_empty() {
            self.meta = Some(RpcMeta {
                trace_id: Some(trace_id),
            });
        }
        self
    }
}

/// Extract a human-readable result string from a raw JSON-RPC reply.
///
/// Success replies yield the `result` (strings as-is, everything else as
/// JSON); error replies yield the error message. Unparseable input comes
/// back verbatim so nothing is silently lost.
pub fn reply_text(raw: &str) -> String {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return raw.to_string(),
    };
    if let Some(result) = value.get("result") {
        return match result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return format!("error: {message}");
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_string_id() {
        let req = JsonRpcRequest::new(
            "write_ab12",
            "local/write_file",
            serde_json::json!({ "file_path": "README.md" }),
        );
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":\"write_ab12\""));
        assert!(!json.contains("meta"));
    }

    #[test]
    fn trace_meta_serializes_when_set() {
        let req = JsonRpcRequest::new("x", "local/read_file", Value::Null)
            .with_trace("abcd1234".into());
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"trace_id\":\"abcd1234\""));
    }

    #[test]
    fn reply_text_string_result() {
        assert_eq!(
            reply_text(r#"{"jsonrpc":"2.0","id":"1","result":"3 matches"}"#),
            "3 matches"
        );
    }

    #[test]
    fn reply_text_object_result() {
        let text = reply_text(r#"{"id":"1","result":{"files":2}}"#);
        assert!(text.contains("\"files\":2"));
    }

    #[test]
    fn reply_text_error() {
        assert_eq!(
            reply_text(r#"{"id":"1","error":{"code":-1,"message":"denied"}}"#),
            "error: denied"
        );
    }

    #[test]
    fn reply_text_garbage_passthrough() {
        assert_eq!(reply_text("not json"), "not json");
    }
}
