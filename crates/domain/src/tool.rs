use serde::{Deserialize, Serialize};

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// How a tool call is executed once the model requests it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Dispatched to the desktop client as a JSON-RPC request via the
    /// Instant-ACK + background pattern (the default path).
    LocalRpc,
    /// Executed in-process against an external API.
    RemoteApi,
    /// Suspends the graph for human review of a file change.
    FileProposal,
    /// Suspends the graph for human review of a shell command.
    CommandProposal,
    /// Synchronous in-band screen capture round-trip.
    InlineScreen,
    /// Synchronous in-band security scan round-trip.
    InlineScan,
    /// Stores HTML in the sandbox slot and notifies the client.
    SandboxPreview,
}
