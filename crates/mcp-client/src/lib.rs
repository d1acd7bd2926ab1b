//! External tool-server client.
//!
//! Each declared server is a child process speaking newline-delimited
//! JSON-RPC on stdio. At startup the manager connects to every server,
//! performs the initialize handshake, and discovers its tools; the tool
//! registry then exposes them to the reasoning graph as dynamic tools.

pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{McpError, McpManager};
pub use protocol::DiscoveredTool;
