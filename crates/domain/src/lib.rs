//! Shared domain types for the Voco cognitive engine.
//!
//! Everything here is serialization-friendly and free of I/O except for the
//! config loader and the app-data path helpers.

pub mod config;
pub mod error;
pub mod ids;
pub mod message;
pub mod model;
pub mod paths;
pub mod tool;

pub use error::{Error, Result};
pub use message::{ChatMessage, ContentPart, ToolCall, ToolContent};
pub use model::ModelTag;
pub use tool::{ToolDefinition, ToolKind};
