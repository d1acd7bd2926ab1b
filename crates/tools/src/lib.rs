//! Tool catalog: built-in definitions, name-based classification, remote-API
//! execution, and dynamic fan-in from external tool servers.

pub mod builtin;
pub mod registry;

pub use registry::ToolRegistry;
