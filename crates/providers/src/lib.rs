//! LLM provider adapters.
//!
//! The graph depends on the thin [`ChatModel`] interface — invoke, rebind
//! tools, count tokens — never on a concrete vendor SDK.

pub mod anthropic;
pub mod registry;
pub mod traits;

pub use anthropic::AnthropicModel;
pub use registry::ModelRegistry;
pub use traits::{estimate_tokens, ChatModel, ChatOutcome, ModelSource};
