use voco_domain::error::Result;
use voco_domain::message::{ChatMessage, ToolCall};
use voco_domain::tool::ToolDefinition;

/// The assistant's reply for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Thin adapter over one model binding.
///
/// The capability set is deliberately small: invoke the model over a message
/// list, rebind the tool catalog, and count tokens. Everything vendor-shaped
/// (wire format, retry-worthy statuses, system-prompt placement) stays
/// inside the adapter.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the conversation and wait for the full assistant message.
    async fn invoke(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<ChatOutcome>;

    /// Replace the tool catalog used on subsequent invocations.
    fn rebind_tools(&self, tools: Vec<ToolDefinition>);

    /// Count tokens with the provider's native counter; implementations fall
    /// back to the char/4 estimate when the counter is unavailable.
    async fn count_tokens(&self, system_prompt: &str, messages: &[ChatMessage]) -> u32;

    /// The bound model identifier.
    fn model_id(&self) -> &str;
}

/// Hands out the client bound to a routing tag.
///
/// The registry implements this for production; tests substitute scripted
/// models.
pub trait ModelSource: Send + Sync {
    fn get(&self, tag: voco_domain::model::ModelTag) -> std::sync::Arc<dyn ChatModel>;
}

/// Rough char/4 token estimate shared by adapters and the budget trimmer.
pub fn estimate_tokens(system_prompt: &str, messages: &[ChatMessage]) -> u32 {
    let chars: usize = system_prompt.len()
        + messages
            .iter()
            .map(voco_domain::message::ChatMessage::approx_chars)
            .sum::<usize>();
    (chars / 4) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_counts_system_and_messages() {
        let messages = vec![
            ChatMessage::human("aaaa"),     // 4 chars
            ChatMessage::assistant("bbbb"), // 4 chars
        ];
        // 8 system chars + 8 message chars = 16 chars = 4 tokens.
        assert_eq!(estimate_tokens("ssssssss", &messages), 4);
    }

    #[test]
    fn estimate_empty_is_zero() {
        assert_eq!(estimate_tokens("", &[]), 0);
    }
}
