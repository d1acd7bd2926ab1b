//! Token budget trimmer — prevents context-window overflow.
//!
//! Pure function over the message list. The caller supplies the total token
//! count (native counter when the provider offers one, char/4 estimate
//! otherwise); per-message removal uses the estimate.
//!
//! Protected messages (never trimmed):
//!   - the last 10 messages of any kind
//!   - the last 4 Tool messages
//!   - the paired partner of any protected tool_call / tool_result
//!
//! The pairing repair pass extends the protected set so an
//! Assistant(tool_calls) and its Tool result are kept or dropped together —
//! trimming must never split a pair, or the provider rejects the request.

use std::collections::HashSet;

use voco_domain::message::ChatMessage;

pub const DEFAULT_MAX_TOKENS: u32 = 160_000;
const KEEP_LAST_TOOL_MSGS: usize = 4;
const KEEP_LAST_CONV_MSGS: usize = 10;

/// Trim `messages` so `total_tokens` fits under `max_tokens`.
///
/// Returns the input unchanged when already under budget. The system prompt
/// is accounted for in `total_tokens` but never part of the trimmable list.
pub fn trim_to_budget(
    messages: Vec<ChatMessage>,
    total_tokens: u32,
    max_tokens: u32,
) -> Vec<ChatMessage> {
    if total_tokens <= max_tokens {
        return messages;
    }

    let protected = protected_indices(&messages);

    let mut remaining = total_tokens;
    let mut removed: HashSet<usize> = HashSet::new();
    for idx in 0..messages.len() {
        if remaining <= max_tokens {
            break;
        }
        if protected.contains(&idx) || removed.contains(&idx) {
            continue;
        }
        // Remove the message together with its pair partners so a
        // tool_call never survives without its tool_result (or vice versa).
        for partner in pair_closure(&messages, idx) {
            if removed.insert(partner) {
                remaining = remaining.saturating_sub(message_tokens(&messages[partner]));
            }
        }
    }

    if !removed.is_empty() {
        tracing::warn!(
            trimmed = removed.len(),
            total_tokens,
            remaining,
            max_tokens,
            "trimmed messages to fit token budget"
        );
    }

    messages
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !removed.contains(idx))
        .map(|(_, m)| m)
        .collect()
}

/// Indices that must survive trimming, pairing repair included.
fn protected_indices(messages: &[ChatMessage]) -> HashSet<usize> {
    let mut protected: HashSet<usize> = HashSet::new();

    // Last N conversation messages of any kind.
    let start = messages.len().saturating_sub(KEEP_LAST_CONV_MSGS);
    protected.extend(start..messages.len());

    // Last N tool messages.
    let tool_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_tool())
        .map(|(i, _)| i)
        .collect();
    let tool_start = tool_indices.len().saturating_sub(KEEP_LAST_TOOL_MSGS);
    protected.extend(tool_indices[tool_start..].iter().copied());

    // Pairing repair: pull in partners until stable.
    loop {
        let mut added = false;
        for &idx in protected.clone().iter() {
            match &messages[idx] {
                ChatMessage::Tool { call_id, .. } => {
                    if let Some(partner) = find_assistant_for(messages, call_id) {
                        if protected.insert(partner) {
                            added = true;
                        }
                    }
                }
                ChatMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                    for tc in tool_calls {
                        if let Some(partner) = find_tool_for(messages, &tc.call_id) {
                            if protected.insert(partner) {
                                added = true;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        if !added {
            break;
        }
    }

    protected
}

/// The message at `idx` plus every pair partner reachable from it.
fn pair_closure(messages: &[ChatMessage], idx: usize) -> Vec<usize> {
    let mut closure = vec![idx];
    let mut cursor = 0;
    while cursor < closure.len() {
        let current = closure[cursor];
        cursor += 1;
        match &messages[current] {
            ChatMessage::Tool { call_id, .. } => {
                if let Some(partner) = find_assistant_for(messages, call_id) {
                    if !closure.contains(&partner) {
                        closure.push(partner);
                    }
                }
            }
            ChatMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                for tc in tool_calls {
                    if let Some(partner) = find_tool_for(messages, &tc.call_id) {
                        if !closure.contains(&partner) {
                            closure.push(partner);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    closure
}

fn find_assistant_for(messages: &[ChatMessage], call_id: &str) -> Option<usize> {
    messages
        .iter()
        .position(|m| m.tool_call_ids().contains(&call_id))
}

fn find_tool_for(messages: &[ChatMessage], call_id: &str) -> Option<usize> {
    messages.iter().position(|m| match m {
        ChatMessage::Tool { call_id: id, .. } => id == call_id,
        _ => false,
    })
}

/// char/4 estimate for a single message.
fn message_tokens(msg: &ChatMessage) -> u32 {
    (msg.approx_chars() / 4) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use voco_domain::message::ToolCall;

    fn human(n: usize) -> ChatMessage {
        // ~250 tokens each.
        ChatMessage::human("x".repeat(1000) + &n.to_string())
    }

    fn call(id: &str) -> ToolCall {
        ToolCall {
            name: "read_file".into(),
            args: serde_json::json!({}),
            call_id: id.into(),
        }
    }

    #[test]
    fn under_budget_is_unchanged() {
        let messages = vec![ChatMessage::human("hi"), ChatMessage::assistant("hello")];
        let out = trim_to_budget(messages.clone(), 100, 160_000);
        assert_eq!(out, messages);
    }

    #[test]
    fn over_budget_removes_oldest_first() {
        let messages: Vec<ChatMessage> = (0..30).map(human).collect();
        // Each message is ~250 tokens; claim a 9000-token total with a 8000 cap.
        let out = trim_to_budget(messages.clone(), 9_000, 8_000);
        assert!(out.len() < messages.len());
        // The newest 10 always survive.
        assert_eq!(&out[out.len() - 10..], &messages[20..]);
        // The oldest message is the first to go.
        assert_ne!(out[0], messages[0]);
    }

    #[test]
    fn last_ten_protected_even_when_budget_unreachable() {
        let messages: Vec<ChatMessage> = (0..12).map(human).collect();
        let out = trim_to_budget(messages.clone(), 1_000_000, 1);
        assert_eq!(out.len(), 10);
        assert_eq!(&out[..], &messages[2..]);
    }

    #[test]
    fn last_four_tool_messages_protected() {
        let mut messages: Vec<ChatMessage> = Vec::new();
        for i in 0..6 {
            messages.push(ChatMessage::assistant_with_tools(
                "w".repeat(1000),
                vec![call(&format!("c{i}"))],
            ));
            messages.push(ChatMessage::tool(format!("c{i}"), "r".repeat(1000)));
        }
        // Pad with enough human messages that the tool pairs fall outside
        // the last-10 window.
        for i in 0..12 {
            messages.push(human(i));
        }

        let out = trim_to_budget(messages, 1_000_000, 1);
        let kept_tools: Vec<String> = out
            .iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { call_id, .. } => Some(call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(kept_tools, vec!["c2", "c3", "c4", "c5"]);
    }

    #[test]
    fn pairing_repair_keeps_assistant_with_kept_tool() {
        let mut messages: Vec<ChatMessage> = Vec::new();
        messages.push(ChatMessage::assistant_with_tools(
            "w".repeat(1000),
            vec![call("keep-me")],
        ));
        messages.push(ChatMessage::tool("keep-me", "r".repeat(1000)));
        for i in 0..12 {
            messages.push(human(i));
        }

        let out = trim_to_budget(messages, 1_000_000, 1);
        // The tool message is one of the last 4 tool messages, so its
        // assistant partner must survive too.
        let has_assistant = out
            .iter()
            .any(|m| m.tool_call_ids().contains(&"keep-me"));
        let has_tool = out.iter().any(|m| match m {
            ChatMessage::Tool { call_id, .. } => call_id == "keep-me",
            _ => false,
        });
        assert!(has_assistant && has_tool);
    }

    #[test]
    fn trimmed_list_never_splits_pairs() {
        // Build a long log of paired tool exchanges and verify no orphan
        // survives trimming at any budget.
        let mut messages: Vec<ChatMessage> = Vec::new();
        for i in 0..20 {
            messages.push(ChatMessage::assistant_with_tools(
                "t".repeat(500),
                vec![call(&format!("c{i}"))],
            ));
            messages.push(ChatMessage::tool(format!("c{i}"), "r".repeat(500)));
        }

        for budget in [1u32, 500, 2_000, 5_000] {
            let out = trim_to_budget(messages.clone(), 100_000, budget);
            let tool_ids: HashSet<String> = out
                .iter()
                .filter_map(|m| match m {
                    ChatMessage::Tool { call_id, .. } => Some(call_id.clone()),
                    _ => None,
                })
                .collect();
            let assistant_ids: HashSet<String> = out
                .iter()
                .flat_map(|m| {
                    m.tool_call_ids()
                        .into_iter()
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .collect();
            assert_eq!(tool_ids, assistant_ids, "budget {budget} split a pair");
        }
    }
}
