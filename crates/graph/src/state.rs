//! The root state threaded through every graph node, checkpointed after
//! every step.

use serde::{Deserialize, Serialize};

use voco_domain::message::{ChatMessage, ToolCall};
use voco_domain::model::ModelTag;
use voco_protocol::hitl::{CommandDecision, CommandProposal, Proposal, ProposalDecision};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnState {
    /// Conversation log. Append-only: nodes add messages, never rewrite.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Model tier chosen by the selector for this turn.
    #[serde(default)]
    pub routed_model: ModelTag,

    /// Winning domain tag from the context classifier.
    #[serde(default)]
    pub domain_tag: String,

    /// One-line hint appended to the system prompt.
    #[serde(default)]
    pub focused_context: String,

    /// Set when the user interrupted playback; cleared by the orchestrator.
    #[serde(default)]
    pub barge_in_detected: bool,

    /// At most one local/remote tool call per turn, dispatched after END.
    #[serde(default)]
    pub pending_tool_action: Option<ToolCall>,

    #[serde(default)]
    pub pending_file_proposals: Vec<Proposal>,

    #[serde(default)]
    pub pending_command_proposals: Vec<CommandProposal>,

    /// Supplied on resume; consumed by the review nodes.
    #[serde(default)]
    pub proposal_decisions: Vec<ProposalDecision>,

    #[serde(default)]
    pub command_decisions: Vec<CommandDecision>,

    #[serde(default)]
    pub active_project_path: String,

    #[serde(default)]
    pub turn_count: u32,
}

impl TurnState {
    /// Monotonic append reducer: messages are only ever added.
    pub fn append_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages.extend(messages);
    }

    pub fn last_human_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            ChatMessage::Human { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            ChatMessage::Assistant { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Check the tool_call↔tool_result pairing invariant: every Assistant
    /// message carrying tool calls must be immediately followed by Tool
    /// messages covering its call ids, with no intervening Assistant
    /// message. An uncovered tail (review still pending) is allowed.
    pub fn tool_pairing_holds(&self) -> bool {
        for (i, msg) in self.messages.iter().enumerate() {
            let mut wanted: Vec<&str> = msg.tool_call_ids();
            if wanted.is_empty() {
                continue;
            }
            let mut j = i + 1;
            while !wanted.is_empty() && j < self.messages.len() {
                match &self.messages[j] {
                    ChatMessage::Tool { call_id, .. } => {
                        wanted.retain(|id| id != call_id);
                        j += 1;
                    }
                    _ => break,
                }
            }
            if !wanted.is_empty() && j < self.messages.len() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voco_domain::message::ToolCall;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            name: "search_codebase".into(),
            args: serde_json::json!({}),
            call_id: id.into(),
        }
    }

    #[test]
    fn append_is_monotonic() {
        let mut state = TurnState::default();
        state.append_messages(vec![ChatMessage::human("a")]);
        state.append_messages(vec![ChatMessage::assistant("b")]);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.last_human_text(), Some("a"));
        assert_eq!(state.last_assistant_text(), Some("b"));
    }

    #[test]
    fn pairing_holds_for_ack_pattern() {
        let mut state = TurnState::default();
        state.append_messages(vec![
            ChatMessage::human("find auth"),
            ChatMessage::assistant_with_tools("searching", vec![call("c1")]),
            ChatMessage::tool("c1", "Action queued in background with Job ID: j1."),
            ChatMessage::assistant("I started the search."),
        ]);
        assert!(state.tool_pairing_holds());
    }

    #[test]
    fn pairing_violated_by_intervening_assistant() {
        let mut state = TurnState::default();
        state.append_messages(vec![
            ChatMessage::assistant_with_tools("searching", vec![call("c1")]),
            ChatMessage::assistant("oops, a second assistant turn"),
            ChatMessage::tool("c1", "late result"),
        ]);
        assert!(!state.tool_pairing_holds());
    }

    #[test]
    fn pending_tail_is_allowed() {
        let mut state = TurnState::default();
        state.append_messages(vec![ChatMessage::assistant_with_tools(
            "proposing",
            vec![call("c1")],
        )]);
        assert!(state.tool_pairing_holds());
    }

    #[test]
    fn multiple_ids_covered_by_consecutive_tools() {
        let mut state = TurnState::default();
        state.append_messages(vec![
            ChatMessage::assistant_with_tools("two files", vec![call("c1"), call("c2")]),
            ChatMessage::tool("c2", "ok"),
            ChatMessage::tool("c1", "ok"),
            ChatMessage::assistant("done"),
        ]);
        assert!(state.tool_pairing_holds());
    }

    #[test]
    fn state_round_trips_through_serde() {
        let mut state = TurnState::default();
        state.routed_model = ModelTag::Fast;
        state.focused_context = "Focus: frontend/UI work.".into();
        state.append_messages(vec![ChatMessage::human("hello")]);
        let json = serde_json::to_string(&state).unwrap();
        let parsed: TurnState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.routed_model, ModelTag::Fast);
        assert_eq!(parsed.messages.len(), 1);
    }
}
