//! Graph topology and routing.
//!
//! Start edge: START → context_classifier → model_selector → orchestrator.
//! After the orchestrator a pure function on the state picks the next node.
//! Terminal set: {End}. Interruptible set: {ProposalReview, CommandReview}.

use crate::state::TurnState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    ContextClassifier,
    ModelSelector,
    Orchestrator,
    ProposalReview,
    CommandReview,
    ToolDispatch,
    End,
}

impl Node {
    /// Nodes the graph suspends before, waiting for an external resume.
    pub fn is_interrupt(self) -> bool {
        matches!(self, Node::ProposalReview | Node::CommandReview)
    }
}

/// Routing after the orchestrator node. Barge-in always wins; reviews come
/// before dispatch; dispatch leaves the graph at END.
pub fn route_after_orchestrator(state: &TurnState) -> Node {
    if state.barge_in_detected {
        return Node::Orchestrator;
    }
    if !state.pending_file_proposals.is_empty() {
        return Node::ProposalReview;
    }
    if !state.pending_command_proposals.is_empty() {
        return Node::CommandReview;
    }
    if state.pending_tool_action.is_some() {
        return Node::ToolDispatch;
    }
    Node::End
}

#[cfg(test)]
mod tests {
    use super::*;
    use voco_domain::message::ToolCall;
    use voco_protocol::hitl::{CommandProposal, Proposal, ProposalAction};

    fn state() -> TurnState {
        TurnState::default()
    }

    fn with_action(mut s: TurnState) -> TurnState {
        s.pending_tool_action = Some(ToolCall {
            name: "search_codebase".into(),
            args: serde_json::json!({}),
            call_id: "x".into(),
        });
        s
    }

    fn with_proposal(mut s: TurnState) -> TurnState {
        s.pending_file_proposals.push(Proposal {
            proposal_id: "p".into(),
            action: ProposalAction::CreateFile,
            file_path: "foo.rs".into(),
            content: String::new(),
            diff: String::new(),
            description: String::new(),
            project_root: String::new(),
            source_call_id: "c".into(),
        });
        s
    }

    fn with_command(mut s: TurnState) -> TurnState {
        s.pending_command_proposals.push(CommandProposal {
            command_id: "k".into(),
            command: "git push".into(),
            description: String::new(),
            project_path: String::new(),
            source_call_id: "c".into(),
        });
        s
    }

    // Barge-in must win over every other routing signal.

    #[test]
    fn bargein_overrides_end() {
        let mut s = state();
        s.barge_in_detected = true;
        assert_eq!(route_after_orchestrator(&s), Node::Orchestrator);
    }

    #[test]
    fn bargein_overrides_tool_action() {
        let mut s = with_action(state());
        s.barge_in_detected = true;
        assert_eq!(route_after_orchestrator(&s), Node::Orchestrator);
    }

    #[test]
    fn bargein_overrides_proposals() {
        let mut s = with_proposal(state());
        s.barge_in_detected = true;
        assert_eq!(route_after_orchestrator(&s), Node::Orchestrator);
    }

    #[test]
    fn bargein_overrides_commands() {
        let mut s = with_command(state());
        s.barge_in_detected = true;
        assert_eq!(route_after_orchestrator(&s), Node::Orchestrator);
    }

    // Without barge-in, the priority order is proposals, commands, dispatch.

    #[test]
    fn no_signals_routes_to_end() {
        assert_eq!(route_after_orchestrator(&state()), Node::End);
    }

    #[test]
    fn action_routes_to_dispatch() {
        assert_eq!(
            route_after_orchestrator(&with_action(state())),
            Node::ToolDispatch
        );
    }

    #[test]
    fn proposals_route_to_review() {
        assert_eq!(
            route_after_orchestrator(&with_proposal(state())),
            Node::ProposalReview
        );
    }

    #[test]
    fn commands_route_to_review() {
        assert_eq!(
            route_after_orchestrator(&with_command(state())),
            Node::CommandReview
        );
    }

    #[test]
    fn proposals_take_priority_over_dispatch() {
        let s = with_proposal(with_action(state()));
        assert_eq!(route_after_orchestrator(&s), Node::ProposalReview);
    }

    #[test]
    fn rapid_bargein_toggle_stays_deterministic() {
        for i in 0..100 {
            let mut s = with_action(state());
            s.barge_in_detected = i % 2 == 0;
            let next = route_after_orchestrator(&s);
            if i % 2 == 0 {
                assert_eq!(next, Node::Orchestrator, "iteration {i}");
            } else {
                assert_eq!(next, Node::ToolDispatch, "iteration {i}");
            }
        }
    }

    #[test]
    fn interrupt_set() {
        assert!(Node::ProposalReview.is_interrupt());
        assert!(Node::CommandReview.is_interrupt());
        assert!(!Node::Orchestrator.is_interrupt());
        assert!(!Node::End.is_interrupt());
    }
}
