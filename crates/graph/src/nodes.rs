//! Graph node implementations.
//!
//! Each node is a function over [`TurnState`]; the driver in `graph.rs`
//! sequences them and the router decides what runs next.

use std::sync::Arc;

use voco_domain::error::Result;
use voco_domain::ids;
use voco_domain::message::{ChatMessage, ToolCall};
use voco_domain::model::ModelTag;
use voco_domain::tool::ToolKind;
use voco_protocol::hitl::{
    CommandProposal, DecisionStatus, Proposal, ProposalAction, ProposalDecision,
};
use voco_providers::ChatModel;

use crate::state::TurnState;
use crate::token_budget;

/// Note appended ahead of the LLM call when the user cut playback short.
const INTERRUPTED_NOTE: &str =
    "[USER INTERRUPTED] Audio playback was cut off; the previous spoken response \
     may not have been heard in full.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// context_classifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "ui",
        &[
            "ui", "button", "component", "css", "style", "layout", "frontend", "react", "render",
            "screen",
        ],
    ),
    (
        "database",
        &[
            "database", "sql", "query", "migration", "schema", "postgres", "sqlite", "table",
            "index",
        ],
    ),
    (
        "api",
        &[
            "api", "endpoint", "route", "request", "http", "rest", "websocket", "server",
        ],
    ),
    (
        "devops",
        &[
            "deploy", "docker", "ci", "pipeline", "kubernetes", "build", "release", "container",
        ],
    ),
    (
        "git",
        &[
            "git", "commit", "branch", "merge", "push", "pull request", "rebase", "diff",
        ],
    ),
];

fn focus_hint(tag: &str) -> &'static str {
    match tag {
        "ui" => "Focus: frontend/UI work — components, styling, layout.",
        "database" => "Focus: data layer — schemas, queries, migrations.",
        "api" => "Focus: service surface — endpoints, routing, contracts.",
        "devops" => "Focus: build and deployment — CI, containers, releases.",
        "git" => "Focus: version control — branches, commits, reviews.",
        _ => "Focus: general software assistance.",
    }
}

/// Score the last Human message against the keyword table and write the
/// winning tag plus a one-line focus hint.
pub fn classify_context(state: &mut TurnState) {
    let text = state.last_human_text().unwrap_or("").to_lowercase();

    let mut best_tag = "general";
    let mut best_score = 0usize;
    for (tag, keywords) in DOMAIN_KEYWORDS.iter().copied() {
        let score = keywords.iter().filter(|kw| text.contains(*kw)).count();
        if score > best_score {
            best_score = score;
            best_tag = tag;
        }
    }

    state.domain_tag = best_tag.to_string();
    state.focused_context = focus_hint(best_tag).to_string();
    tracing::debug!(tag = %best_tag, score = best_score, "context classified");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// model_selector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SELECTOR_PROMPT: &str = "You route coding-assistant requests to a model tier. \
    Reply with exactly one word. Say 'fast' for short conversational requests, \
    acknowledgements, and simple questions. Say 'full' for anything involving \
    code changes, tools, multi-step work, or careful reasoning.";

/// One-token fast/full classification using the fast model. Any failure or
/// unexpected answer defaults to the full path.
pub async fn select_model(fast: Arc<dyn ChatModel>, state: &TurnState) -> ModelTag {
    let Some(request) = state.last_human_text() else {
        return ModelTag::Full;
    };

    match fast
        .invoke(SELECTOR_PROMPT, &[ChatMessage::human(request)])
        .await
    {
        Ok(outcome) => {
            let answer = outcome.text.trim().to_lowercase();
            if answer.starts_with("fast") {
                ModelTag::Fast
            } else {
                ModelTag::Full
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "model selector failed, defaulting to full path");
            ModelTag::Full
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Classify a tool call for partitioning without consulting the registry:
/// proposal tools are fixed names, everything else is the single action.
fn partition_kind(name: &str) -> ToolKind {
    match name {
        "propose_file_creation" | "propose_file_edit" => ToolKind::FileProposal,
        "propose_command" => ToolKind::CommandProposal,
        _ => ToolKind::LocalRpc,
    }
}

/// Invoke the selected model and fold its response into the state.
///
/// The budget trim applies to the request only — the log itself stays
/// append-only. Tool calls are partitioned into file proposals, command
/// proposals, and at most one pending action; parallel tool use is disabled
/// at the adapter, and any extra non-proposal call is dropped here with a
/// warning.
pub async fn run_orchestrator(
    model: Arc<dyn ChatModel>,
    state: &mut TurnState,
    system_prompt: &str,
    max_context_tokens: u32,
) -> Result<()> {
    state.pending_tool_action = None;

    if state.barge_in_detected {
        state.barge_in_detected = false;
        state.append_messages(vec![ChatMessage::system(INTERRUPTED_NOTE)]);
    }

    let full_prompt = if state.focused_context.is_empty() {
        system_prompt.to_string()
    } else {
        format!("{system_prompt}\n\n{}", state.focused_context)
    };

    let total_tokens = model.count_tokens(&full_prompt, &state.messages).await;
    let request_messages =
        token_budget::trim_to_budget(state.messages.clone(), total_tokens, max_context_tokens);

    let outcome = model.invoke(&full_prompt, &request_messages).await?;
    tracing::debug!(
        model = %model.model_id(),
        tool_calls = outcome.tool_calls.len(),
        input_tokens = outcome.input_tokens,
        output_tokens = outcome.output_tokens,
        "orchestrator response"
    );

    state.append_messages(vec![ChatMessage::assistant_with_tools(
        outcome.text.clone(),
        outcome.tool_calls.clone(),
    )]);

    partition_tool_calls(state, outcome.tool_calls);
    Ok(())
}

fn partition_tool_calls(state: &mut TurnState, tool_calls: Vec<ToolCall>) {
    let mut has_review_calls = false;

    for tc in tool_calls {
        match partition_kind(&tc.name) {
            ToolKind::FileProposal => {
                has_review_calls = true;
                let proposal = proposal_from_call(&tc, state);
                state.pending_file_proposals.push(proposal);
            }
            ToolKind::CommandProposal => {
                has_review_calls = true;
                let command = command_from_call(&tc, state);
                state.pending_command_proposals.push(command);
            }
            _ => {
                if state.pending_tool_action.is_none() {
                    state.pending_tool_action = Some(tc);
                } else {
                    tracing::warn!(
                        tool = %tc.name,
                        call_id = %tc.call_id,
                        "dropping extra tool call — one action per turn"
                    );
                }
            }
        }
    }

    // A review suspends the graph before any dispatch could answer the
    // action's call id, which would break the pairing contract.
    if has_review_calls {
        if let Some(dropped) = state.pending_tool_action.take() {
            tracing::warn!(
                tool = %dropped.name,
                call_id = %dropped.call_id,
                "dropping tool action that arrived alongside review proposals"
            );
        }
    }
}

fn proposal_from_call(tc: &ToolCall, state: &TurnState) -> Proposal {
    let action = if tc.name == "propose_file_edit" {
        ProposalAction::EditFile
    } else {
        ProposalAction::CreateFile
    };
    Proposal {
        proposal_id: ids::generate_proposal_id(),
        action,
        file_path: str_arg(&tc.args, "file_path"),
        content: str_arg(&tc.args, "content"),
        diff: str_arg(&tc.args, "diff"),
        description: str_arg(&tc.args, "description"),
        project_root: state.active_project_path.clone(),
        source_call_id: tc.call_id.clone(),
    }
}

fn command_from_call(tc: &ToolCall, state: &TurnState) -> CommandProposal {
    let project_path = {
        let arg = str_arg(&tc.args, "project_path");
        if arg.is_empty() {
            state.active_project_path.clone()
        } else {
            arg
        }
    };
    CommandProposal {
        command_id: ids::generate_proposal_id(),
        command: str_arg(&tc.args, "command"),
        description: str_arg(&tc.args, "description"),
        project_path,
        source_call_id: tc.call_id.clone(),
    }
}

fn str_arg(args: &serde_json::Value, key: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// proposal_review / command_review
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fold proposal decisions into the log: one summary Tool message per
/// originating assistant call, then clear the pending list.
///
/// A proposal with no decision (HITL timeout) is reported as unreviewed so
/// the call id is still answered and the model knows nothing was written.
pub fn apply_proposal_decisions(state: &mut TurnState) -> Vec<ChatMessage> {
    let decisions = std::mem::take(&mut state.proposal_decisions);
    let proposals = std::mem::take(&mut state.pending_file_proposals);

    let mut messages = Vec::new();
    for (call_id, group) in group_by_call(proposals.iter().map(|p| (p.source_call_id.clone(), p))) {
        let lines: Vec<String> = group
            .iter()
            .map(|p| {
                let verb = match p.action {
                    ProposalAction::CreateFile => "create",
                    ProposalAction::EditFile => "edit",
                };
                let status = decision_label(
                    decisions
                        .iter()
                        .find(|d| d.proposal_id == p.proposal_id)
                        .map(|d| d.status),
                );
                format!("- {verb} {}: {status}", p.file_path)
            })
            .collect();
        messages.push(ChatMessage::tool(
            call_id,
            format!("File proposal review complete:\n{}", lines.join("\n")),
        ));
    }
    messages
}

/// Command analog of [`apply_proposal_decisions`]; captured output from
/// approved commands is attached inline.
pub fn apply_command_decisions(state: &mut TurnState) -> Vec<ChatMessage> {
    let decisions = std::mem::take(&mut state.command_decisions);
    let commands = std::mem::take(&mut state.pending_command_proposals);

    let mut messages = Vec::new();
    for (call_id, group) in group_by_call(commands.iter().map(|c| (c.source_call_id.clone(), c))) {
        let lines: Vec<String> = group
            .iter()
            .map(|c| {
                let decision = decisions.iter().find(|d| d.command_id == c.command_id);
                let status = decision_label(decision.map(|d| d.status));
                let mut line = format!("- `{}`: {status}", c.command);
                if let Some(output) = decision.and_then(|d| d.output.as_deref()) {
                    if !output.is_empty() {
                        line.push_str(&format!("\n  output: {}", truncate(output, 1000)));
                    }
                }
                line
            })
            .collect();
        messages.push(ChatMessage::tool(
            call_id,
            format!("Command review complete:\n{}", lines.join("\n")),
        ));
    }
    messages
}

fn decision_label(status: Option<DecisionStatus>) -> &'static str {
    match status {
        Some(DecisionStatus::Approved) => "approved",
        Some(DecisionStatus::Rejected) => "rejected",
        None => "no decision received (review timed out)",
    }
}

/// Group items by call id, preserving first-seen order.
fn group_by_call<'a, T>(items: impl Iterator<Item = (String, &'a T)>) -> Vec<(String, Vec<&'a T>)> {
    let mut groups: Vec<(String, Vec<&'a T>)> = Vec::new();
    for (call_id, item) in items {
        match groups.iter_mut().find(|(id, _)| *id == call_id) {
            Some((_, group)) => group.push(item),
            None => groups.push((call_id, vec![item])),
        }
    }
    groups
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &s[..cut])
    }
}

/// Lookup decisions by proposal, exposed for the HITL phase (write-RPC
/// dispatch needs approved create_file proposals with their content).
pub fn approved_file_creations<'a>(
    proposals: &'a [Proposal],
    decisions: &[ProposalDecision],
) -> Vec<&'a Proposal> {
    proposals
        .iter()
        .filter(|p| p.action == ProposalAction::CreateFile)
        .filter(|p| {
            decisions
                .iter()
                .any(|d| d.proposal_id == p.proposal_id && d.status == DecisionStatus::Approved)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use voco_protocol::hitl::CommandDecision;

    fn call(name: &str, id: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.into(),
            args,
            call_id: id.into(),
        }
    }

    // ── context_classifier ─────────────────────────────────────────

    #[test]
    fn classifier_picks_ui_for_frontend_request() {
        let mut state = TurnState::default();
        state.append_messages(vec![ChatMessage::human(
            "the submit button component has a broken css layout",
        )]);
        classify_context(&mut state);
        assert_eq!(state.domain_tag, "ui");
        assert!(state.focused_context.contains("frontend"));
    }

    #[test]
    fn classifier_defaults_to_general() {
        let mut state = TurnState::default();
        state.append_messages(vec![ChatMessage::human("hello there")]);
        classify_context(&mut state);
        assert_eq!(state.domain_tag, "general");
    }

    #[test]
    fn classifier_picks_highest_scoring_tag() {
        let mut state = TurnState::default();
        state.append_messages(vec![ChatMessage::human(
            "write a sql migration for the users table schema",
        )]);
        classify_context(&mut state);
        assert_eq!(state.domain_tag, "database");
    }

    // ── partition ──────────────────────────────────────────────────

    #[test]
    fn partition_collects_proposals_and_commands() {
        let mut state = TurnState::default();
        state.active_project_path = "/work/app".into();
        partition_tool_calls(
            &mut state,
            vec![
                call(
                    "propose_file_creation",
                    "c1",
                    serde_json::json!({
                        "file_path": "README.md",
                        "content": "# hi",
                        "description": "readme"
                    }),
                ),
                call(
                    "propose_command",
                    "c2",
                    serde_json::json!({ "command": "npm test", "description": "run tests" }),
                ),
            ],
        );
        assert_eq!(state.pending_file_proposals.len(), 1);
        assert_eq!(state.pending_command_proposals.len(), 1);
        let p = &state.pending_file_proposals[0];
        assert_eq!(p.action, ProposalAction::CreateFile);
        assert_eq!(p.project_root, "/work/app");
        assert_eq!(p.source_call_id, "c1");
        assert_eq!(state.pending_command_proposals[0].project_path, "/work/app");
        assert!(state.pending_tool_action.is_none());
    }

    #[test]
    fn partition_keeps_first_action_drops_extras() {
        let mut state = TurnState::default();
        partition_tool_calls(
            &mut state,
            vec![
                call("search_codebase", "c1", serde_json::json!({})),
                call("read_file", "c2", serde_json::json!({})),
            ],
        );
        assert_eq!(
            state.pending_tool_action.as_ref().unwrap().call_id,
            "c1"
        );
    }

    #[test]
    fn partition_drops_action_when_review_pending() {
        let mut state = TurnState::default();
        partition_tool_calls(
            &mut state,
            vec![
                call("search_codebase", "c1", serde_json::json!({})),
                call(
                    "propose_command",
                    "c2",
                    serde_json::json!({ "command": "ls", "description": "list" }),
                ),
            ],
        );
        assert!(state.pending_tool_action.is_none());
        assert_eq!(state.pending_command_proposals.len(), 1);
    }

    // ── review decisions ───────────────────────────────────────────

    fn proposal(id: &str, call_id: &str, path: &str) -> Proposal {
        Proposal {
            proposal_id: id.into(),
            action: ProposalAction::CreateFile,
            file_path: path.into(),
            content: "x".into(),
            diff: String::new(),
            description: "d".into(),
            project_root: String::new(),
            source_call_id: call_id.into(),
        }
    }

    #[test]
    fn proposal_summary_pairs_source_call() {
        let mut state = TurnState::default();
        state.pending_file_proposals = vec![proposal("p1", "c9", "README.md")];
        state.proposal_decisions = vec![ProposalDecision {
            proposal_id: "p1".into(),
            status: DecisionStatus::Approved,
        }];

        let messages = apply_proposal_decisions(&mut state);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ChatMessage::Tool { call_id, .. } => assert_eq!(call_id, "c9"),
            other => panic!("expected Tool message, got {other:?}"),
        }
        assert!(messages[0].text().unwrap().contains("README.md: approved"));
        assert!(state.pending_file_proposals.is_empty());
        assert!(state.proposal_decisions.is_empty());
    }

    #[test]
    fn timeout_yields_unreviewed_summary() {
        let mut state = TurnState::default();
        state.pending_file_proposals = vec![proposal("p1", "c9", "a.rs")];
        // No decisions supplied.
        let messages = apply_proposal_decisions(&mut state);
        assert!(messages[0].text().unwrap().contains("no decision received"));
    }

    #[test]
    fn proposals_group_by_originating_call() {
        let mut state = TurnState::default();
        state.pending_file_proposals = vec![
            proposal("p1", "c1", "a.rs"),
            proposal("p2", "c1", "b.rs"),
            proposal("p3", "c2", "c.rs"),
        ];
        let messages = apply_proposal_decisions(&mut state);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn command_summary_includes_output() {
        let mut state = TurnState::default();
        state.pending_command_proposals = vec![CommandProposal {
            command_id: "k1".into(),
            command: "npm test".into(),
            description: "run tests".into(),
            project_path: "/work".into(),
            source_call_id: "c3".into(),
        }];
        state.command_decisions = vec![CommandDecision {
            command_id: "k1".into(),
            status: DecisionStatus::Approved,
            output: Some("12 passing".into()),
        }];

        let messages = apply_command_decisions(&mut state);
        let text = messages[0].text().unwrap();
        assert!(text.contains("`npm test`: approved"));
        assert!(text.contains("12 passing"));
    }

    #[test]
    fn rejected_command_noted_without_output() {
        let mut state = TurnState::default();
        state.pending_command_proposals = vec![CommandProposal {
            command_id: "k1".into(),
            command: "rm -rf /".into(),
            description: "danger".into(),
            project_path: String::new(),
            source_call_id: "c3".into(),
        }];
        state.command_decisions = vec![CommandDecision {
            command_id: "k1".into(),
            status: DecisionStatus::Rejected,
            output: None,
        }];

        let messages = apply_command_decisions(&mut state);
        assert!(messages[0].text().unwrap().contains("`rm -rf /`: rejected"));
    }

    #[test]
    fn approved_file_creations_filters_correctly() {
        let proposals = vec![proposal("p1", "c1", "a.rs"), proposal("p2", "c1", "b.rs")];
        let decisions = vec![
            ProposalDecision {
                proposal_id: "p1".into(),
                status: DecisionStatus::Approved,
            },
            ProposalDecision {
                proposal_id: "p2".into(),
                status: DecisionStatus::Rejected,
            },
        ];
        let approved = approved_file_creations(&proposals, &decisions);
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].file_path, "a.rs");
    }
}
