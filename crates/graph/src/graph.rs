//! Graph driver: sequences nodes, persists a checkpoint after every step,
//! and surfaces interrupts for the HITL phase.
//!
//! The graph is pure over (checkpoint → checkpoint): every invoke or resume
//! loads the latest snapshot, runs nodes, and appends the result. Suspension
//! at a review node is a returned [`GraphOutcome::Interrupted`]; the session
//! orchestrator collects decisions and calls [`ReasoningGraph::resume`].

use std::sync::Arc;

use voco_domain::error::Result;
use voco_domain::message::ChatMessage;
use voco_domain::model::ModelTag;
use voco_protocol::hitl::{CommandDecision, ProposalDecision};
use voco_providers::ModelSource;

use crate::checkpoint::Checkpointer;
use crate::nodes;
use crate::router::{route_after_orchestrator, Node};
use crate::state::TurnState;

/// Base system prompt; the focused-context hint and session memory are
/// appended per turn.
pub const BASE_SYSTEM_PROMPT: &str = "You are Voco, a voice-native coding assistant. \
    You hear the user through a microphone and answer out loud, so keep \
    responses short and speakable. Use tools to inspect the project instead \
    of guessing; propose file changes and shell commands for review rather \
    than describing them. When a tool result arrives in the background you \
    will see it as a system note on the next turn.";

/// One graph invocation's input.
#[derive(Debug, Default)]
pub struct TurnInput {
    pub messages: Vec<ChatMessage>,
    pub barge_in_detected: bool,
    /// Extra system-prompt block (session memory).
    pub system_extra: String,
    /// Updates the active project path when non-empty.
    pub project_path: String,
}

impl TurnInput {
    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// Where an invocation stopped.
#[derive(Debug)]
pub enum GraphOutcome {
    /// Reached END (possibly with a pending tool action to dispatch).
    Completed(TurnState),
    /// Suspended before an interrupt node; resume with decisions.
    Interrupted { node: Node, state: TurnState },
}

impl GraphOutcome {
    pub fn state(&self) -> &TurnState {
        match self {
            GraphOutcome::Completed(state) => state,
            GraphOutcome::Interrupted { state, .. } => state,
        }
    }
}

/// The external resume payload for an interrupted graph.
#[derive(Debug)]
pub enum ResumeUpdate {
    ProposalDecisions(Vec<ProposalDecision>),
    CommandDecisions(Vec<CommandDecision>),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ReasoningGraph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReasoningGraph {
    models: Arc<dyn ModelSource>,
    checkpointer: Checkpointer,
    base_system_prompt: String,
    max_context_tokens: u32,
    /// Serializes load-modify-append transactions. Background job
    /// completions write through the same checkpointer as turns; without
    /// this, a note appended mid-invoke would be overwritten by the turn's
    /// own snapshot.
    txn: tokio::sync::Mutex<()>,
}

impl ReasoningGraph {
    /// Compile the graph against a session's checkpointer.
    pub fn new(
        models: Arc<dyn ModelSource>,
        checkpointer: Checkpointer,
        max_context_tokens: u32,
    ) -> Self {
        Self {
            models,
            checkpointer,
            base_system_prompt: BASE_SYSTEM_PROMPT.to_string(),
            max_context_tokens,
            txn: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_system_prompt = prompt.into();
        self
    }

    /// Run from START: context_classifier → model_selector → orchestrator,
    /// then route until END or an interrupt.
    pub async fn invoke(&self, input: TurnInput) -> Result<GraphOutcome> {
        let _txn = self.txn.lock().await;
        let mut state = self.checkpointer.latest().unwrap_or_default();

        if input.barge_in_detected {
            state.barge_in_detected = true;
        }
        if !input.project_path.is_empty() {
            state.active_project_path = input.project_path.clone();
        }
        if input
            .messages
            .iter()
            .any(|m| matches!(m, ChatMessage::Human { .. }))
        {
            state.turn_count += 1;
        }
        state.append_messages(input.messages);

        nodes::classify_context(&mut state);
        state.routed_model = nodes::select_model(self.models.get(ModelTag::Fast), &state).await;

        self.run_from_orchestrator(state, &input.system_extra).await
    }

    /// Resume an interrupted graph with review decisions.
    ///
    /// Idempotent: when nothing is pending (already resumed, or the review
    /// timed out and was resumed with empty decisions), this is a no-op.
    pub async fn resume(&self, update: ResumeUpdate, system_extra: &str) -> Result<GraphOutcome> {
        let _txn = self.txn.lock().await;
        let mut state = self.checkpointer.latest().unwrap_or_default();

        let review_messages = match update {
            ResumeUpdate::ProposalDecisions(decisions) => {
                if state.pending_file_proposals.is_empty() {
                    tracing::debug!("resume with no pending proposals — no-op");
                    return Ok(GraphOutcome::Completed(state));
                }
                state.proposal_decisions = decisions;
                nodes::apply_proposal_decisions(&mut state)
            }
            ResumeUpdate::CommandDecisions(decisions) => {
                if state.pending_command_proposals.is_empty() {
                    tracing::debug!("resume with no pending commands — no-op");
                    return Ok(GraphOutcome::Completed(state));
                }
                state.command_decisions = decisions;
                nodes::apply_command_decisions(&mut state)
            }
        };
        state.append_messages(review_messages);

        self.run_from_orchestrator(state, system_extra).await
    }

    /// Append an out-of-band system note (background job completions) to
    /// the checkpointed log so the model sees it on the next turn.
    pub async fn append_system_note(&self, text: &str) -> Result<()> {
        let _txn = self.txn.lock().await;
        let mut state = self.checkpointer.latest().unwrap_or_default();
        state.append_messages(vec![ChatMessage::system(text)]);
        self.checkpointer.append(&state)?;
        Ok(())
    }

    /// The latest checkpointed state.
    pub fn latest_state(&self) -> Option<TurnState> {
        self.checkpointer.latest()
    }

    /// Retention pass, run at session teardown.
    pub fn prune_checkpoints(&self, keep_last: usize) -> Result<usize> {
        self.checkpointer.prune(keep_last)
    }

    pub fn system_prompt_base(&self) -> &str {
        &self.base_system_prompt
    }

    // ── Internals ──────────────────────────────────────────────────

    async fn run_from_orchestrator(
        &self,
        mut state: TurnState,
        system_extra: &str,
    ) -> Result<GraphOutcome> {
        let system_prompt = self.compose_system_prompt(system_extra);

        loop {
            let model = self.models.get(state.routed_model);
            nodes::run_orchestrator(model, &mut state, &system_prompt, self.max_context_tokens)
                .await?;

            match route_after_orchestrator(&state) {
                Node::Orchestrator => continue,
                node if node.is_interrupt() => {
                    self.checkpointer.append(&state)?;
                    return Ok(GraphOutcome::Interrupted { node, state });
                }
                _ => {
                    // ToolDispatch and End both leave the graph; dispatch is
                    // the session orchestrator's job.
                    self.checkpointer.append(&state)?;
                    return Ok(GraphOutcome::Completed(state));
                }
            }
        }
    }

    fn compose_system_prompt(&self, system_extra: &str) -> String {
        if system_extra.is_empty() {
            self.base_system_prompt.clone()
        } else {
            format!("{}\n\n{system_extra}", self.base_system_prompt)
        }
    }
}
