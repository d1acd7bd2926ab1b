//! Human-in-the-loop phase: proposal and command review interrupts.
//!
//! Flow for either kind:
//! 1. Send one message per pending item to the client
//! 2. Announce the review over TTS
//! 3. Filtered receive for the decision message (120 s hard timeout —
//!    timeout resumes the graph with empty decisions)
//! 4. For approved items, perform the synchronous in-band RPC
//!    (`local/write_file` / `local/execute_command`) before resuming

use std::time::Duration;

use tracing::Instrument;

use voco_graph::nodes::approved_file_creations;
use voco_graph::TurnState;
use voco_protocol::hitl::{CommandDecision, DecisionStatus, ProposalDecision};
use voco_protocol::jsonrpc::{reply_text, JsonRpcRequest};
use voco_protocol::ws::ServerMessage;

use super::orchestrator::{TurnOrchestrator, Wanted};

impl TurnOrchestrator {
    /// Run the proposal review: returns the decision list to resume with.
    /// Approved `create_file` proposals are written via RPC before resume.
    pub(crate) async fn run_proposal_review(&mut self, state: &TurnState) -> Vec<ProposalDecision> {
        let span = tracing::info_span!("voco.hitl.proposals", count = state.pending_file_proposals.len());
        async {
            let proposals = &state.pending_file_proposals;
            tracing::info!(pending = proposals.len(), "proposal review interrupt");

            for p in proposals {
                self.send(ServerMessage::Proposal {
                    proposal_id: p.proposal_id.clone(),
                    action: p.action,
                    file_path: p.file_path.clone(),
                    content: p.content.clone(),
                    diff: p.diff.clone(),
                    description: p.description.clone(),
                    project_root: state.active_project_path.clone(),
                })
                .await;
            }

            let announcement = if proposals.len() == 1 {
                format!(
                    "I have a file change ready for review: {}. Approve or reject it when you're ready.",
                    proposals[0].description
                )
            } else {
                format!(
                    "I have {} file changes ready for your review.",
                    proposals.len()
                )
            };
            self.run_tts(&announcement).await;

            let timeout = Duration::from_secs(self.app.config.turn.hitl_timeout_secs);
            let decisions: Vec<ProposalDecision> =
                match self.recv_filtered(Wanted::Type("proposal_decision"), timeout).await {
                    Some(value) => serde_json::from_value(
                        value.get("decisions").cloned().unwrap_or_default(),
                    )
                    .unwrap_or_default(),
                    None => {
                        tracing::warn!("proposal decision timeout — resuming with empty decisions");
                        Vec::new()
                    }
                };

            // Approved file creations are written synchronously in-band so
            // the resumed graph can confirm real state.
            for proposal in approved_file_creations(proposals, &decisions) {
                let file_path = if std::path::Path::new(&proposal.file_path).is_absolute() {
                    proposal.file_path.clone()
                } else {
                    std::path::Path::new(&state.active_project_path)
                        .join(&proposal.file_path)
                        .to_string_lossy()
                        .into_owned()
                };
                let rpc_id = format!("write_{}", proposal.proposal_id);
                let request = JsonRpcRequest::new(
                    rpc_id.clone(),
                    "local/write_file",
                    serde_json::json!({
                        "file_path": file_path,
                        "content": proposal.content,
                        "project_root": state.active_project_path,
                    }),
                );
                self.send_rpc_and_await(request).await;
            }

            decisions
        }
        .instrument(span)
        .await
    }

    /// Run the command review: approved commands execute via RPC and their
    /// captured output is attached to the decision before resume.
    pub(crate) async fn run_command_review(&mut self, state: &TurnState) -> Vec<CommandDecision> {
        let span = tracing::info_span!("voco.hitl.commands", count = state.pending_command_proposals.len());
        async {
            let commands = &state.pending_command_proposals;
            tracing::info!(pending = commands.len(), "command review interrupt");

            for c in commands {
                self.send(ServerMessage::CommandProposal {
                    command_id: c.command_id.clone(),
                    command: c.command.clone(),
                    description: c.description.clone(),
                    project_path: c.project_path.clone(),
                })
                .await;
            }

            let announcement = if commands.len() == 1 {
                format!(
                    "I'd like to run a command: {}. Approve it to continue.",
                    commands[0].command
                )
            } else {
                format!("I have {} commands waiting for your approval.", commands.len())
            };
            self.run_tts(&announcement).await;

            let timeout = Duration::from_secs(self.app.config.turn.hitl_timeout_secs);
            let mut decisions: Vec<CommandDecision> =
                match self.recv_filtered(Wanted::Type("command_decision"), timeout).await {
                    Some(value) => serde_json::from_value(
                        value.get("decisions").cloned().unwrap_or_default(),
                    )
                    .unwrap_or_default(),
                    None => {
                        tracing::warn!("command decision timeout — resuming with empty decisions");
                        Vec::new()
                    }
                };

            for decision in &mut decisions {
                if decision.status != DecisionStatus::Approved {
                    continue;
                }
                let Some(command) = commands.iter().find(|c| c.command_id == decision.command_id)
                else {
                    tracing::warn!(command_id = %decision.command_id, "decision for unknown command");
                    continue;
                };
                let rpc_id = format!("cmd_{}", command.command_id);
                let request = JsonRpcRequest::new(
                    rpc_id,
                    "local/execute_command",
                    serde_json::json!({
                        "command": command.command,
                        "project_path": command.project_path,
                    }),
                );
                decision.output = Some(
                    self.send_rpc_and_await(request)
                        .await
                        .unwrap_or_else(|| "execution error: no reply from client".into()),
                );
            }

            decisions
        }
        .instrument(span)
        .await
    }

    /// Send a JSON-RPC request and wait for its reply in-band through the
    /// filtered receive. Returns the reply rendered as text.
    pub(crate) async fn send_rpc_and_await(&mut self, request: JsonRpcRequest) -> Option<String> {
        let rpc_id = request.id.clone();
        let method = request.method.clone();
        let json = match serde_json::to_string(&request) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "unserializable RPC request");
                return None;
            }
        };
        self.send_raw(json).await;
        self.metrics.rpcs += 1;

        let timeout_secs = self.app.config.turn.rpc_timeout_secs;
        let timeout = Duration::from_secs(timeout_secs);
        match self.recv_filtered(Wanted::RpcId(rpc_id.clone()), timeout).await {
            Some(value) => {
                let text = reply_text(&value.to_string());
                tracing::info!(id = %rpc_id, method = %method, result = %super::truncate(&text, 200), "RPC reply");
                Some(text)
            }
            None => {
                let err = voco_domain::error::Error::RpcTimeout {
                    call_id: rpc_id,
                    seconds: timeout_secs,
                };
                tracing::warn!(method = %method, error = %err, "RPC reply timeout");
                None
            }
        }
    }
}
