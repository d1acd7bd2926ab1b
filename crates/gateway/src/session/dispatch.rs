//! Tool dispatch phase.
//!
//! Branches on the pending action's classification:
//! - inline screen / scan: synchronous in-band round-trip, then re-invoke
//! - sandbox: store HTML, notify, re-invoke
//! - remote API: execute in-process, re-invoke
//! - local RPC (default): Instant-ACK + background dispatch
//!
//! The Instant-ACK pattern is the pivotal invariant: the model requires a
//! tool_result immediately after a tool-calling assistant message, but a
//! slow client RPC must not block the conversation. A synthetic ACK closes
//! the pair, the real work runs as a background job, and the result lands
//! in the checkpoint as a system note the model reads next turn.

use std::time::Duration;

use serde_json::Value;
use tracing::Instrument;

use voco_domain::error::Error;
use voco_domain::ids;
use voco_domain::message::{ChatMessage, ContentPart, ToolCall};
use voco_domain::tool::ToolKind;
use voco_graph::graph::{GraphOutcome, TurnInput};
use voco_graph::TurnState;
use voco_protocol::error::ErrorCode;
use voco_protocol::jsonrpc::{reply_text, JsonRpcRequest};
use voco_protocol::ws::ServerMessage;

use super::orchestrator::{TurnOrchestrator, Wanted};
use super::outbound::Outbound;
use super::truncate;

/// Background job results are truncated to this many chars in the system
/// note the model sees.
const RESULT_NOTE_MAX: usize = 2000;
/// And to this many in the client-facing job update.
const RESULT_UPDATE_MAX: usize = 500;

pub(crate) enum DispatchResult {
    /// The graph was re-invoked with a real tool result.
    Reinvoked(GraphOutcome),
    /// Instant-ACK: the pair is closed, the job runs in the background.
    AckDone(GraphOutcome),
}

impl TurnOrchestrator {
    /// Dispatch one pending tool action. `None` means the failure was
    /// already reported and the turn should stop.
    pub(crate) async fn dispatch_action(
        &mut self,
        action: ToolCall,
        state: &TurnState,
    ) -> Option<DispatchResult> {
        match self.app.tools.classify(&action.name) {
            ToolKind::InlineScreen => self.dispatch_screen(action).await,
            ToolKind::InlineScan => self.dispatch_scan(action, state).await,
            ToolKind::SandboxPreview => self.dispatch_sandbox(action).await,
            ToolKind::RemoteApi => self.dispatch_remote(action).await,
            // Proposals never reach dispatch (the router interrupts first);
            // anything else takes the background path.
            _ => self.dispatch_background(action).await,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Inline: screen analysis
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn dispatch_screen(&mut self, action: ToolCall) -> Option<DispatchResult> {
        let span = tracing::info_span!("voco.rpc.screen_analysis", call_id = %action.call_id);
        async {
            self.send(ServerMessage::ScreenCaptureRequest {
                id: action.call_id.clone(),
            })
            .await;

            let timeout = Duration::from_secs(self.app.config.turn.screen_timeout_secs);
            let reply = self.recv_filtered(Wanted::Type("screen_frames"), timeout).await;

            let tool_msg = match reply {
                Some(value) => screen_frames_message(&action, &value),
                None => {
                    tracing::warn!("timed out waiting for screen frames");
                    ChatMessage::tool(
                        &action.call_id,
                        "Screen buffer was empty — no frames captured yet. \
                         Tell the user to try again in a moment.",
                    )
                }
            };
            self.reinvoke(tool_msg).await
        }
        .instrument(span)
        .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Inline: security scan
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn dispatch_scan(
        &mut self,
        action: ToolCall,
        state: &TurnState,
    ) -> Option<DispatchResult> {
        let span = tracing::info_span!("voco.rpc.security_scan", call_id = %action.call_id);
        async {
            let project_path = action
                .args
                .get("project_path")
                .and_then(|p| p.as_str())
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| state.active_project_path.clone());

            self.send(ServerMessage::ScanSecurityRequest {
                id: action.call_id.clone(),
                project_path,
            })
            .await;

            let timeout = Duration::from_secs(self.app.config.turn.scan_timeout_secs);
            let findings = match self
                .recv_filtered(Wanted::Type("scan_security_result"), timeout)
                .await
            {
                Some(value) => {
                    let findings = value.get("findings").cloned().unwrap_or(Value::Null);
                    serde_json::to_string_pretty(&findings).unwrap_or_else(|_| "{}".into())
                }
                None => format!(
                    "{{\"error\": \"Scan timed out after {} seconds.\"}}",
                    self.app.config.turn.scan_timeout_secs
                ),
            };

            let tool_msg = ChatMessage::tool(
                &action.call_id,
                format!(
                    "Security scan complete. Analyze these findings and provide a \
                     prioritized threat summary with actionable remediation steps. \
                     Be concise — your response will be spoken aloud.\n\n{findings}"
                ),
            );
            self.reinvoke(tool_msg).await
        }
        .instrument(span)
        .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Sandbox preview
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn dispatch_sandbox(&mut self, action: ToolCall) -> Option<DispatchResult> {
        let span = tracing::info_span!("voco.rpc.sandbox", call_id = %action.call_id);
        async {
            let html = action
                .args
                .get("html_code")
                .and_then(|h| h.as_str())
                .unwrap_or_default()
                .to_string();
            let is_update = action.name == "update_sandbox_preview";
            let url = self.app.config.server.sandbox_url();

            *self.app.sandbox.write() = html.clone();
            let notify = if is_update {
                ServerMessage::SandboxUpdated { url: url.clone() }
            } else {
                ServerMessage::SandboxLive { url: url.clone() }
            };
            self.send(notify).await;
            tracing::info!(bytes = html.len(), updated = is_update, "sandbox served");

            let confirmation = if is_update {
                "Sandbox preview updated. The user can see the changes instantly.".to_string()
            } else {
                format!(
                    "Sandbox is live at {url}. The preview is now visible on the \
                     right side of the screen."
                )
            };
            self.reinvoke(ChatMessage::tool(&action.call_id, confirmation)).await
        }
        .instrument(span)
        .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Remote API (in-process)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn dispatch_remote(&mut self, action: ToolCall) -> Option<DispatchResult> {
        let span = tracing::info_span!("voco.rpc.remote_api", tool = %action.name);
        async {
            let result = self.app.tools.execute_remote(&action.name, &action.args).await;
            self.reinvoke(ChatMessage::tool(&action.call_id, result)).await
        }
        .instrument(span)
        .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Local RPC: Instant-ACK + background
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn dispatch_background(&mut self, action: ToolCall) -> Option<DispatchResult> {
        let job_id = ids::generate_job_id();
        let tool_name = action.name.clone();
        let call_id = action.call_id.clone();

        // a) Close the tool_call↔tool_result pair with a synthetic ACK and
        //    let the model speak a brief acknowledgement.
        let ack = ChatMessage::tool(
            &call_id,
            format!(
                "Action queued in background with Job ID: {job_id}. \
                 You may continue conversing with the user."
            ),
        );
        let outcome = match self.graph.invoke(TurnInput::messages(vec![ack])).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report_graph_error(&e).await;
                return None;
            }
        };

        self.send(ServerMessage::BackgroundJobStart {
            job_id: job_id.clone(),
            tool_name: tool_name.clone(),
        })
        .await;

        // b) Future keyed on the call id, resolved by the inbound
        //    demultiplexer when the client replies.
        let reply_rx = self.pending_rpc.register(&call_id);

        // c) The job sends the request and awaits the reply with a deadline.
        let request = JsonRpcRequest::new(
            call_id.clone(),
            self.app.tools.rpc_method(&action.name),
            action.args.clone(),
        );
        let out = self.out.clone();
        let rpc_timeout_secs = self.app.config.turn.rpc_timeout_secs;
        self.metrics.rpcs += 1;

        let work = {
            let job_span = tracing::info_span!("voco.rpc.background", job_id = %job_id, tool = %tool_name);
            async move {
                let json = match serde_json::to_string(&request) {
                    Ok(json) => json,
                    Err(e) => return format!("Failed to serialize tool request: {e}"),
                };
                if out.send(Outbound::Raw(json)).await.is_err() {
                    return "Client disconnected before the tool request was sent.".to_string();
                }
                match tokio::time::timeout(Duration::from_secs(rpc_timeout_secs), reply_rx).await {
                    Ok(Ok(raw_reply)) => reply_text(&raw_reply),
                    Ok(Err(_)) => "Tool request was dropped before a reply arrived.".to_string(),
                    Err(_) => Error::RpcTimeout {
                        call_id: request.id.clone(),
                        seconds: rpc_timeout_secs,
                    }
                    .to_string(),
                }
            }
            .instrument(job_span)
        };

        // d) On completion, inject the result into the checkpoint and tell
        //    the client; a timeout additionally raises E_RPC_TIMEOUT.
        let graph = self.graph.clone();
        let out = self.out.clone();
        let pending = self.pending_rpc.clone();
        let session_id = self.session_id.clone();
        let completion_tool = tool_name.clone();
        let completion_call = call_id.clone();
        self.jobs.submit(&job_id, work, move |job_id, result| async move {
            pending.remove(&completion_call);

            let note = format!(
                "[BACKGROUND JOB COMPLETE] Job {job_id} (tool {completion_tool}): {}",
                truncate(&result, RESULT_NOTE_MAX)
            );
            if let Err(e) = graph.append_system_note(&note).await {
                tracing::warn!(error = %e, "failed to record background result");
            }

            let timed_out = result.to_lowercase().contains("timed out");
            let status = if timed_out { "timed_out" } else { "done" };
            let _ = out
                .send(Outbound::Json(ServerMessage::AsyncJobUpdate {
                    job_id: job_id.clone(),
                    tool_name: completion_tool.clone(),
                    status: status.into(),
                    result: truncate(&result, RESULT_UPDATE_MAX),
                }))
                .await;

            if timed_out {
                let envelope = voco_protocol::error::ErrorEnvelope::new(
                    ErrorCode::RpcTimeout,
                    format!("tool {completion_tool} did not reply in time"),
                    session_id,
                )
                .with_details(serde_json::json!({ "job_id": job_id }));
                let _ = out.send(Outbound::Json(ServerMessage::Error { envelope })).await;
            }
        });

        // e) TTS of the ACK response proceeds while the job runs.
        Some(DispatchResult::AckDone(outcome))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Shared
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn reinvoke(&mut self, tool_msg: ChatMessage) -> Option<DispatchResult> {
        match self.graph.invoke(TurnInput::messages(vec![tool_msg])).await {
            Ok(outcome) => Some(DispatchResult::Reinvoked(outcome)),
            Err(e) => {
                self.report_graph_error(&e).await;
                None
            }
        }
    }
}

/// Build the multimodal tool message from a `screen_frames` reply: up to the
/// 5 most recent frames plus an analysis prompt.
fn screen_frames_message(action: &ToolCall, value: &Value) -> ChatMessage {
    let media_type = value
        .get("media_type")
        .and_then(|m| m.as_str())
        .unwrap_or("image/jpeg")
        .to_string();
    let frames: Vec<String> = value
        .get("frames")
        .and_then(|f| f.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|f| f.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if frames.is_empty() {
        return ChatMessage::tool(
            &action.call_id,
            "Screen buffer was empty — no frames captured yet. \
             Tell the user to try again in a moment.",
        );
    }

    let start = frames.len().saturating_sub(5);
    let sampled = &frames[start..];

    let user_desc = action
        .args
        .get("user_description")
        .and_then(|d| d.as_str())
        .unwrap_or("");
    let mut parts: Vec<ContentPart> = sampled
        .iter()
        .map(|data| ContentPart::Image {
            data: data.clone(),
            media_type: media_type.clone(),
        })
        .collect();
    let mut prompt = format!(
        "These are {} sequential screenshots of the user's screen captured at \
         500ms intervals (most recent last). ",
        sampled.len()
    );
    if !user_desc.is_empty() {
        prompt.push_str(&format!("User says: {user_desc}. "));
    }
    prompt.push_str("Analyze the visual state and diagnose any visible bugs, errors, or UI issues.");
    parts.push(ContentPart::Text { text: prompt });

    ChatMessage::tool_parts(&action.call_id, parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> ToolCall {
        ToolCall {
            name: "analyze_screen".into(),
            args: serde_json::json!({ "user_description": "the page is blank" }),
            call_id: "scr-1".into(),
        }
    }

    #[test]
    fn screen_message_samples_most_recent_five() {
        let frames: Vec<String> = (0..8).map(|i| format!("frame{i}")).collect();
        let value = serde_json::json!({ "type": "screen_frames", "frames": frames });
        let msg = screen_frames_message(&action(), &value);

        match msg {
            ChatMessage::Tool { call_id, content } => {
                assert_eq!(call_id, "scr-1");
                let voco_domain::message::ToolContent::Parts(parts) = content else {
                    panic!("expected multimodal parts");
                };
                // 5 images + 1 text part.
                assert_eq!(parts.len(), 6);
                match &parts[0] {
                    ContentPart::Image { data, media_type } => {
                        assert_eq!(data, "frame3");
                        assert_eq!(media_type, "image/jpeg");
                    }
                    other => panic!("expected image part, got {other:?}"),
                }
                match parts.last().unwrap() {
                    ContentPart::Text { text } => {
                        assert!(text.contains("5 sequential screenshots"));
                        assert!(text.contains("the page is blank"));
                    }
                    other => panic!("expected text part, got {other:?}"),
                }
            }
            other => panic!("expected Tool message, got {other:?}"),
        }
    }

    #[test]
    fn empty_frames_yield_text_fallback() {
        let value = serde_json::json!({ "type": "screen_frames", "frames": [] });
        let msg = screen_frames_message(&action(), &value);
        assert!(msg.text().unwrap().contains("Screen buffer was empty"));
    }

    #[test]
    fn media_type_override_is_used() {
        let value = serde_json::json!({
            "type": "screen_frames",
            "frames": ["f1"],
            "media_type": "image/png",
        });
        let msg = screen_frames_message(&action(), &value);
        match msg {
            ChatMessage::Tool { content, .. } => {
                let voco_domain::message::ToolContent::Parts(parts) = content else {
                    panic!("expected parts");
                };
                match &parts[0] {
                    ContentPart::Image { media_type, .. } => assert_eq!(media_type, "image/png"),
                    other => panic!("expected image, got {other:?}"),
                }
            }
            other => panic!("expected Tool message, got {other:?}"),
        }
    }
}
