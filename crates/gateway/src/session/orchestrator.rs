//! Per-session turn orchestrator.
//!
//! Owns one WebSocket connection end to end: the inbound demultiplexer, the
//! VAD, the reasoning graph instance (with its checkpointer), the pending-RPC
//! table, the background job queue, and per-session auth state.
//!
//! Single-threaded cooperative: everything per-session runs on this task.
//! The one inbound reader routes frames by type; HITL and inline waits use
//! the same reader through a filtered receive, never a second one. Outbound
//! traffic — including sends from background jobs — goes through the writer
//! channel.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;

use voco_audio::{VadEvent, VadStreamer};
use voco_domain::config::env_key_allowed;
use voco_domain::error::{Error, Result};
use voco_domain::message::ChatMessage;
use voco_graph::archive;
use voco_graph::graph::{GraphOutcome, ReasoningGraph, ResumeUpdate, TurnInput};
use voco_graph::memory;
use voco_graph::{Checkpointer, Node};
use voco_protocol::error::{ErrorCode, ErrorEnvelope};
use voco_protocol::ws::{parse_client_text, ClientMessage, ControlAction, Inbound, ServerMessage};

use crate::state::AppState;

use super::dispatch::DispatchResult;
use super::jobs::BackgroundJobQueue;
use super::outbound::Outbound;
use super::rpc::PendingRpcTable;
use super::truncate;

/// Interrupt/dispatch cycles tolerated inside one turn before giving up.
const MAX_TURN_CYCLES: usize = 6;

#[derive(Default)]
pub(crate) struct SessionMetrics {
    pub turns: u32,
    pub rpcs: u32,
}

enum LoopSignal {
    /// Start a turn, optionally with typed text (STT skipped).
    Run(Option<String>),
    Idle,
    Closed,
}

/// What the filtered receive is waiting for.
pub(crate) enum Wanted {
    Type(&'static str),
    RpcId(String),
}

pub struct TurnOrchestrator {
    pub(crate) app: AppState,
    pub(crate) session_id: String,
    pub(crate) session_dir: PathBuf,
    pub(crate) ws_rx: SplitStream<WebSocket>,
    pub(crate) out: mpsc::Sender<Outbound>,
    pub(crate) vad: VadStreamer,
    pub(crate) graph: Arc<ReasoningGraph>,
    pub(crate) jobs: BackgroundJobQueue,
    pub(crate) pending_rpc: Arc<PendingRpcTable>,

    pub(crate) audio_buffer: Vec<u8>,
    pub(crate) tts_active: bool,
    /// Frames before this instant are dropped (post-TTS echo grace).
    pub(crate) vad_muted_until: Option<Instant>,
    /// Speech onset before this instant counts as barge-in.
    pub(crate) playback_window_until: Option<Instant>,
    pub(crate) barge_in_pending: bool,
    /// `text_input` frames that arrived mid-turn, drained afterwards.
    pub(crate) queued_text: VecDeque<String>,

    pub(crate) auth_uid: String,
    pub(crate) auth_refresh: Option<String>,
    pub(crate) metrics: SessionMetrics,
}

impl TurnOrchestrator {
    /// Build the session: open the checkpointer, compile the graph against
    /// it, instantiate a VAD over the shared weights.
    pub fn new(
        app: AppState,
        session_id: String,
        ws_rx: SplitStream<WebSocket>,
        out: mpsc::Sender<Outbound>,
    ) -> Result<Self> {
        let session_dir = voco_domain::paths::ensure_session_dir(&session_id)?;
        let checkpointer = Checkpointer::open(&session_dir)?;
        let graph = Arc::new(ReasoningGraph::new(
            app.models.clone(),
            checkpointer,
            app.config.llm.max_context_tokens,
        ));
        let vad = VadStreamer::new(app.vad_source.instantiate(), &app.config.audio);

        Ok(Self {
            app,
            session_id,
            session_dir,
            ws_rx,
            out,
            vad,
            graph,
            jobs: BackgroundJobQueue::new(),
            pending_rpc: Arc::new(PendingRpcTable::new()),
            audio_buffer: Vec::new(),
            tts_active: false,
            vad_muted_until: None,
            playback_window_until: None,
            barge_in_pending: false,
            queued_text: VecDeque::new(),
            auth_uid: "local".into(),
            auth_refresh: None,
            metrics: SessionMetrics::default(),
        })
    }

    /// The session loop: read frames until the socket closes, running the
    /// turn pipeline whenever VAD fires turn-end or typed text arrives.
    pub async fn run(&mut self) -> Result<()> {
        self.send(ServerMessage::SessionInit {
            session_id: self.session_id.clone(),
        })
        .await;

        let sweeper = self.spawn_sweeper();

        loop {
            match self.next_signal().await {
                LoopSignal::Run(text_override) => {
                    self.run_turn(text_override).await;
                    while let Some(queued) = self.queued_text.pop_front() {
                        self.run_turn(Some(queued)).await;
                    }
                }
                LoopSignal::Idle => {}
                LoopSignal::Closed => break,
            }
        }

        sweeper.abort();
        self.teardown().await;
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Inbound demultiplexer
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn next_signal(&mut self) -> LoopSignal {
        let deadline = Duration::from_secs(self.app.config.turn.receive_timeout_secs);
        match tokio::time::timeout(deadline, self.ws_rx.next()).await {
            // Soft timeout: back to the top of the loop, do not close.
            Err(_) => LoopSignal::Idle,
            Ok(None) | Ok(Some(Err(_))) => LoopSignal::Closed,
            Ok(Some(Ok(Message::Binary(bytes)))) => {
                if self.on_audio(&bytes).await {
                    LoopSignal::Run(None)
                } else {
                    LoopSignal::Idle
                }
            }
            Ok(Some(Ok(Message::Text(text)))) => self.on_text(&text).await,
            Ok(Some(Ok(Message::Close(_)))) => LoopSignal::Closed,
            Ok(Some(Ok(_))) => LoopSignal::Idle,
        }
    }

    /// Feed a binary frame to the buffer and VAD. Returns true when VAD
    /// declared the turn ended.
    async fn on_audio(&mut self, bytes: &[u8]) -> bool {
        // Echo guard: frames during TTS are dropped, not queued.
        if self.tts_active {
            return false;
        }
        if let Some(muted_until) = self.vad_muted_until {
            if Instant::now() < muted_until {
                return false;
            }
            self.vad_muted_until = None;
            self.vad.reset();
        }

        self.audio_buffer.extend_from_slice(bytes);
        let events = self.vad.process_chunk(bytes);

        let mut turn_ended = false;
        for event in events {
            match event {
                VadEvent::SpeechOnset => self.on_speech_onset().await,
                VadEvent::TurnEnd => turn_ended = true,
            }
        }
        turn_ended
    }

    /// Speech onset: always halt client playback; inside the playback
    /// window it also flags barge-in for the next graph invocation.
    async fn on_speech_onset(&mut self) {
        self.send(ServerMessage::control(ControlAction::HaltAudioPlayback))
            .await;
        if let Some(window) = self.playback_window_until.take() {
            if Instant::now() < window {
                tracing::info!("barge-in detected during playback window");
                self.barge_in_pending = true;
            }
        }
    }

    async fn on_text(&mut self, text: &str) -> LoopSignal {
        match parse_client_text(text) {
            Some(Inbound::RpcReply { id, raw }) => {
                self.pending_rpc.resolve(&id, &raw);
                LoopSignal::Idle
            }
            Some(Inbound::Message(ClientMessage::TextInput { text })) => {
                LoopSignal::Run(Some(text))
            }
            Some(Inbound::Message(msg)) => {
                self.handle_control_message(msg).await;
                LoopSignal::Idle
            }
            None => {
                tracing::debug!("ignoring unparseable text frame");
                LoopSignal::Idle
            }
        }
    }

    async fn handle_control_message(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::AuthSync {
                token,
                uid,
                refresh_token,
                ..
            } => {
                self.auth_uid = uid;
                self.auth_refresh = refresh_token;
                tracing::info!(
                    uid = %self.auth_uid,
                    has_refresh = self.auth_refresh.is_some(),
                    "auth_sync received"
                );
                if let Err(e) = self.app.models.rebind_auth(&token) {
                    tracing::warn!(error = %e, "failed to rebind model clients");
                }
            }
            ClientMessage::UpdateEnv { env } => {
                for (key, value) in env {
                    if env_key_allowed(&key) {
                        std::env::set_var(&key, &value);
                        tracing::info!(key = %key, "environment key updated");
                    } else {
                        tracing::warn!(key = %key, "rejected non-allow-listed env key");
                    }
                }
            }
            // Decisions and inline replies are only meaningful inside the
            // filtered receive; a stray one is stale (e.g. sent after the
            // HITL wait timed out) and is dropped.
            other => {
                tracing::debug!(msg = ?std::mem::discriminant(&other), "stray message outside wait");
            }
        }
    }

    /// Filtered receive: wait for one specific message kind, routing
    /// everything else to its normal handler so nothing is lost. Returns
    /// `None` on timeout or socket close.
    pub(crate) async fn recv_filtered(&mut self, wanted: Wanted, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match tokio::time::timeout(remaining, self.ws_rx.next()).await {
                Err(_) => return None,
                Ok(None) | Ok(Some(Err(_))) => return None,
                Ok(Some(Ok(Message::Binary(bytes)))) => {
                    // Buffer audio for the next turn; no VAD mid-turn, so a
                    // burst of speech cannot re-enter the pipeline here.
                    if !self.tts_active {
                        self.audio_buffer.extend_from_slice(&bytes);
                    }
                }
                Ok(Some(Ok(Message::Text(text)))) => {
                    let Ok(value) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    if Self::matches_wanted(&value, &wanted) {
                        return Some(value);
                    }
                    self.route_unmatched(&text).await;
                }
                Ok(Some(Ok(Message::Close(_)))) => return None,
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    fn matches_wanted(value: &Value, wanted: &Wanted) -> bool {
        let ty = value.get("type").and_then(|t| t.as_str());
        match wanted {
            Wanted::Type(expected) => ty == Some(*expected),
            Wanted::RpcId(expected) => {
                let is_reply = ty == Some("mcp_result")
                    || (ty.is_none()
                        && (value.get("result").is_some() || value.get("error").is_some()));
                if !is_reply {
                    return false;
                }
                match value.get("id") {
                    Some(Value::String(id)) => id == expected,
                    Some(Value::Number(n)) => n.to_string() == *expected,
                    _ => false,
                }
            }
        }
    }

    /// Route a frame that arrived during a wait but wasn't the one awaited:
    /// RPC replies resolve their futures, text input is queued, auth/env
    /// updates apply immediately.
    async fn route_unmatched(&mut self, text: &str) {
        match parse_client_text(text) {
            Some(Inbound::RpcReply { id, raw }) => {
                self.pending_rpc.resolve(&id, &raw);
            }
            Some(Inbound::Message(ClientMessage::TextInput { text })) => {
                tracing::debug!("queueing text_input received mid-turn");
                self.queued_text.push_back(text);
            }
            Some(Inbound::Message(msg)) => self.handle_control_message(msg).await,
            None => {}
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Turn pipeline
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub(crate) async fn run_turn(&mut self, text_override: Option<String>) {
        self.metrics.turns += 1;
        let turn_span = tracing::info_span!(
            "turn",
            session_id = %self.session_id,
            turn = self.metrics.turns,
            "otel.kind" = "SERVER",
        );

        self.send(ServerMessage::control(ControlAction::TurnEnded)).await;

        let audio = std::mem::take(&mut self.audio_buffer);
        if text_override.is_none() && audio.len() < self.app.config.audio.min_buffer_bytes {
            tracing::debug!(bytes = audio.len(), "buffer below threshold — turn dropped");
            return;
        }

        // ── STT ───────────────────────────────────────────────────
        let transcript = match text_override {
            Some(text) => text,
            None => {
                let stt_span = tracing::info_span!("voco.stt", bytes = audio.len());
                match self.app.stt.transcribe(&audio).instrument(stt_span).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "transcription failed — turn dropped");
                        self.send_error(ErrorCode::SttFailed, &e.to_string(), None).await;
                        return;
                    }
                }
            }
        };
        let transcript = transcript.trim().to_string();
        if transcript.len() < 2 {
            tracing::debug!("trivial transcript — turn dropped");
            return;
        }
        self.send(ServerMessage::Transcript {
            text: transcript.clone(),
        })
        .await;
        self.send(ServerMessage::LedgerUpdate {
            text: "Understanding request".into(),
        })
        .await;

        // ── Graph ─────────────────────────────────────────────────
        let project_path = self.project_path();
        let memory_block = memory::load_recent_history(&project_path);
        let barge_in = std::mem::take(&mut self.barge_in_pending);

        let input = TurnInput {
            messages: vec![ChatMessage::human(&transcript)],
            barge_in_detected: barge_in,
            system_extra: memory_block.clone(),
            project_path,
        };
        let graph_span = tracing::info_span!("voco.graph", transcript_len = transcript.len());
        let outcome = match self.graph.invoke(input).instrument(graph_span).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report_graph_error(&e).await;
                return;
            }
        };

        let Some(final_state) = self
            .drive_to_completion(outcome, &memory_block)
            .instrument(turn_span)
            .await
        else {
            return;
        };

        // ── TTS ───────────────────────────────────────────────────
        let spoken = final_state.last_assistant_text().unwrap_or("").to_string();
        if !spoken.is_empty() {
            self.run_tts(&spoken).await;
        }

        self.finish_turn(&final_state, &transcript, &spoken).await;
    }

    /// Process interrupts and tool dispatch until the turn settles.
    async fn drive_to_completion(
        &mut self,
        mut outcome: GraphOutcome,
        memory_block: &str,
    ) -> Option<voco_graph::TurnState> {
        let mut background_started = false;

        for _ in 0..MAX_TURN_CYCLES {
            match outcome {
                GraphOutcome::Interrupted {
                    node: Node::ProposalReview,
                    state,
                } => {
                    let decisions = self.run_proposal_review(&state).await;
                    outcome = match self
                        .graph
                        .resume(ResumeUpdate::ProposalDecisions(decisions), memory_block)
                        .await
                    {
                        Ok(o) => o,
                        Err(e) => {
                            self.report_graph_error(&e).await;
                            return None;
                        }
                    };
                }
                GraphOutcome::Interrupted {
                    node: Node::CommandReview,
                    state,
                } => {
                    let decisions = self.run_command_review(&state).await;
                    outcome = match self
                        .graph
                        .resume(ResumeUpdate::CommandDecisions(decisions), memory_block)
                        .await
                    {
                        Ok(o) => o,
                        Err(e) => {
                            self.report_graph_error(&e).await;
                            return None;
                        }
                    };
                }
                GraphOutcome::Interrupted { state, .. } => return Some(state),
                GraphOutcome::Completed(state) => {
                    let Some(action) = state.pending_tool_action.clone() else {
                        return Some(state);
                    };
                    if background_started {
                        // The ACK response may not chain another action; the
                        // closed pair is the whole point of the ACK.
                        tracing::warn!(tool = %action.name, "dropping tool call chained after ACK");
                        return Some(state);
                    }
                    self.send(ServerMessage::LedgerUpdate {
                        text: format!("Running {}", action.name),
                    })
                    .await;
                    match self.dispatch_action(action, &state).await {
                        Some(DispatchResult::Reinvoked(next)) => outcome = next,
                        Some(DispatchResult::AckDone(next)) => {
                            background_started = true;
                            outcome = next;
                        }
                        None => return None,
                    }
                }
            }
        }

        tracing::warn!("turn exceeded interrupt/dispatch cycle limit");
        self.graph.latest_state()
    }

    /// Post-response bookkeeping: archive the turn, persist session memory,
    /// emit the usage ping and ledger sync.
    async fn finish_turn(
        &mut self,
        state: &voco_graph::TurnState,
        transcript: &str,
        spoken: &str,
    ) {
        let model_name = {
            use voco_providers::ChatModel as _;
            self.app.models.get(state.routed_model).model_id().to_string()
        };

        let last_tool_calls: Vec<voco_domain::message::ToolCall> = state
            .messages
            .iter()
            .rev()
            .find_map(|m| match m {
                ChatMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                    Some(tool_calls.clone())
                }
                _ => None,
            })
            .unwrap_or_default();

        if let Err(e) = archive::archive_turn(
            &self.session_dir,
            &self.session_id,
            state.turn_count,
            self.graph.system_prompt_base(),
            &model_name,
            &state.messages,
            &last_tool_calls,
        ) {
            tracing::warn!(error = %e, "turn archive failed");
        }

        let project_path = self.project_path();
        memory::save_session_entry(
            &project_path,
            &memory::SessionEntry {
                ts: chrono::Utc::now(),
                session_id: self.session_id.clone(),
                model: model_name,
                transcript: transcript.to_string(),
                actions: last_tool_calls.iter().map(|tc| tc.name.clone()).collect(),
                files: state
                    .pending_file_proposals
                    .iter()
                    .map(|p| p.file_path.clone())
                    .collect(),
                summary: truncate(spoken, 200),
            },
        );

        // Usage ping for the external billing meter, plus a ledger sync.
        tracing::info!(
            uid = %self.auth_uid,
            turn = state.turn_count,
            "turn complete"
        );
        self.send(ServerMessage::LedgerUpdate {
            text: "Turn complete".into(),
        })
        .await;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // TTS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Stream synthesized audio, framed by tts_start/tts_end. Inbound
    /// binary frames during the stream are read and dropped (echo guard);
    /// text frames are still routed so RPC replies are never lost.
    pub(crate) async fn run_tts(&mut self, text: &str) -> usize {
        let tts_span = tracing::info_span!("voco.tts", text_len = text.len());
        let mut chunks_rx = match self
            .app
            .tts
            .synthesize_stream(text)
            .instrument(tts_span)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!(error = %e, "TTS synthesis failed");
                self.send_error(ErrorCode::TtsFailed, &e.to_string(), None).await;
                return 0;
            }
        };

        self.tts_active = true;
        self.send(ServerMessage::control_tts(ControlAction::TtsStart, true))
            .await;

        enum StreamEvent {
            Chunk(Option<Vec<u8>>),
            Frame(Option<std::result::Result<Message, axum::Error>>),
        }

        let mut chunk_count = 0usize;
        loop {
            let event = tokio::select! {
                chunk = chunks_rx.recv() => StreamEvent::Chunk(chunk),
                frame = self.ws_rx.next() => StreamEvent::Frame(frame),
            };
            match event {
                StreamEvent::Chunk(Some(bytes)) => {
                    let _ = self.out.send(Outbound::Audio(bytes)).await;
                    chunk_count += 1;
                }
                // Channel closed: the end sentinel.
                StreamEvent::Chunk(None) => break,
                // Dropped, not queued — echo guard.
                StreamEvent::Frame(Some(Ok(Message::Binary(_)))) => {}
                StreamEvent::Frame(Some(Ok(Message::Text(text)))) => {
                    self.route_unmatched(&text).await;
                }
                StreamEvent::Frame(Some(Ok(Message::Close(_))))
                | StreamEvent::Frame(Some(Err(_)))
                | StreamEvent::Frame(None) => break,
                StreamEvent::Frame(Some(Ok(_))) => {}
            }
        }

        self.tts_active = false;
        self.send(ServerMessage::control_tts(ControlAction::TtsEnd, false))
            .await;

        let grace = Duration::from_millis(self.app.config.audio.tts_grace_ms);
        let window = Duration::from_millis(self.app.config.audio.barge_in_window_ms);
        self.vad_muted_until = Some(Instant::now() + grace);
        self.playback_window_until = Some(Instant::now() + grace + window);

        if chunk_count == 0 {
            tracing::warn!("TTS produced zero chunks");
            self.send_error(
                ErrorCode::TtsFailed,
                "synthesis produced no audio",
                None,
            )
            .await;
        } else {
            tracing::info!(chunks = chunk_count, "TTS stream complete");
        }
        chunk_count
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Helpers
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub(crate) async fn send(&self, msg: ServerMessage) {
        let _ = self.out.send(Outbound::Json(msg)).await;
    }

    pub(crate) async fn send_raw(&self, json: String) {
        let _ = self.out.send(Outbound::Raw(json)).await;
    }

    pub(crate) async fn send_error(
        &self,
        code: ErrorCode,
        message: &str,
        details: Option<Value>,
    ) {
        let mut envelope = ErrorEnvelope::new(code, message, &self.session_id);
        if let Some(details) = details {
            envelope = envelope.with_details(details);
        }
        self.send(ServerMessage::Error { envelope }).await;
    }

    /// Surface a graph failure: structured envelope, ledger cleared, the
    /// session stays open.
    pub(crate) async fn report_graph_error(&self, e: &Error) {
        tracing::error!(error = %e, "graph invocation failed");
        let code = match e {
            Error::AuthExpired(_) => ErrorCode::AuthExpired,
            Error::Overloaded(_) => ErrorCode::ModelOverloaded,
            _ => ErrorCode::GraphFailed,
        };
        self.send_error(code, &e.to_string(), None).await;
        self.send(ServerMessage::LedgerClear {}).await;
    }

    pub(crate) fn project_path(&self) -> String {
        if let Some(state) = self.graph.latest_state() {
            if !state.active_project_path.is_empty() {
                return state.active_project_path;
            }
        }
        match std::env::var("VOCO_PROJECT_PATH") {
            Ok(path) if !path.is_empty() => path,
            _ => self.app.config.turn.default_project_path.clone(),
        }
    }

    fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let pending = self.pending_rpc.clone();
        let interval_secs = self.app.config.turn.sweep_interval_secs;
        let ttl = Duration::from_secs(self.app.config.turn.future_ttl_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                pending.sweep(ttl);
            }
        })
    }

    /// Session teardown: cancel jobs (their completion callbacks still
    /// fire), prune checkpoints, log session metrics.
    async fn teardown(&mut self) {
        self.jobs.cancel_all();
        tokio::task::yield_now().await;

        if let Err(e) = self
            .graph
            .prune_checkpoints(self.app.config.turn.max_checkpoints)
        {
            tracing::warn!(error = %e, "checkpoint prune failed");
        }

        tracing::info!(
            session_id = %self.session_id,
            turns = self.metrics.turns,
            rpcs = self.metrics.rpcs,
            timeouts = self.jobs.timeout_count(),
            "session closed"
        );
    }
}
