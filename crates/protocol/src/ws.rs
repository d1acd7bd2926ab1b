//! WebSocket message envelopes.
//!
//! Flow:
//! 1. Client connects to `/ws/voco-stream?token=<shared-token>`
//! 2. Server sends `session_init` with the minted session id
//! 3. Client streams binary PCM frames; server answers with `transcript`,
//!    `control`, proposals, RPC requests, and binary TTS frames
//! 4. Tool RPC replies come back as `mcp_result` or raw JSON-RPC replies and
//!    are demultiplexed by id into the pending-RPC table

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorEnvelope;
use crate::hitl::{CommandDecision, ProposalDecision};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client → Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Typed message — schedules a turn with STT skipped.
    TextInput { text: String },

    /// Auth credentials pushed from the client shell.
    AuthSync {
        token: String,
        uid: String,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        voco_session_token: Option<String>,
    },

    /// Merge allow-listed keys into the process environment.
    UpdateEnv { env: HashMap<String, String> },

    /// Decisions for pending file proposals.
    ProposalDecision { decisions: Vec<ProposalDecision> },

    /// Decisions for pending command proposals.
    CommandDecision { decisions: Vec<CommandDecision> },

    /// Reply to a `screen_capture_request`.
    ScreenFrames {
        frames: Vec<String>,
        #[serde(default)]
        media_type: Option<String>,
    },

    /// Reply to a `scan_security_request`.
    ScanSecurityResult { findings: Value },
}

/// A parsed inbound text frame.
///
/// RPC replies (`mcp_result` or raw JSON-RPC) are kept as raw text because
/// pending futures are resolved with the reply exactly as it arrived.
#[derive(Debug, Clone)]
pub enum Inbound {
    Message(ClientMessage),
    RpcReply { id: String, raw: String },
}

/// Parse an inbound text frame.
///
/// Returns `None` for frames that are neither a known typed message nor an
/// RPC reply; callers log and ignore those.
pub fn parse_client_text(text: &str) -> Option<Inbound> {
    let value: Value = serde_json::from_str(text).ok()?;
    let ty = value.get("type").and_then(|t| t.as_str());

    let is_reply = matches!(ty, Some("mcp_result"))
        || (ty.is_none() && (value.get("result").is_some() || value.get("error").is_some()));
    if is_reply {
        let id = match value.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        return Some(Inbound::RpcReply {
            id,
            raw: text.to_string(),
        });
    }

    serde_json::from_value::<ClientMessage>(value)
        .ok()
        .map(Inbound::Message)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server → Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    TurnEnded,
    TtsStart,
    TtsEnd,
    HaltAudioPlayback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionInit {
        session_id: String,
    },

    Transcript {
        text: String,
    },

    Control {
        action: ControlAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tts_active: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_count: Option<u32>,
    },

    /// One per pending file proposal.
    Proposal {
        proposal_id: String,
        action: crate::hitl::ProposalAction,
        file_path: String,
        content: String,
        diff: String,
        description: String,
        project_root: String,
    },

    /// One per pending command proposal.
    CommandProposal {
        command_id: String,
        command: String,
        description: String,
        project_path: String,
    },

    ScreenCaptureRequest {
        id: String,
    },

    ScanSecurityRequest {
        id: String,
        project_path: String,
    },

    SandboxLive {
        url: String,
    },

    SandboxUpdated {
        url: String,
    },

    /// Progress marker shown in the client's activity ledger.
    LedgerUpdate {
        text: String,
    },

    LedgerClear {},

    BackgroundJobStart {
        job_id: String,
        tool_name: String,
    },

    AsyncJobUpdate {
        job_id: String,
        tool_name: String,
        status: String,
        /// Truncated to 500 chars.
        result: String,
    },

    Error {
        #[serde(flatten)]
        envelope: ErrorEnvelope,
    },
}

impl ServerMessage {
    pub fn control(action: ControlAction) -> Self {
        ServerMessage::Control {
            action,
            text: None,
            tts_active: None,
            turn_count: None,
        }
    }

    pub fn control_tts(action: ControlAction, tts_active: bool) -> Self {
        ServerMessage::Control {
            action,
            text: None,
            tts_active: Some(tts_active),
            turn_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::hitl::DecisionStatus;

    #[test]
    fn parse_text_input() {
        let inbound = parse_client_text(r#"{"type":"text_input","text":"hello"}"#).unwrap();
        match inbound {
            Inbound::Message(ClientMessage::TextInput { text }) => assert_eq!(text, "hello"),
            other => panic!("expected TextInput, got {other:?}"),
        }
    }

    #[test]
    fn parse_mcp_result_as_reply() {
        let raw = r#"{"type":"mcp_result","id":"c1","result":"42 matches"}"#;
        match parse_client_text(raw).unwrap() {
            Inbound::RpcReply { id, raw: r } => {
                assert_eq!(id, "c1");
                assert_eq!(crate::jsonrpc::reply_text(&r), "42 matches");
            }
            other => panic!("expected RpcReply, got {other:?}"),
        }
    }

    #[test]
    fn parse_raw_jsonrpc_reply() {
        let raw = r#"{"jsonrpc":"2.0","id":"write_p1","result":"ok"}"#;
        match parse_client_text(raw).unwrap() {
            Inbound::RpcReply { id, .. } => assert_eq!(id, "write_p1"),
            other => panic!("expected RpcReply, got {other:?}"),
        }
    }

    #[test]
    fn parse_numeric_reply_id() {
        let raw = r#"{"id":7,"result":{}}"#;
        match parse_client_text(raw).unwrap() {
            Inbound::RpcReply { id, .. } => assert_eq!(id, "7"),
            other => panic!("expected RpcReply, got {other:?}"),
        }
    }

    #[test]
    fn unknown_frames_ignored() {
        assert!(parse_client_text("not json").is_none());
        assert!(parse_client_text(r#"{"type":"bogus"}"#).is_none());
        // An object with an id but no result/error is not a reply.
        assert!(parse_client_text(r#"{"id":"x"}"#).is_none());
    }

    #[test]
    fn parse_decisions() {
        let raw = r#"{"type":"proposal_decision","decisions":[{"proposal_id":"p1","status":"approved"}]}"#;
        match parse_client_text(raw).unwrap() {
            Inbound::Message(ClientMessage::ProposalDecision { decisions }) => {
                assert_eq!(decisions.len(), 1);
                assert_eq!(decisions[0].status, DecisionStatus::Approved);
            }
            other => panic!("expected ProposalDecision, got {other:?}"),
        }
    }

    #[test]
    fn control_serializes_snake_case() {
        let msg = ServerMessage::control(ControlAction::HaltAudioPlayback);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"control","action":"halt_audio_playback"}"#
        );
    }

    #[test]
    fn tts_control_carries_flag() {
        let json =
            serde_json::to_string(&ServerMessage::control_tts(ControlAction::TtsStart, true))
                .unwrap();
        assert!(json.contains("\"action\":\"tts_start\""));
        assert!(json.contains("\"tts_active\":true"));
    }

    #[test]
    fn error_envelope_flattens() {
        let msg = ServerMessage::Error {
            envelope: ErrorEnvelope::new(ErrorCode::GraphFailed, "boom", "s1"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"code\":\"E_GRAPH_FAILED\""));
        assert!(json.contains("\"session_id\":\"s1\""));
    }

    #[test]
    fn session_init_wire_shape() {
        let json = serde_json::to_string(&ServerMessage::SessionInit {
            session_id: "abc".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"session_init","session_id":"abc"}"#);
    }
}
