//! Client WebSocket protocol: message envelopes, JSON-RPC framing, HITL
//! payloads, and the structured error envelope.
//!
//! Text frames are UTF-8 JSON objects tagged by `type`; the one exception is
//! a raw JSON-RPC 2.0 reply (no `type`, with `id`), which is treated like an
//! `mcp_result`. Binary frames are PCM-16 LE mono 16 kHz audio in both
//! directions.

pub mod error;
pub mod hitl;
pub mod jsonrpc;
pub mod ws;

pub use error::{ErrorCode, ErrorEnvelope};
pub use hitl::{
    CommandDecision, CommandProposal, DecisionStatus, Proposal, ProposalAction, ProposalDecision,
};
pub use jsonrpc::{reply_text, JsonRpcRequest, RpcMeta};
pub use ws::{parse_client_text, ClientMessage, ControlAction, Inbound, ServerMessage};
