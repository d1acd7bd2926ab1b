//! Human-in-the-loop payloads: file proposals, command proposals, and the
//! decisions the client sends back.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalAction {
    CreateFile,
    EditFile,
}

/// A file change awaiting user review.
///
/// `create_file` carries the full `content`; `edit_file` carries a `diff`.
/// `source_call_id` links the proposal back to the assistant tool call that
/// produced it so the decision summary can close the tool_call↔tool_result
/// pair; it never goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub action: ProposalAction,
    pub file_path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub diff: String,
    pub description: String,
    #[serde(default)]
    pub project_root: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_call_id: String,
}

/// A shell command awaiting user approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandProposal {
    pub command_id: String,
    pub command: String,
    pub description: String,
    #[serde(default)]
    pub project_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_call_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDecision {
    pub proposal_id: String,
    pub status: DecisionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDecision {
    pub command_id: String,
    pub status: DecisionStatus,
    /// Captured stdout/stderr, attached after the command executes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_round_trip() {
        let p = Proposal {
            proposal_id: "ab12cd34".into(),
            action: ProposalAction::CreateFile,
            file_path: "README.md".into(),
            content: "# hello\n".into(),
            diff: String::new(),
            description: "Add a readme".into(),
            project_root: "/work/app".into(),
            source_call_id: "c9".into(),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"action\":\"create_file\""));
        let parsed: Proposal = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn decision_status_wire_format() {
        let d: ProposalDecision =
            serde_json::from_str(r#"{"proposal_id":"p1","status":"approved"}"#).unwrap();
        assert_eq!(d.status, DecisionStatus::Approved);
    }

    #[test]
    fn command_decision_output_optional() {
        let d: CommandDecision =
            serde_json::from_str(r#"{"command_id":"c1","status":"rejected"}"#).unwrap();
        assert!(d.output.is_none());
        let json = serde_json::to_string(&d).unwrap();
        assert!(!json.contains("output"));
    }
}
