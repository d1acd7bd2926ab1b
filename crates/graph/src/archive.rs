//! Per-turn prompt archival for replay and debugging.
//!
//! Writes one JSON file per turn to the session directory. The prompt hash
//! (first 12 hex chars of SHA-256) lets prompt changes be diffed across
//! sessions without storing the full text in graph state.

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use voco_domain::error::{Error, Result};
use voco_domain::message::{ChatMessage, ToolCall};

#[derive(Debug, Serialize)]
struct TurnArchive<'a> {
    session_id: &'a str,
    turn_number: u32,
    prompt_hash: String,
    model_name: &'a str,
    system_prompt: &'a str,
    messages: &'a [ChatMessage],
    tool_calls: &'a [ToolCall],
}

/// First 12 hex characters of the SHA-256 of `system_prompt`.
pub fn compute_prompt_hash(system_prompt: &str) -> String {
    let digest = Sha256::digest(system_prompt.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// Write `turn_<N>.json` into `session_dir`; returns the prompt hash.
pub fn archive_turn(
    session_dir: &Path,
    session_id: &str,
    turn_number: u32,
    system_prompt: &str,
    model_name: &str,
    messages: &[ChatMessage],
    tool_calls: &[ToolCall],
) -> Result<String> {
    let prompt_hash = compute_prompt_hash(system_prompt);

    std::fs::create_dir_all(session_dir).map_err(|e| Error::io("creating session directory", e))?;
    let path = session_dir.join(format!("turn_{turn_number}.json"));

    let payload = TurnArchive {
        session_id,
        turn_number,
        prompt_hash: prompt_hash.clone(),
        model_name,
        system_prompt,
        messages,
        tool_calls,
    };
    let json = serde_json::to_string_pretty(&payload)
        .map_err(|e| Error::json("serializing turn archive", e))?;
    std::fs::write(&path, json).map_err(|e| Error::io("writing turn archive", e))?;

    tracing::debug!(path = %path.display(), "archived turn");
    Ok(prompt_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_hash_is_stable_and_short() {
        let a = compute_prompt_hash("You are a voice assistant.");
        let b = compute_prompt_hash("You are a voice assistant.");
        let c = compute_prompt_hash("Different prompt.");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn archive_writes_turn_file() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![ChatMessage::human("hello")];
        let hash = archive_turn(
            dir.path(),
            "sess1",
            3,
            "system prompt",
            "claude-sonnet-4-5",
            &messages,
            &[],
        )
        .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("turn_3.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["session_id"], "sess1");
        assert_eq!(value["turn_number"], 3);
        assert_eq!(value["prompt_hash"], hash);
        assert_eq!(value["messages"][0]["role"], "human");
    }
}
