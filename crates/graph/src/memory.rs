//! Project session memory — persist and recall turns across sessions.
//!
//! One JSONL line per turn in `<project>/.voco/sessions.jsonl`; the most
//! recent entries are formatted into a block the orchestrator injects into
//! the system prompt so the model remembers prior sessions on this project.
//! Missing paths and unreadable files yield an empty string, never an error.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_ENTRIES: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub ts: DateTime<Utc>,
    pub session_id: String,
    #[serde(default)]
    pub model: String,
    pub transcript: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

fn sessions_path(project_path: &str) -> PathBuf {
    Path::new(project_path).join(".voco").join("sessions.jsonl")
}

/// Append one turn to the project's session log. Failures are logged and
/// swallowed — memory is never worth failing a turn over.
pub fn save_session_entry(project_path: &str, entry: &SessionEntry) {
    if project_path.is_empty() {
        tracing::debug!("no project path — skipping session memory save");
        return;
    }
    let path = sessions_path(project_path);

    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)?;
        file.write_all(line.as_bytes())
    })();

    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to save session memory");
    }
}

/// Read the last `max_entries` turns formatted for system-prompt injection.
pub fn load_session_history(project_path: &str, max_entries: usize) -> String {
    if project_path.is_empty() {
        return String::new();
    }
    let path = sessions_path(project_path);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return String::new(),
    };

    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_entries);

    let mut blocks: Vec<String> = Vec::new();
    for line in &lines[start..] {
        let entry: SessionEntry = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(_) => continue,
        };
        let mut block = format!(
            "[{}] User: \"{}\"",
            entry.ts.format("%b %d, %H:%M"),
            entry.transcript
        );
        if !entry.actions.is_empty() {
            block.push_str(&format!("\n  → Actions: {}", entry.actions.join(", ")));
        }
        if !entry.summary.is_empty() {
            block.push_str(&format!("\n  → Summary: {}", entry.summary));
        }
        blocks.push(block);
    }

    if blocks.is_empty() {
        return String::new();
    }
    format!(
        "## Session Memory (recent history from this project)\n{}",
        blocks.join("\n")
    )
}

/// Convenience wrapper using the default entry cap.
pub fn load_recent_history(project_path: &str) -> String {
    load_session_history(project_path, DEFAULT_MAX_ENTRIES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(transcript: &str) -> SessionEntry {
        SessionEntry {
            ts: Utc::now(),
            session_id: "s1".into(),
            model: "claude-sonnet-4-5".into(),
            transcript: transcript.into(),
            actions: vec![],
            files: vec![],
            summary: String::new(),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().to_str().unwrap();

        let mut e = entry("create a readme");
        e.actions = vec!["propose_file_creation".into()];
        e.summary = "Proposed README.md".into();
        save_session_entry(project, &e);

        let history = load_session_history(project, 20);
        assert!(history.starts_with("## Session Memory"));
        assert!(history.contains("create a readme"));
        assert!(history.contains("→ Actions: propose_file_creation"));
        assert!(history.contains("→ Summary: Proposed README.md"));
    }

    #[test]
    fn load_keeps_only_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().to_str().unwrap();
        for i in 0..10 {
            save_session_entry(project, &entry(&format!("turn {i}")));
        }

        let history = load_session_history(project, 3);
        assert!(!history.contains("turn 6"));
        assert!(history.contains("turn 7"));
        assert!(history.contains("turn 9"));
    }

    #[test]
    fn missing_project_yields_empty() {
        assert_eq!(load_session_history("", 20), "");
        assert_eq!(load_session_history("/nonexistent/project/path", 20), "");
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().to_str().unwrap();
        save_session_entry(project, &entry("good turn"));

        let path = sessions_path(project);
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{not json}\n");
        std::fs::write(&path, raw).unwrap();

        let history = load_session_history(project, 20);
        assert!(history.contains("good turn"));
    }
}
