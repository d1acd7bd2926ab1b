//! Centralized ID generation.
//!
//! All ids are short hex fragments of a v4 UUID; session ids use a longer
//! fragment so per-session directories stay unique over long deployments.

/// Generate a unique call ID with an optional prefix (e.g. `"screen"`, `"scan"`).
pub fn generate_call_id(prefix: &str) -> String {
    let unique = short_hex(8);
    if prefix.is_empty() {
        unique
    } else {
        format!("{prefix}-{unique}")
    }
}

/// Generate a unique background job ID.
pub fn generate_job_id() -> String {
    short_hex(8)
}

/// Generate a unique proposal / command ID.
pub fn generate_proposal_id() -> String {
    short_hex(8)
}

/// Generate a unique session ID.
pub fn generate_session_id() -> String {
    short_hex(16)
}

fn short_hex(len: usize) -> String {
    let mut s = uuid::Uuid::new_v4().simple().to_string();
    s.truncate(len);
    s
}
