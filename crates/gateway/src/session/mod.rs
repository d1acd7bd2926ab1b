//! Per-session runtime: the turn orchestrator and its supporting pieces.

mod dispatch;
mod hitl;
mod jobs;
mod orchestrator;
mod outbound;
mod rpc;

pub use jobs::BackgroundJobQueue;
pub use orchestrator::TurnOrchestrator;
pub use outbound::{writer_task, Outbound};
pub use rpc::PendingRpcTable;

/// Truncate to at most `max` bytes on a char boundary, appending an
/// ellipsis when anything was cut.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &s[..cut])
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_short_passthrough() {
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn truncate_cuts_on_char_boundary() {
        let s = "héllo wörld";
        let t = truncate(s, 3);
        assert!(t.ends_with('…'));
        assert!(t.len() <= 3 + '…'.len_utf8());
    }
}
