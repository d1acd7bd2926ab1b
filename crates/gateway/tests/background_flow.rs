//! Background dispatch plumbing: the pending-RPC table and job queue
//! working together the way the Instant-ACK path wires them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use voco_gateway::session::{BackgroundJobQueue, PendingRpcTable};
use voco_protocol::jsonrpc::reply_text;

/// Submit a job awaiting a pending future, then deliver the client reply —
/// the completion callback observes the rendered result.
#[tokio::test]
async fn reply_resolves_background_job() {
    let table = Arc::new(PendingRpcTable::new());
    let queue = BackgroundJobQueue::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(String, String)>();

    let reply_rx = table.register("call-7");
    queue.submit(
        "job-1",
        async move {
            match tokio::time::timeout(Duration::from_secs(30), reply_rx).await {
                Ok(Ok(raw)) => reply_text(&raw),
                Ok(Err(_)) => "Tool request was dropped before a reply arrived.".into(),
                Err(_) => "Tool request timed out after 30 seconds.".into(),
            }
        },
        move |job_id, result| {
            let done_tx = done_tx.clone();
            async move {
                let _ = done_tx.send((job_id, result));
            }
        },
    );

    // The client answers out-of-band, demultiplexed by call id.
    assert!(table.resolve("call-7", r#"{"id":"call-7","result":"3 matches in auth.rs"}"#));

    let (job_id, result) = done_rx.recv().await.unwrap();
    assert_eq!(job_id, "job-1");
    assert_eq!(result, "3 matches in auth.rs");
    assert_eq!(queue.timeout_count(), 0);
    assert!(table.is_empty());
}

/// A reply that never arrives: the short deadline elapses, the completion
/// fires with a timeout result, and the timeout counter increments.
#[tokio::test]
async fn unanswered_rpc_times_out_and_counts() {
    let table = Arc::new(PendingRpcTable::new());
    let queue = BackgroundJobQueue::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(String, String)>();

    let reply_rx = table.register("call-9");
    let table_for_job = table.clone();
    queue.submit(
        "job-2",
        async move {
            match tokio::time::timeout(Duration::from_millis(20), reply_rx).await {
                Ok(Ok(raw)) => reply_text(&raw),
                Ok(Err(_)) => "Tool request was dropped before a reply arrived.".into(),
                Err(_) => {
                    table_for_job.remove("call-9");
                    "Tool request timed out after 30 seconds.".into()
                }
            }
        },
        move |job_id, result| {
            let done_tx = done_tx.clone();
            async move {
                let _ = done_tx.send((job_id, result));
            }
        },
    );

    let (_, result) = done_rx.recv().await.unwrap();
    assert!(result.contains("timed out"));
    assert_eq!(queue.timeout_count(), 1);
    assert!(table.is_empty(), "timed-out future is removed");

    // A late reply after the timeout is ignored without side effect.
    assert!(!table.resolve("call-9", r#"{"id":"call-9","result":"too late"}"#));
}

/// An error reply renders as an error string, not a panic.
#[tokio::test]
async fn error_reply_renders_error_text() {
    let table = Arc::new(PendingRpcTable::new());
    let queue = BackgroundJobQueue::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(String, String)>();

    let reply_rx = table.register("call-err");
    queue.submit(
        "job-3",
        async move {
            match tokio::time::timeout(Duration::from_secs(5), reply_rx).await {
                Ok(Ok(raw)) => reply_text(&raw),
                _ => "Tool request timed out after 5 seconds.".into(),
            }
        },
        move |job_id, result| {
            let done_tx = done_tx.clone();
            async move {
                let _ = done_tx.send((job_id, result));
            }
        },
    );

    table.resolve(
        "call-err",
        r#"{"id":"call-err","error":{"code":-32000,"message":"path outside project root"}}"#,
    );

    let (_, result) = done_rx.recv().await.unwrap();
    assert_eq!(result, "error: path outside project root");
}

/// Teardown semantics: cancel_all fires every completion exactly once and
/// drains the queue within a scheduler tick.
#[tokio::test]
async fn cancel_all_fires_completions_once() {
    let table = Arc::new(PendingRpcTable::new());
    let queue = BackgroundJobQueue::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(String, String)>();

    for i in 0..3 {
        let reply_rx = table.register(&format!("call-{i}"));
        let done_tx = done_tx.clone();
        queue.submit(
            &format!("job-{i}"),
            async move {
                match tokio::time::timeout(Duration::from_secs(3600), reply_rx).await {
                    Ok(Ok(raw)) => reply_text(&raw),
                    _ => "Tool request timed out.".into(),
                }
            },
            move |job_id, result| {
                let done_tx = done_tx.clone();
                async move {
                    let _ = done_tx.send((job_id, result));
                }
            },
        );
    }
    drop(done_tx);
    tokio::task::yield_now().await;

    queue.cancel_all();

    let mut completions = Vec::new();
    while let Some((job_id, result)) = done_rx.recv().await {
        assert!(result.contains("was cancelled before completion"));
        completions.push(job_id);
    }
    completions.sort();
    assert_eq!(completions, vec!["job-0", "job-1", "job-2"]);

    tokio::task::yield_now().await;
    assert_eq!(queue.active_count(), 0);
}
