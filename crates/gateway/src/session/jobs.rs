//! Background job queue for async tool execution.
//!
//! Part of the Instant-ACK pattern: the turn pipeline answers the model's
//! tool call immediately with a synthetic ACK and hands the real work here.
//! The completion callback always fires exactly once — on success, error,
//! or cancellation — so the result can be injected into the checkpoint for
//! the model's next turn.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default, Clone)]
pub struct BackgroundJobQueue {
    jobs: Arc<Mutex<HashMap<String, CancellationToken>>>,
    timeout_count: Arc<AtomicU32>,
}

impl BackgroundJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `work` in the background. When it resolves (or is cancelled,
    /// or panics), `on_complete(job_id, result_string)` runs once.
    ///
    /// A result containing "timed out" (case-insensitive) bumps the
    /// session's timeout counter.
    pub fn submit<W, C, Fut>(&self, job_id: &str, work: W, on_complete: C)
    where
        W: Future<Output = String> + Send + 'static,
        C: FnOnce(String, String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        self.jobs.lock().insert(job_id.to_string(), token.clone());
        tracing::info!(job_id, active = self.jobs.lock().len(), "background job submitted");

        let jobs = self.jobs.clone();
        let timeouts = self.timeout_count.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => {
                    tracing::warn!(job_id = %job_id, "background job cancelled");
                    format!("Job {job_id} was cancelled before completion.")
                }
                outcome = AssertUnwindSafe(work).catch_unwind() => match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(job_id = %job_id, "background job panicked");
                        format!("Background job {job_id} encountered an error: task panicked.")
                    }
                },
            };

            if result.to_lowercase().contains("timed out") {
                timeouts.fetch_add(1, Ordering::Relaxed);
            }

            on_complete(job_id.clone(), result).await;
            jobs.lock().remove(&job_id);
        });
    }

    /// Number of jobs still running.
    pub fn active_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Jobs that ended with a timeout result.
    pub fn timeout_count(&self) -> u32 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    /// Cancel every running job; each still fires its completion callback.
    pub fn cancel_all(&self) {
        let jobs = self.jobs.lock();
        for token in jobs.values() {
            token.cancel();
        }
        if !jobs.is_empty() {
            tracing::info!(cancelled = jobs.len(), "all background jobs cancelled");
        }
    }
}
