use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

use crate::bench::RunState;
use crate::config::{FailurePolicy, Options};
use crate::worker::WorkerReport;

/// Live counters shared by every worker; read by the progress reporter while
/// the run is in flight. The summary is computed from worker reports, not from
/// these.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicU64,
    errors: AtomicU64,
}

impl Progress {
    pub fn record_completed(&self, n: u64) {
        self.completed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Result of one run, aggregated from every worker's final counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub name: String,
    pub state: RunState,
    /// Set when the run was aborted or completed fewer requests than requested.
    pub incomplete: bool,
    pub failure_policy: FailurePolicy,
    pub clients: usize,
    pub pipeline: usize,
    pub requested: u64,
    pub sent: u64,
    pub completed: u64,
    /// Connection and protocol errors; at most one per worker.
    pub errors: u64,
    /// Top-level error replies returned by the server.
    pub error_replies: u64,
    pub failed_workers: usize,
    pub bytes_written: u64,
    pub bytes_read: u64,
    /// From coordinator start to the last worker finishing.
    pub elapsed_secs: f64,
    pub throughput_rps: f64,
    /// Round-trip latency of a pipelined batch.
    pub mean_latency_ns: u64,
    pub p50_latency_ns: u64,
    pub p99_latency_ns: u64,
}

impl Summary {
    /// Sum the final worker counters of a run. Pure over its inputs, so the
    /// same reports always produce the same summary.
    pub fn aggregate(
        name: &str,
        options: &Options,
        started: Instant,
        state: RunState,
        reports: &[WorkerReport],
    ) -> Self {
        let mut summary = Summary {
            name: name.to_string(),
            state,
            incomplete: false,
            failure_policy: options.failure_policy,
            clients: options.clients,
            pipeline: options.pipeline,
            requested: options.requests,
            sent: 0,
            completed: 0,
            errors: 0,
            error_replies: 0,
            failed_workers: 0,
            bytes_written: 0,
            bytes_read: 0,
            elapsed_secs: 0.0,
            throughput_rps: 0.0,
            mean_latency_ns: 0,
            p50_latency_ns: 0,
            p99_latency_ns: 0,
        };

        let mut latency_ns = Vec::new();
        let mut last_finish = started;
        for report in reports {
            let stats = &report.stats;
            summary.sent += stats.sent;
            summary.completed += stats.completed;
            summary.errors += stats.errors;
            summary.error_replies += stats.error_replies;
            summary.bytes_written += stats.bytes_written;
            summary.bytes_read += stats.bytes_read;
            if report.error.is_some() {
                summary.failed_workers += 1;
            }
            last_finish = last_finish.max(stats.finished);
            latency_ns.extend_from_slice(&stats.latency_ns);
        }

        summary.elapsed_secs = last_finish.saturating_duration_since(started).as_secs_f64();
        if summary.elapsed_secs > 0.0 {
            summary.throughput_rps = summary.completed as f64 / summary.elapsed_secs;
        }
        if !latency_ns.is_empty() {
            summary.mean_latency_ns = latency_ns.iter().sum::<u64>() / latency_ns.len() as u64;
        }
        latency_ns.sort_unstable();
        summary.p50_latency_ns = percentile(&latency_ns, 0.50);
        summary.p99_latency_ns = percentile(&latency_ns, 0.99);
        summary.incomplete = state == RunState::Aborted || summary.completed < summary.requested;
        summary
    }

    pub fn error_reply_rate(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        self.error_replies as f64 / self.completed as f64
    }
}

/// Return the element of sorted `data` at index `floor(p * n)`.
/// Returns 0 for an empty slice.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = (p * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
