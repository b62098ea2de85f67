use serde::Serialize;
use std::time::Duration;

use crate::error::ConfigError;

/// Default number of concurrent connections.
pub const DEFAULT_CLIENTS: usize = 50;

/// Default total number of requests per run.
pub const DEFAULT_REQUESTS: u64 = 100_000;

/// Default time allowed to establish each connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Slowest accepted rate limit, in requests per second.
pub const MIN_RATE_LIMIT: f64 = 0.001;

/// Initial capacity of a worker's outbound and inbound buffers.
pub const WORKER_BUFFER_SIZE: usize = 16 * 1024;

/// What the coordinator does when a worker fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Cancel every other worker as soon as one fails.
    #[default]
    AbortOnFirstError,
    /// Let the remaining workers finish their shares.
    Tolerate,
}

/// Immutable run configuration, passed by reference to [`run`](crate::run).
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of concurrent connections, one worker each.
    pub clients: usize,
    /// Total request budget, split across workers.
    pub requests: u64,
    /// Requests written per round-trip.
    pub pipeline: usize,
    /// Aggregate requests per second across all workers.
    pub rate_limit: Option<f64>,
    pub failure_policy: FailurePolicy,
    pub connect_timeout: Duration,
    /// Limit on any single write or read of a worker.
    pub io_timeout: Option<Duration>,
    /// Cancel the run once this much time has passed since it started.
    pub time_limit: Option<Duration>,
    /// Count top-level error replies in the summary.
    pub check_replies: bool,
    /// Pre-encoded commands sent once per connection before timing starts.
    pub setup: Vec<Vec<u8>>,
    /// Base seed for the per-worker random generators.
    pub seed: Option<u64>,
    pub max_reply_depth: usize,
    /// Log live progress at this interval.
    pub progress_interval: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            clients: DEFAULT_CLIENTS,
            requests: DEFAULT_REQUESTS,
            pipeline: 1,
            rate_limit: None,
            failure_policy: FailurePolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: None,
            time_limit: None,
            check_replies: true,
            setup: Vec::new(),
            seed: None,
            max_reply_depth: redbench_common::DEFAULT_MAX_DEPTH,
            progress_interval: None,
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clients < 1 {
            return Err(ConfigError::InvalidConcurrency(self.clients));
        }
        if self.pipeline < 1 {
            return Err(ConfigError::InvalidPipeline(self.pipeline));
        }
        if let Some(rate) = self.rate_limit {
            if !rate.is_finite() || rate < MIN_RATE_LIMIT {
                return Err(ConfigError::InvalidRateLimit(rate.to_string()));
            }
        }
        if self.max_reply_depth < 1 {
            return Err(ConfigError::InvalidReplyDepth);
        }
        Ok(())
    }
}
