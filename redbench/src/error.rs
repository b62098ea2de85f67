use redbench_common::ProtocolError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Invalid [`Options`](crate::Options), reported before any connection is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("Pipeline depth must be at least 1, got {0}")]
    InvalidPipeline(usize),

    #[error("Rate limit must be a positive number of requests per second, got {0}")]
    InvalidRateLimit(String),

    #[error("Maximum reply depth must be at least 1")]
    InvalidReplyDepth,
}

/// Failure that ends one connection worker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed by server with {0} replies outstanding")]
    Closed(u64),

    #[error("Timed out after {0:?} waiting on the connection")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server sent {0} bytes with no request outstanding")]
    Unsolicited(usize),

    #[error("Connection setup rejected: {0} error replies")]
    SetupRejected(usize),

    #[error("Worker panicked")]
    Panicked,
}

impl From<io::Error> for WorkerError {
    fn from(e: io::Error) -> Self {
        WorkerError::Connection(e.to_string())
    }
}

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot connect to {addr}: {source}")]
    Connect { addr: String, source: WorkerError },

    #[error("Failed to start runtime: {0}")]
    Runtime(String),
}
