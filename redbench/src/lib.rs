pub mod bench;
pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod worker;
pub mod workload;

pub use bench::{run, run_blocking, Bench, RunState};
pub use config::{FailurePolicy, Options};
pub use error::{BenchError, ConfigError, WorkerError};
pub use metrics::Summary;
pub use redbench_common::append_command;
pub use workload::Workload;
