use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{FailurePolicy, Options};
use crate::error::{BenchError, WorkerError};
use crate::limiter::RateLimiter;
use crate::metrics::{Progress, Summary};
use crate::worker::{self, Worker, WorkerConfig, WorkerReport};
use crate::workload::Workload;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Split `total` requests across `workers`: every share is `total / workers`,
/// and the first `total % workers` shares get one more.
pub fn shares(total: u64, workers: usize) -> Vec<u64> {
    if workers == 0 {
        return Vec::new();
    }
    let n = workers as u64;
    let base = total / n;
    let extra = total % n;
    (0..n).map(|i| base + u64::from(i < extra)).collect()
}

/// One benchmark run: validates options, opens every connection, then drives
/// one worker per connection until the budget is spent or the run is aborted.
pub struct Bench<W: Workload + ?Sized> {
    name: String,
    addr: String,
    options: Options,
    workload: Arc<W>,
    state: RunState,
}

impl<W: Workload + ?Sized + 'static> Bench<W> {
    pub fn new(name: &str, addr: &str, options: Options, workload: Arc<W>) -> Self {
        Self {
            name: name.to_string(),
            addr: addr.to_string(),
            options,
            workload,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(&mut self) -> Result<Summary, BenchError> {
        self.options.validate()?;
        let streams = self.connect_all().await?;

        let options = &self.options;
        let shares = shares(options.requests, options.clients);
        let base_seed = options.seed.unwrap_or_else(rand::random);
        let limiter = options.rate_limit.map(|rate| Arc::new(RateLimiter::new(rate)));
        let progress = Arc::new(Progress::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<WorkerReport>();

        self.state = RunState::Running;
        let started = Instant::now();
        info!(
            name = %self.name,
            addr = %self.addr,
            clients = options.clients,
            requests = options.requests,
            pipeline = options.pipeline,
            "benchmark started"
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(shares.len());
        for (id, (stream, share)) in streams.into_iter().zip(shares.iter().copied()).enumerate() {
            let config = WorkerConfig::from_options(options, id, share, base_seed.wrapping_add(id as u64));
            let worker = Worker::new(
                config,
                Arc::clone(&self.workload),
                limiter.clone(),
                Arc::clone(&progress),
                cancel_rx.clone(),
            );
            let done_tx = done_tx.clone();
            let handle = tokio::spawn(async move {
                // A panic outside the workload still has to reach the
                // coordinator while the other workers are running.
                let report = match tokio::spawn(worker.run(stream)).await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(worker = id, error = %e, "worker task failed");
                        WorkerReport::panicked(id, share)
                    }
                };
                done_tx.send(report).ok();
            });
            handles.push(handle);
        }
        drop(done_tx);

        let reporter = options
            .progress_interval
            .map(|every| spawn_progress_reporter(self.name.clone(), Arc::clone(&progress), options.requests, every));

        let deadline = options.time_limit.map(|limit| started + limit);
        let time_limit = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(time_limit);

        let mut aborted = false;
        let mut reports = Vec::with_capacity(handles.len());
        loop {
            tokio::select! {
                report = done_rx.recv() => {
                    let Some(report) = report else { break };
                    let panicked = matches!(report.error, Some(WorkerError::Panicked));
                    let strict = options.failure_policy == FailurePolicy::AbortOnFirstError;
                    if report.error.is_some() && (strict || panicked) && !aborted {
                        warn!(worker = report.stats.id, "aborting run after worker failure");
                        aborted = true;
                        cancel_tx.send(true).ok();
                    }
                    reports.push(report);
                }
                _ = &mut time_limit, if !aborted => {
                    warn!(name = %self.name, "time limit reached, cancelling workers");
                    aborted = true;
                    cancel_tx.send(true).ok();
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker supervisor failed");
            }
        }
        if let Some(reporter) = reporter {
            reporter.abort();
        }

        reports.sort_by_key(|r| r.stats.id);
        self.state = if aborted { RunState::Aborted } else { RunState::Completed };
        let summary = Summary::aggregate(&self.name, options, started, self.state, &reports);
        info!(
            name = %summary.name,
            completed = summary.completed,
            errors = summary.errors,
            elapsed_secs = summary.elapsed_secs,
            throughput_rps = summary.throughput_rps,
            state = ?summary.state,
            "benchmark finished"
        );
        Ok(summary)
    }

    /// Open every connection before the clock starts, so an unreachable target
    /// fails the run before a single request is issued.
    async fn connect_all(&self) -> Result<Vec<tokio::net::TcpStream>, BenchError> {
        let mut set = JoinSet::new();
        for id in 0..self.options.clients {
            let addr = self.addr.clone();
            let options = self.options.clone();
            set.spawn(async move { (id, worker::connect(&addr, &options).await) });
        }

        let mut streams: Vec<Option<tokio::net::TcpStream>> = (0..self.options.clients).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (id, result) = joined.map_err(|e| BenchError::Runtime(e.to_string()))?;
            match result {
                Ok(stream) => streams[id] = Some(stream),
                Err(source) => {
                    // dropping the set aborts the remaining attempts
                    return Err(BenchError::Connect {
                        addr: self.addr.clone(),
                        source,
                    });
                }
            }
        }
        Ok(streams.into_iter().flatten().collect())
    }
}

fn spawn_progress_reporter(name: String, progress: Arc<Progress>, requested: u64, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // consume the immediate first tick
        loop {
            interval.tick().await;
            info!(
                name = %name,
                completed = progress.completed(),
                requested,
                errors = progress.errors(),
                "progress"
            );
        }
    })
}

/// Run one benchmark of `workload` against `addr`.
pub async fn run<W>(name: &str, addr: &str, options: &Options, workload: W) -> Result<Summary, BenchError>
where
    W: Workload + 'static,
{
    Bench::new(name, addr, options.clone(), Arc::new(workload)).run().await
}

/// Blocking form of [`run`] for callers without a runtime.
pub fn run_blocking<W>(name: &str, addr: &str, options: &Options, workload: W) -> Result<Summary, BenchError>
where
    W: Workload + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BenchError::Runtime(e.to_string()))?;
    runtime.block_on(run(name, addr, options, workload))
}
