use rand::{rngs::StdRng, SeedableRng};
use redbench_common::FrameScanner;
use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::config::{Options, WORKER_BUFFER_SIZE};
use crate::error::WorkerError;
use crate::limiter::RateLimiter;
use crate::metrics::Progress;
use crate::workload::Workload;

/// Counters owned by a single worker until it finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStats {
    pub id: usize,
    /// Requests assigned to this worker.
    pub share: u64,
    pub sent: u64,
    pub completed: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub errors: u64,
    pub error_replies: u64,
    pub started: Instant,
    pub finished: Instant,
    /// Round-trip time of each completed batch, in issue order.
    pub latency_ns: Vec<u64>,
}

impl WorkerStats {
    pub fn new(id: usize, share: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            share,
            sent: 0,
            completed: 0,
            bytes_written: 0,
            bytes_read: 0,
            errors: 0,
            error_replies: 0,
            started: now,
            finished: now,
            latency_ns: Vec::new(),
        }
    }
}

/// What a worker hands back to the coordinator when it stops.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub stats: WorkerStats,
    /// The failure that ended the worker; `None` when it exhausted its share
    /// or was cancelled.
    pub error: Option<WorkerError>,
}

impl WorkerReport {
    /// Report standing in for a worker whose task panicked.
    pub fn panicked(id: usize, share: u64) -> Self {
        let mut stats = WorkerStats::new(id, share);
        stats.errors = 1;
        Self {
            stats,
            error: Some(WorkerError::Panicked),
        }
    }
}

/// Per-worker settings derived from [`Options`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub id: usize,
    pub share: u64,
    pub pipeline: usize,
    pub io_timeout: Option<Duration>,
    pub check_replies: bool,
    pub max_reply_depth: usize,
    pub seed: u64,
}

impl WorkerConfig {
    pub fn from_options(options: &Options, id: usize, share: u64, seed: u64) -> Self {
        Self {
            id,
            share,
            pipeline: options.pipeline,
            io_timeout: options.io_timeout,
            check_replies: options.check_replies,
            max_reply_depth: options.max_reply_depth,
            seed,
        }
    }
}

/// Drives one connection through its share of the request budget: fill a
/// batch of up to `pipeline` requests, write it, then consume exactly that
/// many replies in order before starting the next batch.
pub struct Worker<W: Workload + ?Sized> {
    config: WorkerConfig,
    workload: Arc<W>,
    limiter: Option<Arc<RateLimiter>>,
    progress: Arc<Progress>,
    cancel: watch::Receiver<bool>,
}

impl<W: Workload + ?Sized> Worker<W> {
    pub fn new(
        config: WorkerConfig,
        workload: Arc<W>,
        limiter: Option<Arc<RateLimiter>>,
        progress: Arc<Progress>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            workload,
            limiter,
            progress,
            cancel,
        }
    }

    /// Run until the share is exhausted, the connection fails, or the run is
    /// cancelled. Counters accumulated before a failure are always reported.
    pub async fn run(mut self, stream: TcpStream) -> WorkerReport {
        let mut stats = WorkerStats::new(self.config.id, self.config.share);
        debug!(worker = self.config.id, share = self.config.share, "worker started");

        let error = self.drive(stream, &mut stats).await.err();
        stats.finished = Instant::now();
        if let Some(e) = &error {
            stats.errors += 1;
            self.progress.record_error();
            warn!(worker = self.config.id, completed = stats.completed, error = %e, "worker failed");
        } else {
            debug!(worker = self.config.id, completed = stats.completed, "worker finished");
        }
        WorkerReport { stats, error }
    }

    async fn drive(&mut self, mut stream: TcpStream, stats: &mut WorkerStats) -> Result<(), WorkerError> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut scanner = FrameScanner::with_max_depth(self.config.max_reply_depth);
        let mut outbuf = Vec::with_capacity(WORKER_BUFFER_SIZE);
        let mut inbuf = Vec::with_capacity(WORKER_BUFFER_SIZE);
        let io_timeout = self.config.io_timeout;

        while stats.sent < self.config.share {
            if *self.cancel.borrow() {
                return Ok(());
            }
            let batch = (self.config.share - stats.sent).min(self.config.pipeline as u64);

            if let Some(limiter) = &self.limiter {
                let ready = limiter.reserve(batch);
                tokio::select! {
                    biased;
                    _ = cancelled(&mut self.cancel) => return Ok(()),
                    _ = tokio::time::sleep_until(ready) => {}
                }
            }

            outbuf.clear();
            let workload = &self.workload;
            let filled = panic::catch_unwind(AssertUnwindSafe(|| {
                for _ in 0..batch {
                    workload.append_request(&mut outbuf, &mut rng);
                }
            }));
            if filled.is_err() {
                return Err(WorkerError::Panicked);
            }

            let batch_start = Instant::now();
            if guarded(&mut self.cancel, io_timeout, stream.write_all(&outbuf)).await?.is_none() {
                return Ok(());
            }
            stats.sent += batch;
            stats.bytes_written += outbuf.len() as u64;

            let mut outstanding = batch;
            loop {
                let limit = usize::try_from(outstanding).unwrap_or(usize::MAX);
                let scanned = scanner.scan(&inbuf, limit)?;
                inbuf.drain(..scanned.consumed);
                let frames = scanned.frames as u64;
                stats.completed += frames;
                if self.config.check_replies {
                    stats.error_replies += scanned.error_frames as u64;
                }
                self.progress.record_completed(frames);
                outstanding -= frames;
                if outstanding == 0 {
                    break;
                }

                let read = guarded(&mut self.cancel, io_timeout, stream.read_buf(&mut inbuf)).await?;
                match read {
                    None => return Ok(()),
                    Some(0) => return Err(WorkerError::Closed(outstanding)),
                    Some(n) => stats.bytes_read += n as u64,
                }
            }

            // Replies are strictly one per request and in order; anything left
            // over cannot belong to a request of this connection.
            if !inbuf.is_empty() {
                return Err(WorkerError::Unsolicited(inbuf.len()));
            }
            stats.latency_ns.push(batch_start.elapsed().as_nanos() as u64);
        }
        Ok(())
    }
}

/// Open a connection and run the setup commands on it. Setup replies are
/// consumed here so they never reach a worker's accounting.
pub async fn connect(addr: &str, options: &Options) -> Result<TcpStream, WorkerError> {
    let mut stream = match timeout(options.connect_timeout, TcpStream::connect(addr)).await {
        Ok(stream) => stream?,
        Err(_) => return Err(WorkerError::Timeout(options.connect_timeout)),
    };
    stream.set_nodelay(true)?;

    if options.setup.is_empty() {
        return Ok(stream);
    }

    let request: Vec<u8> = options.setup.concat();
    let run_setup = async {
        stream.write_all(&request).await?;
        let mut scanner = FrameScanner::with_max_depth(options.max_reply_depth);
        let mut inbuf = Vec::with_capacity(WORKER_BUFFER_SIZE);
        let mut outstanding = options.setup.len();
        let mut rejected = 0;
        while outstanding > 0 {
            if stream.read_buf(&mut inbuf).await? == 0 {
                return Err(WorkerError::Closed(outstanding as u64));
            }
            let scanned = scanner.scan(&inbuf, outstanding)?;
            inbuf.drain(..scanned.consumed);
            outstanding -= scanned.frames;
            rejected += scanned.error_frames;
        }
        if rejected > 0 {
            return Err(WorkerError::SetupRejected(rejected));
        }
        Ok::<(), WorkerError>(())
    };

    match timeout(options.connect_timeout, run_setup).await {
        Ok(result) => result?,
        Err(_) => return Err(WorkerError::Timeout(options.connect_timeout)),
    }
    Ok(stream)
}

/// Run one network operation under the optional I/O timeout, giving up early
/// when the run is cancelled. `Ok(None)` means cancelled.
async fn guarded<T, F>(
    cancel: &mut watch::Receiver<bool>,
    limit: Option<Duration>,
    op: F,
) -> Result<Option<T>, WorkerError>
where
    F: Future<Output = io::Result<T>>,
{
    let op = async move {
        match limit {
            Some(d) => match timeout(d, op).await {
                Ok(result) => result.map_err(WorkerError::from),
                Err(_) => Err(WorkerError::Timeout(d)),
            },
            None => op.await.map_err(WorkerError::from),
        }
    };
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Ok(None),
        result = op => result.map(Some),
    }
}

/// Resolves once the run is cancelled. Never resolves if the coordinator went
/// away without cancelling.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
