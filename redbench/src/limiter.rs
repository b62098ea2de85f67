//! Token bucket shared by every worker of a run.
//!
//! The bucket is kept as a single atomic "virtual clock": the instant, in
//! nanoseconds since the limiter was created, up to which tokens have already
//! been handed out. Taking `n` tokens advances it by `n` token intervals with a
//! CAS loop; the caller then waits until the virtual clock minus the burst
//! allowance (`capacity` intervals) has been reached in real time. An idle
//! bucket refills lazily because the clock never lags real time by more than
//! the burst allowance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    origin: Instant,
    per_second: f64,
    capacity: u64,
    interval_ns: f64,
    burst_ns: u64,
    /// Virtual clock, nanoseconds since `origin`.
    reserved_until: AtomicU64,
}

impl RateLimiter {
    /// Bucket refilled at `per_second` tokens per second holding one
    /// millisecond's worth of tokens (at least one).
    pub fn new(per_second: f64) -> Self {
        let capacity = (per_second / 1000.0).ceil().max(1.0) as u64;
        Self::with_capacity(per_second, capacity)
    }

    pub fn with_capacity(per_second: f64, capacity: u64) -> Self {
        let interval_ns = 1e9 / per_second;
        Self {
            origin: Instant::now(),
            per_second,
            capacity,
            interval_ns,
            burst_ns: (capacity as f64 * interval_ns).round() as u64,
            reserved_until: AtomicU64::new(0),
        }
    }

    pub fn per_second(&self) -> f64 {
        self.per_second
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Take `tokens` from the bucket and return when they may be used.
    ///
    /// Reservations are never returned, so concurrent callers are served in the
    /// order their CAS succeeds and the aggregate rate holds regardless of how
    /// the tokens are batched.
    pub fn reserve(&self, tokens: u64) -> Instant {
        let now = self.origin.elapsed().as_nanos() as u64;
        let cost = (tokens as f64 * self.interval_ns).round() as u64;
        let mut current = self.reserved_until.load(Ordering::Acquire);
        loop {
            let next = current.max(now).saturating_add(cost);
            match self.reserved_until.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let ready = next.saturating_sub(self.burst_ns);
                    return self.origin + Duration::from_nanos(ready);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait until `tokens` are available.
    pub async fn acquire(&self, tokens: u64) {
        tokio::time::sleep_until(self.reserve(tokens)).await;
    }
}
