//! Request limiting for the photos backend
//!
//! One [`RequestLimiter`] is shared across every outgoing call the adapter
//! makes: it bounds in-flight concurrency with a semaphore and paces
//! sustained throughput with a token bucket. Before a sync retry the
//! limiter is settled — all in-flight permits returned — so a transient
//! failure is never amplified into a thundering herd.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

// ============================================================================
// TokenBucket
// ============================================================================

/// Internal mutable state for the token bucket, protected by a Mutex.
#[derive(Debug)]
struct TokenBucketInner {
    /// Current number of available tokens (fractional for smooth refill)
    tokens: f64,
    /// Timestamp of the last refill calculation
    last_refill: Instant,
}

/// Token bucket pacing for the whole backend.
///
/// Tokens are consumed on each request and refilled at a constant rate.
/// When no tokens are available, callers wait for refill.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum number of tokens in the bucket
    capacity: u32,
    /// Rate at which tokens are added (tokens per second)
    refill_rate: f64,
    /// Mutable inner state (token count, last refill time)
    inner: Mutex<TokenBucketInner>,
}

impl TokenBucket {
    /// Creates a new `TokenBucket` that starts full.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            inner: Mutex::new(TokenBucketInner {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, inner: &mut TokenBucketInner) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(inner.last_refill).as_secs_f64();
        if elapsed_secs > 0.0 {
            inner.tokens = (inner.tokens + elapsed_secs * self.refill_rate)
                .min(self.capacity as f64);
            inner.last_refill = now;
        }
    }

    /// Attempts to take one token; refills first based on elapsed time.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.refill(&mut inner);
        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated wait until a token becomes available.
    pub fn time_until_available(&self) -> Duration {
        let mut inner = self.inner.lock().unwrap();
        self.refill(&mut inner);
        if inner.tokens >= 1.0 || self.refill_rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - inner.tokens) / self.refill_rate)
        }
    }
}

// ============================================================================
// RequestLimiter
// ============================================================================

/// A permit for one outgoing request. Dropping it returns the slot.
pub struct RequestPermit {
    _permit: OwnedSemaphorePermit,
}

/// Global request-rate/concurrency limiter shared across all outgoing calls.
#[derive(Debug)]
pub struct RequestLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    bucket: TokenBucket,
}

impl RequestLimiter {
    pub fn new(max_concurrent: usize, requests_per_second: f64) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            bucket: TokenBucket::new(max_concurrent as u32, requests_per_second),
        }
    }

    /// Acquires a request slot, waiting for both a concurrency permit and a
    /// pacing token.
    pub async fn acquire(&self) -> RequestPermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore never closed");

        loop {
            if self.bucket.try_acquire() {
                break;
            }
            let wait = self.bucket.time_until_available();
            if wait.is_zero() {
                continue;
            }
            tokio::time::sleep(wait).await;
        }

        RequestPermit { _permit: permit }
    }

    /// Waits until every handed-out permit has been returned.
    ///
    /// Called between retry attempts so the next attempt starts with no
    /// in-flight or queued load.
    pub async fn settle(&self) {
        let all = self
            .semaphore
            .acquire_many(self.max_concurrent as u32)
            .await
            .expect("limiter semaphore never closed");
        drop(all);
        debug!("Request limiter settled");
    }

    /// Number of currently available request slots.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
