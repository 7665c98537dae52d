//! Politeness and retry for the fetcher.
//!
//! Every request goes through a [`FetchPermit`] handed out by the shared
//! [`RateLimiter`]: the permit holds a concurrency slot, has already waited
//! out the per-host delay, and carries the rotated request identity. Dropping
//! the permit releases the slot, so error paths cannot leak budget.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::identity::{IdentityPool, RequestIdentity};
use crate::error::FetchError;

pub struct RateLimiter {
    min_delay: Duration,
    slots: Arc<Semaphore>,
    next_slot: Mutex<HashMap<String, Instant>>,
    identities: IdentityPool,
}

/// Scoped right to issue one request.
pub struct FetchPermit {
    identity: RequestIdentity,
    _slot: OwnedSemaphorePermit,
}

impl FetchPermit {
    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_in_flight: usize, identities: IdentityPool) -> Self {
        Self {
            min_delay,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            next_slot: Mutex::new(HashMap::new()),
            identities,
        }
    }

    /// Waits for a free slot and for the host's next allowed send time.
    ///
    /// Send times are reserved under the lock, so concurrent callers for the
    /// same host are spaced `min_delay` apart rather than released together.
    pub async fn acquire(&self, host: &str) -> Result<FetchPermit, FetchError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Network {
                url: host.to_owned(),
                message: "rate limiter closed".into(),
            })?;

        let send_at = {
            let mut next = self
                .next_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let send_at = next.get(host).copied().filter(|t| *t > now).unwrap_or(now);
            next.insert(host.to_owned(), send_at + self.min_delay);
            send_at
        };
        tokio::time::sleep_until(send_at).await;

        Ok(FetchPermit {
            identity: self.identities.next_identity(),
            _slot: slot,
        })
    }
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// `max_retries` additional attempts are spent.
///
/// The wait before retry `n` is `backoff_base_ms * 2^(n-1)` plus up to half
/// the base in random jitter. `Blocked` is not transient and returns at once.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_transient() || attempt >= max_retries {
            return Err(err);
        }

        let jitter = if backoff_base_ms > 0 {
            rand::thread_rng().gen_range(0..=backoff_base_ms / 2)
        } else {
            0
        };
        let delay_ms = backoff_base_ms
            .saturating_mul(1u64 << attempt.min(32))
            .saturating_add(jitter);
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms,
            error = %err,
            "transient fetch error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> FetchError {
        FetchError::Http {
            status: 503,
            url: "https://example.com".to_owned(),
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, FetchError>(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, |attempt| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(server_error())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(server_error())
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(FetchError::Http { status: 503, .. })));
    }

    #[tokio::test]
    async fn blocked_escalates_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(5, 0, |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::Blocked {
                    url: "https://example.com".into(),
                    reason: "HTTP 403".into(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::Blocked { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_requests_to_the_same_host() {
        let limiter = RateLimiter::new(Duration::from_millis(500), 4, IdentityPool::new(&[]));
        let start = Instant::now();

        drop(limiter.acquire("example.com").await.unwrap());
        drop(limiter.acquire("example.com").await.unwrap());
        drop(limiter.acquire("example.com").await.unwrap());

        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn different_hosts_do_not_wait_on_each_other() {
        let limiter = RateLimiter::new(Duration::from_millis(500), 4, IdentityPool::new(&[]));
        let start = Instant::now();

        drop(limiter.acquire("a.example.com").await.unwrap());
        drop(limiter.acquire("b.example.com").await.unwrap());

        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn permit_rotates_identity() {
        let agents: Vec<String> = vec!["ua-1".into(), "ua-2".into()];
        let limiter = RateLimiter::new(Duration::ZERO, 1, IdentityPool::new(&agents));
        let first = limiter.acquire("example.com").await.unwrap();
        let first_ua = first.identity().user_agent.clone();
        drop(first);
        let second = limiter.acquire("example.com").await.unwrap();
        assert_ne!(first_ua, second.identity().user_agent);
    }
}
