use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorRateLimiter};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest interval between tokens
const MAX_PERIOD: Duration = Duration::from_secs(3600);

/// Run-wide request limiter
///
/// A request may start only when a token bucket (refilled at
/// `requests_per_second`, holding at most `burst` tokens) has a token and
/// fewer than `max_in_flight` requests hold a permit.
pub struct RateLimiter {
    bucket: DefaultDirectRateLimiter,
    slots: Arc<Semaphore>,
    max_in_flight: usize,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_in_flight", &self.max_in_flight)
            .field("available_slots", &self.slots.available_permits())
            .finish()
    }
}

/// Held for the duration of one request; dropping it frees the slot
#[derive(Debug)]
pub struct LimiterPermit {
    _slot: OwnedSemaphorePermit,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, burst: u32, max_in_flight: usize) -> Self {
        // rates that are zero, negative or too small for a Duration fall back
        // to the slowest period instead of panicking
        let period = Duration::try_from_secs_f64(requests_per_second.recip())
            .unwrap_or(MAX_PERIOD)
            .min(MAX_PERIOD);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
            .allow_burst(burst);

        Self {
            bucket: GovernorRateLimiter::direct(quota),
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Waits for an in-flight slot and then a token
    ///
    /// Returns None only after [`RateLimiter::close`].
    pub async fn acquire(&self) -> Option<LimiterPermit> {
        let slot = Arc::clone(&self.slots).acquire_owned().await.ok()?;
        self.bucket.until_ready().await;
        Some(LimiterPermit { _slot: slot })
    }

    /// Like [`RateLimiter::acquire`], giving up when `cancel` fires
    pub async fn acquire_or_cancel(&self, cancel: &CancellationToken) -> Option<LimiterPermit> {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Rate limiter wait cancelled");
                None
            }
            permit = self.acquire() => permit,
        }
    }

    /// Returns a permit early; equivalent to dropping it
    pub fn release(&self, permit: LimiterPermit) {
        drop(permit);
    }

    /// Wakes every waiter with None; later acquisitions fail immediately
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }
}
