//! Global minimum-spacing gate for upstream requests.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::core::clock::ClockHandle;

/// Enforces a minimum interval between successive upstream attempts.
///
/// Each caller reserves the next free slot while holding the lock, then
/// sleeps outside of it until that slot arrives. Slots are handed out in the
/// order callers reach the lock. A caller that is cancelled while waiting
/// keeps its slot consumed, so spacing never shrinks.
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
    clock: ClockHandle,
}

impl RateLimiter {
    /// Create a limiter with the given spacing.
    pub fn new(min_interval: Duration, clock: ClockHandle) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
            clock,
        }
    }

    /// Configured spacing.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the caller may issue its request.
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis() as u64, "Rate limiter delaying request");
            self.clock.sleep(wait).await;
        }
    }

    /// Reserve a slot and return how long the caller must wait for it.
    fn reserve(&self) -> Duration {
        let mut next_slot = self.next_slot.lock();
        let now = self.clock.now();
        let slot = match *next_slot {
            Some(free_at) if free_at > now => free_at,
            _ => now,
        };
        *next_slot = Some(slot + self.min_interval);
        slot.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{ManualClock, TokioClock};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(Duration::from_millis(100), clock.clone());

        limiter.acquire().await;

        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_acquires_are_spaced() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(Duration::from_millis(100), clock.clone());

        limiter.acquire().await;
        limiter.acquire().await;
        clock.advance(Duration::from_millis(30));
        limiter.acquire().await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(70)]
        );
    }

    #[tokio::test]
    async fn test_idle_gap_resets_spacing() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(Duration::from_millis(100), clock.clone());

        limiter.acquire().await;
        clock.advance(Duration::from_secs(5));
        limiter.acquire().await;

        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(Duration::ZERO, clock.clone());

        for _ in 0..5 {
            limiter.acquire().await;
        }

        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_respect_spacing() {
        let interval = Duration::from_millis(100);
        let limiter = Arc::new(RateLimiter::new(interval, TokioClock::shared()));
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let stamps = stamps.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                stamps.lock().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut stamps = stamps.lock().clone();
        stamps.sort();
        assert_eq!(stamps.len(), 8);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_keeps_its_slot() {
        let interval = Duration::from_millis(100);
        let limiter = Arc::new(RateLimiter::new(interval, TokioClock::shared()));
        let start = Instant::now();

        limiter.acquire().await;
        {
            // Reserves the second slot, then gives up before it arrives.
            let waiter = limiter.acquire();
            let _ = tokio::time::timeout(Duration::from_millis(10), waiter).await;
        }
        limiter.acquire().await;

        assert!(Instant::now() - start >= interval * 2);
    }
}
