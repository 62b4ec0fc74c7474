use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::info;

/// Rate-limit metadata read from an upstream response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// `X-RateLimit-Remaining`
    pub remaining: Option<u32>,
    /// `X-RateLimit-Limit`
    pub limit: Option<u32>,
    /// `Retry-After`, or the distance to `X-RateLimit-Reset`
    pub reset_after: Option<Duration>,
}

/// Locally tracked upstream call budget.
///
/// AniList allows a fixed number of requests per window. The budget is
/// decremented on every send and overwritten by whatever the provider reports.
/// When it drops below the low-water mark, callers sleep out the reset window
/// before sending.
#[derive(Debug)]
pub struct RateBudget {
    // (remaining, reset window)
    state: Mutex<(u32, Duration)>,
    limit: u32,
    low_water: u32,
    window: Duration,
}

impl RateBudget {
    pub fn new(limit: u32, window: Duration, low_water: u32) -> Self {
        Self {
            state: Mutex::new((limit, window)),
            limit,
            low_water,
            window,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut (u32, Duration)) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Current `(remaining, reset window)`.
    pub fn snapshot(&self) -> (u32, Duration) {
        self.with_state(|state| *state)
    }

    pub fn remaining(&self) -> u32 {
        self.snapshot().0
    }

    /// The window to sleep when throttled or rate limited.
    pub fn reset_window(&self) -> Duration {
        self.snapshot().1
    }

    /// Account for a call about to be sent.
    pub fn consume(&self) {
        self.with_state(|state| state.0 = state.0.saturating_sub(1));
    }

    /// Apply the provider's rate-limit headers.
    pub fn observe(&self, info: &RateLimitInfo) {
        self.with_state(|state| {
            if let Some(remaining) = info.remaining {
                let ceiling = info.limit.unwrap_or(self.limit).max(self.limit);
                state.0 = remaining.min(ceiling);
            }
            if let Some(reset) = info.reset_after {
                state.1 = reset;
            }
        });
    }

    /// Refill after the reset window has elapsed.
    pub fn restore(&self) {
        self.with_state(|state| *state = (self.limit, self.window));
    }

    /// Suspend the caller for the reset window if the budget is below the
    /// low-water mark. Other callers are not blocked.
    pub async fn throttle(&self) {
        let (remaining, reset) = self.snapshot();
        if remaining >= self.low_water {
            return;
        }

        info!(
            name: "upstream.throttle",
            remaining,
            wait_secs = reset.as_secs(),
            "Rate budget low, waiting for reset window"
        );
        tokio::time::sleep(reset).await;
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_never_negative() {
        let budget = RateBudget::new(2, Duration::from_secs(60), 1);
        budget.consume();
        budget.consume();
        budget.consume();
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_observe_applies_headers() {
        let budget = RateBudget::new(90, Duration::from_secs(60), 5);
        budget.observe(&RateLimitInfo {
            remaining: Some(42),
            limit: Some(90),
            reset_after: Some(Duration::from_secs(17)),
        });
        assert_eq!(budget.snapshot(), (42, Duration::from_secs(17)));

        // Absent headers leave the budget alone.
        budget.observe(&RateLimitInfo::default());
        assert_eq!(budget.snapshot(), (42, Duration::from_secs(17)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_waits_for_reset_window() {
        let budget = RateBudget::new(90, Duration::from_secs(60), 5);

        let start = tokio::time::Instant::now();
        budget.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        budget.observe(&RateLimitInfo {
            remaining: Some(3),
            limit: None,
            reset_after: Some(Duration::from_secs(30)),
        });

        let start = tokio::time::Instant::now();
        budget.throttle().await;
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(budget.remaining(), 90);
    }
}
