// * Navigation Throttle
// * Paces consecutive page loads against a single external portal

use governor::{Quota, RateLimiter as GovernorLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use tracing::debug;

type DirectLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Direct (un-keyed) limiter; a rate of zero disables pacing
pub struct NavigationThrottle {
    limiter: Option<DirectLimiter>,
}

impl NavigationThrottle {
    pub fn per_second(navigations_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(navigations_per_second).map(|rate| {
            // * Burst of one keeps loads evenly spaced instead of front-loaded
            let quota = Quota::per_second(rate).allow_burst(nonzero!(1u32));
            GovernorLimiter::direct(quota)
        });
        Self { limiter }
    }

    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Waits until the next navigation is allowed
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                debug!("Navigation throttled");
                limiter.until_ready().await;
            }
        }
    }
}
