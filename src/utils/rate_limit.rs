//! Quota gate for services with a requests-per-second allowance.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::fmt;
use std::num::NonZeroU32;

/// Token bucket granting `permits` acquisitions per second.
///
/// One gate is shared (behind an `Arc`) by every concurrent call to the same
/// service, so acquisitions are throttled across the whole batch.
pub struct RateGate {
    limiter: DefaultDirectRateLimiter,
    permits: NonZeroU32,
}

impl RateGate {
    /// A gate allowing `permits` calls per second; zero is treated as one
    pub fn per_second(permits: u32) -> Self {
        let permits = NonZeroU32::new(permits).unwrap_or(nonzero!(1u32));
        Self {
            limiter: RateLimiter::direct(Quota::per_second(permits)),
            permits,
        }
    }

    /// Wait until a permit is available
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

impl fmt::Debug for RateGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateGate")
            .field("permits_per_second", &self.permits)
            .finish()
    }
}
