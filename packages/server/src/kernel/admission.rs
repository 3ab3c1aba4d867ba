//! Request admission control for the service surface.
//!
//! Uses the governor crate. The quota refills one slot every `window / max`
//! and allows a burst of `max`, so no more than `max` requests are admitted in
//! any `window` starting from a full bucket.

use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::common::{IngestError, IngestResult};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Clone)]
pub struct AdmissionControl {
    limiter: Option<Arc<DefaultRateLimiter>>,
}

impl AdmissionControl {
    /// Admit at most `max_requests` per `window`. A zero limit disables admission control.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let limiter = NonZeroU32::new(max_requests).and_then(|burst| {
            let period = window / burst.get();
            Quota::with_period(period)
                .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(burst))))
        });

        Self { limiter }
    }

    /// Admit everything.
    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    /// Consume one slot, or reject with `RateLimited`.
    pub fn check(&self) -> IngestResult<()> {
        match &self.limiter {
            Some(limiter) => limiter.check().map_err(|_| {
                warn!("request rejected by admission control");
                IngestError::RateLimited
            }),
            None => Ok(()),
        }
    }
}

impl Default for AdmissionControl {
    /// 100 requests per 15 minutes
    fn default() -> Self {
        Self::new(100, Duration::from_secs(15 * 60))
    }
}
