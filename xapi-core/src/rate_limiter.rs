//! Outbound request pacing.
//!
//! The server enforces a minimum spacing between consecutive requests on one
//! socket and disconnects clients that violate it. The write loop is the only
//! caller; backlog accumulates in the outbound queue, never by skipping waits.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Enforces a minimum interval between consecutive grants.
///
/// `acquire` suspends until at least `interval` has elapsed since the previous
/// grant. Grants are strictly sequential: the internal lock is held across the
/// wait, so no two callers can proceed without the full interval between them.
/// The first grant is immediate.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter with the given minimum spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    /// Returns the configured minimum spacing.
    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Suspends until the minimum interval since the previous grant has
    /// elapsed, then records the new grant.
    pub async fn acquire(&self) {
        let mut last_grant = self.last_grant.lock().await;
        if let Some(previous) = *last_grant {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        *last_grant = Some(Instant::now());
    }
}
