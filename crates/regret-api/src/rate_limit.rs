use chrono::{TimeDelta, Utc};
use tracing::warn;

use regret_db::Database;

use crate::error::ApiError;

/// Global cap on confessions created per trailing window, counted from the store.
///
/// The count and the following insert are separate statements, so N submissions
/// racing the same count can overshoot the cap by at most N - 1 in one window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    max: u64,
    window: TimeDelta,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(50, TimeDelta::minutes(60))
    }
}

impl RateLimiter {
    pub fn new(max: u64, window: TimeDelta) -> Self {
        Self { max, window }
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Blocking: call from `spawn_blocking`.
    pub fn check(&self, db: &Database) -> Result<(), ApiError> {
        let count = db.count_since(Utc::now() - self.window)?;
        if count >= self.max {
            warn!(
                "Rate limit reached: {} confessions in the last {} minutes (max {})",
                count,
                self.window.num_minutes(),
                self.max
            );
            return Err(ApiError::RateLimitExceeded);
        }
        Ok(())
    }
}
