//! Clock - read-only source of "now"
//!
//! Time is supplied from outside, is monotonic and may jump by any amount
//! between operations. Nothing in the engine advances it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Seconds in a day
pub const DAY: u64 = 24 * 60 * 60;

/// Seconds in the 365-day year used by every APY formula
pub const YEAR: u64 = 365 * DAY;

pub trait Clock: Send + Sync {
    /// Current timestamp in Unix seconds
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Manually driven clock for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move time forward by `seconds`
    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Jump to `timestamp`; earlier values are ignored to keep time monotonic
    pub fn set(&self, timestamp: u64) {
        self.now.fetch_max(timestamp, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
