// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! The whole data model runs on Unix seconds (`startTime`, `duration`,
//! retention cutoffs), so the trait deals in epoch seconds only.

#[cfg(any(test, feature = "test-support"))]
use parking_lot::Mutex;
#[cfg(any(test, feature = "test-support"))]
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A clock that provides the current time as Unix seconds.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now_unix(&self) -> i64;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Fake clock for testing with controllable time.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct FakeClock {
    unix: Arc<Mutex<i64>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn new(unix: i64) -> Self {
        Self { unix: Arc::new(Mutex::new(unix)) }
    }

    /// Advance the clock by the given number of seconds.
    pub fn advance(&self, secs: i64) {
        *self.unix.lock() += secs;
    }

    /// Set the clock to a specific Unix timestamp.
    pub fn set(&self, unix: i64) {
        *self.unix.lock() = unix;
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new(1_000_000_000)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn now_unix(&self) -> i64 {
        *self.unix.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
