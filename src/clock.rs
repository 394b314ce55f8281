//! Injectable clock
//!
//! Expiry comparisons and default start/end dates must not read the ambient
//! system clock inside business logic, so every manager takes a `Clock`.

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time. Used in production wiring.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: parking_lot::Mutex<Option<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(Some(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = Some(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().unwrap_or_else(Utc::now)
    }
}
