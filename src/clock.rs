use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local, Utc};

pub use mockable::{Clock, DefaultClock};

use crate::model::Ms;

/// Shared handle to the engine's source of "now".
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Read the clock once, as Unix milliseconds.
pub fn now_ms(clock: &(dyn Clock + Send + Sync)) -> Ms {
    clock.utc().timestamp_millis()
}

/// Manually driven clock for tests and benches.
#[derive(Debug)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now: Ms) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Ms) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Ms) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_moves_only_when_told() {
        let clock = FixedClock::new(1_000);
        assert_eq!(now_ms(&clock), 1_000);
        clock.advance(500);
        assert_eq!(now_ms(&clock), 1_500);
        clock.set(42);
        assert_eq!(now_ms(&clock), 42);
    }

    #[test]
    fn default_clock_is_after_2020() {
        assert!(now_ms(&DefaultClock) > 1_577_836_800_000);
    }
}
