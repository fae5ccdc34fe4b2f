// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monotonic local message id generation.
//!
//! Ids have the shape `m{millis:013}{counter:04}-{device}`. On one device the
//! lexicographic order of generated ids equals their creation order, which the
//! conversation-preview guard relies on. The counter absorbs bursts within one
//! millisecond; a clock that steps backwards never produces a smaller id.

use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::types::LocalId;

/// Ids issued per millisecond before the generator borrows from the next one.
const COUNTER_LIMIT: u32 = 10_000;

/// Generates strictly increasing [`LocalId`]s for one device.
pub struct LocalIdGenerator {
    device: String,
    clock: Arc<dyn Clock>,
    /// Last issued (millis, counter) pair.
    last: Mutex<(i64, u32)>,
}

impl LocalIdGenerator {
    /// Create a generator whose ids end with `-{device}`.
    pub fn new(device: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            device: device.into(),
            clock,
            last: Mutex::new((i64::MIN, 0)),
        }
    }

    /// Issue the next id.
    pub fn next_id(&self) -> LocalId {
        let now = self.clock.now().timestamp_millis().max(0);
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let (millis, counter) = if now > last.0 {
            (now, 0)
        } else if last.1 + 1 < COUNTER_LIMIT {
            (last.0, last.1 + 1)
        } else {
            (last.0 + 1, 0)
        };
        *last = (millis, counter);

        LocalId(format!("m{millis:013}{counter:04}-{}", self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn ids_increase_within_one_millisecond() {
        let clock = Arc::new(FixedClock(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()));
        let generator = LocalIdGenerator::new("phone", clock);

        let ids: Vec<LocalId> = (0..50).map(|_| generator.next_id()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        assert!(ids[0].as_str().ends_with("-phone"));
        assert_eq!(ids[0].as_str(), "m17000000000000000-phone");
    }

    #[test]
    fn counter_overflow_borrows_next_millisecond() {
        let clock = Arc::new(FixedClock(Utc.timestamp_millis_opt(5).unwrap()));
        let generator = LocalIdGenerator::new("d", clock);

        let mut previous = generator.next_id();
        for _ in 0..(COUNTER_LIMIT + 5) {
            let next = generator.next_id();
            assert!(previous < next);
            previous = next;
        }
        assert!(previous.as_str().starts_with("m0000000000006"));
    }

    #[test]
    fn backwards_clock_never_regresses() {
        struct SteppingClock(Mutex<Vec<i64>>);
        impl Clock for SteppingClock {
            fn now(&self) -> DateTime<Utc> {
                let millis = self.0.lock().unwrap().remove(0);
                Utc.timestamp_millis_opt(millis).unwrap()
            }
        }

        let clock = Arc::new(SteppingClock(Mutex::new(vec![2_000, 1_000, 3_000])));
        let generator = LocalIdGenerator::new("d", clock);
        let a = generator.next_id();
        let b = generator.next_id();
        let c = generator.next_id();
        assert!(a < b && b < c);
    }
}
