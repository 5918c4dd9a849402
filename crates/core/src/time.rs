//! Wall-clock abstraction so scheduling math can be tested deterministically.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC calendar day.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
///
/// Clones share the same underlying instant, so a test can hand one clone to
/// the code under test and advance time through another.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Half-open UTC window `[start_of_day(day), start_of_day(day) + 1 day)`.
#[must_use]
pub fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + TimeDelta::days(1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_shared_between_clones() {
        let start = "2025-07-09T00:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let clock = FixedClock::new(start);
        let other = clock.clone();

        other.advance(TimeDelta::hours(2));
        assert_eq!(clock.now(), start + TimeDelta::hours(2));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 7, 9).unwrap());
    }

    #[test]
    fn test_day_window_is_half_open() {
        let day = NaiveDate::from_ymd_opt(2025, 7, 9).unwrap();
        let (start, end) = day_window(day);
        assert_eq!(start, "2025-07-09T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(end, "2025-07-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }
}
