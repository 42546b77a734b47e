//! Wall clock abstraction. Every "now" in the gate flows through here.
//!
//! Production callers use SystemClock. Tests pin time with FixedClock so
//! expiry, rolling windows and time-of-day rules are reproducible.

use crate::types::Timestamp;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ts(&self) -> Timestamp {
        self.now().timestamp()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    secs: AtomicI64,
}

impl FixedClock {
    pub fn at(ts: Timestamp) -> Self {
        Self { secs: AtomicI64::new(ts) }
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::at(dt.timestamp())
    }

    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, ts: Timestamp) {
        self.secs.store(ts, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.load(Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }
}

/// Start of the UTC day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> Timestamp {
    now.with_hour(0)
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .map(|d| d.timestamp())
        .unwrap_or_else(|| now.timestamp())
}

/// Start of the UTC month containing `now`.
pub fn start_of_month(now: DateTime<Utc>) -> Timestamp {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .map(|d| d.timestamp())
        .unwrap_or_else(|| start_of_day(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_and_month_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 13, 45, 10).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap().timestamp()
        );
        assert_eq!(
            start_of_month(now),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap().timestamp()
        );
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::at(1_000);
        clock.advance(300);
        assert_eq!(clock.now_ts(), 1_300);
    }
}
