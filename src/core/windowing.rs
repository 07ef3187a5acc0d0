//! Time bucketing for aggregation.
//!
//! Records are bucketed by the minute they fall in. The rolling window is
//! anchored to the latest minute that holds any record, not to wall-clock now,
//! so a dashboard opened after a quiet period still shows the last activity.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Truncate a timestamp to the start of its minute.
pub fn minute_of(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// The N whole minutes ending at and including `last_minute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingWindow {
    /// First minute bucket in the window
    #[serde(with = "crate::core::record::timestamp_serde")]
    pub first_minute: NaiveDateTime,
    /// Last minute bucket in the window (the latest minute with data)
    #[serde(with = "crate::core::record::timestamp_serde")]
    pub last_minute: NaiveDateTime,
}

impl RollingWindow {
    /// Window of `minutes` buckets anchored at the minute containing `latest`.
    ///
    /// A length of zero is treated as one minute.
    pub fn ending_at(latest: NaiveDateTime, minutes: u32) -> Self {
        let last_minute = minute_of(latest);
        let span = i64::from(minutes.max(1)) - 1;
        Self {
            first_minute: last_minute - Duration::minutes(span),
            last_minute,
        }
    }

    /// Whether a raw timestamp's minute bucket falls inside the window.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        let minute = minute_of(ts);
        minute >= self.first_minute && minute <= self.last_minute
    }

    /// Latest raw timestamp that still belongs to the window.
    pub fn last_instant(&self) -> NaiveDateTime {
        self.last_minute + Duration::seconds(59)
    }

    pub fn len_minutes(&self) -> i64 {
        (self.last_minute - self.first_minute).num_minutes() + 1
    }
}

/// Inclusive time-of-day range, applied to every calendar day alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BusinessHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        let time = ts.time();
        time >= self.start && time <= self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_minute_truncation() {
        assert_eq!(minute_of(at(9, 7, 59)), at(9, 7, 0));
        assert_eq!(minute_of(at(9, 7, 0)), at(9, 7, 0));
    }

    #[test]
    fn test_rolling_window_bounds() {
        let window = RollingWindow::ending_at(at(9, 9, 42), 10);
        assert_eq!(window.first_minute, at(9, 0, 0));
        assert_eq!(window.last_minute, at(9, 9, 0));
        assert_eq!(window.last_instant(), at(9, 9, 59));
        assert_eq!(window.len_minutes(), 10);

        assert!(window.contains(at(9, 0, 0)));
        assert!(window.contains(at(9, 9, 59)));
        assert!(!window.contains(at(8, 59, 59)));
        assert!(!window.contains(at(9, 10, 0)));
    }

    #[test]
    fn test_rolling_window_crosses_midnight() {
        let latest = NaiveDate::from_ymd_opt(2024, 5, 7)
            .unwrap()
            .and_hms_opt(0, 3, 10)
            .unwrap();
        let window = RollingWindow::ending_at(latest, 10);
        assert_eq!(window.first_minute, at(23, 54, 0));
        assert!(window.contains(at(23, 58, 30)));
    }

    #[test]
    fn test_zero_length_window_is_one_minute() {
        let window = RollingWindow::ending_at(at(10, 0, 5), 0);
        assert_eq!(window.first_minute, window.last_minute);
        assert_eq!(window.len_minutes(), 1);
    }

    #[test]
    fn test_business_hours_inclusive() {
        let hours = BusinessHours::default();
        assert!(!hours.contains(at(8, 59, 59)));
        assert!(hours.contains(at(9, 0, 0)));
        assert!(hours.contains(at(12, 30, 0)));
        assert!(hours.contains(at(17, 0, 0)));
        assert!(!hours.contains(at(17, 0, 1)));
        assert!(hours.is_valid());
    }
}
