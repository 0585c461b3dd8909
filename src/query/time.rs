//! Time range constraints and granularity arithmetic

use std::fmt;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};

use super::error::QueryError;
use crate::semantic_model::{MetricTimeWindow, TimeGranularity};

/// Inclusive `[start, end]` range applied to `metric_time`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRangeConstraint {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day).map(midnight).unwrap_or_default()
}

impl TimeRangeConstraint {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::InvalidTimeRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(TimeRangeConstraint { start, end })
    }

    /// Range used when a query leaves one or both ends open
    pub fn all_time() -> Self {
        TimeRangeConstraint {
            start: ymd(2000, 1, 1),
            end: ymd(2040, 12, 31),
        }
    }

    /// Widen both ends to whole periods of `granularity`
    pub fn adjust_to_granularity(&self, granularity: TimeGranularity) -> Result<Self, QueryError> {
        Ok(TimeRangeConstraint {
            start: truncate(self.start, granularity)?,
            end: period_end(self.end, granularity)?,
        })
    }

    /// Move the start back so a trailing window ending at `start` is fully covered
    pub fn widen_for_window(&self, window: MetricTimeWindow) -> Result<Self, QueryError> {
        Ok(TimeRangeConstraint {
            start: subtract_periods(self.start, window.count, window.granularity)?,
            end: self.end,
        })
    }

    /// Move the start back to the beginning of its `granularity` period
    pub fn widen_for_grain_to_date(&self, granularity: TimeGranularity) -> Result<Self, QueryError> {
        Ok(TimeRangeConstraint {
            start: truncate(self.start, granularity)?,
            end: self.end,
        })
    }
}

impl fmt::Display for TimeRangeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", format_time(self.start), format_time(self.end))
    }
}

/// Format as `YYYY-MM-DD`, or `YYYY-MM-DDTHH:MM:SS` when the time is not midnight
pub fn format_time(t: NaiveDateTime) -> String {
    if t == midnight(t.date()) {
        t.format("%Y-%m-%d").to_string()
    } else {
        t.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Parse an ISO date or datetime
pub fn parse_time(value: &str) -> Result<NaiveDateTime, QueryError> {
    let value = value.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(t);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(midnight)
        .map_err(|_| QueryError::InvalidTimeConstraint { value: value.to_string() })
}

fn out_of_range(t: NaiveDateTime, operation: String) -> QueryError {
    QueryError::TimeOutOfRange {
        value: format_time(t),
        operation,
    }
}

fn shift_days(t: NaiveDateTime, days: i64) -> Option<NaiveDateTime> {
    t.checked_add_signed(Duration::try_days(days)?)
}

/// Start of the `granularity` period containing `t`. Weeks start on Monday.
pub fn truncate(t: NaiveDateTime, granularity: TimeGranularity) -> Result<NaiveDateTime, QueryError> {
    let date = t.date();
    let truncated = match granularity {
        TimeGranularity::Day => Some(midnight(date)),
        TimeGranularity::Week => shift_days(midnight(date), -i64::from(date.weekday().num_days_from_monday())),
        TimeGranularity::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1).map(midnight),
        TimeGranularity::Quarter => NaiveDate::from_ymd_opt(date.year(), (date.month0() / 3) * 3 + 1, 1).map(midnight),
        TimeGranularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).map(midnight),
    };
    truncated.ok_or_else(|| out_of_range(t, format!("truncating to {}", granularity.as_str())))
}

/// Last day of the `granularity` period containing `t`
pub fn period_end(t: NaiveDateTime, granularity: TimeGranularity) -> Result<NaiveDateTime, QueryError> {
    let start = truncate(t, granularity)?;
    let next = match granularity {
        TimeGranularity::Day => shift_days(start, 1),
        TimeGranularity::Week => shift_days(start, 7),
        TimeGranularity::Month => start.checked_add_months(Months::new(1)),
        TimeGranularity::Quarter => start.checked_add_months(Months::new(3)),
        TimeGranularity::Year => start.checked_add_months(Months::new(12)),
    };
    next.and_then(|next| shift_days(next, -1))
        .ok_or_else(|| out_of_range(t, format!("extending to the end of its {}", granularity.as_str())))
}

/// `t` moved back by `count` periods
pub fn subtract_periods(
    t: NaiveDateTime,
    count: u32,
    granularity: TimeGranularity,
) -> Result<NaiveDateTime, QueryError> {
    let shifted = match granularity {
        TimeGranularity::Day => shift_days(t, -i64::from(count)),
        TimeGranularity::Week => shift_days(t, -7 * i64::from(count)),
        TimeGranularity::Month => t.checked_sub_months(Months::new(count)),
        TimeGranularity::Quarter => count.checked_mul(3).and_then(|months| t.checked_sub_months(Months::new(months))),
        TimeGranularity::Year => count.checked_mul(12).and_then(|months| t.checked_sub_months(Months::new(months))),
    };
    shifted.ok_or_else(|| out_of_range(t, format!("subtracting {} {}", count, granularity.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveDateTime {
        parse_time(s).unwrap()
    }

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(format_time(t("2020-01-15")), "2020-01-15");
        assert_eq!(format_time(t("2020-01-15T10:30:00")), "2020-01-15T10:30:00");
        assert!(parse_time("15/01/2020").is_err());
    }

    #[test]
    fn test_truncate() {
        // 2020-01-15 is a Wednesday
        assert_eq!(truncate(t("2020-01-15"), TimeGranularity::Week), Ok(t("2020-01-13")));
        assert_eq!(truncate(t("2020-01-15"), TimeGranularity::Month), Ok(t("2020-01-01")));
        assert_eq!(truncate(t("2020-05-15"), TimeGranularity::Quarter), Ok(t("2020-04-01")));
        assert_eq!(truncate(t("2020-05-15T12:00:00"), TimeGranularity::Day), Ok(t("2020-05-15")));
    }

    #[test]
    fn test_adjust_to_granularity() {
        let range = TimeRangeConstraint::new(t("2020-01-15"), t("2020-02-10")).unwrap();
        let adjusted = range.adjust_to_granularity(TimeGranularity::Month).unwrap();
        assert_eq!(adjusted.start, t("2020-01-01"));
        assert_eq!(adjusted.end, t("2020-02-29"));
        assert_eq!(adjusted.to_string(), "[2020-01-01, 2020-02-29]");
    }

    #[test]
    fn test_widen() {
        let range = TimeRangeConstraint::new(t("2020-03-10"), t("2020-03-20")).unwrap();
        let window = MetricTimeWindow { count: 7, granularity: TimeGranularity::Day };
        assert_eq!(range.widen_for_window(window).unwrap().start, t("2020-03-03"));
        assert_eq!(range.widen_for_grain_to_date(TimeGranularity::Month).unwrap().start, t("2020-03-01"));
    }

    #[test]
    fn test_arithmetic_at_calendar_edges_is_an_error() {
        let first = midnight(NaiveDate::MIN);
        let last = midnight(NaiveDate::MAX);

        let window = MetricTimeWindow { count: 2, granularity: TimeGranularity::Day };
        let range = TimeRangeConstraint::new(first, first).unwrap();
        let err = range.widen_for_window(window).unwrap_err();
        assert!(matches!(err, QueryError::TimeOutOfRange { .. }));
        assert!(subtract_periods(first, 1, TimeGranularity::Month).is_err());
        assert!(subtract_periods(t("2020-01-01"), u32::MAX, TimeGranularity::Year).is_err());
        assert!(period_end(last, TimeGranularity::Year).is_err());
        assert!(TimeRangeConstraint::new(last, last)
            .unwrap()
            .adjust_to_granularity(TimeGranularity::Week)
            .is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = TimeRangeConstraint::new(t("2020-02-01"), t("2020-01-01")).unwrap_err();
        assert!(matches!(err, QueryError::InvalidTimeRange { .. }));
    }
}
