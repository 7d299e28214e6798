//! 商户本地日历窗口
//!
//! 频次挑战和每日积分统计都按自然日/周/月对齐，而不是滚动 24h/7d/30d

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::FrequencyPeriod;

/// 半开区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarWindow {
    /// 包含 `at` 的日历窗口
    pub fn containing(period: FrequencyPeriod, at: DateTime<Utc>, tz: Tz) -> Self {
        let date = at.with_timezone(&tz).date_naive();
        let (first, next) = match period {
            FrequencyPeriod::Daily => (date, date + Duration::days(1)),
            FrequencyPeriod::Weekly => {
                let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                (monday, monday + Duration::days(7))
            }
            FrequencyPeriod::Monthly => {
                let first = date.with_day(1).unwrap_or(date);
                let next = first
                    .checked_add_months(Months::new(1))
                    .unwrap_or(first + Duration::days(31));
                (first, next)
            }
        };

        Self {
            start: local_midnight(first, tz),
            end: local_midnight(next, tz),
        }
    }

    /// 包含 `at` 的商户本地自然日
    pub fn day_of(at: DateTime<Utc>, tz: Tz) -> Self {
        Self::containing(FrequencyPeriod::Daily, at, tz)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// 本地日期零点对应的 UTC 时刻
///
/// 零点落在夏令时跳变空隙时顺延一小时
fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Mexico_City;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_daily_window_uses_local_calendar() {
        // 墨西哥城 UTC-6：UTC 03:00 仍是本地前一天 21:00
        let window = CalendarWindow::day_of(utc("2026-03-11T03:00:00Z"), Mexico_City);
        assert_eq!(window.start, utc("2026-03-10T06:00:00Z"));
        assert_eq!(window.end, utc("2026-03-11T06:00:00Z"));
        assert!(window.contains(utc("2026-03-11T05:59:59Z")));
        assert!(!window.contains(utc("2026-03-11T06:00:00Z")));
    }

    #[test]
    fn test_weekly_window_starts_monday() {
        // 2026-10-15 是周四
        let window =
            CalendarWindow::containing(FrequencyPeriod::Weekly, utc("2026-10-15T12:00:00Z"), Tz::UTC);
        assert_eq!(window.start, utc("2026-10-12T00:00:00Z"));
        assert_eq!(window.end, utc("2026-10-19T00:00:00Z"));
    }

    #[test]
    fn test_weekly_window_on_sunday_belongs_to_previous_monday() {
        let window =
            CalendarWindow::containing(FrequencyPeriod::Weekly, utc("2026-10-18T23:59:59Z"), Tz::UTC);
        assert_eq!(window.start, utc("2026-10-12T00:00:00Z"));
    }

    #[test]
    fn test_monthly_window_handles_year_end() {
        let window =
            CalendarWindow::containing(FrequencyPeriod::Monthly, utc("2026-12-31T10:00:00Z"), Tz::UTC);
        assert_eq!(window.start, utc("2026-12-01T00:00:00Z"));
        assert_eq!(window.end, utc("2027-01-01T00:00:00Z"));
    }

    #[test]
    fn test_monthly_window_february() {
        let window =
            CalendarWindow::containing(FrequencyPeriod::Monthly, utc("2028-02-29T10:00:00Z"), Tz::UTC);
        assert_eq!(window.start, utc("2028-02-01T00:00:00Z"));
        assert_eq!(window.end, utc("2028-03-01T00:00:00Z"));
    }
}
