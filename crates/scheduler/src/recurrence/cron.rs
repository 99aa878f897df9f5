//! Timezone-aware cron evaluator (5-field: min hour dom month dow).
//!
//! Expressions are compiled once into per-field bitmasks; the next match
//! is found field-wise (day, then hour, then minute) instead of scanning
//! minute by minute.

use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use cs_domain::Error;

/// Four years of days, so `0 0 29 2 *` always finds a leap day.
const MAX_SEARCH_DAYS: u32 = 366 * 4 + 1;

const FIELD_NAMES: [&str; 5] = ["minute", "hour", "day-of-month", "month", "day-of-week"];
const FIELD_RANGES: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 6)];

/// Parse a timezone string into a `chrono_tz::Tz`, falling back to UTC.
pub fn parse_tz(tz: &str) -> chrono_tz::Tz {
    tz.parse::<chrono_tz::Tz>().unwrap_or(chrono_tz::UTC)
}

/// A compiled 5-field cron expression. All fields must match (AND).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronExpr {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
}

impl CronExpr {
    /// Compile an expression, reporting the first malformed field.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            ));
        }
        let mut masks = [0u64; 5];
        for (i, field) in fields.iter().enumerate() {
            let (min, max) = FIELD_RANGES[i];
            masks[i] = parse_field(field, FIELD_NAMES[i], min, max)?;
        }
        Ok(Self {
            minutes: masks[0],
            hours: masks[1],
            days_of_month: masks[2],
            months: masks[3],
            days_of_week: masks[4],
        })
    }

    /// Check if a **local** naive datetime matches.
    pub fn matches(&self, dt: &NaiveDateTime) -> bool {
        self.date_matches(dt.date())
            && bit(self.hours, dt.hour())
            && bit(self.minutes, dt.minute())
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        bit(self.months, date.month())
            && bit(self.days_of_month, date.day())
            && bit(self.days_of_week, date.weekday().num_days_from_sunday())
    }

    /// Next occurrence strictly after `after`, evaluated in `tz`.
    ///
    /// **DST handling:**
    /// - Spring-forward gaps: local times that don't exist are skipped.
    /// - Fall-back overlaps: the earliest (pre-transition) mapping is chosen.
    pub fn next_after(&self, after: &DateTime<Utc>, tz: chrono_tz::Tz) -> Option<DateTime<Utc>> {
        // Convert `after` to local time and advance to the next whole minute.
        let local_after = after.with_timezone(&tz).naive_local();
        let next_min_secs = 60 - i64::from(local_after.second());
        let start = local_after
            .checked_add_signed(chrono::Duration::seconds(next_min_secs))?
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))?;

        let mut date = start.date();
        for _ in 0..MAX_SEARCH_DAYS {
            if self.date_matches(date) {
                let first_day = date == start.date();
                for hour in (0..24).filter(|h| bit(self.hours, *h)) {
                    if first_day && hour < start.hour() {
                        continue;
                    }
                    let min_from = if first_day && hour == start.hour() {
                        start.minute()
                    } else {
                        0
                    };
                    for minute in (min_from..60).filter(|m| bit(self.minutes, *m)) {
                        let naive = date.and_hms_opt(hour, minute, 0)?;
                        let resolved = match tz.from_local_datetime(&naive) {
                            chrono::LocalResult::Single(dt) => dt,
                            chrono::LocalResult::Ambiguous(earliest, _) => earliest,
                            // DST gap: this local minute doesn't exist.
                            chrono::LocalResult::None => continue,
                        };
                        let utc = resolved.with_timezone(&Utc);
                        if utc > *after {
                            return Some(utc);
                        }
                    }
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}

impl FromStr for CronExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).map_err(|msg| Error::Recurrence(format!("invalid cron '{s}': {msg}")))
    }
}

fn bit(mask: u64, value: u32) -> bool {
    value < 64 && mask & (1u64 << value) != 0
}

fn span(min: u32, max: u32, step: u32) -> u64 {
    (min..=max)
        .step_by(step as usize)
        .fold(0u64, |acc, v| acc | (1u64 << v))
}

/// Parse a single field (`*`, `*/n`, `a`, `a-b`, `a,b,c-d`) into a bitmask.
fn parse_field(field: &str, name: &str, min: u32, max: u32) -> Result<u64, String> {
    if field == "*" {
        return Ok(span(min, max, 1));
    }
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step
            .parse()
            .map_err(|_| format!("{}: invalid step '*/{}', expected a number", name, step))?;
        if n == 0 || n > max {
            return Err(format!("{}: step {} out of range 1..={}", name, n, max));
        }
        return Ok(span(min, max, n));
    }
    let mut mask = 0u64;
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            let start: u32 = start_s
                .parse()
                .map_err(|_| format!("{}: invalid range start '{}'", name, start_s))?;
            let end: u32 = end_s
                .parse()
                .map_err(|_| format!("{}: invalid range end '{}'", name, end_s))?;
            if start < min || start > max || end < min || end > max {
                return Err(format!(
                    "{}: range {}-{} out of bounds {}..={}",
                    name, start, end, min, max
                ));
            }
            if start > end {
                return Err(format!("{}: range start {} > end {}", name, start, end));
            }
            mask |= span(start, end, 1);
        } else {
            let n: u32 = part
                .parse()
                .map_err(|_| format!("{}: invalid value '{}'", name, part))?;
            if n < min || n > max {
                return Err(format!("{}: value {} out of range {}..={}", name, n, min, max));
            }
            mask |= 1u64 << n;
        }
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_domain::item::RecurrenceRule;

    fn cron(expr: &str) -> CronExpr {
        CronExpr::parse(expr).unwrap()
    }

    fn matches_utc(expr: &str, dt: DateTime<Utc>) -> bool {
        cron(expr).matches(&dt.naive_utc())
    }

    #[test]
    fn cron_every_5_minutes() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert!(matches_utc("*/5 * * * *", dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 10, 3, 0).unwrap();
        assert!(!matches_utc("*/5 * * * *", dt2));
    }

    #[test]
    fn cron_specific_time() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap();
        assert!(matches_utc("30 9 * * *", dt));
        assert!(!matches_utc("30 10 * * *", dt));
    }

    #[test]
    fn cron_range() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert!(matches_utc("0 9-17 * * *", dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 20, 0, 0).unwrap();
        assert!(!matches_utc("0 9-17 * * *", dt2));
    }

    #[test]
    fn cron_comma_separated() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 15, 0).unwrap();
        assert!(matches_utc("0,15,30,45 * * * *", dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 10, 20, 0).unwrap();
        assert!(!matches_utc("0,15,30,45 * * * *", dt2));
    }

    #[test]
    fn step_on_day_of_month_starts_at_one() {
        let odd = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let even = Utc.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap();
        assert!(matches_utc("0 0 */2 * *", odd));
        assert!(!matches_utc("0 0 */2 * *", even));
    }

    #[test]
    fn cron_next_finds_occurrence() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let next = cron("30 * * * *").next_after(&after, chrono_tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn cron_next_is_strictly_after() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap();
        let next = cron("30 * * * *").next_after(&after, chrono_tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 15, 11, 30, 0).unwrap());
    }

    #[test]
    fn cron_series_is_increasing() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let rule = RecurrenceRule::cron("0 * * * *");
        let results = super::super::occurrences(&rule, after, chrono_tz::UTC, 6).unwrap();
        assert_eq!(results.len(), 6);
        assert!(results.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn no_next_at_the_last_instant() {
        let after = DateTime::<Utc>::MAX_UTC - chrono::Duration::seconds(30);
        assert!(cron("* * * * *").next_after(&after, chrono_tz::UTC).is_none());
    }

    #[test]
    fn cron_next_skips_to_weekday() {
        // 2024-06-15 is a Saturday; "1" is Monday.
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let next = cron("0 9 * * 1").next_after(&after, chrono_tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 17, 9, 0, 0).unwrap());
    }

    #[test]
    fn cron_next_reaches_leap_day() {
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let next = cron("0 0 29 2 *").next_after(&after, chrono_tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2028, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn impossible_date_yields_none() {
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(cron("0 0 31 2 *").next_after(&after, chrono_tz::UTC).is_none());
    }

    // ── Timezone-aware cron tests ─────────────────────────────────────

    #[test]
    fn cron_next_tz_basic() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let tz = parse_tz("US/Eastern");
        let next = cron("0 9 * * *").next_after(&after, tz).unwrap();
        assert_eq!(next.hour(), 13); // 9 ET = 13 UTC (EDT is UTC-4)
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn cron_next_tz_spring_forward() {
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
        let tz = parse_tz("US/Eastern");
        let next = cron("30 2 * * *").next_after(&after, tz).unwrap();
        assert_eq!(next.day(), 11);
        assert_eq!(next.hour(), 6);
        assert_eq!(next.minute(), 30);
    }

    #[test]
    fn cron_next_tz_fall_back() {
        let after = Utc.with_ymd_and_hms(2024, 11, 3, 4, 0, 0).unwrap();
        let tz = parse_tz("US/Eastern");
        let next = cron("30 1 * * *").next_after(&after, tz).unwrap();
        assert_eq!(next.hour(), 5);
        assert_eq!(next.minute(), 30);
    }

    #[test]
    fn cron_series_in_tz_produces_correct_utc_times() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let tz = parse_tz("Asia/Tokyo");
        let rule = RecurrenceRule::cron("0 9 * * *");
        let results = super::super::occurrences(&rule, after, tz, 4).unwrap();
        assert_eq!(results.len(), 4);
        for r in &results[1..] {
            assert_eq!(r.hour(), 0); // 9 JST = 0 UTC
            assert_eq!(r.minute(), 0);
        }
    }

    #[test]
    fn parse_tz_invalid_returns_utc() {
        assert_eq!(parse_tz("Not/Real"), chrono_tz::UTC);
        assert_eq!(parse_tz(""), chrono_tz::UTC);
        assert_eq!(parse_tz("Europe/London"), chrono_tz::Europe::London);
    }

    #[test]
    fn from_str_wraps_message() {
        let err = "61 * * * *".parse::<CronExpr>().unwrap_err();
        assert!(err.to_string().contains("minute"));
    }
}
