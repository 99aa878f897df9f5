use chrono::{Datelike, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::item::DayOfWeek;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduling policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide scheduling policy. Read by every component, mutated by
/// none (hot updates replace it wholesale).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// IANA timezone in which working hours are evaluated.
    #[serde(default = "d_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub working_hours: WorkingHours,
    /// Minimum gap enforced between consecutive items.
    #[serde(default = "d_buffer_minutes")]
    pub buffer_minutes: u32,
    /// Capacity ceiling for simultaneous items; also sizes the worker pool.
    #[serde(default = "d_max_concurrent_items")]
    pub max_concurrent_items: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub optimization: OptimizationToggles,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: d_timezone(),
            working_hours: WorkingHours::default(),
            buffer_minutes: d_buffer_minutes(),
            max_concurrent_items: d_max_concurrent_items(),
            retry: RetryPolicy::default(),
            optimization: OptimizationToggles::default(),
        }
    }
}

impl ScheduleConfig {
    /// Parsed policy timezone, falling back to UTC.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    pub fn buffer(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.buffer_minutes))
    }
}

fn d_timezone() -> String {
    "UTC".into()
}

fn d_buffer_minutes() -> u32 {
    15
}

fn d_max_concurrent_items() -> usize {
    3
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Working hours
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Daily window and active weekdays during which items may be scheduled
/// without a warning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingHours {
    #[serde(default = "d_start")]
    pub start: NaiveTime,
    #[serde(default = "d_end")]
    pub end: NaiveTime,
    #[serde(default = "d_days")]
    pub days: Vec<DayOfWeek>,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: d_start(),
            end: d_end(),
            days: d_days(),
        }
    }
}

impl WorkingHours {
    /// Whether a local wall-clock interval falls entirely inside the window
    /// on an active weekday. Intervals crossing midnight never do.
    pub fn covers(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        let day = DayOfWeek::from(start.weekday());
        if !self.days.contains(&day) {
            return false;
        }
        if end.date() != start.date() {
            return false;
        }
        start.time() >= self.start && end.time() <= self.end
    }
}

fn d_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

fn d_end() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default()
}

fn d_days() -> Vec<DayOfWeek> {
    DayOfWeek::WEEKDAYS.to_vec()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_RETRY_DELAY_MINUTES: f64 = 24.0 * 60.0; // 24 hours

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Default `max_retries` for items created without one.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_base_delay_minutes")]
    pub base_delay_minutes: u32,
    #[serde(default = "d_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: d_max_retries(),
            base_delay_minutes: d_base_delay_minutes(),
            backoff_multiplier: d_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Back-off before attempt `retry_count + 1`:
    /// `base × multiplier^(retry_count − 1)`, capped at 24h.
    pub fn delay_for(&self, retry_count: u32) -> chrono::Duration {
        if retry_count == 0 {
            return chrono::Duration::zero();
        }
        let exp = (retry_count - 1).min(32) as i32; // prevent overflow
        let minutes = f64::from(self.base_delay_minutes) * self.backoff_multiplier.powi(exp);
        let minutes = minutes.clamp(0.0, MAX_RETRY_DELAY_MINUTES);
        chrono::Duration::seconds((minutes * 60.0).round() as i64)
    }
}

fn d_max_retries() -> u32 {
    3
}

fn d_base_delay_minutes() -> u32 {
    5
}

fn d_backoff_multiplier() -> f64 {
    2.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Optimization toggles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptimizationToggles {
    #[serde(default = "d_true")]
    pub prefer_optimal_times: bool,
    #[serde(default = "d_true")]
    pub avoid_conflicts: bool,
    #[serde(default = "d_true")]
    pub group_similar: bool,
    #[serde(default = "d_true")]
    pub respect_dependencies: bool,
}

impl Default for OptimizationToggles {
    fn default() -> Self {
        Self {
            prefer_optimal_times: true,
            avoid_conflicts: true,
            group_similar: true,
            respect_dependencies: true,
        }
    }
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        // June 2024: the 17th is a Monday.
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = ScheduleConfig::default();
        assert_eq!(cfg.timezone, "UTC");
        assert_eq!(cfg.buffer_minutes, 15);
        assert_eq!(cfg.max_concurrent_items, 3);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.working_hours.days.len(), 5);
        assert!(cfg.optimization.respect_dependencies);
    }

    #[test]
    fn working_hours_cover_weekday_window() {
        let wh = WorkingHours::default();
        assert!(wh.covers(at(17, 9, 0), at(17, 10, 0)));
        assert!(wh.covers(at(17, 16, 0), at(17, 17, 0)));
        assert!(!wh.covers(at(17, 8, 30), at(17, 9, 30)));
        assert!(!wh.covers(at(17, 16, 30), at(17, 17, 30)));
        // Saturday
        assert!(!wh.covers(at(15, 10, 0), at(15, 11, 0)));
    }

    #[test]
    fn working_hours_reject_midnight_crossing() {
        let wh = WorkingHours {
            start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            days: d_days(),
        };
        assert!(!wh.covers(at(17, 23, 30), at(18, 0, 30)));
    }

    #[test]
    fn retry_delay_is_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), chrono::Duration::zero());
        assert_eq!(policy.delay_for(1), chrono::Duration::minutes(5));
        assert_eq!(policy.delay_for(2), chrono::Duration::minutes(10));
        assert_eq!(policy.delay_for(3), chrono::Duration::minutes(20));
    }

    #[test]
    fn retry_delay_capped_at_24h() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(30), chrono::Duration::hours(24));
    }

    #[test]
    fn deserialize_partial_uses_defaults() {
        let toml_str = r#"
            buffer_minutes = 30
            [working_hours]
            start = "08:00:00"
        "#;
        let cfg: ScheduleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.buffer_minutes, 30);
        assert_eq!(cfg.working_hours.start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(cfg.working_hours.end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(cfg.max_concurrent_items, 3);
    }
}
