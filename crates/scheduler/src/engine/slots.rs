//! Free time-slot discovery.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use cs_domain::config::{RunnerConfig, ScheduleConfig};
use cs_domain::item::{ScheduleItem, TimeBucket};

use crate::validation::{check_time_slot_conflicts, within_working_hours};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotPreferences {
    /// Keep only slots starting in this time-of-day bucket.
    #[serde(default)]
    pub bucket: Option<TimeBucket>,
    /// Timezone the bucket is evaluated in; the policy timezone if unset.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "d_true")]
    pub working_hours_only: bool,
}

impl Default for SlotPreferences {
    fn default() -> Self {
        Self {
            bucket: None,
            timezone: None,
            working_hours_only: true,
        }
    }
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Sweep `[start, end)` in `slot_increment_minutes` steps and keep the
/// slots of length `duration` that are free, inside working hours and in
/// the preferred bucket. Chronological, capped at `max_slot_results`.
pub fn find_slots<'a>(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration: Duration,
    prefs: &SlotPreferences,
    items: impl IntoIterator<Item = &'a ScheduleItem>,
    schedule: &ScheduleConfig,
    runner: &RunnerConfig,
) -> Vec<TimeSlot> {
    let step = Duration::minutes(i64::from(runner.slot_increment_minutes.max(1)));
    let items: Vec<&ScheduleItem> = items.into_iter().collect();
    let tz = prefs
        .timezone
        .as_deref()
        .and_then(|t| t.parse::<chrono_tz::Tz>().ok())
        .unwrap_or_else(|| schedule.tz());

    let mut slots = Vec::new();
    if duration <= Duration::zero() {
        return slots;
    }

    let mut cursor = start;
    while slots.len() < runner.max_slot_results {
        let Some(slot_end) = cursor.checked_add_signed(duration).filter(|e| *e <= end) else {
            break;
        };
        let in_bucket = prefs.bucket.map_or(true, |b| {
            b.contains_hour(cursor.with_timezone(&tz).hour())
        });
        let in_hours = !prefs.working_hours_only || within_working_hours(cursor, slot_end, schedule);
        if in_bucket
            && in_hours
            && check_time_slot_conflicts(cursor, slot_end, items.iter().copied(), &[]).is_empty()
        {
            slots.push(TimeSlot {
                start: cursor,
                end: slot_end,
            });
        }
        cursor = match cursor.checked_add_signed(step) {
            Some(next) => next,
            None => break,
        };
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cs_domain::item::{ItemSpec, ItemType};

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap()
    }

    fn busy(start: DateTime<Utc>, minutes: u32) -> ScheduleItem {
        let spec = ItemSpec::new("busy", ItemType::Meeting, start).with_duration(minutes);
        ScheduleItem::from_spec(spec, 3, start)
    }

    #[test]
    fn skips_busy_and_off_hours() {
        let items = [busy(at(17, 10, 0), 60)];
        let slots = find_slots(
            at(17, 8, 0),
            at(17, 12, 0),
            Duration::minutes(60),
            &SlotPreferences::default(),
            &items,
            &ScheduleConfig::default(),
            &RunnerConfig::default(),
        );
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(17, 9, 0), at(17, 11, 0)]);
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn bucket_preference_filters() {
        let prefs = SlotPreferences {
            bucket: Some(TimeBucket::Afternoon),
            ..SlotPreferences::default()
        };
        let slots = find_slots(
            at(17, 9, 0),
            at(17, 17, 0),
            Duration::minutes(30),
            &prefs,
            Vec::<&ScheduleItem>::new(),
            &ScheduleConfig::default(),
            &RunnerConfig::default(),
        );
        assert!(!slots.is_empty());
        assert!(slots.iter().all(|s| (12..18).contains(&s.start.hour())));
    }

    #[test]
    fn result_cap_applies() {
        let runner = RunnerConfig {
            max_slot_results: 3,
            ..RunnerConfig::default()
        };
        let prefs = SlotPreferences {
            working_hours_only: false,
            ..SlotPreferences::default()
        };
        let slots = find_slots(
            at(15, 0, 0),
            at(16, 0, 0),
            Duration::minutes(30),
            &prefs,
            Vec::<&ScheduleItem>::new(),
            &ScheduleConfig::default(),
            &runner,
        );
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn weekend_has_no_working_slots() {
        let slots = find_slots(
            at(15, 0, 0),
            at(17, 0, 0),
            Duration::minutes(30),
            &SlotPreferences::default(),
            Vec::<&ScheduleItem>::new(),
            &ScheduleConfig::default(),
            &RunnerConfig::default(),
        );
        assert!(slots.is_empty());
    }
}
