//! Recurrence handler: maps a rule plus an anchor instant to the next
//! occurrence(s). Pure functions, no engine state.
//!
//! Calendar deltas are applied to the wall-clock reading in the item's own
//! timezone, so a daily 09:00 Berlin item stays at 09:00 across DST
//! changes. Local times that fall into a spring-forward gap are shifted
//! forward to the first valid minute; ambiguous fall-back times resolve to
//! the earliest mapping.

pub mod cron;
pub mod rrule;

pub use self::cron::{parse_tz, CronExpr};
pub use self::rrule::{from_rule_string, to_rule_string};

use chrono::{DateTime, Datelike, Days, Months, NaiveDateTime, TimeZone, Utc};
use cs_domain::item::{DayOfWeek, RecurrencePattern, RecurrenceRule, ScheduleItem};
use cs_domain::Result;

/// Longest DST gap we will shift across, in minutes.
const MAX_GAP_MINUTES: i64 = 180;

/// Next occurrence of `item` after its own occurrence time, or `None`
/// when the item does not repeat or the next instant lies past `ends`.
/// A retried item keeps stepping from the occurrence it was created for.
pub fn next_occurrence(item: &ScheduleItem) -> Result<Option<DateTime<Utc>>> {
    next_after(&item.recurrence, item.occurrence_time(), item.tz())
}

/// Up to `limit` occurrences starting with the item's own occurrence time.
pub fn future_occurrences(item: &ScheduleItem, limit: usize) -> Result<Vec<DateTime<Utc>>> {
    occurrences(&item.recurrence, item.occurrence_time(), item.tz(), limit)
}

/// Up to `limit` occurrences of `rule` starting at `anchor`, strictly
/// increasing and never past `rule.ends`.
pub fn occurrences(
    rule: &RecurrenceRule,
    anchor: DateTime<Utc>,
    tz: chrono_tz::Tz,
    limit: usize,
) -> Result<Vec<DateTime<Utc>>> {
    let mut out = Vec::with_capacity(limit.min(256));
    if limit == 0 || rule.ends.map_or(false, |end| anchor > end) {
        return Ok(out);
    }
    out.push(anchor);
    let mut cursor = anchor;
    while out.len() < limit {
        match next_after(rule, cursor, tz)? {
            Some(next) if next > cursor => {
                out.push(next);
                cursor = next;
            }
            _ => break,
        }
    }
    Ok(out)
}

/// One step of `rule` from `anchor`, evaluated in `tz`.
pub fn next_after(
    rule: &RecurrenceRule,
    anchor: DateTime<Utc>,
    tz: chrono_tz::Tz,
) -> Result<Option<DateTime<Utc>>> {
    let next = match rule.pattern {
        RecurrencePattern::None => return Ok(None),
        RecurrencePattern::Custom => match rule.cron.as_deref() {
            Some(expr) => expr.parse::<CronExpr>()?.next_after(&anchor, tz),
            None => step_weekdays(anchor, tz, &rule.normalized_days(), 1),
        },
        RecurrencePattern::Weekly if !rule.days.is_empty() => {
            step_weekdays(anchor, tz, &rule.normalized_days(), 1)
        }
        RecurrencePattern::Biweekly if !rule.days.is_empty() => {
            step_weekdays(anchor, tz, &rule.normalized_days(), 2)
        }
        RecurrencePattern::Daily => step_local(anchor, tz, |t| t.checked_add_days(Days::new(1))),
        RecurrencePattern::Weekly => step_local(anchor, tz, |t| t.checked_add_days(Days::new(7))),
        RecurrencePattern::Biweekly => {
            step_local(anchor, tz, |t| t.checked_add_days(Days::new(14)))
        }
        RecurrencePattern::Monthly => {
            step_local(anchor, tz, |t| t.checked_add_months(Months::new(1)))
        }
        RecurrencePattern::Quarterly => {
            step_local(anchor, tz, |t| t.checked_add_months(Months::new(3)))
        }
        RecurrencePattern::Yearly => {
            step_local(anchor, tz, |t| t.checked_add_months(Months::new(12)))
        }
    };

    Ok(next.filter(|at| rule.ends.map_or(true, |end| *at <= end)))
}

/// Apply a wall-clock delta in `tz` and map the result back to UTC.
fn step_local(
    anchor: DateTime<Utc>,
    tz: chrono_tz::Tz,
    delta: impl FnOnce(NaiveDateTime) -> Option<NaiveDateTime>,
) -> Option<DateTime<Utc>> {
    let local = anchor.with_timezone(&tz).naive_local();
    resolve_local(delta(local)?, tz)
}

/// Next matching weekday after the anchor's local date. Past the last
/// listed day of the week, wraps to the first listed day `interval`
/// weeks later. Weeks start on Monday.
fn step_weekdays(
    anchor: DateTime<Utc>,
    tz: chrono_tz::Tz,
    days: &[DayOfWeek],
    interval: u64,
) -> Option<DateTime<Utc>> {
    let local = anchor.with_timezone(&tz).naive_local();
    let today = local.weekday().num_days_from_monday();

    let first = days.first()?;
    let target = match days.iter().find(|d| d.days_from_monday() > today) {
        Some(later) => local.checked_add_days(Days::new(u64::from(later.days_from_monday() - today)))?,
        None => {
            let week_start = local.checked_sub_days(Days::new(u64::from(today)))?;
            week_start.checked_add_days(Days::new(7 * interval + u64::from(first.days_from_monday())))?
        }
    };
    resolve_local(target, tz)
}

/// Map a local wall-clock time to UTC: earliest on ambiguity, first valid
/// minute after a gap.
pub(crate) fn resolve_local(local: NaiveDateTime, tz: chrono_tz::Tz) -> Option<DateTime<Utc>> {
    for shift in 0..=MAX_GAP_MINUTES {
        let candidate = local.checked_add_signed(chrono::Duration::minutes(shift))?;
        match tz.from_local_datetime(&candidate) {
            chrono::LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
            chrono::LocalResult::Ambiguous(earliest, _) => {
                return Some(earliest.with_timezone(&Utc))
            }
            chrono::LocalResult::None => continue,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Weekday};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn none_pattern_has_no_next() {
        let rule = RecurrenceRule::none();
        assert_eq!(next_after(&rule, utc(2024, 6, 17, 9, 0), chrono_tz::UTC).unwrap(), None);
        let all = occurrences(&rule, utc(2024, 6, 17, 9, 0), chrono_tz::UTC, 5).unwrap();
        assert_eq!(all, vec![utc(2024, 6, 17, 9, 0)]);
    }

    #[test]
    fn fixed_deltas() {
        let anchor = utc(2024, 1, 15, 9, 0);
        let tz = chrono_tz::UTC;
        let step = |p| next_after(&RecurrenceRule::every(p), anchor, tz).unwrap().unwrap();
        assert_eq!(step(RecurrencePattern::Daily), utc(2024, 1, 16, 9, 0));
        assert_eq!(step(RecurrencePattern::Weekly), utc(2024, 1, 22, 9, 0));
        assert_eq!(step(RecurrencePattern::Biweekly), utc(2024, 1, 29, 9, 0));
        assert_eq!(step(RecurrencePattern::Monthly), utc(2024, 2, 15, 9, 0));
        assert_eq!(step(RecurrencePattern::Quarterly), utc(2024, 4, 15, 9, 0));
        assert_eq!(step(RecurrencePattern::Yearly), utc(2025, 1, 15, 9, 0));
    }

    #[test]
    fn monthly_clamps_to_month_end() {
        let rule = RecurrenceRule::every(RecurrencePattern::Monthly);
        let next = next_after(&rule, utc(2024, 1, 31, 9, 0), chrono_tz::UTC).unwrap();
        assert_eq!(next, Some(utc(2024, 2, 29, 9, 0)));
    }

    #[test]
    fn daily_keeps_local_wall_clock_across_dst() {
        // 09:00 Berlin is 07:00 UTC in summer, 08:00 UTC in winter.
        let tz = parse_tz("Europe/Berlin");
        let rule = RecurrenceRule::every(RecurrencePattern::Daily);
        let next = next_after(&rule, utc(2024, 10, 26, 7, 0), tz).unwrap().unwrap();
        assert_eq!(next, utc(2024, 10, 27, 8, 0));
    }

    #[test]
    fn daily_shifts_out_of_spring_gap() {
        // 02:30 does not exist on 2024-03-10 in New York.
        let tz = parse_tz("America/New_York");
        let rule = RecurrenceRule::every(RecurrencePattern::Daily);
        let anchor = utc(2024, 3, 9, 7, 30); // 02:30 EST
        let next = next_after(&rule, anchor, tz).unwrap().unwrap();
        let local = next.with_timezone(&tz);
        assert_eq!((local.day(), local.hour(), local.minute()), (10, 3, 0));
    }

    #[test]
    fn weekly_days_wrap_to_next_week() {
        // 2024-06-17 is a Monday.
        let rule = RecurrenceRule::on_days(
            RecurrencePattern::Weekly,
            [DayOfWeek::Wednesday, DayOfWeek::Monday],
        );
        let all = occurrences(&rule, utc(2024, 6, 17, 10, 0), chrono_tz::UTC, 3).unwrap();
        assert_eq!(
            all,
            vec![utc(2024, 6, 17, 10, 0), utc(2024, 6, 19, 10, 0), utc(2024, 6, 24, 10, 0)]
        );
        assert_eq!(all[2].weekday(), Weekday::Mon);
    }

    #[test]
    fn biweekly_days_skip_a_week() {
        let rule = RecurrenceRule::on_days(RecurrencePattern::Biweekly, [DayOfWeek::Friday]);
        let next = next_after(&rule, utc(2024, 6, 21, 10, 0), chrono_tz::UTC).unwrap();
        assert_eq!(next, Some(utc(2024, 7, 5, 10, 0)));
    }

    #[test]
    fn custom_days_from_unlisted_day() {
        // Anchor on Saturday; only Tuesday listed.
        let rule = RecurrenceRule::on_days(RecurrencePattern::Custom, [DayOfWeek::Tuesday]);
        let next = next_after(&rule, utc(2024, 6, 22, 8, 0), chrono_tz::UTC).unwrap();
        assert_eq!(next, Some(utc(2024, 6, 25, 8, 0)));
    }

    #[test]
    fn custom_cron_in_item_timezone() {
        let rule = RecurrenceRule::cron("0 9 * * 1-5");
        let tz = parse_tz("Asia/Tokyo");
        // Friday 10:00 JST → Monday 09:00 JST (00:00 UTC).
        let next = next_after(&rule, utc(2024, 6, 21, 1, 0), tz).unwrap();
        assert_eq!(next, Some(utc(2024, 6, 24, 0, 0)));
    }

    #[test]
    fn malformed_cron_is_an_error() {
        let rule = RecurrenceRule::cron("every day");
        assert!(next_after(&rule, utc(2024, 6, 21, 1, 0), chrono_tz::UTC).is_err());
    }

    #[test]
    fn occurrences_respect_end_and_limit() {
        let rule = RecurrenceRule::every(RecurrencePattern::Daily).until(utc(2024, 6, 20, 9, 0));
        let all = occurrences(&rule, utc(2024, 6, 17, 9, 0), chrono_tz::UTC, 10).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|t| *t <= utc(2024, 6, 20, 9, 0)));
        assert!(all.windows(2).all(|w| w[0] < w[1]));

        let capped = occurrences(&rule, utc(2024, 6, 17, 9, 0), chrono_tz::UTC, 2).unwrap();
        assert_eq!(capped.len(), 2);
        assert!(occurrences(&rule, utc(2024, 6, 17, 9, 0), chrono_tz::UTC, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn next_past_end_is_none() {
        let rule = RecurrenceRule::every(RecurrencePattern::Weekly).until(utc(2024, 6, 20, 0, 0));
        assert_eq!(next_after(&rule, utc(2024, 6, 17, 9, 0), chrono_tz::UTC).unwrap(), None);
    }
}
