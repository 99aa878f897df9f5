//! Item validation and conflict detection against the scheduling policy.
//!
//! Everything here is a pure function over caller-supplied snapshots; the
//! engine and optimizer both build on these primitives.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cs_domain::config::ScheduleConfig;
use cs_domain::conflict::{
    ConflictKind, ConflictSeverity, ScheduleConflict, ValidationIssue, ValidationReport,
};
use cs_domain::item::{saturating_add, ItemStatus, RecurrencePattern, ScheduleItem};

use crate::recurrence::CronExpr;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Field validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate an IANA timezone string.
pub fn validate_timezone(tz: &str) -> Result<(), String> {
    if tz.parse::<chrono_tz::Tz>().is_err() {
        Err(format!(
            "invalid timezone: '{}', use IANA names like 'America/New_York' or 'UTC'",
            tz
        ))
    } else {
        Ok(())
    }
}

/// Validate a 5-field cron expression. Returns `Ok(())` or an error message.
pub fn validate_cron(cron: &str) -> Result<(), String> {
    CronExpr::parse(cron).map(|_| ())
}

/// Structural validation of a single item. Errors make the item
/// unacceptable; warnings are surfaced but never block.
pub fn validate_item(item: &ScheduleItem, now: DateTime<Utc>) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if item.title.trim().is_empty() {
        errors.push(ValidationIssue::new("title", "title is required"));
    }
    if item.timezone.trim().is_empty() {
        errors.push(ValidationIssue::new("timezone", "timezone is required"));
    } else if let Err(msg) = validate_timezone(&item.timezone) {
        errors.push(ValidationIssue::new("timezone", msg));
    }
    if !(1..=10).contains(&item.priority) {
        errors.push(ValidationIssue::new(
            "priority",
            format!("priority {} out of range 1..=10", item.priority),
        ));
    }
    if item.estimated_duration_minutes == 0 {
        errors.push(ValidationIssue::new(
            "estimated_duration_minutes",
            "duration must be at least one minute",
        ));
    } else if item.checked_end().is_none() {
        errors.push(ValidationIssue::new(
            "scheduled_for",
            "item ends past the latest supported date",
        ));
    }
    if item.depends_on.contains(&item.id) {
        errors.push(ValidationIssue::new("depends_on", "item cannot depend on itself"));
    }

    validate_recurrence(item, &mut errors, &mut warnings);

    if item.scheduled_for < now {
        warnings.push(ValidationIssue::new(
            "scheduled_for",
            format!("scheduled time {} is in the past", item.scheduled_for),
        ));
    }
    if item.item_type.carries_content() && content_is_empty(&item.content) {
        warnings.push(ValidationIssue::new(
            "content",
            "content-bearing item has no content",
        ));
    }

    ValidationReport::from_issues(errors, warnings)
}

fn validate_recurrence(
    item: &ScheduleItem,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<ValidationIssue>,
) {
    let rule = &item.recurrence;

    if rule.pattern == RecurrencePattern::None {
        if !rule.days.is_empty() || rule.cron.is_some() || rule.ends.is_some() {
            errors.push(ValidationIssue::new(
                "recurrence",
                "days, cron and ends require a recurring pattern",
            ));
        }
        return;
    }

    if rule.pattern == RecurrencePattern::Custom && rule.days.is_empty() == rule.cron.is_none() {
        errors.push(ValidationIssue::new(
            "recurrence",
            "custom recurrence needs exactly one of days or cron",
        ));
    }
    if !rule.days.is_empty() && !rule.pattern.accepts_days() {
        errors.push(ValidationIssue::new(
            "recurrence.days",
            format!("days are not allowed with {:?} recurrence", rule.pattern),
        ));
    }
    if let Some(expr) = &rule.cron {
        if rule.pattern != RecurrencePattern::Custom {
            errors.push(ValidationIssue::new(
                "recurrence.cron",
                "cron is only allowed with custom recurrence",
            ));
        } else if let Err(msg) = validate_cron(expr) {
            errors.push(ValidationIssue::new("recurrence.cron", msg));
        }
    }
    match rule.ends {
        Some(ends) if ends <= item.scheduled_for => {
            errors.push(ValidationIssue::new(
                "recurrence.ends",
                "recurrence end must be after the first occurrence",
            ));
        }
        Some(_) => {}
        None => warnings.push(ValidationIssue::new(
            "recurrence.ends",
            "recurring item has no end",
        )),
    }
}

fn content_is_empty(content: &serde_json::Value) -> bool {
    match content {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conflict detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Items whose half-open interval intersects `[start, end)`. Items that
/// released their slot and ids in `exclude` are skipped.
pub fn check_time_slot_conflicts<'a, I>(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    items: I,
    exclude: &[Uuid],
) -> Vec<&'a ScheduleItem>
where
    I: IntoIterator<Item = &'a ScheduleItem>,
{
    items
        .into_iter()
        .filter(|other| !other.status.releases_slot() && !exclude.contains(&other.id))
        .filter(|other| other.overlaps(start, end))
        .collect()
}

/// Whether `[start, end)` lies inside the working window, evaluated in the
/// policy timezone.
pub fn within_working_hours(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: &ScheduleConfig,
) -> bool {
    let tz = config.tz();
    let local_start = start.with_timezone(&tz).naive_local();
    let local_end = end.with_timezone(&tz).naive_local();
    // An item ending exactly at midnight still belongs to its start day.
    let local_end = if local_end.date() > local_start.date()
        && local_end.time() == chrono::NaiveTime::MIN
        && end > start
    {
        local_end - chrono::Duration::nanoseconds(1)
    } else {
        local_end
    };
    config.working_hours.covers(local_start, local_end)
}

/// Peak number of simultaneously active intervals (sweep line). Ends are
/// processed before starts at the same instant.
pub fn max_concurrency<'a, I>(items: I) -> usize
where
    I: IntoIterator<Item = &'a ScheduleItem>,
{
    let mut edges: Vec<(DateTime<Utc>, i32)> = Vec::new();
    for item in items {
        edges.push((item.scheduled_for, 1));
        edges.push((item.ends_at(), -1));
    }
    sweep_peak(edges)
}

fn sweep_peak(mut edges: Vec<(DateTime<Utc>, i32)>) -> usize {
    edges.sort();
    let mut current = 0i32;
    let mut peak = 0i32;
    for (_, delta) in edges {
        current += delta;
        peak = peak.max(current);
    }
    peak.max(0) as usize
}

/// All conflicts `item` would have against `existing`. The item itself
/// and `exclude_id` are never compared against.
pub fn check_conflicts<'a, I>(
    item: &ScheduleItem,
    existing: I,
    exclude_id: Option<Uuid>,
    config: &ScheduleConfig,
) -> Vec<ScheduleConflict>
where
    I: IntoIterator<Item = &'a ScheduleItem>,
{
    let others: Vec<&ScheduleItem> = existing
        .into_iter()
        .filter(|o| o.id != item.id && Some(o.id) != exclude_id)
        .collect();
    let start = item.scheduled_for;
    let end = item.ends_at();
    let mut conflicts = Vec::new();

    // Overlap
    let overlapping = check_time_slot_conflicts(start, end, others.iter().copied(), &[]);
    for other in &overlapping {
        conflicts.push(ScheduleConflict::new(
            ConflictKind::TimeOverlap,
            ConflictSeverity::Error,
            vec![item.id, other.id],
            format!(
                "'{}' overlaps '{}' ({} to {})",
                item.title,
                other.title,
                other.scheduled_for,
                other.ends_at()
            ),
            format!("move to {} or later", saturating_add(other.ends_at(), config.buffer())),
        ));
    }

    // Dependencies
    for dep_id in &item.depends_on {
        match others.iter().find(|o| o.id == *dep_id) {
            None => conflicts.push(ScheduleConflict::new(
                ConflictKind::DependencyViolation,
                ConflictSeverity::Error,
                vec![item.id, *dep_id],
                format!("dependency {dep_id} does not exist"),
                "remove the dependency or create the item first",
            )),
            Some(dep) if dep.scheduled_for >= start => conflicts.push(ScheduleConflict::new(
                ConflictKind::DependencyViolation,
                ConflictSeverity::Error,
                vec![item.id, dep.id],
                format!(
                    "dependency '{}' is scheduled at {}, not before {}",
                    dep.title, dep.scheduled_for, start
                ),
                format!("schedule after {}", saturating_add(dep.ends_at(), config.buffer())),
            )),
            Some(dep) if matches!(dep.status, ItemStatus::Cancelled | ItemStatus::Failed) => {
                conflicts.push(ScheduleConflict::new(
                    ConflictKind::DependencyViolation,
                    ConflictSeverity::Warning,
                    vec![item.id, dep.id],
                    format!("dependency '{}' is {}", dep.title, dep.status),
                    "reschedule or drop the dependency",
                ))
            }
            Some(_) => {}
        }
    }

    // Capacity
    let edges = overlapping
        .iter()
        .flat_map(|o| [(o.scheduled_for.max(start), 1), (o.ends_at().min(end), -1)])
        .collect();
    let peak = sweep_peak(edges);
    if peak >= config.max_concurrent_items {
        let mut ids = vec![item.id];
        ids.extend(overlapping.iter().map(|o| o.id));
        conflicts.push(ScheduleConflict::new(
            ConflictKind::ResourceExhaustion,
            ConflictSeverity::Warning,
            ids,
            format!(
                "{} items already active in this window (limit {})",
                peak, config.max_concurrent_items
            ),
            "pick a less busy time slot",
        ));
    }

    // Working hours
    if !within_working_hours(start, end, config) {
        conflicts.push(ScheduleConflict::new(
            ConflictKind::TimezoneMismatch,
            ConflictSeverity::Warning,
            vec![item.id],
            format!(
                "'{}' falls outside working hours {}-{} ({})",
                item.title, config.working_hours.start, config.working_hours.end, config.timezone
            ),
            "move inside the working window",
        ));
    }

    if !conflicts.is_empty() {
        tracing::debug!(item_id = %item.id, count = conflicts.len(), "conflicts detected");
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cs_domain::item::{DayOfWeek, ItemSpec, ItemType, RecurrenceRule};

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        // June 2024: the 17th is a Monday.
        Utc.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap()
    }

    fn item(title: &str, start: DateTime<Utc>, minutes: u32) -> ScheduleItem {
        let spec = ItemSpec::new(title, ItemType::Task, start).with_duration(minutes);
        ScheduleItem::from_spec(spec, 3, at(1, 0, 0))
    }

    // ── Field validation ────────────────────────────────────────────

    #[test]
    fn validate_cron_accepts_valid() {
        assert!(validate_cron("0 * * * *").is_ok());
        assert!(validate_cron("*/5 9-17 * * 1-5").is_ok());
        assert!(validate_cron("30 9 1,15 * *").is_ok());
        assert!(validate_cron("0 0 * * 0").is_ok());
    }

    #[test]
    fn validate_cron_rejects_invalid() {
        assert!(validate_cron("* * *").is_err());
        assert!(validate_cron("* * * * * *").is_err());
        assert!(validate_cron("60 * * * *").is_err());
        assert!(validate_cron("* 24 * * *").is_err());
        assert!(validate_cron("* * 0 * *").is_err());
        assert!(validate_cron("* * * 13 *").is_err());
        assert!(validate_cron("* * * * 7").is_err());
        assert!(validate_cron("*/0 * * * *").is_err());
        assert!(validate_cron("abc * * * *").is_err());
    }

    #[test]
    fn validate_timezone_accepts_valid() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("America/New_York").is_ok());
        assert!(validate_timezone("Asia/Tokyo").is_ok());
    }

    #[test]
    fn validate_timezone_rejects_invalid() {
        assert!(validate_timezone("Not/Real").is_err());
        assert!(validate_timezone("").is_err());
        assert!(validate_timezone("GMT+5").is_err());
    }

    #[test]
    fn valid_item_passes() {
        let report = validate_item(&item("Plan", at(17, 10, 0), 60), at(17, 9, 0));
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn structural_errors_are_collected() {
        let mut bad = item("  ", at(17, 10, 0), 0);
        bad.priority = 11;
        bad.timezone = "Mars/Base".into();
        bad.depends_on.insert(bad.id);
        let report = validate_item(&bad, at(17, 9, 0));
        assert!(!report.valid);
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        for f in ["title", "timezone", "priority", "estimated_duration_minutes", "depends_on"] {
            assert!(fields.contains(&f), "missing {f}: {fields:?}");
        }
    }

    #[test]
    fn end_past_latest_date_is_rejected() {
        let near_max = DateTime::<Utc>::MAX_UTC - chrono::Duration::minutes(30);
        let report = validate_item(&item("far", near_max, 60), at(17, 9, 0));
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.field == "scheduled_for"));

        // Still fits.
        assert!(validate_item(&item("edge", near_max, 30), at(17, 9, 0)).valid);
    }

    #[test]
    fn recurrence_shape_rules() {
        let now = at(17, 9, 0);
        let mut it = item("Rec", at(17, 10, 0), 30);

        it.recurrence = RecurrenceRule {
            days: vec![DayOfWeek::Monday],
            ..RecurrenceRule::none()
        };
        assert!(!validate_item(&it, now).valid);

        it.recurrence = RecurrenceRule::on_days(RecurrencePattern::Daily, [DayOfWeek::Monday]);
        assert!(!validate_item(&it, now).valid);

        let mut both = RecurrenceRule::cron("0 9 * * *");
        both.days = vec![DayOfWeek::Monday];
        it.recurrence = both;
        assert!(!validate_item(&it, now).valid);

        it.recurrence = RecurrenceRule::every(RecurrencePattern::Custom);
        assert!(!validate_item(&it, now).valid);

        it.recurrence = RecurrenceRule::cron("0 25 * * *");
        assert!(!validate_item(&it, now).valid);

        it.recurrence = RecurrenceRule::every(RecurrencePattern::Daily).until(at(17, 10, 0));
        assert!(!validate_item(&it, now).valid);

        it.recurrence = RecurrenceRule::cron("0 9 * * 1");
        let report = validate_item(&it, now);
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.field == "recurrence.ends"));
    }

    #[test]
    fn soft_warnings() {
        let spec = ItemSpec::new("Post", ItemType::BlogPost, at(17, 8, 0));
        let post = ScheduleItem::from_spec(spec, 3, at(1, 0, 0));
        let report = validate_item(&post, at(17, 9, 0));
        assert!(report.valid);
        let fields: Vec<&str> = report.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["scheduled_for", "content"]);
    }

    // ── Conflicts ───────────────────────────────────────────────────

    #[test]
    fn overlap_is_an_error_and_adjacent_is_not() {
        let cfg = ScheduleConfig::default();
        let a = item("A", at(17, 10, 0), 60);
        let b = item("B", at(17, 10, 30), 60);
        let c = item("C", at(17, 11, 0), 60);

        let conflicts = check_conflicts(&b, [&a], None, &cfg);
        assert!(conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::TimeOverlap && c.is_blocking()));

        let conflicts = check_conflicts(&c, [&a], None, &cfg);
        assert!(conflicts.iter().all(|c| c.kind != ConflictKind::TimeOverlap));
    }

    #[test]
    fn released_slots_are_ignored() {
        let cfg = ScheduleConfig::default();
        let mut a = item("A", at(17, 10, 0), 60);
        a.status = ItemStatus::Cancelled;
        let b = item("B", at(17, 10, 0), 60);
        assert!(check_conflicts(&b, [&a], None, &cfg).is_empty());
    }

    #[test]
    fn exclude_id_skips_the_previous_version() {
        let cfg = ScheduleConfig::default();
        let a = item("A", at(17, 10, 0), 60);
        let mut moved = a.clone();
        moved.scheduled_for = at(17, 10, 30);
        assert!(check_conflicts(&moved, [&a], Some(a.id), &cfg).is_empty());
    }

    #[test]
    fn dependency_checks() {
        let cfg = ScheduleConfig::default();
        let dep = item("Dep", at(17, 12, 0), 30);
        let mut it = item("It", at(17, 10, 0), 30);
        it.depends_on.insert(dep.id);
        it.depends_on.insert(Uuid::new_v4());

        let conflicts = check_conflicts(&it, [&dep], None, &cfg);
        let deps: Vec<_> = conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::DependencyViolation)
            .collect();
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().all(|c| c.severity == ConflictSeverity::Error));
    }

    #[test]
    fn failed_dependency_is_a_warning() {
        let cfg = ScheduleConfig::default();
        let mut dep = item("Dep", at(17, 9, 0), 30);
        dep.status = ItemStatus::Failed;
        let mut it = item("It", at(17, 10, 0), 30);
        it.depends_on.insert(dep.id);
        let conflicts = check_conflicts(&it, [&dep], None, &cfg);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Warning);
    }

    #[test]
    fn capacity_warning_when_window_is_full() {
        let cfg = ScheduleConfig {
            max_concurrent_items: 2,
            ..ScheduleConfig::default()
        };
        let a = item("A", at(17, 10, 0), 60);
        let b = item("B", at(17, 10, 0), 60);
        let c = item("C", at(17, 10, 30), 60);
        let conflicts = check_conflicts(&c, [&a, &b], None, &cfg);
        let cap = conflicts
            .iter()
            .find(|c| c.kind == ConflictKind::ResourceExhaustion)
            .expect("capacity conflict");
        assert_eq!(cap.severity, ConflictSeverity::Warning);
        assert_eq!(cap.item_ids.len(), 3);
    }

    #[test]
    fn outside_working_hours_is_a_warning() {
        let cfg = ScheduleConfig::default();
        let late = item("Late", at(17, 18, 0), 30);
        let weekend = item("Sat", at(15, 10, 0), 30);
        for it in [late, weekend] {
            let conflicts = check_conflicts(&it, Vec::<&ScheduleItem>::new(), None, &cfg);
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].kind, ConflictKind::TimezoneMismatch);
            assert!(!conflicts[0].is_blocking());
        }
    }

    #[test]
    fn working_hours_use_policy_timezone() {
        let cfg = ScheduleConfig {
            timezone: "America/New_York".into(),
            ..ScheduleConfig::default()
        };
        // 14:00 UTC is 10:00 EDT.
        assert!(within_working_hours(at(17, 14, 0), at(17, 15, 0), &cfg));
        // 10:00 UTC is 06:00 EDT.
        assert!(!within_working_hours(at(17, 10, 0), at(17, 11, 0), &cfg));
    }

    #[test]
    fn sweep_line_peak() {
        let items = [
            item("A", at(17, 10, 0), 60),
            item("B", at(17, 10, 30), 60),
            item("C", at(17, 11, 0), 60),
        ];
        assert_eq!(max_concurrency(&items), 2);
        assert_eq!(max_concurrency(&items[..1]), 1);
        assert_eq!(max_concurrency(Vec::<ScheduleItem>::new().iter()), 0);
    }
}
