//! RFC 5545-style `RRULE` rendering of [`RecurrenceRule`].
//!
//! Only FREQ / INTERVAL / BYDAY / UNTIL are understood. Custom rules with
//! a cron expression pass the raw expression through; custom weekday
//! rules render as `FREQ=WEEKLY;BYDAY=…` and read back as weekly.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use cs_domain::item::{DayOfWeek, RecurrencePattern, RecurrenceRule};
use cs_domain::{Error, Result};

use super::cron::CronExpr;

const UNTIL_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Render `rule`, or `None` for non-recurring rules.
pub fn to_rule_string(rule: &RecurrenceRule) -> Option<String> {
    let (freq, interval) = match rule.pattern {
        RecurrencePattern::None => return None,
        RecurrencePattern::Custom => {
            if let Some(expr) = &rule.cron {
                return Some(expr.clone());
            }
            ("WEEKLY", 1)
        }
        RecurrencePattern::Daily => ("DAILY", 1),
        RecurrencePattern::Weekly => ("WEEKLY", 1),
        RecurrencePattern::Biweekly => ("WEEKLY", 2),
        RecurrencePattern::Monthly => ("MONTHLY", 1),
        RecurrencePattern::Quarterly => ("MONTHLY", 3),
        RecurrencePattern::Yearly => ("YEARLY", 1),
    };

    let mut parts = vec![format!("FREQ={freq}")];
    if interval > 1 {
        parts.push(format!("INTERVAL={interval}"));
    }
    let days = rule.normalized_days();
    if !days.is_empty() {
        let codes: Vec<&str> = days.iter().map(|d| d.ical_code()).collect();
        parts.push(format!("BYDAY={}", codes.join(",")));
    }
    if let Some(ends) = rule.ends {
        parts.push(format!("UNTIL={}", ends.format(UNTIL_FORMAT)));
    }
    Some(parts.join(";"))
}

/// Parse an `RRULE` string (optionally prefixed with `RRULE:`) or a bare
/// 5-field cron expression.
pub fn from_rule_string(input: &str) -> Result<RecurrenceRule> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix("RRULE:").unwrap_or(trimmed);

    if !body.contains('=') {
        body.parse::<CronExpr>()?;
        return Ok(RecurrenceRule::cron(body));
    }

    let mut freq = None;
    let mut interval = 1u32;
    let mut days = Vec::new();
    let mut ends = None;

    for part in body.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| rule_error(format!("malformed part '{part}'")))?;
        match key.trim().to_ascii_uppercase().as_str() {
            "FREQ" => freq = Some(value.trim().to_ascii_uppercase()),
            "INTERVAL" => {
                interval = value
                    .trim()
                    .parse()
                    .map_err(|_| rule_error(format!("invalid INTERVAL '{value}'")))?;
            }
            "BYDAY" => {
                for code in value.split(',') {
                    let day = DayOfWeek::from_ical_code(code)
                        .ok_or_else(|| rule_error(format!("invalid BYDAY code '{code}'")))?;
                    days.push(day);
                }
            }
            "UNTIL" => ends = Some(parse_until(value.trim())?),
            "WKST" => {}
            other => return Err(rule_error(format!("unsupported rule part '{other}'"))),
        }
    }

    let freq = freq.ok_or_else(|| rule_error("missing FREQ".to_string()))?;
    let pattern = match (freq.as_str(), interval) {
        ("DAILY", 1) => RecurrencePattern::Daily,
        ("WEEKLY", 1) => RecurrencePattern::Weekly,
        ("WEEKLY", 2) => RecurrencePattern::Biweekly,
        ("MONTHLY", 1) => RecurrencePattern::Monthly,
        ("MONTHLY", 3) => RecurrencePattern::Quarterly,
        ("YEARLY", 1) => RecurrencePattern::Yearly,
        (f, i) => return Err(rule_error(format!("unsupported FREQ={f} with INTERVAL={i}"))),
    };
    if !days.is_empty() && !pattern.accepts_days() {
        return Err(rule_error(format!("BYDAY is not valid with FREQ={freq}")));
    }

    let mut rule = RecurrenceRule {
        pattern,
        days,
        cron: None,
        ends,
    };
    rule.days = rule.normalized_days();
    Ok(rule)
}

fn parse_until(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, UNTIL_FORMAT) {
        return Ok(dt.and_utc());
    }
    // Date-only form: midnight UTC.
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| rule_error(format!("invalid UNTIL '{value}'")))
}

fn rule_error(msg: String) -> Error {
    Error::Recurrence(msg)
}
