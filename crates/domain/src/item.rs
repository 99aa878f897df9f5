//! Schedule item model: types, enums, and creation and patch payloads.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kind of schedulable work. Only picks defaults; never changes engine
/// semantics.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ItemType {
    BlogPost,
    SocialPost,
    Newsletter,
    Email,
    Task,
    Reminder,
    Meeting,
    Event,
    Campaign,
    Automation,
}

impl ItemType {
    /// Duration used when the creation payload does not carry one.
    pub fn default_duration_minutes(self) -> u32 {
        match self {
            Self::SocialPost | Self::Reminder => 15,
            Self::Email | Self::Automation => 30,
            Self::BlogPost | Self::Event => 120,
            Self::Campaign => 240,
            Self::Newsletter | Self::Task | Self::Meeting => 60,
        }
    }

    /// Time-of-day bucket in which this kind of item performs best.
    pub fn optimal_bucket(self) -> TimeBucket {
        match self {
            Self::BlogPost
            | Self::Newsletter
            | Self::Email
            | Self::Task
            | Self::Reminder
            | Self::Campaign => TimeBucket::Morning,
            Self::SocialPost | Self::Meeting => TimeBucket::Afternoon,
            Self::Event => TimeBucket::Evening,
            Self::Automation => TimeBucket::Night,
        }
    }

    /// Types that are expected to carry a content payload.
    pub fn carries_content(self) -> bool {
        matches!(
            self,
            Self::BlogPost | Self::SocialPost | Self::Newsletter | Self::Email | Self::Campaign
        )
    }
}

/// Coarse time-of-day windows, evaluated on local wall-clock hours.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// 06:00–12:00
    Morning,
    /// 12:00–18:00
    Afternoon,
    /// 18:00–22:00
    Evening,
    /// 22:00–06:00 (wraps midnight)
    Night,
}

impl TimeBucket {
    pub fn contains_hour(self, hour: u32) -> bool {
        match self {
            Self::Morning => (6..12).contains(&hour),
            Self::Afternoon => (12..18).contains(&hour),
            Self::Evening => (18..22).contains(&hour),
            Self::Night => hour >= 22 || hour < 6,
        }
    }

    /// Hour an out-of-bucket item is moved to. Always on the same calendar day.
    pub fn canonical_hour(self) -> u32 {
        match self {
            Self::Morning => 9,
            Self::Afternoon => 14,
            Self::Evening => 19,
            Self::Night => 22,
        }
    }

    pub fn for_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            18..=21 => Self::Evening,
            _ => Self::Night,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Draft,
    Scheduled,
    Queued,
    Processing,
    Published,
    Failed,
    Cancelled,
    Archived,
}

impl ItemStatus {
    /// No further engine-driven transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Published | Self::Failed | Self::Cancelled | Self::Archived
        )
    }

    /// Items that may be edited, cancelled or removed.
    pub fn is_mutable(self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled | Self::Queued)
    }

    /// Items that no longer occupy their time slot for overlap and
    /// capacity checks.
    pub fn releases_slot(self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Archived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Published => "published",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recurrence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    #[default]
    None,
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
    Custom,
}

impl RecurrencePattern {
    /// Whether an explicit weekday set is meaningful for this pattern.
    pub fn accepts_days(self) -> bool {
        matches!(self, Self::Weekly | Self::Biweekly | Self::Custom)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const WEEKDAYS: [DayOfWeek; 5] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
    ];

    /// Two-letter iCalendar code (`MO`, `TU`, …).
    pub fn ical_code(self) -> &'static str {
        match self {
            Self::Monday => "MO",
            Self::Tuesday => "TU",
            Self::Wednesday => "WE",
            Self::Thursday => "TH",
            Self::Friday => "FR",
            Self::Saturday => "SA",
            Self::Sunday => "SU",
        }
    }

    pub fn from_ical_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "MO" => Some(Self::Monday),
            "TU" => Some(Self::Tuesday),
            "WE" => Some(Self::Wednesday),
            "TH" => Some(Self::Thursday),
            "FR" => Some(Self::Friday),
            "SA" => Some(Self::Saturday),
            "SU" => Some(Self::Sunday),
            _ => None,
        }
    }

    pub fn days_from_monday(self) -> u32 {
        self.to_weekday().num_days_from_monday()
    }

    pub fn to_weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Tuesday => Weekday::Tue,
            Self::Wednesday => Weekday::Wed,
            Self::Thursday => Weekday::Thu,
            Self::Friday => Weekday::Fri,
            Self::Saturday => Weekday::Sat,
            Self::Sunday => Weekday::Sun,
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

/// How an item repeats. `days` is legal on weekly/biweekly/custom, `cron`
/// only on custom, and `none` carries neither (nor an end).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRule {
    #[serde(default)]
    pub pattern: RecurrencePattern,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<DayOfWeek>,
    /// 5-field cron expression (minute hour dom month dow).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends: Option<DateTime<Utc>>,
}

impl RecurrenceRule {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn every(pattern: RecurrencePattern) -> Self {
        Self {
            pattern,
            ..Self::default()
        }
    }

    pub fn on_days(pattern: RecurrencePattern, days: impl IntoIterator<Item = DayOfWeek>) -> Self {
        Self {
            pattern,
            days: days.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        Self {
            pattern: RecurrencePattern::Custom,
            cron: Some(expr.into()),
            ..Self::default()
        }
    }

    pub fn until(mut self, ends: DateTime<Utc>) -> Self {
        self.ends = Some(ends);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.pattern != RecurrencePattern::None
    }

    /// Sorted, de-duplicated weekday set.
    pub fn normalized_days(&self) -> Vec<DayOfWeek> {
        let mut days = self.days.clone();
        days.sort();
        days.dedup();
        days
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schedule item
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn default_priority() -> u8 {
    5
}

/// The unit of schedulable work held by the engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleItem {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub item_type: ItemType,
    pub status: ItemStatus,
    /// Absolute start instant; `timezone` qualifies its wall-clock reading.
    pub scheduled_for: DateTime<Utc>,
    /// IANA timezone identifier, e.g. `Europe/Berlin`.
    pub timezone: String,
    pub estimated_duration_minutes: u32,
    #[serde(default)]
    pub recurrence: RecurrenceRule,
    /// 1–10, 10 is highest.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Items that must complete strictly before this one.
    #[serde(default)]
    pub depends_on: BTreeSet<Uuid>,
    /// Items to activate on success (advisory only).
    #[serde(default)]
    pub triggers: BTreeSet<Uuid>,
    /// Opaque payload handed to the publisher.
    #[serde(default)]
    pub content: serde_json::Value,
    /// Platform identifiers handed to the publisher.
    #[serde(default)]
    pub publish_to: Vec<String>,
    #[serde(default)]
    pub created_by: String,

    // ── Reliability counters ─────────────────────────────────────────
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub failure_count: u32,

    // ── Bookkeeping ──────────────────────────────────────────────────
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Metadata returned by the publisher on the last successful attempt.
    #[serde(default)]
    pub publish_metadata: serde_json::Value,
    /// Item whose successful run spawned this occurrence.
    #[serde(default)]
    pub recurrence_parent: Option<Uuid>,
    /// Original occurrence instant, set once a retry moves `scheduled_for`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_anchor: Option<DateTime<Utc>>,
}

/// `at + by`, clamped to the representable range instead of panicking.
pub fn saturating_add(at: DateTime<Utc>, by: chrono::Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(if by < chrono::Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

impl ScheduleItem {
    /// Build a fresh item from a creation payload, assigning id/timestamps.
    pub fn from_spec(spec: ItemSpec, default_max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: spec.title,
            description: spec.description,
            item_type: spec.item_type,
            status: spec.status.unwrap_or(ItemStatus::Draft),
            scheduled_for: spec.scheduled_for,
            timezone: spec.timezone,
            estimated_duration_minutes: spec
                .estimated_duration_minutes
                .unwrap_or_else(|| spec.item_type.default_duration_minutes()),
            recurrence: spec.recurrence,
            priority: spec.priority.unwrap_or_else(default_priority),
            depends_on: spec.depends_on,
            triggers: spec.triggers,
            content: spec.content,
            publish_to: spec.publish_to,
            created_by: spec.created_by,
            retry_count: 0,
            max_retries: spec.max_retries.unwrap_or(default_max_retries),
            last_error: None,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
            last_attempt_at: None,
            published_at: None,
            publish_metadata: serde_json::Value::Null,
            recurrence_parent: None,
            occurrence_anchor: None,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.estimated_duration_minutes))
    }

    /// End of `[scheduled_for, end)`, or `None` past the representable range.
    pub fn checked_end(&self) -> Option<DateTime<Utc>> {
        self.scheduled_for.checked_add_signed(self.duration())
    }

    /// Exclusive end of the half-open interval `[scheduled_for, end)`,
    /// clamped to the latest representable instant.
    pub fn ends_at(&self) -> DateTime<Utc> {
        saturating_add(self.scheduled_for, self.duration())
    }

    /// Instant the recurrence series is stepped from. Retries move
    /// `scheduled_for` but not the occurrence this run belongs to.
    pub fn occurrence_time(&self) -> DateTime<Utc> {
        self.occurrence_anchor.unwrap_or(self.scheduled_for)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.scheduled_for < end && start < self.ends_at()
    }

    /// Parsed IANA zone, falling back to UTC for unknown identifiers.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Apply a patch to this item. Identity and counters are untouched.
    pub fn apply_patch(&mut self, patch: ItemPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(item_type) = patch.item_type {
            self.item_type = item_type;
        }
        if let Some(at) = patch.scheduled_for {
            self.scheduled_for = at;
            self.occurrence_anchor = None;
        }
        if let Some(tz) = patch.timezone {
            self.timezone = tz;
        }
        if let Some(minutes) = patch.estimated_duration_minutes {
            self.estimated_duration_minutes = minutes;
        }
        if let Some(rule) = patch.recurrence {
            self.recurrence = rule;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(deps) = patch.depends_on {
            self.depends_on = deps;
        }
        if let Some(triggers) = patch.triggers {
            self.triggers = triggers;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(targets) = patch.publish_to {
            self.publish_to = targets;
        }
        if let Some(max) = patch.max_retries {
            self.max_retries = max;
        }
    }
}

/// Creation payload: a [`ScheduleItem`] minus generated fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub item_type: ItemType,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub estimated_duration_minutes: Option<u32>,
    #[serde(default)]
    pub recurrence: RecurrenceRule,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub depends_on: BTreeSet<Uuid>,
    #[serde(default)]
    pub triggers: BTreeSet<Uuid>,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub publish_to: Vec<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// `draft` (default) or `scheduled`.
    #[serde(default)]
    pub status: Option<ItemStatus>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl ItemSpec {
    pub fn new(title: impl Into<String>, item_type: ItemType, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: None,
            item_type,
            scheduled_for,
            timezone: default_timezone(),
            estimated_duration_minutes: None,
            recurrence: RecurrenceRule::none(),
            priority: None,
            depends_on: BTreeSet::new(),
            triggers: BTreeSet::new(),
            content: serde_json::Value::Null,
            publish_to: Vec::new(),
            created_by: String::new(),
            max_retries: None,
            status: None,
        }
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration_minutes = Some(minutes);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence = rule;
        self
    }

    pub fn depending_on(mut self, id: Uuid) -> Self {
        self.depends_on.insert(id);
        self
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn publish_to(mut self, platform: impl Into<String>) -> Self {
        self.publish_to.push(platform.into());
        self
    }

    pub fn created_by(mut self, who: impl Into<String>) -> Self {
        self.created_by = who.into();
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    pub fn scheduled(mut self) -> Self {
        self.status = Some(ItemStatus::Scheduled);
        self
    }
}

/// Partial update. `None` leaves a field unchanged; nullable fields use
/// `Option<Option<_>>`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub item_type: Option<ItemType>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub estimated_duration_minutes: Option<u32>,
    pub recurrence: Option<RecurrenceRule>,
    pub priority: Option<u8>,
    pub depends_on: Option<BTreeSet<Uuid>>,
    pub triggers: Option<BTreeSet<Uuid>>,
    pub content: Option<serde_json::Value>,
    pub publish_to: Option<Vec<String>>,
    pub max_retries: Option<u32>,
}
