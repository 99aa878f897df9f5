//! Derived scheduling diagnostics: conflicts and item validation reports.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conflicts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    TimeOverlap,
    DependencyViolation,
    ResourceExhaustion,
    TimezoneMismatch,
}

/// Ordered: `Warning < Error < Critical`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Warning,
    Error,
    Critical,
}

/// A detected violation of temporal, dependency, capacity, or
/// working-hours policy. Never stored; recomputed on demand.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConflict {
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub item_ids: Vec<Uuid>,
    pub description: String,
    pub resolution: String,
}

impl ScheduleConflict {
    pub fn new(
        kind: ConflictKind,
        severity: ConflictSeverity,
        item_ids: Vec<Uuid>,
        description: impl Into<String>,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            item_ids,
            description: description.into(),
            resolution: resolution.into(),
        }
    }

    /// Error and critical conflicts abort a mutating call.
    pub fn is_blocking(&self) -> bool {
        self.severity >= ConflictSeverity::Error
    }
}

impl fmt::Display for ScheduleConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConflictSeverity::Warning => "WARN",
            ConflictSeverity::Error => "ERROR",
            ConflictSeverity::Critical => "CRITICAL",
        };
        write!(f, "[{tag}] {:?}: {}", self.kind, self.description)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single structural problem with an item.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Join issues into one line for error messages.
pub(crate) fn join_issues<T: fmt::Display>(issues: &[T]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
