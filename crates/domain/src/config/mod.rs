mod observability;
mod runner;
mod schedule;
mod storage;

pub use observability::*;
pub use runner::*;
pub use schedule::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = self.schedule.validate();

        if self.runner.poll_interval_secs == 0 {
            errors.push(ConfigError::error(
                "runner.poll_interval_secs",
                "poll interval must be greater than 0",
            ));
        }
        if self.runner.slot_increment_minutes == 0 {
            errors.push(ConfigError::error(
                "runner.slot_increment_minutes",
                "slot increment must be greater than 0",
            ));
        }
        if self.runner.publish_timeout_secs == Some(0) {
            errors.push(ConfigError::warning(
                "runner.publish_timeout_secs",
                "a zero timeout fails every publish attempt",
            ));
        }

        errors
    }
}

impl ScheduleConfig {
    /// Validate the scheduling policy on its own (used for hot updates).
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            errors.push(ConfigError::error(
                "schedule.timezone",
                format!("invalid timezone '{}'", self.timezone),
            ));
        }

        if self.working_hours.start >= self.working_hours.end {
            errors.push(ConfigError::error(
                "schedule.working_hours",
                format!(
                    "start {} must be before end {}",
                    self.working_hours.start, self.working_hours.end
                ),
            ));
        }

        if self.working_hours.days.is_empty() {
            errors.push(ConfigError::error(
                "schedule.working_hours.days",
                "at least one working day is required",
            ));
        }

        if self.max_concurrent_items == 0 {
            errors.push(ConfigError::error(
                "schedule.max_concurrent_items",
                "must be at least 1",
            ));
        }

        if !(self.retry.backoff_multiplier >= 1.0) {
            errors.push(ConfigError::error(
                "schedule.retry.backoff_multiplier",
                "multiplier must be >= 1.0",
            ));
        }

        let window = self.working_hours.end - self.working_hours.start;
        if self.buffer() >= window && window > chrono::Duration::zero() {
            errors.push(ConfigError::warning(
                "schedule.buffer_minutes",
                "buffer is as long as the whole working day",
            ));
        }

        errors
    }
}
