use uuid::Uuid;

use crate::conflict::{join_issues, ScheduleConflict, ValidationIssue};
use crate::item::ItemStatus;

/// Shared error type used across all content-scheduler crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed: {}", join_issues(.issues))]
    Validation { issues: Vec<ValidationIssue> },

    #[error("blocked by conflicts: {}", join_issues(.conflicts))]
    Conflict { conflicts: Vec<ScheduleConflict> },

    #[error("item not found: {0}")]
    NotFound(Uuid),

    #[error("cannot {action} item {id} in status {from}")]
    InvalidTransition {
        id: Uuid,
        from: ItemStatus,
        action: &'static str,
    },

    #[error("item {0} is being processed")]
    InFlight(Uuid),

    #[error("recurrence: {0}")]
    Recurrence(String),

    #[error("publish: {0}")]
    Publish(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
