//! Content scheduling engine.
//!
//! Four components over the shared `cs-domain` model:
//!
//! - [`recurrence`]: next/future occurrences, RRULE-style rule strings and
//!   5-field cron expressions.
//! - [`validation`]: structural item checks and conflict detection.
//! - [`optimizer`]: batch passes that reorder a schedule snapshot.
//! - [`engine`]: the live item set, its state machine and the due-item
//!   poller, publishing through a [`publish::Publisher`].

pub mod cli;
pub mod engine;
pub mod optimizer;
pub mod publish;
pub mod recurrence;
pub mod storage;
pub mod validation;

pub use engine::{
    AddOutcome, EngineEvent, EngineStatus, ImportMode, ImportReport, ItemPage, ItemQuery,
    ProcessOutcome, SchedulingEngine, SlotPreferences, TickReport, TimeSlot,
};
pub use optimizer::{optimize_schedule, OptimizationResult};
pub use publish::{LogPublisher, PublishOutcome, Publisher};
pub use storage::{ItemRepository, JsonFileRepository};
