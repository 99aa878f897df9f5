//! Shared types for the content scheduling engine: the item and conflict
//! model, configuration, structured trace events and the error type.

pub mod config;
pub mod conflict;
pub mod error;
pub mod item;
pub mod trace;

pub use error::{Error, Result};
