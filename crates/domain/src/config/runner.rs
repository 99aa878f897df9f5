use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Due-item poller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Poller cadence and slot-search granularity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Seconds between due-item polls.
    #[serde(default = "d_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on a single publish call (None = no timeout).
    #[serde(default)]
    pub publish_timeout_secs: Option<u64>,
    /// Step used when sweeping for free time slots.
    #[serde(default = "d_slot_increment_minutes")]
    pub slot_increment_minutes: u32,
    /// Maximum number of slots returned by one search.
    #[serde(default = "d_max_slot_results")]
    pub max_slot_results: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: d_poll_interval_secs(),
            publish_timeout_secs: None,
            slot_increment_minutes: d_slot_increment_minutes(),
            max_slot_results: d_max_slot_results(),
        }
    }
}

fn d_poll_interval_secs() -> u64 {
    30
}

fn d_slot_increment_minutes() -> u32 {
    30
}

fn d_max_slot_results() -> usize {
    50
}
