//! Outbound publish seam. The engine hands each due item to a
//! [`Publisher`]; what "publishing" means is up to the implementation.

use cs_domain::item::ScheduleItem;
use cs_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Publish collaborator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a publish attempt reported back.
#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    pub success: bool,
    /// Adapter-specific details (post id, URL, ...), stored on the item.
    pub metadata: serde_json::Value,
    pub error: Option<String>,
}

impl PublishOutcome {
    pub fn ok(metadata: serde_json::Value) -> Self {
        Self {
            success: true,
            metadata,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            metadata: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Seam to the outside world (CMS, social networks, mail).
///
/// Called exactly once per processing attempt. Both `Err(_)` and an
/// outcome with `success = false` count as a failed attempt.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, item: &ScheduleItem) -> Result<PublishOutcome>;
}

/// Logs the item and reports success. Used by the CLI.
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait::async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, item: &ScheduleItem) -> Result<PublishOutcome> {
        tracing::info!(
            item_id = %item.id,
            title = %item.title,
            item_type = ?item.item_type,
            targets = ?item.publish_to,
            "publishing item"
        );
        Ok(PublishOutcome::ok(serde_json::json!({
            "publisher": "log",
            "targets": item.publish_to,
        })))
    }
}
