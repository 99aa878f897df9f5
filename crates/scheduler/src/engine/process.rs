//! One processing attempt: publish, then apply the success or failure
//! transition.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use cs_domain::item::{saturating_add, ItemStatus, ScheduleItem};
use cs_domain::trace::TraceEvent;
use cs_domain::{Error, Result};

use super::SchedulingEngine;
use crate::publish::PublishOutcome;
use crate::recurrence;
use crate::validation::check_time_slot_conflicts;

/// Occurrences tried when placing the next instance of a recurring item.
const MAX_OCCURRENCE_ATTEMPTS: usize = 10;
/// Upper bound on occurrences skipped because they are already past.
const MAX_PAST_OCCURRENCES: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Not in a processable state, or not due yet. Nothing changed.
    NotDue,
    /// Another worker holds the item.
    AlreadyInFlight,
    Published {
        /// The next instance of a recurring item, if one was placed.
        next_occurrence: Option<ScheduleItem>,
        /// Items the caller may want to kick off next.
        triggers: Vec<Uuid>,
    },
    RetryScheduled {
        retry_count: u32,
        next_attempt: DateTime<Utc>,
    },
    Failed {
        error: String,
    },
}

impl SchedulingEngine {
    /// Process item `id` if it is due. The id stays in the in-flight set
    /// for the whole attempt.
    pub async fn process_item(&self, id: Uuid) -> Result<ProcessOutcome> {
        let Some(_guard) = self.inner.in_flight.try_acquire(id) else {
            return Ok(ProcessOutcome::AlreadyInFlight);
        };

        let now = Utc::now();
        // Status and due time are checked under the same lock as the
        // transition, so a concurrent reschedule cannot slip in between.
        let claimed = self
            .inner
            .store
            .transition_if(
                &id,
                "process",
                |it| {
                    matches!(it.status, ItemStatus::Scheduled | ItemStatus::Queued)
                        && it.scheduled_for <= now
                },
                ItemStatus::Processing,
                |it| it.last_attempt_at = Some(now),
            )
            .await;
        let item = match claimed {
            Ok(item) => item,
            Err(Error::InvalidTransition { .. }) => {
                // Queued, then moved into the future.
                let _ = self
                    .inner
                    .store
                    .transition_if(
                        &id,
                        "requeue",
                        |it| it.status == ItemStatus::Queued,
                        ItemStatus::Scheduled,
                        |_| {},
                    )
                    .await;
                return Ok(ProcessOutcome::NotDue);
            }
            Err(e) => return Err(e),
        };

        let attempt = item.retry_count + 1;
        let span = tracing::info_span!("process_item", item_id = %id, attempt);
        let started = Instant::now();
        let result = self.publish_once(&item).instrument(span).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(metadata) => self.record_success(&item, metadata).await?,
            Err(Error::Publish(reason)) => self.record_failure(&item, reason).await?,
            Err(e) => self.record_failure(&item, e.to_string()).await?,
        };

        TraceEvent::ItemProcessed {
            item_id: id,
            success: matches!(outcome, ProcessOutcome::Published { .. }),
            attempt,
            duration_ms,
        }
        .emit();
        Ok(outcome)
    }

    /// One publisher call. A reported failure becomes `Error::Publish`;
    /// success yields the publisher's metadata.
    async fn publish_once(&self, item: &ScheduleItem) -> Result<serde_json::Value> {
        let publish = self.inner.publisher.publish(item);
        let outcome: PublishOutcome = match self.inner.runner_config.publish_timeout_secs {
            Some(secs) => tokio::time::timeout(std::time::Duration::from_secs(secs), publish)
                .await
                .map_err(|_| Error::Timeout(format!("publish took longer than {secs}s")))??,
            None => publish.await?,
        };
        if outcome.success {
            Ok(outcome.metadata)
        } else {
            Err(Error::Publish(
                outcome
                    .error
                    .unwrap_or_else(|| "publisher reported failure".to_string()),
            ))
        }
    }

    async fn record_success(
        &self,
        item: &ScheduleItem,
        metadata: serde_json::Value,
    ) -> Result<ProcessOutcome> {
        let now = Utc::now();
        let published = self
            .inner
            .store
            .update(&item.id, |it| {
                it.status = ItemStatus::Published;
                it.success_count += 1;
                it.published_at = Some(now);
                it.publish_metadata = metadata;
                it.last_error = None;
            })
            .await
            .ok_or(Error::NotFound(item.id))?;
        tracing::info!(item_id = %item.id, title = %item.title, "item published");

        let next_occurrence = if published.recurrence.is_recurring() {
            self.spawn_next_occurrence(&published, now).await
        } else {
            None
        };
        Ok(ProcessOutcome::Published {
            next_occurrence,
            triggers: published.triggers.iter().copied().collect(),
        })
    }

    async fn record_failure(&self, item: &ScheduleItem, error: String) -> Result<ProcessOutcome> {
        let now = Utc::now();
        let policy = self.config().retry;
        let updated = self
            .inner
            .store
            .update(&item.id, |it| {
                it.retry_count += 1;
                it.failure_count += 1;
                it.last_error = Some(error.clone());
                if it.retry_count > it.max_retries {
                    it.status = ItemStatus::Failed;
                } else {
                    it.status = ItemStatus::Scheduled;
                    it.occurrence_anchor.get_or_insert(it.scheduled_for);
                    it.scheduled_for = saturating_add(now, policy.delay_for(it.retry_count));
                }
            })
            .await
            .ok_or(Error::NotFound(item.id))?;

        if updated.status == ItemStatus::Failed {
            tracing::warn!(
                item_id = %item.id,
                retry_count = updated.retry_count,
                error = %error,
                "item failed, retries exhausted"
            );
            TraceEvent::ItemFailed {
                item_id: item.id,
                retry_count: updated.retry_count,
                error: error.clone(),
            }
            .emit();
            Ok(ProcessOutcome::Failed { error })
        } else {
            tracing::warn!(
                item_id = %item.id,
                retry_count = updated.retry_count,
                next_attempt = %updated.scheduled_for,
                error = %error,
                "publish failed, retry scheduled"
            );
            TraceEvent::RetryScheduled {
                item_id: item.id,
                retry_count: updated.retry_count,
                next_attempt: updated.scheduled_for,
            }
            .emit();
            Ok(ProcessOutcome::RetryScheduled {
                retry_count: updated.retry_count,
                next_attempt: updated.scheduled_for,
            })
        }
    }

    /// Insert the next instance of `parent` at the first future occurrence
    /// whose slot is free, trying at most [`MAX_OCCURRENCE_ATTEMPTS`].
    async fn spawn_next_occurrence(
        &self,
        parent: &ScheduleItem,
        now: DateTime<Utc>,
    ) -> Option<ScheduleItem> {
        let tz = parent.tz();
        let mut cursor = parent.occurrence_time();
        let mut tried = 0usize;
        let mut skipped = 0usize;

        while tried < MAX_OCCURRENCE_ATTEMPTS {
            let next = match recurrence::next_after(&parent.recurrence, cursor, tz) {
                Ok(Some(next)) if next > cursor => next,
                Ok(_) => return None,
                Err(e) => {
                    tracing::warn!(item_id = %parent.id, error = %e, "cannot compute next occurrence");
                    return None;
                }
            };
            cursor = next;
            if next <= now && skipped < MAX_PAST_OCCURRENCES {
                skipped += 1;
                continue;
            }
            tried += 1;

            let child = next_instance(parent, next, now);
            let inserted = self
                .inner
                .store
                .insert_checked(child.clone(), |candidate, map| {
                    let busy = check_time_slot_conflicts(
                        candidate.scheduled_for,
                        candidate.ends_at(),
                        map.values(),
                        &[],
                    );
                    if busy.is_empty() {
                        Ok(())
                    } else {
                        Err(Error::Other("occurrence slot is taken".into()))
                    }
                })
                .await;
            if inserted.is_ok() {
                TraceEvent::RecurrenceSpawned {
                    parent_id: parent.id,
                    item_id: child.id,
                    scheduled_for: child.scheduled_for,
                }
                .emit();
                return Some(child);
            }
            tracing::debug!(item_id = %parent.id, occurrence = %next, "occurrence slot taken");
        }

        tracing::warn!(
            item_id = %parent.id,
            attempts = tried,
            "no free slot for the next occurrence"
        );
        None
    }
}

fn next_instance(parent: &ScheduleItem, at: DateTime<Utc>, now: DateTime<Utc>) -> ScheduleItem {
    ScheduleItem {
        id: Uuid::new_v4(),
        status: ItemStatus::Scheduled,
        scheduled_for: at,
        retry_count: 0,
        last_error: None,
        success_count: 0,
        failure_count: 0,
        created_at: now,
        updated_at: now,
        last_attempt_at: None,
        published_at: None,
        publish_metadata: serde_json::Value::Null,
        recurrence_parent: Some(parent.id),
        occurrence_anchor: None,
        ..parent.clone()
    }
}
