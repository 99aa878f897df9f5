//! Due-item poller: selects due items on a fixed interval and processes
//! them on a bounded worker pool.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use cs_domain::item::ItemStatus;
use cs_domain::trace::TraceEvent;

use super::{EngineInner, ProcessOutcome, SchedulingEngine};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tick
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one poll did.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TickReport {
    /// Scheduled items due at poll time.
    pub due: usize,
    /// Items marked queued and handed to a worker.
    pub dispatched: usize,
    pub published: usize,
    pub retried: usize,
    pub failed: usize,
    /// Attempts that returned an error or whose worker panicked.
    pub errors: usize,
}

impl SchedulingEngine {
    /// Run one poll: queue every due item that is not in flight and process
    /// the batch with at most `max_concurrent_items` workers. A failing
    /// item is logged and does not stop the others.
    pub async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let now = Utc::now();
        let mut report = TickReport::default();

        let due = self.inner.store.due_items(now).await;
        report.due = due.len();

        let mut queued = Vec::with_capacity(due.len());
        for item in due {
            if self.inner.in_flight.contains(&item.id) {
                continue;
            }
            let marked = self
                .inner
                .store
                .transition(
                    &item.id,
                    "enqueue",
                    |s| s == ItemStatus::Scheduled,
                    ItemStatus::Queued,
                    |_| {},
                )
                .await;
            if marked.is_ok() {
                queued.push(item.id);
            }
        }
        report.dispatched = queued.len();

        let permits = self.config().max_concurrent_items.max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut workers = JoinSet::new();
        for id in queued {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (id, engine.process_item(id).await)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(ProcessOutcome::Published { .. }))) => report.published += 1,
                Ok((_, Ok(ProcessOutcome::RetryScheduled { .. }))) => report.retried += 1,
                Ok((_, Ok(ProcessOutcome::Failed { .. }))) => report.failed += 1,
                Ok((_, Ok(_))) => {}
                Ok((id, Err(e))) => {
                    report.errors += 1;
                    tracing::error!(item_id = %id, error = %e, "processing attempt errored");
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(error = %e, "processing worker panicked");
                }
            }
        }

        TraceEvent::PollCompleted {
            due: report.due,
            dispatched: report.dispatched,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        if report.dispatched > 0 {
            if let Err(e) = self.flush().await {
                tracing::warn!(error = %e, "failed to persist items after poll");
            }
        }
        report
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle to a running poll loop. The loop holds only a weak reference to
/// the engine and exits on its own once the engine is dropped.
pub struct Runner {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Runner {
    pub(crate) fn spawn(engine: Weak<EngineInner>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                // An in-progress tick runs to completion so no item is
                // left in `processing`.
                let report = SchedulingEngine::from_inner(inner).tick().await;
                if report.dispatched > 0 {
                    tracing::debug!(
                        due = report.due,
                        dispatched = report.dispatched,
                        published = report.published,
                        "poll finished"
                    );
                }
            }
            tracing::debug!("poll loop exited");
        });

        Self { cancel, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "poll loop ended abnormally");
        }
    }
}
