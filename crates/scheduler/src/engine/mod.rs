//! Scheduling engine: the live item set, its lifecycle state machine and
//! the background due-item poller.
//!
//! `SchedulingEngine` is a cheap `Clone` handle. Every mutating call runs
//! validation and conflict checks under the store's write lock, so two
//! concurrent adds cannot both claim the same slot.

pub mod in_flight;
mod process;
pub mod query;
pub mod runner;
pub mod slots;
pub mod store;

pub use in_flight::{InFlightGuard, InFlightSet};
pub use process::ProcessOutcome;
pub use query::{ItemFilter, ItemPage, ItemQuery, SortField, SortOrder};
pub use runner::{Runner, TickReport};
pub use slots::{SlotPreferences, TimeSlot};
pub use store::{EngineEvent, ItemMap, ItemStore};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use cs_domain::config::{Config, ConfigSeverity, RunnerConfig, ScheduleConfig};
use cs_domain::conflict::{ScheduleConflict, ValidationIssue};
use cs_domain::item::{ItemPatch, ItemSpec, ItemStatus, ScheduleItem};
use cs_domain::trace::TraceEvent;
use cs_domain::{Error, Result};

use crate::optimizer::{optimize_schedule, OptimizationResult};
use crate::publish::Publisher;
use crate::recurrence;
use crate::storage::{ItemRepository, JsonFileRepository};
use crate::validation::{check_conflicts, validate_item};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public result types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of an accepted add or update.
#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub item: ScheduleItem,
    /// Non-blocking conflicts (warning severity).
    pub warnings: Vec<ScheduleConflict>,
    pub validation_warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub initialized: bool,
    pub running: bool,
    pub item_count: usize,
    pub in_flight_count: usize,
    pub config: ScheduleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Insert or overwrite by id; keep everything else.
    Merge,
    /// Drop the live set first.
    Replace,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSkip {
    pub id: Uuid,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<ImportSkip>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) struct EngineInner {
    store: ItemStore,
    in_flight: Arc<InFlightSet>,
    schedule: parking_lot::RwLock<ScheduleConfig>,
    runner_config: RunnerConfig,
    publisher: Arc<dyn Publisher>,
    repository: Option<Arc<dyn ItemRepository>>,
    initialized: AtomicBool,
    runner: parking_lot::Mutex<Option<Runner>>,
}

#[derive(Clone)]
pub struct SchedulingEngine {
    inner: Arc<EngineInner>,
}

impl SchedulingEngine {
    /// Build an engine from the full config. A JSON file repository is
    /// attached when `storage.path` is set.
    pub fn new(config: Config, publisher: Arc<dyn Publisher>) -> Self {
        let repository = config
            .storage
            .path
            .clone()
            .map(|p| Arc::new(JsonFileRepository::new(p)) as Arc<dyn ItemRepository>);
        Self::with_repository(config.schedule, config.runner, publisher, repository)
    }

    pub fn with_repository(
        schedule: ScheduleConfig,
        runner_config: RunnerConfig,
        publisher: Arc<dyn Publisher>,
        repository: Option<Arc<dyn ItemRepository>>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store: ItemStore::new(),
                in_flight: Arc::new(InFlightSet::new()),
                schedule: parking_lot::RwLock::new(schedule),
                runner_config,
                publisher,
                repository,
                initialized: AtomicBool::new(false),
                runner: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<EngineInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    // ── CRUD ─────────────────────────────────────────────────────────

    /// Validate, conflict-check and insert a new item.
    pub async fn add_item(&self, spec: ItemSpec) -> Result<AddOutcome> {
        if let Some(status) = spec.status {
            if !matches!(status, ItemStatus::Draft | ItemStatus::Scheduled) {
                return Err(Error::Validation {
                    issues: vec![ValidationIssue::new(
                        "status",
                        format!("new items start as draft or scheduled, not {status}"),
                    )],
                });
            }
        }

        let config = self.config();
        let now = Utc::now();
        let item = ScheduleItem::from_spec(spec, config.retry.max_retries, now);
        let report = validate_item(&item, now);
        if !report.valid {
            return Err(Error::Validation {
                issues: report.errors,
            });
        }

        let warnings = self
            .inner
            .store
            .insert_checked(item.clone(), |candidate, map| {
                admit(candidate, map, None, &config)
            })
            .await?;

        TraceEvent::ItemAdded {
            item_id: item.id,
            item_type: format!("{:?}", item.item_type),
            scheduled_for: item.scheduled_for,
            warnings: warnings.len(),
        }
        .emit();

        Ok(AddOutcome {
            item,
            warnings,
            validation_warnings: report.warnings,
        })
    }

    /// Patch an item. The patched copy goes through the same validation
    /// and conflict pipeline as a new item (never conflicting with itself).
    pub async fn update_item(&self, id: Uuid, patch: ItemPatch) -> Result<AddOutcome> {
        let config = self.config();
        let now = Utc::now();

        let (item, (warnings, validation_warnings)) = self
            .inner
            .store
            .mutate_with_snapshot(&id, |copy, map| {
                if self.inner.in_flight.contains(&id) {
                    return Err(Error::InFlight(id));
                }
                if !copy.status.is_mutable() {
                    return Err(Error::InvalidTransition {
                        id,
                        from: copy.status,
                        action: "update",
                    });
                }
                copy.apply_patch(patch);
                copy.updated_at = now;
                if copy.status == ItemStatus::Queued && copy.scheduled_for > now {
                    copy.status = ItemStatus::Scheduled;
                }
                let report = validate_item(copy, now);
                if !report.valid {
                    return Err(Error::Validation {
                        issues: report.errors,
                    });
                }
                let warnings = admit(copy, map, Some(id), &config)?;
                Ok((warnings, report.warnings))
            })
            .await?;

        tracing::debug!(item_id = %id, "item updated");
        Ok(AddOutcome {
            item,
            warnings,
            validation_warnings,
        })
    }

    /// Remove an item. Rejected while it is being processed.
    pub async fn remove_item(&self, id: Uuid) -> Result<ScheduleItem> {
        if self.inner.in_flight.contains(&id) {
            return Err(Error::InFlight(id));
        }
        let removed = self
            .inner
            .store
            .remove_unless(&id, |s| s == ItemStatus::Processing)
            .await?;
        tracing::debug!(item_id = %id, "item removed");
        Ok(removed)
    }

    pub async fn get_item(&self, id: Uuid) -> Option<ScheduleItem> {
        self.inner.store.get(&id).await
    }

    pub async fn list_items(&self, query: &ItemQuery) -> ItemPage {
        self.inner
            .store
            .with_items(|map| query::run_query(map.values(), query))
            .await
    }

    // ── Lifecycle transitions ────────────────────────────────────────

    /// draft → scheduled.
    pub async fn schedule_item(&self, id: Uuid) -> Result<ScheduleItem> {
        self.inner
            .store
            .transition(
                &id,
                "schedule",
                |s| s == ItemStatus::Draft,
                ItemStatus::Scheduled,
                |_| {},
            )
            .await
    }

    /// {draft, scheduled, queued} → cancelled.
    pub async fn cancel_item(&self, id: Uuid) -> Result<ScheduleItem> {
        if self.inner.in_flight.contains(&id) {
            return Err(Error::InFlight(id));
        }
        self.inner
            .store
            .transition(
                &id,
                "cancel",
                ItemStatus::is_mutable,
                ItemStatus::Cancelled,
                |_| {},
            )
            .await
    }

    /// Any status except processing → archived.
    pub async fn archive_item(&self, id: Uuid) -> Result<ScheduleItem> {
        if self.inner.in_flight.contains(&id) {
            return Err(Error::InFlight(id));
        }
        self.inner
            .store
            .transition(
                &id,
                "archive",
                |s| s != ItemStatus::Processing && s != ItemStatus::Archived,
                ItemStatus::Archived,
                |_| {},
            )
            .await
    }

    // ── Batch optimization ───────────────────────────────────────────

    /// Optimize every draft/scheduled item that is not in flight. With
    /// `apply`, moved times are written back to items that are still
    /// mutable and have not been moved by someone else meanwhile.
    pub async fn optimize(&self, apply: bool) -> OptimizationResult {
        let config = self.config();
        let in_flight = Arc::clone(&self.inner.in_flight);
        let mut batch: Vec<ScheduleItem> = self
            .inner
            .store
            .with_items(|map| {
                map.values()
                    .filter(|i| matches!(i.status, ItemStatus::Draft | ItemStatus::Scheduled))
                    .filter(|i| !in_flight.contains(&i.id))
                    .cloned()
                    .collect()
            })
            .await;
        batch.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for).then(a.id.cmp(&b.id)));

        let result = optimize_schedule(&batch, &config);
        if !apply {
            return result;
        }

        let now = Utc::now();
        let moves: Vec<(Uuid, DateTime<Utc>, DateTime<Utc>)> = result
            .moved()
            .into_iter()
            .map(|(before, after)| (before.id, before.scheduled_for, after.scheduled_for))
            .collect();
        let applied = self
            .inner
            .store
            .write_all(|map| {
                let mut applied = 0;
                for (id, was, to) in &moves {
                    let Some(live) = map.get_mut(id) else { continue };
                    if live.status.is_mutable()
                        && live.scheduled_for == *was
                        && !in_flight.contains(id)
                    {
                        live.scheduled_for = *to;
                        live.updated_at = now;
                        applied += 1;
                    }
                }
                applied
            })
            .await;

        if applied < moves.len() {
            tracing::info!(
                applied,
                skipped = moves.len() - applied,
                "some optimized moves were stale and skipped"
            );
        }
        self.inner.store.emit(EngineEvent::Optimized { moved: applied });
        result
    }

    // ── Slot discovery ───────────────────────────────────────────────

    /// Free slots of `duration_minutes` in `[start, end)`.
    pub async fn get_available_time_slots(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_minutes: u32,
        prefs: &SlotPreferences,
    ) -> Result<Vec<TimeSlot>> {
        let mut issues = Vec::new();
        if duration_minutes == 0 {
            issues.push(ValidationIssue::new("duration", "must be greater than 0"));
        }
        if end <= start {
            issues.push(ValidationIssue::new("end", "must be after start"));
        }
        if let Some(tz) = prefs.timezone.as_deref() {
            if let Err(msg) = crate::validation::validate_timezone(tz) {
                issues.push(ValidationIssue::new("timezone", msg));
            }
        }
        if !issues.is_empty() {
            return Err(Error::Validation { issues });
        }

        let config = self.config();
        let duration = Duration::minutes(i64::from(duration_minutes));
        let runner = &self.inner.runner_config;
        Ok(self
            .inner
            .store
            .with_items(|map| {
                slots::find_slots(start, end, duration, prefs, map.values(), &config, runner)
            })
            .await)
    }

    // ── Recurrence ───────────────────────────────────────────────────

    /// Up to `limit` occurrences of item `id`, starting with its own time.
    pub async fn next_occurrences(&self, id: Uuid, limit: usize) -> Result<Vec<DateTime<Utc>>> {
        let item = self.get_item(id).await.ok_or(Error::NotFound(id))?;
        recurrence::future_occurrences(&item, limit)
    }

    /// RRULE-style rendering of the item's rule, `None` if it does not repeat.
    pub async fn recurrence_rule_string(&self, id: Uuid) -> Result<Option<String>> {
        let item = self.get_item(id).await.ok_or(Error::NotFound(id))?;
        Ok(recurrence::to_rule_string(&item.recurrence))
    }

    // ── Introspection & config ───────────────────────────────────────

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            initialized: self.inner.initialized.load(Ordering::SeqCst),
            running: self.is_running(),
            item_count: self.inner.store.len().await,
            in_flight_count: self.inner.in_flight.len(),
            config: self.config(),
        }
    }

    /// Effective scheduling policy.
    pub fn config(&self) -> ScheduleConfig {
        self.inner.schedule.read().clone()
    }

    pub fn runner_config(&self) -> &RunnerConfig {
        &self.inner.runner_config
    }

    /// Replace the scheduling policy. Rejected if it has error-level issues.
    pub fn update_config(&self, config: ScheduleConfig) -> Result<()> {
        let errors: Vec<String> = config
            .validate()
            .into_iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(Error::Config(errors.join("; ")));
        }
        *self.inner.schedule.write() = config;
        tracing::info!("schedule config updated");
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.store.subscribe()
    }

    pub fn in_flight(&self) -> &Arc<InFlightSet> {
        &self.inner.in_flight
    }

    // ── Poller lifecycle ─────────────────────────────────────────────

    /// Start the background poller. No-op if it is already running.
    pub fn start(&self) {
        let mut slot = self.inner.runner.lock();
        if slot.as_ref().map_or(false, Runner::is_running) {
            return;
        }
        let period = std::time::Duration::from_secs(self.inner.runner_config.poll_interval_secs.max(1));
        *slot = Some(Runner::spawn(self.downgrade(), period));
        tracing::info!(poll_interval_secs = period.as_secs(), "poller started");
    }

    /// Stop the poller, letting an in-progress tick finish.
    pub async fn stop(&self) {
        let runner = self.inner.runner.lock().take();
        if let Some(runner) = runner {
            runner.shutdown().await;
            tracing::info!("poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .runner
            .lock()
            .as_ref()
            .map_or(false, Runner::is_running)
    }

    // ── Persistence & exchange ───────────────────────────────────────

    /// Load the persisted set, replacing the live one. Items left
    /// `processing` or `queued` by a previous run go back to `scheduled`.
    pub async fn initialize(&self) -> Result<usize> {
        let loaded = match &self.inner.repository {
            Some(repo) => repo.load().await?,
            None => Vec::new(),
        };
        let mut recovered = 0usize;
        let count = self
            .inner
            .store
            .write_all(|map| {
                map.clear();
                for mut item in loaded {
                    if matches!(item.status, ItemStatus::Processing | ItemStatus::Queued) {
                        item.status = ItemStatus::Scheduled;
                        recovered += 1;
                    }
                    map.insert(item.id, item);
                }
                map.len()
            })
            .await;
        self.inner.initialized.store(true, Ordering::SeqCst);
        tracing::info!(count, recovered, "engine initialized");
        Ok(count)
    }

    /// Persist the live set. No-op without a repository.
    pub async fn flush(&self) -> Result<()> {
        let Some(repo) = &self.inner.repository else {
            return Ok(());
        };
        repo.save(&self.sorted_snapshot().await).await
    }

    pub async fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.sorted_snapshot().await)?)
    }

    /// Import items from a JSON array. Invalid items and items currently in
    /// flight are skipped and reported; the rest are inserted by id.
    pub async fn import_json(&self, json: &str, mode: ImportMode) -> Result<ImportReport> {
        let items: Vec<ScheduleItem> = serde_json::from_str(json)?;
        if mode == ImportMode::Replace && !self.inner.in_flight.is_empty() {
            return Err(Error::Other(format!(
                "cannot replace items while {} are being processed",
                self.inner.in_flight.len()
            )));
        }

        let now = Utc::now();
        let mut report = ImportReport::default();
        let mut accepted = Vec::with_capacity(items.len());
        for mut item in items {
            if self.inner.in_flight.contains(&item.id) {
                report.skipped.push(ImportSkip {
                    id: item.id,
                    title: item.title,
                    reason: "item is being processed".into(),
                });
                continue;
            }
            if matches!(item.status, ItemStatus::Processing | ItemStatus::Queued) {
                item.status = ItemStatus::Scheduled;
            }
            let validation = validate_item(&item, now);
            if !validation.valid {
                let reason = validation
                    .errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                report.skipped.push(ImportSkip {
                    id: item.id,
                    title: item.title,
                    reason,
                });
                continue;
            }
            accepted.push(item);
        }

        report.imported = accepted.len();
        self.inner
            .store
            .write_all(|map| {
                if mode == ImportMode::Replace {
                    map.clear();
                }
                for item in accepted {
                    map.insert(item.id, item);
                }
            })
            .await;
        self.inner.store.emit(EngineEvent::Imported {
            count: report.imported,
        });
        tracing::info!(
            imported = report.imported,
            skipped = report.skipped.len(),
            ?mode,
            "items imported"
        );
        Ok(report)
    }

    async fn sorted_snapshot(&self) -> Vec<ScheduleItem> {
        let mut items = self.inner.store.snapshot().await;
        items.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for).then(a.id.cmp(&b.id)));
        items
    }
}

/// Conflict gate shared by add and update: blocking conflicts abort with
/// the full list, warnings are handed back.
fn admit(
    item: &ScheduleItem,
    existing: &ItemMap,
    exclude: Option<Uuid>,
    config: &ScheduleConfig,
) -> Result<Vec<ScheduleConflict>> {
    let conflicts = check_conflicts(item, existing.values(), exclude, config);
    for conflict in &conflicts {
        TraceEvent::ConflictDetected {
            item_id: item.id,
            kind: conflict.kind,
            severity: conflict.severity,
            with: conflict
                .item_ids
                .iter()
                .copied()
                .filter(|id| *id != item.id)
                .collect(),
        }
        .emit();
    }
    if conflicts.iter().any(ScheduleConflict::is_blocking) {
        return Err(Error::Conflict { conflicts });
    }
    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::LogPublisher;
    use chrono::TimeZone;
    use cs_domain::item::ItemType;

    fn engine() -> SchedulingEngine {
        SchedulingEngine::new(Config::default(), Arc::new(LogPublisher))
    }

    /// Monday in the future, inside default working hours.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2031, 6, 16, h, m, 0).unwrap()
    }

    fn task(title: &str, at: DateTime<Utc>) -> ItemSpec {
        ItemSpec::new(title, ItemType::Task, at).with_duration(60)
    }

    #[tokio::test]
    async fn overlapping_add_is_rejected() {
        let engine = engine();
        engine.add_item(task("a", monday(10, 0))).await.unwrap();
        let err = engine.add_item(task("b", monday(10, 30))).await.unwrap_err();
        match err {
            Error::Conflict { conflicts } => assert!(conflicts.iter().any(|c| c.is_blocking())),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(engine.status().await.item_count, 1);
    }

    #[tokio::test]
    async fn invalid_item_never_enters_store() {
        let engine = engine();
        let err = engine
            .add_item(task("", monday(10, 0)).with_priority(42))
            .await
            .unwrap_err();
        match err {
            Error::Validation { issues } => assert!(issues.len() >= 2),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(engine.status().await.item_count, 0);
    }

    #[tokio::test]
    async fn initial_status_must_be_draft_or_scheduled() {
        let engine = engine();
        let mut spec = task("a", monday(10, 0));
        spec.status = Some(ItemStatus::Published);
        assert!(matches!(
            engine.add_item(spec).await,
            Err(Error::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn update_excludes_self_and_rechecks_others() {
        let engine = engine();
        let a = engine.add_item(task("a", monday(10, 0))).await.unwrap().item;
        engine.add_item(task("b", monday(12, 0))).await.unwrap();

        let shifted = ItemPatch {
            scheduled_for: Some(monday(10, 30)),
            ..ItemPatch::default()
        };
        let out = engine.update_item(a.id, shifted).await.unwrap();
        assert_eq!(out.item.scheduled_for, monday(10, 30));

        let onto_b = ItemPatch {
            scheduled_for: Some(monday(11, 30)),
            ..ItemPatch::default()
        };
        assert!(matches!(
            engine.update_item(a.id, onto_b).await,
            Err(Error::Conflict { .. })
        ));
        assert_eq!(engine.get_item(a.id).await.unwrap().scheduled_for, monday(10, 30));
    }

    #[tokio::test]
    async fn state_machine_transitions() {
        let engine = engine();
        let id = engine.add_item(task("a", monday(10, 0))).await.unwrap().item.id;
        assert_eq!(engine.get_item(id).await.unwrap().status, ItemStatus::Draft);

        engine.schedule_item(id).await.unwrap();
        assert!(matches!(
            engine.schedule_item(id).await,
            Err(Error::InvalidTransition { action: "schedule", .. })
        ));

        engine.cancel_item(id).await.unwrap();
        assert!(matches!(
            engine.update_item(id, ItemPatch::default()).await,
            Err(Error::InvalidTransition { action: "update", .. })
        ));
        engine.archive_item(id).await.unwrap();
        assert_eq!(engine.get_item(id).await.unwrap().status, ItemStatus::Archived);
    }

    #[tokio::test]
    async fn in_flight_items_cannot_be_removed() {
        let engine = engine();
        let id = engine.add_item(task("a", monday(10, 0))).await.unwrap().item.id;
        let guard = engine.in_flight().try_acquire(id).unwrap();
        assert!(matches!(engine.remove_item(id).await, Err(Error::InFlight(_))));
        assert!(matches!(engine.cancel_item(id).await, Err(Error::InFlight(_))));
        drop(guard);
        engine.remove_item(id).await.unwrap();
        assert!(engine.get_item(id).await.is_none());
    }

    #[tokio::test]
    async fn update_config_rejects_errors() {
        let engine = engine();
        let mut bad = engine.config();
        bad.max_concurrent_items = 0;
        assert!(matches!(engine.update_config(bad), Err(Error::Config(_))));

        let mut good = engine.config();
        good.buffer_minutes = 30;
        engine.update_config(good).unwrap();
        assert_eq!(engine.config().buffer_minutes, 30);
    }

    #[tokio::test]
    async fn optimize_apply_writes_back() {
        let mut config = Config::default();
        config.schedule.optimization.group_similar = false;
        config.schedule.optimization.prefer_optimal_times = false;
        let engine = SchedulingEngine::new(config, Arc::new(LogPublisher));
        let a = engine.add_item(task("a", monday(9, 0))).await.unwrap().item;
        let b = engine.add_item(task("b", monday(14, 0))).await.unwrap().item;

        // Force an overlap the add path would have refused.
        engine
            .inner
            .store
            .write_all(|map| {
                if let Some(item) = map.get_mut(&b.id) {
                    item.scheduled_for = a.scheduled_for;
                }
            })
            .await;

        let dry = engine.optimize(false).await;
        assert_eq!(dry.moved().len(), 1);
        let still = engine.get_item(b.id).await.unwrap();
        assert_eq!(still.scheduled_for, a.scheduled_for);

        engine.optimize(true).await;
        let a_now = engine.get_item(a.id).await.unwrap();
        let b_now = engine.get_item(b.id).await.unwrap();
        assert!(a_now.ends_at() <= b_now.scheduled_for || b_now.ends_at() <= a_now.scheduled_for);
    }

    #[tokio::test]
    async fn slots_reject_zero_duration() {
        let engine = engine();
        let err = engine
            .get_available_time_slots(monday(9, 0), monday(17, 0), 0, &SlotPreferences::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn slots_skip_booked_time() {
        let engine = engine();
        engine.add_item(task("a", monday(10, 0))).await.unwrap();
        let slots = engine
            .get_available_time_slots(monday(9, 0), monday(12, 0), 60, &SlotPreferences::default())
            .await
            .unwrap();
        assert!(slots
            .iter()
            .all(|s| s.end <= monday(10, 0) || s.start >= monday(11, 0)));
        assert_eq!(slots.first().map(|s| s.start), Some(monday(9, 0)));
    }

    #[tokio::test]
    async fn export_then_import_replace() {
        let engine = engine();
        engine.add_item(task("a", monday(10, 0))).await.unwrap();
        engine.add_item(task("b", monday(12, 0))).await.unwrap();
        let json = engine.export_json().await.unwrap();

        let other = self::engine();
        other.add_item(task("old", monday(15, 0))).await.unwrap();
        let report = other.import_json(&json, ImportMode::Replace).await.unwrap();
        assert_eq!(report.imported, 2);
        assert!(report.skipped.is_empty());
        let page = other.list_items(&ItemQuery::default()).await;
        let titles: Vec<_> = page.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }
}
