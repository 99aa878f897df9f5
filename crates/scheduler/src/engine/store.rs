//! ItemStore: the live item set with event broadcasting.
//!
//! Compound operations (check then insert, patch then validate) run their
//! whole closure under one write lock so no other writer can slip in
//! between the check and the write.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use cs_domain::item::{ItemStatus, ScheduleItem};
use cs_domain::{Error, Result};

pub type ItemMap = HashMap<Uuid, ScheduleItem>;

/// State changes broadcast to in-process subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ItemAdded { item: ScheduleItem },
    ItemUpdated { item: ScheduleItem },
    ItemRemoved { id: Uuid },
    StatusChanged {
        id: Uuid,
        from: ItemStatus,
        to: ItemStatus,
    },
    Optimized { moved: usize },
    Imported { count: usize },
}

pub struct ItemStore {
    inner: RwLock<ItemMap>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    pub async fn get(&self, id: &Uuid) -> Option<ScheduleItem> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn snapshot(&self) -> Vec<ScheduleItem> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Run `f` over the live map under a read lock.
    pub async fn with_items<T>(&self, f: impl FnOnce(&ItemMap) -> T) -> T {
        f(&*self.inner.read().await)
    }

    /// Run `check` against the current set and insert `item` only if it
    /// returns `Ok`.
    pub async fn insert_checked<T>(
        &self,
        item: ScheduleItem,
        check: impl FnOnce(&ScheduleItem, &ItemMap) -> Result<T>,
    ) -> Result<T> {
        let mut map = self.inner.write().await;
        let out = check(&item, &*map)?;
        map.insert(item.id, item.clone());
        drop(map);
        self.emit(EngineEvent::ItemAdded { item });
        Ok(out)
    }

    /// Apply `f` to a copy of item `id`; the copy replaces the original
    /// only if `f` returns `Ok`. `f` also sees the rest of the set.
    pub async fn mutate_with_snapshot<T>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut ScheduleItem, &ItemMap) -> Result<T>,
    ) -> Result<(ScheduleItem, T)> {
        let mut map = self.inner.write().await;
        let mut copy = map.get(id).cloned().ok_or(Error::NotFound(*id))?;
        let out = f(&mut copy, &*map)?;
        map.insert(copy.id, copy.clone());
        drop(map);
        self.emit(EngineEvent::ItemUpdated { item: copy.clone() });
        Ok((copy, out))
    }

    /// Move item `id` to `to` if `allowed(current)` holds, running `f` on
    /// it in the same critical section.
    pub async fn transition(
        &self,
        id: &Uuid,
        action: &'static str,
        allowed: impl FnOnce(ItemStatus) -> bool,
        to: ItemStatus,
        f: impl FnOnce(&mut ScheduleItem),
    ) -> Result<ScheduleItem> {
        self.transition_if(id, action, |it| allowed(it.status), to, f)
            .await
    }

    /// Like [`transition`](Self::transition), but the guard sees the whole
    /// item as it is under the lock.
    pub async fn transition_if(
        &self,
        id: &Uuid,
        action: &'static str,
        allowed: impl FnOnce(&ScheduleItem) -> bool,
        to: ItemStatus,
        f: impl FnOnce(&mut ScheduleItem),
    ) -> Result<ScheduleItem> {
        let mut map = self.inner.write().await;
        let item = map.get_mut(id).ok_or(Error::NotFound(*id))?;
        let from = item.status;
        if !allowed(item) {
            return Err(Error::InvalidTransition {
                id: *id,
                from,
                action,
            });
        }
        item.status = to;
        item.updated_at = Utc::now();
        f(item);
        let snapshot = item.clone();
        drop(map);
        self.emit(EngineEvent::StatusChanged { id: *id, from, to });
        Ok(snapshot)
    }

    /// In-place update with no status guard. Returns the updated item.
    pub async fn update(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut ScheduleItem),
    ) -> Option<ScheduleItem> {
        let mut map = self.inner.write().await;
        let item = map.get_mut(id)?;
        let from = item.status;
        f(item);
        item.updated_at = Utc::now();
        let snapshot = item.clone();
        drop(map);
        if snapshot.status != from {
            self.emit(EngineEvent::StatusChanged {
                id: *id,
                from,
                to: snapshot.status,
            });
        } else {
            self.emit(EngineEvent::ItemUpdated {
                item: snapshot.clone(),
            });
        }
        Some(snapshot)
    }

    /// Remove item `id` unless `blocked(status)` holds.
    pub async fn remove_unless(
        &self,
        id: &Uuid,
        blocked: impl FnOnce(ItemStatus) -> bool,
    ) -> Result<ScheduleItem> {
        let mut map = self.inner.write().await;
        let status = map.get(id).map(|i| i.status).ok_or(Error::NotFound(*id))?;
        if blocked(status) {
            return Err(Error::InvalidTransition {
                id: *id,
                from: status,
                action: "remove",
            });
        }
        let removed = map.remove(id).ok_or(Error::NotFound(*id))?;
        drop(map);
        self.emit(EngineEvent::ItemRemoved { id: *id });
        Ok(removed)
    }

    /// Scheduled items due at `now`, highest priority first, then earliest.
    pub async fn due_items(&self, now: DateTime<Utc>) -> Vec<ScheduleItem> {
        let mut due: Vec<ScheduleItem> = self
            .inner
            .read()
            .await
            .values()
            .filter(|i| i.status == ItemStatus::Scheduled && i.scheduled_for <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.scheduled_for.cmp(&b.scheduled_for))
        });
        due
    }

    /// Bulk write used by load/import/optimize. `f` gets the whole map.
    pub async fn write_all<T>(&self, f: impl FnOnce(&mut ItemMap) -> T) -> T {
        let mut map = self.inner.write().await;
        f(&mut *map)
    }
}
