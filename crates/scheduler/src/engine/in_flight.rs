//! In-flight set: the ids currently being processed.
//!
//! A guard is handed out per id and removes it again on drop, so the id is
//! released on every exit path (success, error, panic, cancellation).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InFlightSet {
    ids: Mutex<HashSet<Uuid>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`. Returns `None` if it is already in flight.
    pub fn try_acquire(self: &Arc<Self>, id: Uuid) -> Option<InFlightGuard> {
        if self.ids.lock().insert(id) {
            Some(InFlightGuard {
                set: Arc::clone(self),
                id,
            })
        } else {
            None
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}

/// Releases its id when dropped.
pub struct InFlightGuard {
    set: Arc<InFlightSet>,
    id: Uuid,
}

impl InFlightGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.ids.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flight_per_id() {
        let set = Arc::new(InFlightSet::new());
        let id = Uuid::new_v4();
        let guard = set.try_acquire(id).expect("first claim");
        assert!(set.try_acquire(id).is_none(), "second claim must fail");
        assert!(set.contains(&id));
        assert_eq!(guard.id(), id);
        drop(guard);
        assert!(!set.contains(&id));
        assert!(set.try_acquire(id).is_some(), "released after drop");
    }

    #[test]
    fn ids_are_independent() {
        let set = Arc::new(InFlightSet::new());
        let _a = set.try_acquire(Uuid::new_v4()).unwrap();
        let _b = set.try_acquire(Uuid::new_v4()).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn released_when_task_panics() {
        let set = Arc::new(InFlightSet::new());
        let id = Uuid::new_v4();
        let guard = set.try_acquire(id).unwrap();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("publisher blew up");
        });
        assert!(handle.await.is_err());
        assert!(set.is_empty());
    }
}
