//! Per-item lock handles serializing concurrent field writes

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use quarry_core::ItemId;

/// Provider of per-item mutual-exclusion handles.
///
/// Get-or-create semantics: two concurrent calls with the same item id
/// must resolve to the same handle. There is no explicit teardown.
pub trait LockManager: Send + Sync {
    fn lock_handle(&self, item_id: ItemId) -> Arc<Mutex<()>>;
}

/// Default [`LockManager`] backed by a weak-retained registry.
///
/// The registry holds only `Weak` entries, so a handle lives exactly as
/// long as some save is holding or awaiting it; dead entries are swept
/// whenever a new handle is created.
#[derive(Default)]
pub struct ItemLockManager {
    locks: Mutex<HashMap<ItemId, Weak<Mutex<()>>>>,
}

impl ItemLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handles currently tracked.
    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LockManager for ItemLockManager {
    fn lock_handle(&self, item_id: ItemId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = locks.get(&item_id).and_then(Weak::upgrade) {
            return handle;
        }
        locks.retain(|_, weak| weak.strong_count() > 0);
        let handle = Arc::new(Mutex::new(()));
        locks.insert(item_id, Arc::downgrade(&handle));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn same_item_resolves_same_handle() {
        let manager = ItemLockManager::new();
        let id = Uuid::new_v4();
        let first = manager.lock_handle(id);
        let second = manager.lock_handle(id);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn different_items_get_different_handles() {
        let manager = ItemLockManager::new();
        let first = manager.lock_handle(Uuid::new_v4());
        let second = manager.lock_handle(Uuid::new_v4());
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn dropped_handles_are_swept() {
        let manager = ItemLockManager::new();
        for _ in 0..64 {
            drop(manager.lock_handle(Uuid::new_v4()));
        }
        let kept = manager.lock_handle(Uuid::new_v4());
        assert_eq!(manager.len(), 1);
        drop(kept);
        assert!(manager.is_empty());
    }

    #[test]
    fn handle_survives_while_held() {
        let manager = ItemLockManager::new();
        let id = Uuid::new_v4();
        let held = manager.lock_handle(id);
        // Churn other items; the held handle must keep its identity.
        for _ in 0..16 {
            drop(manager.lock_handle(Uuid::new_v4()));
        }
        let again = manager.lock_handle(id);
        assert!(Arc::ptr_eq(&held, &again));
    }

    #[test]
    fn concurrent_callers_share_one_handle() {
        let manager = Arc::new(ItemLockManager::new());
        let id = Uuid::new_v4();
        let anchor = manager.lock_handle(id);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.lock_handle(id))
            })
            .collect();
        for thread in handles {
            let handle = thread.join().expect("lock thread panicked");
            assert!(Arc::ptr_eq(&anchor, &handle));
        }
    }
}
