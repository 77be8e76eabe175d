//! In-memory caches invalidated by the save path

use std::collections::HashMap;
use std::sync::Mutex;

use quarry_core::{ItemDefinition, ItemId, Language};

/// Cache of item definitions, populated by reads and evicted on save.
#[derive(Default)]
pub struct PrefetchCache {
    entries: Mutex<HashMap<ItemId, ItemDefinition>>,
}

impl PrefetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_id: ItemId) -> Option<ItemDefinition> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&item_id).cloned()
    }

    pub fn insert(&self, definition: ItemDefinition) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(definition.id, definition);
    }

    pub fn remove(&self, item_id: ItemId) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&item_id);
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazily loaded language list, reset when a language-definition item is
/// saved.
#[derive(Default)]
pub struct LanguageCache {
    languages: Mutex<Option<Vec<Language>>>,
}

impl LanguageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Vec<Language>> {
        let languages = self.languages.lock().unwrap_or_else(|e| e.into_inner());
        languages.clone()
    }

    pub fn set(&self, loaded: Vec<Language>) {
        let mut languages = self.languages.lock().unwrap_or_else(|e| e.into_inner());
        *languages = Some(loaded);
    }

    pub fn clear(&self) {
        let mut languages = self.languages.lock().unwrap_or_else(|e| e.into_inner());
        *languages = None;
    }

    pub fn is_loaded(&self) -> bool {
        let languages = self.languages.lock().unwrap_or_else(|e| e.into_inner());
        languages.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn definition(name: &str) -> ItemDefinition {
        ItemDefinition::new(Uuid::new_v4(), name, Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn prefetch_insert_get_remove() {
        let cache = PrefetchCache::new();
        let def = definition("home");
        let id = def.id;
        cache.insert(def.clone());
        assert_eq!(cache.get(id), Some(def));
        cache.remove(id);
        assert_eq!(cache.get(id), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn removing_missing_entry_is_a_noop() {
        let cache = PrefetchCache::new();
        cache.insert(definition("home"));
        cache.remove(Uuid::new_v4());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn language_cache_set_and_clear() {
        let cache = LanguageCache::new();
        assert!(!cache.is_loaded());
        cache.set(vec!["da".into(), "en".into()]);
        assert_eq!(cache.get(), Some(vec!["da".into(), "en".into()]));
        cache.clear();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get(), None);
    }
}
