/// Key-value persistence for the opaque story state blob.
use rustc_hash::FxHashMap;

/// Fixed key under which the story state is stored.
pub const STORY_STATE_KEY: &str = "StoryState";

/// A generic string key-value store (player preferences, save slot, ...).
pub trait StateStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

/// In-memory store, used by tests and tools.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    values: FxHashMap<String, String>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }
}
