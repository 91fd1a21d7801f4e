use std::collections::HashMap;
use std::sync::RwLock;

/// Language name → id. Language rows never change while the process runs.
#[derive(Debug, Default)]
pub struct LanguageCache {
    ids: RwLock<HashMap<String, i64>>,
}

impl LanguageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.ids.read().ok()?.get(name).copied()
    }

    pub fn insert(&self, name: &str, id: i64) {
        if let Ok(mut ids) = self.ids.write() {
            ids.insert(name.to_string(), id);
        }
    }
}
