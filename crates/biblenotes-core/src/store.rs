//! Small persisted key-value preferences.
//!
//! Everything the UI remembers between sessions (selected version, pane
//! toggles, alignment overrides, the auth token) goes through the `KvStore`
//! port so tests can substitute an in-memory backend. Writes are
//! last-write-wins per key; all writers share the UI thread.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::align::AlignmentOverrides;

pub trait KvStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// JSON file on disk, one flat string map, written through on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self { path, values })
    }

    /// The conventional location under the user config directory
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("biblenotes").join("preferences.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        let write = || -> Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(&self.values)?;
            fs::write(&self.path, content)?;
            Ok(())
        };
        if let Err(err) = write() {
            tracing::warn!(path = %self.path.display(), %err, "failed to persist preferences");
        }
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
        self.persist();
    }

    fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.persist();
        }
    }
}

mod keys {
    pub const AUTH_TOKEN: &str = "authToken";
    pub const SELECTED_VERSION: &str = "selectedVersion";
    pub const RIGHT_PANE_TAB: &str = "rightPaneTab";
    pub const SELECTION_MODE: &str = "selectionMode";
    pub const SYNC_NOTES: &str = "syncNotes";
    pub const SELECTED_EDITION: &str = "selectedManuscriptEdition";
    pub const SELECTED_AUTHOR: &str = "selectedAuthorId";
    pub const CONCORDANCE_EXPANDED: &str = "concordanceExpanded";
    pub const LAST_WORD_TOKEN: &str = "lastWordSelectToken";
    pub const ALIGNMENT_OVERRIDES: &str = "alignmentOverrides";
}

/// Typed facade over the raw store
pub struct Preferences {
    store: Box<dyn KvStore>,
}

impl Preferences {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    fn set_or_remove(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(v) => self.store.set(key, v),
            None => self.store.remove(key),
        }
    }

    pub fn auth_token(&self) -> Option<String> {
        self.store.get(keys::AUTH_TOKEN)
    }

    pub fn set_auth_token(&mut self, token: Option<&str>) {
        self.set_or_remove(keys::AUTH_TOKEN, token);
    }

    pub fn selected_version(&self) -> Option<String> {
        self.store.get(keys::SELECTED_VERSION)
    }

    pub fn set_selected_version(&mut self, version: Option<&str>) {
        self.set_or_remove(keys::SELECTED_VERSION, version);
    }

    pub fn right_pane_tab(&self) -> Option<String> {
        self.store.get(keys::RIGHT_PANE_TAB)
    }

    pub fn set_right_pane_tab(&mut self, tab: &str) {
        self.store.set(keys::RIGHT_PANE_TAB, tab);
    }

    pub fn selection_mode(&self) -> Option<String> {
        self.store.get(keys::SELECTION_MODE)
    }

    pub fn set_selection_mode(&mut self, mode: &str) {
        self.store.set(keys::SELECTION_MODE, mode);
    }

    pub fn sync_notes(&self) -> bool {
        self.store.get(keys::SYNC_NOTES).as_deref() == Some("1")
    }

    pub fn set_sync_notes(&mut self, enabled: bool) {
        self.store.set(keys::SYNC_NOTES, if enabled { "1" } else { "0" });
    }

    pub fn selected_edition(&self) -> Option<String> {
        self.store.get(keys::SELECTED_EDITION)
    }

    pub fn set_selected_edition(&mut self, edition: Option<&str>) {
        self.set_or_remove(keys::SELECTED_EDITION, edition);
    }

    pub fn selected_author_id(&self) -> Option<i64> {
        self.store.get(keys::SELECTED_AUTHOR)?.parse().ok()
    }

    pub fn set_selected_author_id(&mut self, author_id: Option<i64>) {
        let value = author_id.map(|id| id.to_string());
        self.set_or_remove(keys::SELECTED_AUTHOR, value.as_deref());
    }

    pub fn concordance_expanded(&self) -> bool {
        self.store.get(keys::CONCORDANCE_EXPANDED).as_deref() == Some("1")
    }

    pub fn set_concordance_expanded(&mut self, expanded: bool) {
        self.store
            .set(keys::CONCORDANCE_EXPANDED, if expanded { "1" } else { "0" });
    }

    pub fn last_word_token(&self) -> Option<String> {
        self.store.get(keys::LAST_WORD_TOKEN)
    }

    pub fn set_last_word_token(&mut self, token: &str) {
        self.store.set(keys::LAST_WORD_TOKEN, token);
    }

    pub fn alignment_overrides(&self) -> AlignmentOverrides {
        self.store
            .get(keys::ALIGNMENT_OVERRIDES)
            .map(|json| AlignmentOverrides::from_json(&json))
            .unwrap_or_default()
    }

    pub fn set_alignment_overrides(&mut self, overrides: &AlignmentOverrides) {
        self.store.set(keys::ALIGNMENT_OVERRIDES, &overrides.to_json());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k"), None);
        store.set("k", "v");
        assert_eq!(store.get("k"), Some("v".to_string()));
        store.set("k", "v2");
        assert_eq!(store.get("k"), Some("v2".to_string()));
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        {
            let mut store = JsonFileStore::open(&path).unwrap();
            store.set("selectedVersion", "KJV");
            store.set("syncNotes", "1");
        }
        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("selectedVersion"), Some("KJV".to_string()));
        assert_eq!(store.get("syncNotes"), Some("1".to_string()));
    }

    #[test]
    fn file_store_tolerates_corrupt_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json at all").unwrap();
        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("anything"), None);
    }

    #[test]
    fn preferences_typed_accessors() {
        let mut prefs = Preferences::in_memory();
        assert!(!prefs.sync_notes());
        prefs.set_sync_notes(true);
        assert!(prefs.sync_notes());

        prefs.set_selected_author_id(Some(42));
        assert_eq!(prefs.selected_author_id(), Some(42));
        prefs.set_selected_author_id(None);
        assert_eq!(prefs.selected_author_id(), None);

        let mut overrides = prefs.alignment_overrides();
        assert!(overrides.is_empty());
        let key = AlignmentOverrides::key("John", 1, 1, 0);
        overrides.nudge(&key, 2);
        prefs.set_alignment_overrides(&overrides);
        assert_eq!(prefs.alignment_overrides().get(&key), 2);
    }

    #[test]
    fn auth_token_clears_on_logout() {
        let mut prefs = Preferences::in_memory();
        prefs.set_auth_token(Some("bearer-token"));
        assert_eq!(prefs.auth_token().as_deref(), Some("bearer-token"));
        prefs.set_auth_token(None);
        assert_eq!(prefs.auth_token(), None);
    }
}
