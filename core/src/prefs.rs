//! Per-user preferences kept outside the remote files.
//!
//! The last submitted forward address and alias list are remembered here so
//! the options form can be pre-filled after forwarding or the vacation reply
//! has been switched off. The user's display name and address for the
//! vacation `From:` header are read from the same store.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Last submitted forward address.
pub const PREF_FORWARD: &str = "autorespond_forward";
/// Last submitted vacation aliases, joined with `", "`.
pub const PREF_ALIASES: &str = "autorespond_aliases";
pub const PREF_FULL_NAME: &str = "full_name";
pub const PREF_EMAIL: &str = "email_address";

pub trait PreferenceStore {
    fn get(&self, user: &str, key: &str) -> Option<String>;

    fn set(&mut self, user: &str, key: &str, value: &str);

    fn remove(&mut self, user: &str, key: &str);
}

/// Preferences held in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    values: HashMap<(String, String), String>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, user: &str, key: &str) -> Option<String> {
        self.values
            .get(&(user.to_string(), key.to_string()))
            .cloned()
    }

    fn set(&mut self, user: &str, key: &str, value: &str) {
        self.values
            .insert((user.to_string(), key.to_string()), value.to_string());
    }

    fn remove(&mut self, user: &str, key: &str) {
        self.values.remove(&(user.to_string(), key.to_string()));
    }
}

/// On-disk layout: user → key → value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PreferenceFile {
    users: BTreeMap<String, BTreeMap<String, String>>,
}

/// Preferences persisted to a JSON file, rewritten after every change.
///
/// A missing or unreadable file starts out empty. Write failures are logged
/// and leave the in-memory values in place.
#[derive(Debug)]
pub struct JsonPreferenceStore {
    path: PathBuf,
    data: PreferenceFile,
}

impl JsonPreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<PreferenceFile>(&contents) {
                Ok(data) => {
                    debug!(
                        "Loaded preferences for {} users from {}",
                        data.users.len(),
                        path.display()
                    );
                    data
                }
                Err(e) => {
                    warn!("Failed to parse preferences from {}: {e}", path.display());
                    PreferenceFile::default()
                }
            },
            Err(_) => {
                debug!("No preference file at {}", path.display());
                PreferenceFile::default()
            }
        };
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(
                    "Failed to create preference directory {}: {e}",
                    parent.display()
                );
                return;
            }
        }
        match serde_json::to_string_pretty(&self.data) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!("Failed to write preferences to {}: {e}", self.path.display());
                }
            }
            Err(e) => warn!("Failed to serialize preferences: {e}"),
        }
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn get(&self, user: &str, key: &str) -> Option<String> {
        self.data.users.get(user)?.get(key).cloned()
    }

    fn set(&mut self, user: &str, key: &str, value: &str) {
        self.data
            .users
            .entry(user.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.save();
    }

    fn remove(&mut self, user: &str, key: &str) {
        let Some(values) = self.data.users.get_mut(user) else {
            return;
        };
        if values.remove(key).is_none() {
            return;
        }
        if values.is_empty() {
            self.data.users.remove(user);
        }
        self.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_store_is_per_user() {
        let mut store = MemoryPreferenceStore::new();
        store.set("jdoe", PREF_FORWARD, "a@example.org");
        assert_eq!(store.get("jdoe", PREF_FORWARD).as_deref(), Some("a@example.org"));
        assert_eq!(store.get("sue", PREF_FORWARD), None);
        store.remove("jdoe", PREF_FORWARD);
        assert_eq!(store.get("jdoe", PREF_FORWARD), None);
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs").join("autorespond.json");

        let mut store = JsonPreferenceStore::open(&path);
        store.set("jdoe", PREF_ALIASES, "sue, bob");
        store.set("jdoe", PREF_FULL_NAME, "Jane Doe");
        store.remove("jdoe", PREF_FULL_NAME);

        let reopened = JsonPreferenceStore::open(&path);
        assert_eq!(reopened.get("jdoe", PREF_ALIASES).as_deref(), Some("sue, bob"));
        assert_eq!(reopened.get("jdoe", PREF_FULL_NAME), None);
    }

    #[test]
    fn removing_last_key_drops_the_user() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.json");
        let mut store = JsonPreferenceStore::open(&path);
        store.set("jdoe", PREF_FORWARD, "x@example.org");
        store.remove("jdoe", PREF_FORWARD);

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["users"], serde_json::json!({}));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonPreferenceStore::open(&path);
        assert_eq!(store.get("jdoe", PREF_FORWARD), None);
    }
}
