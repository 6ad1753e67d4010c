use crate::error::OverrideStoreError;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// User-chosen display names keyed by group id, stored as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupNameOverrides {
    names: BTreeMap<String, String>,
}

impl GroupNameOverrides {
    pub fn get(&self, group_id: &str) -> Option<&str> {
        self.names.get(group_id).map(|s| s.as_str())
    }

    /// Sets or, for a blank name, clears the override.
    pub fn set(&mut self, group_id: &str, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            self.names.remove(group_id);
        } else {
            self.names.insert(group_id.to_string(), name.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// File-backed store for [`GroupNameOverrides`].
#[derive(Debug, Clone)]
pub struct OverrideStore {
    path: PathBuf,
}

impl OverrideStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the store. A missing, unreadable or malformed file yields an
    /// empty mapping.
    pub fn load(&self) -> GroupNameOverrides {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return GroupNameOverrides::default(),
            Err(e) => {
                warn!("Failed to read group names {}: {}", self.path.display(), e);
                return GroupNameOverrides::default();
            }
        };

        match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
            Ok(names) => {
                info!("Loaded {} group names from {}", names.len(), self.path.display());
                GroupNameOverrides { names }
            }
            Err(e) => {
                warn!("Ignoring malformed group names {}: {}", self.path.display(), e);
                GroupNameOverrides::default()
            }
        }
    }

    /// Rewrites the whole file.
    pub fn save(&self, overrides: &GroupNameOverrides) -> Result<(), OverrideStoreError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }

        let text = serde_json::to_string_pretty(&overrides.names)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = OverrideStore::new(dir.path().join("nested").join("group_names.json"));

        let mut overrides = GroupNameOverrides::default();
        overrides.set("g1", "  Tea Club ");
        store.save(&overrides).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.get("g1"), Some("Tea Club"));
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_blank_name_clears_override() {
        let mut overrides = GroupNameOverrides::default();
        overrides.set("g1", "x");
        overrides.set("g1", "   ");
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = OverrideStore::new(dir.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_malformed_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("group_names.json");
        fs::write(&path, "{not json").unwrap();
        assert!(OverrideStore::new(path).load().is_empty());
    }

    #[test]
    fn test_file_is_flat_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("group_names.json");
        fs::write(&path, r#"{"grp_a": "Alpha", "grp_b": "Beta"}"#).unwrap();
        let loaded = OverrideStore::new(path).load();
        assert_eq!(loaded.get("grp_b"), Some("Beta"));
    }
}
