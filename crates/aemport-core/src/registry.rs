//! Persistent registry of generated artifacts, keyed by component id.
//!
//! The whole table lives in one JSON document that is read on open and
//! rewritten on every mutation. Entries whose artifact file has vanished
//! are pruned when they are looked up. One writer per output directory.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::Result;
use crate::obs;

/// File name of the registry document inside an output directory.
pub const REGISTRY_FILE: &str = ".component_registry.json";

/// A previously generated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub component_id: String,
    pub artifact_path: PathBuf,
    pub style_path: Option<PathBuf>,
    pub display_name: String,
}

impl RegistryEntry {
    pub fn is_live(&self) -> bool {
        self.artifact_path.is_file()
    }
}

/// On-disk shape of one entry; the component id is the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    artifact_path: PathBuf,
    #[serde(default)]
    style_path: Option<PathBuf>,
    #[serde(default)]
    display_name: String,
}

impl StoredEntry {
    fn into_entry(self, component_id: &str) -> RegistryEntry {
        RegistryEntry {
            component_id: component_id.to_string(),
            artifact_path: self.artifact_path,
            style_path: self.style_path,
            display_name: self.display_name,
        }
    }
}

/// Write-through artifact registry.
#[derive(Debug)]
pub struct ArtifactRegistry {
    path: PathBuf,
    entries: BTreeMap<String, StoredEntry>,
}

impl ArtifactRegistry {
    /// Load the registry document at `path`. A missing document is an empty
    /// registry; an unparseable one is logged and replaced on next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        registry = %path.display(),
                        error = %e,
                        "registry document is corrupt; starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(registry = %path.display(), entries = entries.len(), "registry loaded");
        Ok(Self { path, entries })
    }

    /// Registry stored as [`REGISTRY_FILE`] inside `output_dir`.
    pub fn in_output_dir(output_dir: &Path) -> Result<Self> {
        Self::open(output_dir.join(REGISTRY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `id` if its artifact still exists. A stale entry is removed
    /// and the document rewritten before returning `None`.
    pub fn get(&mut self, id: &str) -> Result<Option<RegistryEntry>> {
        let Some(stored) = self.entries.get(id) else {
            return Ok(None);
        };
        if stored.artifact_path.is_file() {
            return Ok(Some(stored.clone().into_entry(id)));
        }
        let missing = stored.artifact_path.clone();
        self.entries.remove(id);
        self.persist()?;
        obs::emit_registry_pruned(id, &missing);
        Ok(None)
    }

    /// Whether a live artifact is registered for `id`. Never a stale positive.
    pub fn has(&mut self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Insert or replace an entry and persist immediately.
    pub fn put(&mut self, entry: RegistryEntry) -> Result<()> {
        let id = entry.component_id.clone();
        self.entries.insert(
            id,
            StoredEntry {
                artifact_path: entry.artifact_path,
                style_path: entry.style_path,
                display_name: entry.display_name,
            },
        );
        self.persist()
    }

    /// Remove `id`; returns whether it was present.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        if self.entries.remove(id).is_none() {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Live entries for the given ids, in input order. Stale ones are pruned.
    pub fn existing_for(&mut self, ids: &[String]) -> Result<Vec<RegistryEntry>> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(entry) = self.get(id)? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Every entry as stored, without liveness checks.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.entries
            .iter()
            .map(|(id, stored)| stored.clone().into_entry(id))
            .collect()
    }

    /// Drop every stale entry; returns the pruned ids.
    pub fn prune(&mut self) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, stored)| !stored.artifact_path.is_file())
            .map(|(id, _)| id.clone())
            .collect();
        if stale.is_empty() {
            return Ok(stale);
        }
        for id in &stale {
            if let Some(stored) = self.entries.remove(id) {
                obs::emit_registry_pruned(id, &stored.artifact_path);
            }
        }
        self.persist()?;
        Ok(stale)
    }

    /// Rewrite the whole document atomically (temp file + rename).
    fn persist(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_vec_pretty(&self.entries)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dir: &Path, id: &str, name: &str) -> RegistryEntry {
        let artifact = dir.join(format!("{name}.jsx"));
        std::fs::write(&artifact, "export default function X() {}").unwrap();
        RegistryEntry {
            component_id: id.to_string(),
            artifact_path: artifact,
            style_path: None,
            display_name: name.to_string(),
        }
    }

    #[test]
    fn test_missing_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ArtifactRegistry::in_output_dir(dir.path()).unwrap();
        assert!(registry.is_empty());
        assert!(!registry.path().exists());
    }

    #[test]
    fn test_corrupt_document_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(REGISTRY_FILE), "{ not json").unwrap();
        let mut registry = ArtifactRegistry::in_output_dir(dir.path()).unwrap();
        assert!(registry.is_empty());

        registry.put(entry(dir.path(), "site/card", "Card")).unwrap();
        let reopened = ArtifactRegistry::in_output_dir(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_document_shape_is_keyed_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ArtifactRegistry::in_output_dir(dir.path()).unwrap();
        registry.put(entry(dir.path(), "site/card", "Card")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(registry.path()).unwrap()).unwrap();
        assert_eq!(raw["site/card"]["display_name"], "Card");
        assert!(raw["site/card"]["artifact_path"].is_string());
        assert!(raw["site/card"]["style_path"].is_null());
    }

    #[test]
    fn test_remove_unknown_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ArtifactRegistry::in_output_dir(dir.path()).unwrap();
        assert!(!registry.remove("nope").unwrap());
    }
}
