//! JSON file mapping storage
//!
//! Layout: `<folder>/<pair storage id>/mappings.json`. Saves go through a
//! temporary file and a rename so a crash never leaves a truncated snapshot.

use super::{MappingSnapshot, MappingStorage};
use crate::domain::{DashcloneError, InstancePairKey, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const SNAPSHOT_FILE: &str = "mappings.json";

/// Mapping storage backed by JSON files
#[derive(Debug, Clone)]
pub struct FileMappingStorage {
    folder: PathBuf,
}

impl FileMappingStorage {
    /// Create a storage rooted at `folder`; nothing is created until the first save
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Path of a pair's snapshot file
    pub fn snapshot_path(&self, pair: &InstancePairKey) -> PathBuf {
        self.folder.join(pair.storage_id()).join(SNAPSHOT_FILE)
    }
}

#[async_trait]
impl MappingStorage for FileMappingStorage {
    async fn load(&self, pair: &InstancePairKey) -> Result<MappingSnapshot> {
        let path = self.snapshot_path(pair);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No mapping cache yet");
                return Ok(MappingSnapshot::empty(pair));
            }
            Err(e) => {
                return Err(DashcloneError::Cache(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            DashcloneError::Cache(format!("Corrupt mapping cache {}: {e}", path.display()))
        })
    }

    async fn save(&self, pair: &InstancePairKey, snapshot: &MappingSnapshot) -> Result<()> {
        let path = self.snapshot_path(pair);
        let dir = path
            .parent()
            .ok_or_else(|| DashcloneError::Cache(format!("Invalid cache path {}", path.display())))?;
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            DashcloneError::Cache(format!("Failed to create {}: {e}", dir.display()))
        })?;

        let json = serde_json::to_string_pretty(snapshot)?;
        let temp = path.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await.map_err(|e| {
            DashcloneError::Cache(format!("Failed to write {}: {e}", temp.display()))
        })?;
        tokio::fs::rename(&temp, &path).await.map_err(|e| {
            DashcloneError::Cache(format!("Failed to replace {}: {e}", path.display()))
        })?;

        tracing::debug!(path = %path.display(), entries = snapshot.len(), "Mapping cache saved");
        Ok(())
    }

    fn describe(&self, pair: &InstancePairKey) -> String {
        self.snapshot_path(pair).display().to_string()
    }
}
