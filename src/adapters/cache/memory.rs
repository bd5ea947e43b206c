//! In-memory mapping storage

use super::{MappingSnapshot, MappingStorage};
use crate::domain::{InstancePairKey, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mapping storage that lives as long as the process
///
/// Used by tests and by dry runs, which must not touch the file cache.
#[derive(Debug, Default)]
pub struct MemoryMappingStorage {
    snapshots: Mutex<HashMap<String, MappingSnapshot>>,
    saves: AtomicUsize,
}

impl MemoryMappingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot, e.g. one recorded for another pair
    pub fn insert(&self, pair: &InstancePairKey, snapshot: MappingSnapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(pair.storage_id(), snapshot);
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MappingStorage for MemoryMappingStorage {
    async fn load(&self, pair: &InstancePairKey) -> Result<MappingSnapshot> {
        let snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(snapshots
            .get(&pair.storage_id())
            .cloned()
            .unwrap_or_else(|| MappingSnapshot::empty(pair)))
    }

    async fn save(&self, pair: &InstancePairKey, snapshot: &MappingSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(pair.storage_id(), snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self, pair: &InstancePairKey) -> String {
        format!("memory:{}", pair.storage_id())
    }
}
