//! Durable storage for the ID mapping cache
//!
//! A [`MappingSnapshot`] holds every mapping entry recorded for one
//! instance pair. Storage backends load and save whole snapshots; the
//! in-process bookkeeping lives in [`crate::core::mapping::MappingStore`].

pub mod file;
pub mod memory;

use crate::domain::{EntityKind, InstancePairKey, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use file::FileMappingStorage;
pub use memory::MemoryMappingStorage;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted mapping entries of one instance pair
///
/// Entries are grouped by kind: `kind -> source id -> destination id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSnapshot {
    pub version: u32,

    /// Normalized source base URL the entries were recorded for
    pub source: String,

    /// Normalized destination base URL the entries were recorded for
    pub destination: String,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub entries: BTreeMap<EntityKind, BTreeMap<u64, u64>>,
}

impl MappingSnapshot {
    /// An empty snapshot for a pair
    pub fn empty(pair: &InstancePairKey) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            source: pair.source().to_string(),
            destination: pair.destination().to_string(),
            updated_at: None,
            entries: BTreeMap::new(),
        }
    }

    /// Whether the snapshot was recorded for this pair
    pub fn belongs_to(&self, pair: &InstancePairKey) -> bool {
        self.source == pair.source() && self.destination == pair.destination()
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage backend for mapping snapshots
#[async_trait]
pub trait MappingStorage: Send + Sync {
    /// Load the snapshot of a pair; an empty snapshot if none was saved yet
    ///
    /// # Errors
    ///
    /// Returns an error if a stored snapshot cannot be read or parsed.
    async fn load(&self, pair: &InstancePairKey) -> Result<MappingSnapshot>;

    /// Replace the stored snapshot of a pair
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    async fn save(&self, pair: &InstancePairKey, snapshot: &MappingSnapshot) -> Result<()>;

    /// Human-readable location of a pair's snapshot
    fn describe(&self, pair: &InstancePairKey) -> String;
}
