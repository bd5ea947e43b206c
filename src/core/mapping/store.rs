//! Mapping store for cross-instance ID correspondences
//!
//! The store is the only mutable state shared between concurrently copied
//! roots. Lookups are synchronous; persistence goes through a
//! [`MappingStorage`] backend.

use crate::adapters::cache::{MappingSnapshot, MappingStorage, MemoryMappingStorage};
use crate::domain::{
    DashcloneError, EntityId, EntityKind, EntityRef, InstancePairKey, MappingConflict, Result,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Outcome of [`MappingStore::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new entry was recorded
    Inserted,
    /// The same entry already existed
    Unchanged,
    /// A different destination ID was already recorded; the existing entry is kept
    Conflict(MappingConflict),
}

/// Mapping store for one instance pair
///
/// # Example
///
/// ```
/// use dashclone::core::mapping::{MappingStore, PutOutcome};
/// use dashclone::domain::{EntityId, EntityRef, InstancePairKey};
///
/// let pair = InstancePairKey::new("https://staging.example.com", "https://bi.example.com").unwrap();
/// let store = MappingStore::in_memory(pair);
///
/// let question = EntityRef::question(EntityId::new(12).unwrap());
/// let destination = EntityId::new(40).unwrap();
/// assert_eq!(store.put(question, destination), PutOutcome::Inserted);
/// assert_eq!(store.get(question), Some(destination));
/// ```
pub struct MappingStore {
    pair: InstancePairKey,
    storage: Arc<dyn MappingStorage>,
    entries: RwLock<HashMap<EntityRef, EntityId>>,
    /// Entries dropped since the last flush; their stored values are discarded
    removed: Mutex<HashSet<EntityRef>>,
    locks: Mutex<HashMap<EntityRef, Arc<AsyncMutex<()>>>>,
    dirty: AtomicBool,
}

impl MappingStore {
    /// Open the store of a pair, loading its persisted snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded or was recorded for
    /// a different instance pair.
    pub async fn open(pair: InstancePairKey, storage: Arc<dyn MappingStorage>) -> Result<Self> {
        let snapshot = storage.load(&pair).await?;
        if !snapshot.belongs_to(&pair) {
            return Err(DashcloneError::Cache(format!(
                "Mapping cache {} was recorded for {} -> {}, not {}",
                storage.describe(&pair),
                snapshot.source,
                snapshot.destination,
                pair
            )));
        }

        let entries = entries_from_snapshot(&snapshot);
        tracing::debug!(
            pair = %pair,
            entries = entries.len(),
            location = %storage.describe(&pair),
            "Mapping store opened"
        );

        Ok(Self {
            pair,
            storage,
            entries: RwLock::new(entries),
            removed: Mutex::new(HashSet::new()),
            locks: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        })
    }

    /// An empty store persisted only in memory
    pub fn in_memory(pair: InstancePairKey) -> Self {
        Self {
            pair,
            storage: Arc::new(MemoryMappingStorage::new()),
            entries: RwLock::new(HashMap::new()),
            removed: Mutex::new(HashSet::new()),
            locks: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Instance pair the store is scoped to
    pub fn pair(&self) -> &InstancePairKey {
        &self.pair
    }

    /// Where the store persists its snapshot
    pub fn location(&self) -> String {
        self.storage.describe(&self.pair)
    }

    /// Destination ID recorded for a source entity
    pub fn get(&self, reference: EntityRef) -> Option<EntityId> {
        self.read_entries().get(&reference).copied()
    }

    /// Record a mapping entry
    ///
    /// Entries are never overwritten: proposing a different destination ID
    /// for a mapped entity returns [`PutOutcome::Conflict`].
    pub fn put(&self, reference: EntityRef, destination: EntityId) -> PutOutcome {
        let mut entries = self.write_entries();
        match entries.get(&reference) {
            Some(existing) if *existing == destination => PutOutcome::Unchanged,
            Some(existing) => PutOutcome::Conflict(MappingConflict {
                entity: reference,
                existing: *existing,
                proposed: destination,
            }),
            None => {
                entries.insert(reference, destination);
                self.dirty.store(true, Ordering::SeqCst);
                PutOutcome::Inserted
            }
        }
    }

    /// Acquire the per-entity lock
    ///
    /// Held around check, create and put so concurrently copied roots never
    /// create the same entity twice.
    pub async fn lock(&self, reference: EntityRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(reference)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Forget one entry
    pub fn remove(&self, reference: EntityRef) -> Option<EntityId> {
        let removed = self.write_entries().remove(&reference);
        if removed.is_some() {
            self.lock_removed().insert(reference);
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    /// Forget every entry of a kind; returns the number removed
    pub fn clear(&self, kind: EntityKind) -> usize {
        let mut entries = self.write_entries();
        let doomed: Vec<EntityRef> = entries.keys().filter(|r| r.kind == kind).copied().collect();
        for reference in &doomed {
            entries.remove(reference);
        }
        self.lock_removed().extend(doomed.iter().copied());
        if !doomed.is_empty() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        doomed.len()
    }

    /// All entries, optionally restricted to one kind, sorted by reference
    pub fn entries(&self, kind: Option<EntityKind>) -> Vec<(EntityRef, EntityId)> {
        let mut entries: Vec<(EntityRef, EntityId)> = self
            .read_entries()
            .iter()
            .filter(|(reference, _)| kind.map_or(true, |k| reference.kind == k))
            .map(|(reference, id)| (*reference, *id))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether entries changed since the last flush
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Persist the entries
    ///
    /// Entries saved by another run since this store was opened are merged
    /// in, unless this store removed them. A stored entry wins over a
    /// different local one, as in [`MappingStore::put`]; each such
    /// disagreement is returned as a [`MappingConflict`].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn flush(&self) -> Result<Vec<MappingConflict>> {
        let stored = self.storage.load(&self.pair).await?;
        let mut conflicts = Vec::new();
        if stored.belongs_to(&self.pair) {
            let removed = self.lock_removed().clone();
            let mut entries = self.write_entries();
            for (reference, id) in entries_from_snapshot(&stored) {
                if removed.contains(&reference) {
                    continue;
                }
                if let Some(local) = entries.insert(reference, id) {
                    if local != id {
                        conflicts.push(MappingConflict {
                            entity: reference,
                            existing: id,
                            proposed: local,
                        });
                    }
                }
            }
        }

        for conflict in &conflicts {
            tracing::warn!(
                conflict = %conflict,
                location = %self.location(),
                "Mapping cache was changed by another run"
            );
        }

        let snapshot = self.snapshot();
        self.storage.save(&self.pair, &snapshot).await?;
        self.dirty.store(false, Ordering::SeqCst);
        self.lock_removed().clear();
        Ok(conflicts)
    }

    fn snapshot(&self) -> MappingSnapshot {
        let mut snapshot = MappingSnapshot::empty(&self.pair);
        snapshot.updated_at = Some(Utc::now());
        for (reference, id) in self.read_entries().iter() {
            snapshot
                .entries
                .entry(reference.kind)
                .or_default()
                .insert(reference.id.get(), id.get());
        }
        snapshot
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<EntityRef, EntityId>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<EntityRef, EntityId>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_removed(&self) -> std::sync::MutexGuard<'_, HashSet<EntityRef>> {
        self.removed.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn entries_from_snapshot(snapshot: &MappingSnapshot) -> HashMap<EntityRef, EntityId> {
    let mut entries = HashMap::new();
    for (kind, ids) in &snapshot.entries {
        for (source, destination) in ids {
            match (EntityId::new(*source), EntityId::new(*destination)) {
                (Ok(source), Ok(destination)) => {
                    entries.insert(EntityRef::new(*kind, source), destination);
                }
                _ => tracing::warn!(
                    kind = %kind,
                    source = source,
                    destination = destination,
                    "Ignoring invalid mapping cache entry"
                ),
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pair() -> InstancePairKey {
        InstancePairKey::new("https://staging.example.com", "https://bi.example.com").unwrap()
    }

    fn id(n: u64) -> EntityId {
        EntityId::new(n).unwrap()
    }

    #[test]
    fn test_put_outcomes() {
        let store = MappingStore::in_memory(pair());
        let question = EntityRef::question(id(12));

        assert_eq!(store.put(question, id(40)), PutOutcome::Inserted);
        assert_eq!(store.put(question, id(40)), PutOutcome::Unchanged);
        assert_eq!(
            store.put(question, id(41)),
            PutOutcome::Conflict(MappingConflict {
                entity: question,
                existing: id(40),
                proposed: id(41),
            })
        );
        assert_eq!(store.get(question), Some(id(40)));
    }

    #[test]
    fn test_kinds_are_separate_namespaces() {
        let store = MappingStore::in_memory(pair());
        store.put(EntityRef::question(id(5)), id(50));
        assert_eq!(store.get(EntityRef::dashboard(id(5))), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = MappingStore::in_memory(pair());
        store.put(EntityRef::question(id(1)), id(10));
        store.put(EntityRef::question(id(2)), id(20));
        store.put(EntityRef::collection(id(1)), id(30));

        assert_eq!(store.remove(EntityRef::question(id(1))), Some(id(10)));
        assert_eq!(store.remove(EntityRef::question(id(1))), None);
        assert_eq!(store.clear(EntityKind::Question), 1);
        assert_eq!(
            store.entries(None),
            vec![(EntityRef::collection(id(1)), id(30))]
        );
    }

    #[tokio::test]
    async fn test_flush_and_reopen() {
        let storage = Arc::new(MemoryMappingStorage::new());
        let store = MappingStore::open(pair(), storage.clone()).await.unwrap();
        store.put(EntityRef::dashboard(id(3)), id(33));
        assert!(store.is_dirty());
        store.flush().await.unwrap();
        assert!(!store.is_dirty());

        let reopened = MappingStore::open(pair(), storage).await.unwrap();
        assert_eq!(reopened.get(EntityRef::dashboard(id(3))), Some(id(33)));
    }

    #[tokio::test]
    async fn test_flush_merges_entries_saved_elsewhere() {
        let storage = Arc::new(MemoryMappingStorage::new());
        let first = MappingStore::open(pair(), storage.clone()).await.unwrap();
        let second = MappingStore::open(pair(), storage.clone()).await.unwrap();

        first.put(EntityRef::question(id(1)), id(10));
        first.flush().await.unwrap();
        second.put(EntityRef::question(id(2)), id(20));
        second.flush().await.unwrap();

        let reopened = MappingStore::open(pair(), storage).await.unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_keeps_entry_saved_first() {
        let storage = Arc::new(MemoryMappingStorage::new());
        let first = MappingStore::open(pair(), storage.clone()).await.unwrap();
        let second = MappingStore::open(pair(), storage.clone()).await.unwrap();
        let question = EntityRef::question(id(1));

        first.put(question, id(10));
        assert!(first.flush().await.unwrap().is_empty());
        second.put(question, id(20));
        let conflicts = second.flush().await.unwrap();

        assert_eq!(
            conflicts,
            vec![MappingConflict {
                entity: question,
                existing: id(10),
                proposed: id(20),
            }]
        );
        assert_eq!(second.get(question), Some(id(10)));
        let reopened = MappingStore::open(pair(), storage).await.unwrap();
        assert_eq!(reopened.get(question), Some(id(10)));
    }

    #[tokio::test]
    async fn test_removed_then_recorded_entry_replaces_stored_one() {
        let storage = Arc::new(MemoryMappingStorage::new());
        let store = MappingStore::open(pair(), storage.clone()).await.unwrap();
        let question = EntityRef::question(id(1));
        store.put(question, id(10));
        store.flush().await.unwrap();

        store.remove(question);
        store.put(question, id(11));
        assert!(store.flush().await.unwrap().is_empty());

        let reopened = MappingStore::open(pair(), storage).await.unwrap();
        assert_eq!(reopened.get(question), Some(id(11)));
    }

    #[tokio::test]
    async fn test_flush_honors_removals() {
        let storage = Arc::new(MemoryMappingStorage::new());
        let store = MappingStore::open(pair(), storage.clone()).await.unwrap();
        store.put(EntityRef::question(id(1)), id(10));
        store.flush().await.unwrap();

        store.remove(EntityRef::question(id(1)));
        store.flush().await.unwrap();

        let reopened = MappingStore::open(pair(), storage).await.unwrap();
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_for_other_pair_is_rejected() {
        let storage = Arc::new(MemoryMappingStorage::new());
        let other =
            InstancePairKey::new("https://other.example.com", "https://bi.example.com").unwrap();
        storage.insert(&pair(), MappingSnapshot::empty(&other));

        let result = MappingStore::open(pair(), storage).await;
        assert!(matches!(result, Err(DashcloneError::Cache(_))));
    }

    #[tokio::test]
    async fn test_lock_serializes_same_key() {
        let store = Arc::new(MappingStore::in_memory(pair()));
        let reference = EntityRef::collection(id(1));

        let guard = store.lock(reference).await;
        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _guard = store.lock(reference).await;
                store.get(reference)
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.put(reference, id(99));
        drop(guard);

        assert_eq!(contender.await.unwrap(), Some(id(99)));
    }

    #[tokio::test]
    async fn test_lock_different_keys_do_not_block() {
        let store = MappingStore::in_memory(pair());
        let _first = store.lock(EntityRef::collection(id(1))).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            store.lock(EntityRef::collection(id(2))),
        )
        .await;
        assert!(second.is_ok());
    }
}
