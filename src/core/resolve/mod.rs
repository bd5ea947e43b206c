//! Dependency resolution
//!
//! Computes the ordered, deduplicated set of source entities that must exist
//! at the destination before a root can be created there.

use crate::adapters::InstanceClient;
use crate::core::mapping::MappingStore;
use crate::domain::{CopyError, Entity, EntityId, EntityRef, InstanceError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Whether a resolved entity still has to be created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    /// No mapping entry exists yet
    Pending,
    /// Already mapped to this destination ID
    AlreadySatisfied(EntityId),
}

/// One entity of a resolution, with its source representation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub reference: EntityRef,
    pub entity: Entity,
    pub status: ResolutionStatus,
}

/// Dependencies of a root in creation order; the root comes last
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub root: EntityRef,
    pub entities: Vec<ResolvedEntity>,
}

impl Resolution {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// References in creation order
    pub fn references(&self) -> Vec<EntityRef> {
        self.entities.iter().map(|e| e.reference).collect()
    }

    /// Entities that have no mapping entry yet
    pub fn pending(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.entities
            .iter()
            .filter(|e| e.status == ResolutionStatus::Pending)
    }
}

struct Frame {
    reference: EntityRef,
    entity: Entity,
    dependencies: Vec<EntityRef>,
    next: usize,
}

impl Frame {
    fn new(entity: Entity) -> Self {
        Self {
            reference: entity.reference(),
            dependencies: entity.references(),
            entity,
            next: 0,
        }
    }
}

/// Resolver for one copy pass
///
/// Source representations are fetched once and memoized for the lifetime of
/// the resolver, which is shared by every root of the pass.
pub struct DependencyResolver {
    source: Arc<dyn InstanceClient>,
    store: Arc<MappingStore>,
    fetched: Mutex<HashMap<EntityRef, Entity>>,
}

impl DependencyResolver {
    pub fn new(source: Arc<dyn InstanceClient>, store: Arc<MappingStore>) -> Self {
        Self {
            source,
            store,
            fetched: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve every dependency of `root`
    ///
    /// Depth-first with an explicit stack. An entity appears once, after all
    /// of its dependencies. Mapped entities are still traversed so a broken
    /// chain below them is reported.
    ///
    /// # Errors
    ///
    /// - `CyclicDependency` naming the cycle in path order
    /// - `DanglingReference` if a referenced entity (or the root) is missing
    /// - `InstanceClient` if the source fails for any other reason
    pub async fn resolve(&self, root: EntityRef) -> Result<Resolution, CopyError> {
        let root_entity = self.fetch(root, root).await?;

        let mut stack = vec![Frame::new(root_entity)];
        let mut on_path: HashSet<EntityRef> = HashSet::from([root]);
        let mut done: HashSet<EntityRef> = HashSet::new();
        let mut entities = Vec::new();

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.dependencies.len() {
                let dependency = frame.dependencies[frame.next];
                let referrer = frame.reference;
                frame.next += 1;

                if done.contains(&dependency) {
                    continue;
                }
                if on_path.contains(&dependency) {
                    return Err(CopyError::CyclicDependency {
                        cycle: cycle_through(&stack, dependency),
                    });
                }

                let entity = self.fetch(dependency, referrer).await?;
                on_path.insert(dependency);
                stack.push(Frame::new(entity));
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            on_path.remove(&frame.reference);
            done.insert(frame.reference);

            let status = match self.store.get(frame.reference) {
                Some(id) => ResolutionStatus::AlreadySatisfied(id),
                None => ResolutionStatus::Pending,
            };
            entities.push(ResolvedEntity {
                reference: frame.reference,
                entity: frame.entity,
                status,
            });
        }

        tracing::debug!(
            root = %root,
            entities = entities.len(),
            "Dependencies resolved"
        );
        Ok(Resolution { root, entities })
    }

    async fn fetch(&self, reference: EntityRef, referrer: EntityRef) -> Result<Entity, CopyError> {
        if let Some(entity) = self.lock_fetched().get(&reference) {
            return Ok(entity.clone());
        }

        let entity = self
            .source
            .get_entity(reference)
            .await
            .map_err(|error| match error {
                InstanceError::NotFound(_) => CopyError::DanglingReference {
                    referrer,
                    missing: reference,
                },
                source => CopyError::InstanceClient {
                    entity: reference,
                    source,
                },
            })?;

        self.lock_fetched().insert(reference, entity.clone());
        Ok(entity)
    }

    fn lock_fetched(&self) -> std::sync::MutexGuard<'_, HashMap<EntityRef, Entity>> {
        self.fetched.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// The path from the first occurrence of `repeated`, closed by `repeated`
fn cycle_through(stack: &[Frame], repeated: EntityRef) -> Vec<EntityRef> {
    let start = stack
        .iter()
        .position(|frame| frame.reference == repeated)
        .unwrap_or(0);
    stack[start..]
        .iter()
        .map(|frame| frame.reference)
        .chain(std::iter::once(repeated))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryInstance;
    use crate::domain::{EntityKind, InstancePairKey};
    use serde_json::json;

    fn id(n: u64) -> EntityId {
        EntityId::new(n).unwrap()
    }

    fn store() -> Arc<MappingStore> {
        let pair =
            InstancePairKey::new("https://staging.example.com", "https://bi.example.com").unwrap();
        Arc::new(MappingStore::in_memory(pair))
    }

    fn nested_question(id: u64, source: u64) -> serde_json::Value {
        json!({
            "id": id,
            "name": format!("Q{id}"),
            "dataset_query": {"type": "query", "database": 1, "query": {"source-table": format!("card__{source}")}}
        })
    }

    fn source_with_dashboard() -> Arc<MemoryInstance> {
        let source = Arc::new(MemoryInstance::new("https://staging.example.com"));
        source
            .insert_json(EntityKind::Collection, json!({"id": 1, "name": "Team"}))
            .unwrap();
        source
            .insert_json(
                EntityKind::Question,
                json!({"id": 10, "name": "Orders", "collection_id": 1, "dataset_query": {}}),
            )
            .unwrap();
        source
            .insert_json(
                EntityKind::Dashboard,
                json!({
                    "id": 20,
                    "name": "Sales",
                    "collection_id": 1,
                    "dashcards": [{"id": 7, "card_id": 10}]
                }),
            )
            .unwrap();
        source
    }

    #[tokio::test]
    async fn test_dependencies_precede_dependents() {
        let resolver = DependencyResolver::new(source_with_dashboard(), store());
        let resolution = resolver.resolve(EntityRef::dashboard(id(20))).await.unwrap();

        assert_eq!(
            resolution.references(),
            vec![
                EntityRef::collection(id(1)),
                EntityRef::question(id(10)),
                EntityRef::dashboard(id(20)),
            ]
        );
        assert_eq!(resolution.pending().count(), 3);
    }

    #[tokio::test]
    async fn test_mapped_entities_are_still_traversed() {
        let store = store();
        store.put(EntityRef::question(id(10)), id(400));
        let resolver = DependencyResolver::new(source_with_dashboard(), store);

        let resolution = resolver.resolve(EntityRef::dashboard(id(20))).await.unwrap();
        assert_eq!(resolution.len(), 3);
        assert_eq!(
            resolution.entities[1].status,
            ResolutionStatus::AlreadySatisfied(id(400))
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_is_dangling() {
        let source = Arc::new(MemoryInstance::new("https://staging.example.com"));
        source
            .insert_json(EntityKind::Question, nested_question(2, 3))
            .unwrap();
        let resolver = DependencyResolver::new(source, store());

        let error = resolver.resolve(EntityRef::question(id(2))).await.unwrap_err();
        assert_eq!(
            error,
            CopyError::DanglingReference {
                referrer: EntityRef::question(id(2)),
                missing: EntityRef::question(id(3)),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_root_is_dangling_on_itself() {
        let source = Arc::new(MemoryInstance::new("https://staging.example.com"));
        let resolver = DependencyResolver::new(source, store());
        let root = EntityRef::dashboard(id(9));

        let error = resolver.resolve(root).await.unwrap_err();
        assert_eq!(
            error,
            CopyError::DanglingReference {
                referrer: root,
                missing: root,
            }
        );
    }

    #[tokio::test]
    async fn test_cycle_is_reported_in_path_order() {
        let source = Arc::new(MemoryInstance::new("https://staging.example.com"));
        source
            .insert_json(EntityKind::Question, nested_question(1, 2))
            .unwrap();
        source
            .insert_json(EntityKind::Question, nested_question(2, 3))
            .unwrap();
        source
            .insert_json(EntityKind::Question, nested_question(3, 2))
            .unwrap();
        let resolver = DependencyResolver::new(source, store());

        let error = resolver.resolve(EntityRef::question(id(1))).await.unwrap_err();
        assert_eq!(
            error,
            CopyError::CyclicDependency {
                cycle: vec![
                    EntityRef::question(id(2)),
                    EntityRef::question(id(3)),
                    EntityRef::question(id(2)),
                ]
            }
        );
    }

    #[tokio::test]
    async fn test_self_reference_is_a_cycle() {
        let source = Arc::new(MemoryInstance::new("https://staging.example.com"));
        source
            .insert_json(EntityKind::Question, nested_question(5, 5))
            .unwrap();
        let resolver = DependencyResolver::new(source, store());

        let error = resolver.resolve(EntityRef::question(id(5))).await.unwrap_err();
        assert_eq!(error.category(), "CyclicDependency");
    }

    #[tokio::test]
    async fn test_shared_dependency_appears_once() {
        let source = Arc::new(MemoryInstance::new("https://staging.example.com"));
        source
            .insert_json(EntityKind::Question, nested_question(1, 3))
            .unwrap();
        source
            .insert_json(EntityKind::Question, nested_question(2, 3))
            .unwrap();
        source
            .insert_json(
                EntityKind::Question,
                json!({"id": 3, "name": "Base", "dataset_query": {}}),
            )
            .unwrap();
        source
            .insert_json(
                EntityKind::Dashboard,
                json!({
                    "id": 4,
                    "name": "Both",
                    "dashcards": [{"id": 1, "card_id": 1}, {"id": 2, "card_id": 2}]
                }),
            )
            .unwrap();
        let resolver = DependencyResolver::new(source, store());

        let resolution = resolver.resolve(EntityRef::dashboard(id(4))).await.unwrap();
        assert_eq!(
            resolution.references(),
            vec![
                EntityRef::question(id(3)),
                EntityRef::question(id(1)),
                EntityRef::question(id(2)),
                EntityRef::dashboard(id(4)),
            ]
        );
    }

    #[tokio::test]
    async fn test_card_root_is_an_instance_error() {
        let resolver = DependencyResolver::new(source_with_dashboard(), store());
        let error = resolver.resolve(EntityRef::card(id(7))).await.unwrap_err();
        assert_eq!(error.category(), "InstanceClientError");
    }
}
