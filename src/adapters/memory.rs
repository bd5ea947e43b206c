//! In-memory instance
//!
//! An [`InstanceClient`] that keeps entities in memory. It backs the copy
//! scenario tests and can be used to rehearse a copy offline against a
//! snapshot of source content.

use crate::adapters::instance::{
    Created, DatabaseMetadata, InstanceClient, InstanceResult, ListedEntity, RootFilter,
};
use crate::domain::{Dashboard, Entity, EntityId, EntityKind, EntityRef, InstanceError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct MemoryState {
    entities: BTreeMap<EntityRef, Entity>,
    next_id: u64,
    next_card_id: i64,
    created: Vec<Entity>,
    databases: HashMap<u64, DatabaseMetadata>,
    failing_names: HashSet<String>,
    timing_out_names: HashSet<String>,
    failing_card_names: HashSet<String>,
    create_attempts: usize,
}

/// In-memory analytics instance
///
/// # Example
///
/// ```
/// use dashclone::adapters::{InstanceClient, MemoryInstance};
/// use dashclone::domain::{EntityKind, EntityRef, EntityId};
/// use serde_json::json;
///
/// # tokio_test(async {
/// let source = MemoryInstance::new("https://staging.example.com");
/// source.insert_json(EntityKind::Collection, json!({"id": 1, "name": "Team"})).unwrap();
///
/// let fetched = source
///     .get_entity(EntityRef::collection(EntityId::new(1).unwrap()))
///     .await
///     .unwrap();
/// assert_eq!(fetched.name(), "Team");
/// # });
/// # fn tokio_test<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f);
/// # }
/// ```
pub struct MemoryInstance {
    base_url: String,
    latency: Option<Duration>,
    state: Mutex<MemoryState>,
}

impl MemoryInstance {
    /// Create an empty instance whose assigned IDs start at 1
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_first_id(base_url, 1)
    }

    /// Create an empty instance whose assigned IDs start at `first_id`
    ///
    /// Giving the destination a different range than the source makes
    /// leaked source IDs easy to spot.
    pub fn with_first_id(base_url: impl Into<String>, first_id: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            latency: None,
            state: Mutex::new(MemoryState {
                next_id: first_id.max(1),
                next_card_id: first_id.max(1) as i64,
                ..MemoryState::default()
            }),
        }
    }

    /// Delay every operation, so concurrent copies interleave
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Store an entity under its own ID
    pub fn insert(&self, entity: Entity) {
        let mut state = self.state();
        state.next_id = state.next_id.max(entity.id().get() + 1);
        state.entities.insert(entity.reference(), entity);
    }

    /// Parse and store an API document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid representation of `kind`.
    pub fn insert_json(&self, kind: EntityKind, value: Value) -> Result<(), String> {
        let entity = Entity::from_json(kind, &value)?;
        self.insert(entity);
        Ok(())
    }

    /// Delete an entity, leaving references to it dangling
    pub fn remove(&self, reference: EntityRef) -> Option<Entity> {
        self.state().entities.remove(&reference)
    }

    /// Register warehouse metadata returned by `database_metadata`
    pub fn insert_database(&self, metadata: DatabaseMetadata) {
        self.state().databases.insert(metadata.id, metadata);
    }

    /// Make every later creation of an entity with this name fail
    pub fn fail_creates_named(&self, name: impl Into<String>) {
        self.state().failing_names.insert(name.into());
    }

    /// Make every later creation of an entity with this name time out
    ///
    /// Nothing is stored, as when the server dropped the request.
    pub fn time_out_creates_named(&self, name: impl Into<String>) {
        self.state().timing_out_names.insert(name.into());
    }

    /// Make card placement fail for dashboards with this name
    ///
    /// The dashboard itself is still created, without cards.
    pub fn fail_cards_named(&self, name: impl Into<String>) {
        self.state().failing_card_names.insert(name.into());
    }

    /// Drop every injected failure
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_names.clear();
        state.timing_out_names.clear();
        state.failing_card_names.clear();
    }

    /// Number of `create_entity` calls, including failed ones
    pub fn create_attempts(&self) -> usize {
        self.state().create_attempts
    }

    /// Entities created through `create_entity`, in creation order
    pub fn created(&self) -> Vec<Entity> {
        self.state().created.clone()
    }

    /// Look up a stored entity without going through the async trait
    pub fn entity(&self, reference: EntityRef) -> Option<Entity> {
        self.state().entities.get(&reference).cloned()
    }

    /// Number of stored entities of a kind
    pub fn count(&self, kind: EntityKind) -> usize {
        self.state()
            .entities
            .keys()
            .filter(|reference| reference.kind == kind)
            .count()
    }
}

fn place_cards(
    state: &mut MemoryState,
    dashboard: &mut Dashboard,
) -> InstanceResult<Vec<(i64, EntityId)>> {
    let mut children = Vec::new();
    for card in &mut dashboard.cards {
        let assigned = state.next_card_id;
        state.next_card_id += 1;
        let card_id = EntityId::new(assigned as u64).map_err(InstanceError::InvalidResponse)?;
        children.push((card.id, card_id));
        card.id = assigned;
    }
    Ok(children)
}

fn container_of(entity: &Entity) -> Option<EntityId> {
    match entity {
        Entity::Collection(c) => c.parent,
        Entity::Question(q) => q.collection,
        Entity::Dashboard(d) => d.collection,
    }
}

#[async_trait]
impl InstanceClient for MemoryInstance {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_entity(&self, reference: EntityRef) -> InstanceResult<Entity> {
        self.simulate_latency().await;
        if reference.kind == EntityKind::Card {
            return Err(InstanceError::Unsupported(format!(
                "{reference} can only be copied with its dashboard"
            )));
        }
        self.entity(reference)
            .ok_or(InstanceError::NotFound(reference))
    }

    async fn create_entity(&self, entity: &Entity) -> InstanceResult<Created> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.create_attempts += 1;

        if state.timing_out_names.contains(entity.name()) {
            return Err(InstanceError::Timeout(format!(
                "No response while creating '{}'",
                entity.name()
            )));
        }
        if state.failing_names.contains(entity.name()) {
            return Err(InstanceError::ServerError {
                status: 500,
                message: format!("Refusing to create '{}'", entity.name()),
            });
        }

        let id = EntityId::new(state.next_id).map_err(InstanceError::InvalidResponse)?;
        state.next_id += 1;

        let mut stored = entity.clone();
        let mut children = Vec::new();
        let mut cards_failed = false;
        match &mut stored {
            Entity::Collection(c) => c.id = id,
            Entity::Question(q) => q.id = id,
            Entity::Dashboard(d) => {
                d.id = id;
                if state.failing_card_names.contains(&d.name) && !d.cards.is_empty() {
                    d.cards.clear();
                    cards_failed = true;
                } else {
                    children = place_cards(&mut state, d)?;
                }
            }
        }

        state.created.push(stored.clone());
        state.entities.insert(stored.reference(), stored);
        if cards_failed {
            return Err(InstanceError::PartiallyCreated {
                id,
                message: format!("cards of '{}' not attached", entity.name()),
            });
        }
        Ok(Created { id, children })
    }

    async fn attach_cards(
        &self,
        dashboard: EntityId,
        content: &Dashboard,
    ) -> InstanceResult<Vec<(i64, EntityId)>> {
        self.simulate_latency().await;
        let mut state = self.state();
        if state.failing_card_names.contains(&content.name) {
            return Err(InstanceError::ServerError {
                status: 500,
                message: format!("Refusing to place cards of '{}'", content.name),
            });
        }

        let reference = EntityRef::dashboard(dashboard);
        if !state.entities.contains_key(&reference) {
            return Err(InstanceError::NotFound(reference));
        }

        let mut placed = content.clone();
        let children = place_cards(&mut state, &mut placed)?;
        if let Some(Entity::Dashboard(stored)) = state.entities.get_mut(&reference) {
            stored.cards = placed.cards;
        }
        Ok(children)
    }

    async fn list_items(&self, filter: RootFilter) -> InstanceResult<Vec<ListedEntity>> {
        self.simulate_latency().await;
        let state = self.state();
        Ok(state
            .entities
            .values()
            .filter(|entity| filter.accepts(entity.kind()))
            .filter(|entity| container_of(entity) == Some(filter.collection()))
            .map(|entity| ListedEntity {
                reference: entity.reference(),
                name: entity.name().to_string(),
            })
            .collect())
    }

    async fn database_metadata(&self, id: u64) -> InstanceResult<DatabaseMetadata> {
        self.state()
            .databases
            .get(&id)
            .cloned()
            .ok_or_else(|| InstanceError::ClientError {
                status: 404,
                message: format!("Database {id} not found"),
            })
    }

    async fn find_existing(&self, entity: &Entity) -> InstanceResult<Option<EntityId>> {
        let state = self.state();
        Ok(state
            .entities
            .values()
            .find(|candidate| {
                candidate.kind() == entity.kind()
                    && candidate.name() == entity.name()
                    && container_of(candidate) == container_of(entity)
            })
            .map(Entity::id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(n: u64) -> EntityId {
        EntityId::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_missing_entity_is_not_found() {
        let instance = MemoryInstance::new("https://a.example.com");
        let reference = EntityRef::question(id(3));
        assert_eq!(
            instance.get_entity(reference).await,
            Err(InstanceError::NotFound(reference))
        );
    }

    #[tokio::test]
    async fn test_create_assigns_ids_and_card_children() {
        let instance = MemoryInstance::with_first_id("https://b.example.com", 100);
        let dashboard = Entity::from_json(
            EntityKind::Dashboard,
            &json!({
                "id": 1,
                "name": "Sales",
                "dashcards": [
                    {"id": -1, "card_id": 5, "row": 0, "col": 0, "size_x": 4, "size_y": 3},
                    {"id": -2, "card_id": 6, "row": 3, "col": 0, "size_x": 4, "size_y": 3}
                ]
            }),
        )
        .unwrap();

        let created = instance.create_entity(&dashboard).await.unwrap();
        assert_eq!(created.id, id(100));
        assert_eq!(created.children, vec![(-1, id(100)), (-2, id(101))]);
        assert_eq!(instance.created().len(), 1);
        assert_eq!(instance.count(EntityKind::Dashboard), 1);
    }

    #[tokio::test]
    async fn test_list_items_filters_by_collection_and_kind() {
        let instance = MemoryInstance::new("https://a.example.com");
        instance
            .insert_json(EntityKind::Collection, json!({"id": 1, "name": "Team"}))
            .unwrap();
        instance
            .insert_json(
                EntityKind::Dashboard,
                json!({"id": 2, "name": "Sales", "collection_id": 1}),
            )
            .unwrap();
        instance
            .insert_json(
                EntityKind::Question,
                json!({"id": 3, "name": "Orders", "collection_id": 1}),
            )
            .unwrap();

        let roots = instance
            .list_roots(RootFilter::DashboardsInCollection(id(1)))
            .await
            .unwrap();
        assert_eq!(roots, vec![EntityRef::dashboard(id(2))]);

        let items = instance
            .list_items(RootFilter::CollectionItems(id(1)))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_cards_leave_dashboard_without_cards() {
        let instance = MemoryInstance::with_first_id("https://b.example.com", 100);
        instance.fail_cards_named("Sales");
        let Entity::Dashboard(dashboard) = Entity::from_json(
            EntityKind::Dashboard,
            &json!({
                "id": 1,
                "name": "Sales",
                "dashcards": [{"id": -1, "card_id": 5, "row": 0, "col": 0, "size_x": 4, "size_y": 3}]
            }),
        )
        .unwrap() else {
            panic!("expected a dashboard");
        };

        let err = instance
            .create_entity(&Entity::Dashboard(dashboard.clone()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InstanceError::PartiallyCreated {
                id: id(100),
                message: "cards of 'Sales' not attached".to_string()
            }
        );
        assert!(instance.attach_cards(id(100), &dashboard).await.is_err());

        instance.clear_failures();
        let children = instance.attach_cards(id(100), &dashboard).await.unwrap();
        assert_eq!(children, vec![(-1, id(100))]);
        let Some(Entity::Dashboard(stored)) = instance.entity(EntityRef::dashboard(id(100))) else {
            panic!("dashboard missing");
        };
        assert_eq!(stored.cards.len(), 1);
        assert_eq!(instance.create_attempts(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_create_stores_nothing() {
        let instance = MemoryInstance::new("https://a.example.com");
        instance.time_out_creates_named("Slow");
        let entity =
            Entity::from_json(EntityKind::Collection, &json!({"id": 1, "name": "Slow"})).unwrap();
        assert!(matches!(
            instance.create_entity(&entity).await,
            Err(InstanceError::Timeout(_))
        ));
        assert!(instance.created().is_empty());
        assert_eq!(instance.create_attempts(), 1);
    }

    #[tokio::test]
    async fn test_failing_names() {
        let instance = MemoryInstance::new("https://a.example.com");
        instance.fail_creates_named("Broken");
        let entity =
            Entity::from_json(EntityKind::Collection, &json!({"id": 1, "name": "Broken"})).unwrap();
        assert!(instance.create_entity(&entity).await.is_err());
        assert!(instance.created().is_empty());
    }
}
