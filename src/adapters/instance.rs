//! Instance client trait definition
//!
//! This module defines the `InstanceClient` trait that abstracts reads and
//! writes against one analytics instance. The copy engine only talks to
//! instances through this trait, so the HTTP implementation and the
//! in-memory implementation are interchangeable.

use crate::domain::{Dashboard, Entity, EntityId, EntityKind, EntityRef, InstanceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of an instance client operation
pub type InstanceResult<T> = std::result::Result<T, InstanceError>;

/// Outcome of a successful creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// Identifier assigned by the destination
    pub id: EntityId,

    /// Embedded children created together with the entity, as
    /// `(submitted placement id, assigned id)` pairs
    ///
    /// For a dashboard these are its card placements; the submitted id is
    /// the negative placeholder the rewriter gave the placement.
    pub children: Vec<(i64, EntityId)>,
}

impl Created {
    /// An entity without embedded children
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            children: Vec::new(),
        }
    }
}

/// Selects the roots to copy from a source collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFilter {
    /// Dashboards directly inside the collection
    DashboardsInCollection(EntityId),
    /// Questions directly inside the collection
    QuestionsInCollection(EntityId),
    /// Collections, dashboards and questions directly inside the collection
    CollectionItems(EntityId),
}

impl RootFilter {
    /// Collection the filter lists
    pub fn collection(&self) -> EntityId {
        match self {
            RootFilter::DashboardsInCollection(id)
            | RootFilter::QuestionsInCollection(id)
            | RootFilter::CollectionItems(id) => *id,
        }
    }

    /// Whether an item of this kind passes the filter
    pub fn accepts(&self, kind: EntityKind) -> bool {
        match self {
            RootFilter::DashboardsInCollection(_) => kind == EntityKind::Dashboard,
            RootFilter::QuestionsInCollection(_) => kind == EntityKind::Question,
            RootFilter::CollectionItems(_) => kind != EntityKind::Card,
        }
    }
}

impl fmt::Display for RootFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootFilter::DashboardsInCollection(id) => write!(f, "dashboards in collection {id}"),
            RootFilter::QuestionsInCollection(id) => write!(f, "questions in collection {id}"),
            RootFilter::CollectionItems(id) => write!(f, "items in collection {id}"),
        }
    }
}

/// An entity listed inside a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedEntity {
    pub reference: EntityRef,
    pub name: String,
}

/// Warehouse database metadata used for table and field remapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub id: u64,
    pub name: String,
    pub tables: Vec<TableMetadata>,
}

/// One warehouse table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldMetadata>,
}

/// One warehouse column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub id: u64,
    pub name: String,
}

/// Trait for analytics instance clients
///
/// # Example
///
/// ```no_run
/// use dashclone::adapters::{InstanceClient, MetabaseClient};
/// use dashclone::config::InstanceConfig;
/// use dashclone::domain::{EntityId, EntityRef};
///
/// # async fn example(config: InstanceConfig) -> Result<(), Box<dyn std::error::Error>> {
/// let client = MetabaseClient::new(&config)?;
/// let dashboard = client
///     .get_entity(EntityRef::dashboard(EntityId::new(12)?))
///     .await?;
/// println!("{} has {} dependencies", dashboard.name(), dashboard.references().len());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait InstanceClient: Send + Sync {
    /// Normalized base URL of the instance
    fn base_url(&self) -> &str;

    /// Fetch one entity
    ///
    /// # Errors
    ///
    /// Returns `InstanceError::NotFound` if the instance has no such entity.
    async fn get_entity(&self, reference: EntityRef) -> InstanceResult<Entity>;

    /// Create an entity from a destination-ready representation
    ///
    /// The representation's own `id` is ignored; the instance assigns one.
    async fn create_entity(&self, entity: &Entity) -> InstanceResult<Created>;

    /// List named entities inside a collection
    async fn list_items(&self, filter: RootFilter) -> InstanceResult<Vec<ListedEntity>>;

    /// List the references selected by a root filter
    async fn list_roots(&self, filter: RootFilter) -> InstanceResult<Vec<EntityRef>> {
        Ok(self
            .list_items(filter)
            .await?
            .into_iter()
            .map(|item| item.reference)
            .collect())
    }

    /// Fetch table and field metadata of a warehouse database
    async fn database_metadata(&self, id: u64) -> InstanceResult<DatabaseMetadata>;

    /// Look for an equivalent entity that already exists on this instance
    ///
    /// The default implementation never finds one.
    async fn find_existing(&self, _entity: &Entity) -> InstanceResult<Option<EntityId>> {
        Ok(None)
    }

    /// Place a dashboard's cards on an existing destination dashboard
    ///
    /// `content` is the destination-ready dashboard whose cards are placed.
    /// Completes a dashboard whose creation returned
    /// `InstanceError::PartiallyCreated`. Returns the placements as
    /// [`Created::children`] pairs.
    async fn attach_cards(
        &self,
        dashboard: EntityId,
        _content: &Dashboard,
    ) -> InstanceResult<Vec<(i64, EntityId)>> {
        Err(InstanceError::Unsupported(format!(
            "attaching cards to dashboard {dashboard}"
        )))
    }
}
