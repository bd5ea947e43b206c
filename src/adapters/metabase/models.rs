//! Metabase API request and response models

use crate::domain::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session header carrying the login token
pub const SESSION_HEADER: &str = "X-Metabase-Session";

/// Attributes the server assigns itself; never sent on create
pub const SERVER_MANAGED_FIELDS: &[&str] = &[
    "id",
    "entity_id",
    "created_at",
    "updated_at",
    "creator_id",
    "creator",
    "last-edit-info",
    "made_public_by_id",
    "public_uuid",
    "view_count",
    "last_used_at",
    "last_viewed_at",
    "archived",
    "archived_directly",
    "can_write",
    "can_delete",
    "can_restore",
    "can_manage_db",
    "effective_ancestors",
    "effective_location",
    "location",
    "here",
    "below",
    "is_personal",
    "personal_owner_id",
    "slug",
    "table_id",
    "database_id",
    "query_average_duration",
    "moderation_reviews",
    "dashboard_count",
    "collection_preview",
    "tabs",
    "dashcards",
    "ordered_cards",
];

/// Placement attributes the server assigns itself
///
/// The placement `id` is kept: it carries the negative placeholder the
/// server replaces with a real ID.
pub const SERVER_MANAGED_CARD_FIELDS: &[&str] = &[
    "dashboard_id",
    "dashboard_tab_id",
    "entity_id",
    "created_at",
    "updated_at",
];

/// Login request body
#[derive(Debug, Serialize)]
pub struct SessionRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Login response body
#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    pub id: String,
}

/// Response carrying the ID of a created entity
#[derive(Debug, Deserialize)]
pub struct CreatedResponse {
    pub id: u64,
}

/// One item of `GET /api/collection/:id/items`
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionItem {
    pub id: Value,
    #[serde(default)]
    pub name: String,
    pub model: String,
}

impl CollectionItem {
    /// Entity kind of the item; `None` for models that are not copied
    pub fn kind(&self) -> Option<EntityKind> {
        match self.model.as_str() {
            "collection" => Some(EntityKind::Collection),
            "dashboard" => Some(EntityKind::Dashboard),
            "card" | "dataset" | "metric" => Some(EntityKind::Question),
            _ => None,
        }
    }
}

/// Collection items response; newer servers wrap the list in `data`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CollectionItemsResponse {
    Paged { data: Vec<CollectionItem> },
    Plain(Vec<CollectionItem>),
}

impl CollectionItemsResponse {
    pub fn into_items(self) -> Vec<CollectionItem> {
        match self {
            CollectionItemsResponse::Paged { data } => data,
            CollectionItemsResponse::Plain(items) => items,
        }
    }
}

/// One entry of `GET /api/collection`
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSummary {
    pub id: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

/// Grid position of a placement, used to pair submitted and returned cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPosition {
    pub row: i64,
    pub col: i64,
    pub size_x: i64,
    pub size_y: i64,
}

impl GridPosition {
    /// Reads the position of a placement; older servers use `sizeX`/`sizeY`
    pub fn of(card: &Value) -> Option<Self> {
        let int = |keys: &[&str]| keys.iter().find_map(|k| card.get(*k).and_then(Value::as_i64));
        Some(Self {
            row: int(&["row"])?,
            col: int(&["col"])?,
            size_x: int(&["size_x", "sizeX"])?,
            size_y: int(&["size_y", "sizeY"])?,
        })
    }
}

/// Removes server-managed attributes from a create payload
pub fn strip_server_managed(payload: &mut Value, fields: &[&str]) {
    if let Some(map) = payload.as_object_mut() {
        for field in fields {
            map.remove(*field);
        }
    }
}
