//! Domain identifier types with validation
//!
//! This module provides the identity types used as lookup keys everywhere:
//! entity kinds, per-instance entity IDs, entity references, and the
//! instance-pair key that scopes a mapping cache.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Kind of a copyable entity
///
/// `Question` is a saved query (a "card" in the Metabase API). `Card` is a
/// dashboard card placement (a "dashcard"), which is created together with
/// its dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A collection (folder) of content
    Collection,
    /// A dashboard
    Dashboard,
    /// A saved question
    Question,
    /// A card placed on a dashboard
    Card,
}

impl EntityKind {
    /// All kinds, in the order they are usually reported
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Collection,
        EntityKind::Question,
        EntityKind::Dashboard,
        EntityKind::Card,
    ];

    /// Returns the lowercase name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Collection => "collection",
            EntityKind::Dashboard => "dashboard",
            EntityKind::Question => "question",
            EntityKind::Card => "card",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "collection" => Ok(EntityKind::Collection),
            "dashboard" => Ok(EntityKind::Dashboard),
            "question" => Ok(EntityKind::Question),
            "card" | "dashcard" => Ok(EntityKind::Card),
            other => Err(format!(
                "Invalid entity kind '{other}'. Must be one of: collection, dashboard, question, card"
            )),
        }
    }
}

/// Entity identifier assigned by one instance
///
/// # Examples
///
/// ```
/// use dashclone::domain::ids::EntityId;
/// use std::str::FromStr;
///
/// let id = EntityId::from_str("42").unwrap();
/// assert_eq!(id.get(), 42);
/// assert!(EntityId::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new EntityId
    ///
    /// # Returns
    ///
    /// Returns `Err` for zero, which no instance ever assigns
    pub fn new(id: u64) -> Result<Self, String> {
        if id == 0 {
            return Err("Entity ID must be a positive integer".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the raw integer value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Reads an identifier out of a JSON value
    ///
    /// Accepts positive integers and strings holding positive integers.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_u64().and_then(|id| Self::new(id).ok()),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u64 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid entity ID '{s}': expected a positive integer"))?;
        Self::new(id)
    }
}

impl From<EntityId> for serde_json::Value {
    fn from(id: EntityId) -> Self {
        serde_json::Value::from(id.0)
    }
}

/// Reference to one entity on one instance: `(kind, id)`
///
/// Displayed and parsed as `kind:id`.
///
/// # Examples
///
/// ```
/// use dashclone::domain::ids::{EntityKind, EntityRef};
/// use std::str::FromStr;
///
/// let reference = EntityRef::from_str("dashboard:12").unwrap();
/// assert_eq!(reference.kind, EntityKind::Dashboard);
/// assert_eq!(reference.to_string(), "dashboard:12");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    /// Kind of the referenced entity
    pub kind: EntityKind,
    /// Identifier on the instance the reference belongs to
    pub id: EntityId,
}

impl EntityRef {
    /// Creates a new reference
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }

    /// Reference to a collection
    pub fn collection(id: EntityId) -> Self {
        Self::new(EntityKind::Collection, id)
    }

    /// Reference to a dashboard
    pub fn dashboard(id: EntityId) -> Self {
        Self::new(EntityKind::Dashboard, id)
    }

    /// Reference to a question
    pub fn question(id: EntityId) -> Self {
        Self::new(EntityKind::Question, id)
    }

    /// Reference to a dashboard card placement
    pub fn card(id: EntityId) -> Self {
        Self::new(EntityKind::Card, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid entity reference '{s}'. Expected kind:id"))?;
        Ok(Self::new(kind.parse()?, id.parse()?))
    }
}

/// Identity of a (source, destination) instance pair
///
/// A mapping cache built against one destination must never be reused
/// against another, so every persisted snapshot is keyed by this value.
/// Base URLs are normalized (scheme and host lowercased, trailing slash
/// removed) before the key is derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstancePairKey {
    source: String,
    destination: String,
}

impl InstancePairKey {
    /// Creates a key from the two instance base URLs
    ///
    /// # Errors
    ///
    /// Returns an error if either URL is invalid or both name the same instance.
    pub fn new(source_url: &str, destination_url: &str) -> Result<Self, String> {
        let source = normalize_base_url(source_url)?;
        let destination = normalize_base_url(destination_url)?;
        if source == destination {
            return Err(format!(
                "Source and destination are the same instance: {source}"
            ));
        }
        Ok(Self {
            source,
            destination,
        })
    }

    /// Normalized source base URL
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Normalized destination base URL
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// File-system safe identifier for this pair
    ///
    /// Format: `{source_host}__{destination_host}-{digest}` where the digest
    /// is the first 12 hex characters of a SHA-256 over both URLs, so pairs
    /// on the same hosts with different paths or ports stay distinct.
    pub fn storage_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(b"|");
        hasher.update(self.destination.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();

        format!(
            "{}__{}-{}",
            host_slug(&self.source),
            host_slug(&self.destination),
            hex
        )
    }
}

impl fmt::Display for InstancePairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("Invalid instance URL '{raw}': {e}"))?;
    if url.host_str().is_none() {
        return Err(format!("Instance URL '{raw}' has no host"));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn host_slug(normalized: &str) -> String {
    let host = Url::parse(normalized)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    host.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
