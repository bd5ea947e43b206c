//! Entity representations
//!
//! Each copyable kind has a typed representation with its reference fields
//! pulled out explicitly. Every other attribute is kept verbatim in an
//! attribute map and written back unchanged.

use super::ids::{EntityId, EntityKind, EntityRef};
use super::query;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attributes without a dedicated field, kept verbatim
pub type Attributes = Map<String, Value>;

/// A collection (folder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: EntityId,
    pub name: String,
    /// Parent collection; `None` for top-level collections
    pub parent: Option<EntityId>,
    pub attributes: Attributes,
}

/// A saved question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: EntityId,
    pub name: String,
    pub collection: Option<EntityId>,
    /// The `dataset_query` document
    pub query: Value,
    pub attributes: Attributes,
}

/// A dashboard with its card placements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: EntityId,
    pub name: String,
    pub collection: Option<EntityId>,
    pub cards: Vec<DashboardCard>,
    /// Filter definitions, kept as JSON
    pub parameters: Vec<Value>,
    pub attributes: Attributes,
}

/// A card placed on a dashboard
///
/// `id` is the source placement ID. After rewriting it holds a negative
/// placeholder because the destination assigns placement IDs itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardCard {
    pub id: i64,
    /// Question shown by this card; `None` for text and heading cards
    pub question: Option<EntityId>,
    /// Additional questions overlaid on the same visualization
    pub series: Vec<EntityId>,
    pub parameter_mappings: Vec<ParameterMapping>,
    pub attributes: Attributes,
}

/// Binds a dashboard filter to a card's question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMapping {
    pub parameter_id: String,
    pub card: Option<EntityId>,
    pub target: Value,
    pub attributes: Attributes,
}

/// A typed entity representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Collection(Collection),
    Question(Question),
    Dashboard(Dashboard),
}

impl Entity {
    /// Parses an instance API representation of the given kind
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not an object, lacks a valid
    /// `id`, or `kind` is `Card` (placements only exist inside dashboards).
    pub fn from_json(kind: EntityKind, value: &Value) -> Result<Self, String> {
        let map = value
            .as_object()
            .ok_or_else(|| format!("Expected a JSON object for {kind}"))?
            .clone();
        match kind {
            EntityKind::Collection => Collection::from_map(map).map(Entity::Collection),
            EntityKind::Question => Question::from_map(map).map(Entity::Question),
            EntityKind::Dashboard => Dashboard::from_map(map).map(Entity::Dashboard),
            EntityKind::Card => {
                Err("Dashboard cards are only available through their dashboard".to_string())
            }
        }
    }

    /// Renders the representation back into an API document
    pub fn to_json(&self) -> Value {
        match self {
            Entity::Collection(c) => c.to_json(),
            Entity::Question(q) => q.to_json(),
            Entity::Dashboard(d) => d.to_json(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Collection(_) => EntityKind::Collection,
            Entity::Question(_) => EntityKind::Question,
            Entity::Dashboard(_) => EntityKind::Dashboard,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Entity::Collection(c) => c.id,
            Entity::Question(q) => q.id,
            Entity::Dashboard(d) => d.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Collection(c) => &c.name,
            Entity::Question(q) => &q.name,
            Entity::Dashboard(d) => &d.name,
        }
    }

    /// The `(kind, id)` reference of this entity
    pub fn reference(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }

    /// Entities this one depends on, in extraction order, first occurrence kept
    pub fn references(&self) -> Vec<EntityRef> {
        let raw = match self {
            Entity::Collection(c) => c.parent.map(EntityRef::collection).into_iter().collect(),
            Entity::Question(q) => q.references(),
            Entity::Dashboard(d) => d.references(),
        };
        dedup_in_order(raw)
    }
}

impl Collection {
    fn from_map(mut map: Attributes) -> Result<Self, String> {
        let id = take_id(&mut map, "id").ok_or("Collection is missing a valid id")?;
        let name = take_name(&mut map);
        let location = map.remove("location");
        let parent = match map.remove("parent_id") {
            Some(value) if !value.is_null() => EntityId::from_json(&value),
            _ => location
                .as_ref()
                .and_then(Value::as_str)
                .and_then(parent_from_location),
        };
        Ok(Self {
            id,
            name,
            parent,
            attributes: map,
        })
    }

    fn to_json(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("id".to_string(), self.id.into());
        map.insert("name".to_string(), self.name.clone().into());
        map.insert("parent_id".to_string(), optional_id(self.parent));
        Value::Object(map)
    }
}

/// `/1/5/` names parent 5; `/` is the root
fn parent_from_location(location: &str) -> Option<EntityId> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}

impl Question {
    fn from_map(mut map: Attributes) -> Result<Self, String> {
        let id = take_id(&mut map, "id").ok_or("Question is missing a valid id")?;
        let name = take_name(&mut map);
        let collection = take_id(&mut map, "collection_id");
        map.remove("collection");
        let query = map
            .remove("dataset_query")
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(Self {
            id,
            name,
            collection,
            query,
            attributes: map,
        })
    }

    fn to_json(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("id".to_string(), self.id.into());
        map.insert("name".to_string(), self.name.clone().into());
        map.insert("collection_id".to_string(), optional_id(self.collection));
        map.insert("dataset_query".to_string(), self.query.clone());
        Value::Object(map)
    }

    fn references(&self) -> Vec<EntityRef> {
        self.collection
            .map(EntityRef::collection)
            .into_iter()
            .chain(
                query::question_references(&self.query)
                    .into_iter()
                    .map(EntityRef::question),
            )
            .collect()
    }
}

impl Dashboard {
    fn from_map(mut map: Attributes) -> Result<Self, String> {
        let id = take_id(&mut map, "id").ok_or("Dashboard is missing a valid id")?;
        let name = take_name(&mut map);
        let collection = take_id(&mut map, "collection_id");
        map.remove("collection");

        // Older servers call the placements `ordered_cards`
        let raw_cards = match (map.remove("dashcards"), map.remove("ordered_cards")) {
            (Some(Value::Array(cards)), _) | (_, Some(Value::Array(cards))) => cards,
            _ => Vec::new(),
        };
        let cards = raw_cards
            .into_iter()
            .map(DashboardCard::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        let parameters = match map.remove("parameters") {
            Some(Value::Array(parameters)) => parameters,
            _ => Vec::new(),
        };

        Ok(Self {
            id,
            name,
            collection,
            cards,
            parameters,
            attributes: map,
        })
    }

    fn to_json(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("id".to_string(), self.id.into());
        map.insert("name".to_string(), self.name.clone().into());
        map.insert("collection_id".to_string(), optional_id(self.collection));
        map.insert(
            "dashcards".to_string(),
            Value::Array(self.cards.iter().map(DashboardCard::to_json).collect()),
        );
        map.insert("parameters".to_string(), Value::Array(self.parameters.clone()));
        Value::Object(map)
    }

    fn references(&self) -> Vec<EntityRef> {
        let mut refs: Vec<EntityRef> = self
            .cards
            .iter()
            .flat_map(DashboardCard::references)
            .collect();
        refs.extend(
            self.parameters
                .iter()
                .filter_map(parameter_source_question)
                .map(EntityRef::question),
        );
        refs.extend(self.collection.map(EntityRef::collection));
        refs
    }
}

/// Question used as the value source of a dashboard filter
pub fn parameter_source_question(parameter: &Value) -> Option<EntityId> {
    parameter
        .get("values_source_config")
        .and_then(|config| config.get("card_id"))
        .and_then(EntityId::from_json)
}

impl DashboardCard {
    fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("Dashboard card is not a JSON object".to_string());
        };
        let id = map
            .remove("id")
            .and_then(|v| v.as_i64())
            .ok_or("Dashboard card is missing a valid id")?;

        // The embedded `card` object duplicates the question; only its id is kept
        let embedded = map.remove("card");
        let question = take_id(&mut map, "card_id").or_else(|| {
            embedded
                .as_ref()
                .and_then(|card| card.get("id"))
                .and_then(EntityId::from_json)
        });

        let series = match map.remove("series") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(card) => card.get("id").and_then(EntityId::from_json),
                    other => EntityId::from_json(other),
                })
                .collect(),
            _ => Vec::new(),
        };

        let parameter_mappings = match map.remove("parameter_mappings") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(ParameterMapping::from_value)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            id,
            question,
            series,
            parameter_mappings,
            attributes: map,
        })
    }

    /// Renders the placement in the shape the dashboard cards API accepts
    pub fn to_json(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("id".to_string(), self.id.into());
        map.insert("card_id".to_string(), optional_id(self.question));
        map.insert(
            "series".to_string(),
            Value::Array(
                self.series
                    .iter()
                    .map(|id| serde_json::json!({ "id": id.get() }))
                    .collect(),
            ),
        );
        map.insert(
            "parameter_mappings".to_string(),
            Value::Array(
                self.parameter_mappings
                    .iter()
                    .map(ParameterMapping::to_json)
                    .collect(),
            ),
        );
        Value::Object(map)
    }

    /// Question references of this placement: its question, series, then mappings
    pub fn references(&self) -> Vec<EntityRef> {
        self.question
            .into_iter()
            .chain(self.series.iter().copied())
            .chain(self.parameter_mappings.iter().filter_map(|m| m.card))
            .map(EntityRef::question)
            .collect()
    }
}

impl ParameterMapping {
    fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("Parameter mapping is not a JSON object".to_string());
        };
        let parameter_id = match map.remove("parameter_id") {
            Some(Value::String(id)) => id,
            _ => return Err("Parameter mapping is missing parameter_id".to_string()),
        };
        let card = take_id(&mut map, "card_id");
        let target = map.remove("target").unwrap_or(Value::Null);
        Ok(Self {
            parameter_id,
            card,
            target,
            attributes: map,
        })
    }

    fn to_json(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert(
            "parameter_id".to_string(),
            self.parameter_id.clone().into(),
        );
        map.insert("card_id".to_string(), optional_id(self.card));
        map.insert("target".to_string(), self.target.clone());
        Value::Object(map)
    }
}

fn take_id(map: &mut Attributes, key: &str) -> Option<EntityId> {
    map.remove(key).as_ref().and_then(EntityId::from_json)
}

fn take_name(map: &mut Attributes) -> String {
    match map.remove("name") {
        Some(Value::String(name)) => name,
        _ => String::new(),
    }
}

fn optional_id(id: Option<EntityId>) -> Value {
    id.map_or(Value::Null, Value::from)
}

fn dedup_in_order(refs: Vec<EntityRef>) -> Vec<EntityRef> {
    let mut seen = std::collections::HashSet::new();
    refs.into_iter().filter(|r| seen.insert(*r)).collect()
}
