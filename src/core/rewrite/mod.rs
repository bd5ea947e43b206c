//! Reference rewriting
//!
//! Produces destination-ready representations: every embedded entity
//! reference is translated through the mapping store, and warehouse
//! identifiers are translated through an optional [`QueryRemap`].
//! Rewriting is pure; it never talks to an instance.

pub mod fields;

pub use fields::{FieldMatcher, MatchReport, QueryRemap, WarehouseRef};

use crate::core::mapping::MappingStore;
use crate::domain::entity::parameter_source_question;
use crate::domain::query;
use crate::domain::{
    Collection, CopyError, Dashboard, DashboardCard, Entity, EntityId, EntityRef, Question,
};
use serde_json::Value;

/// A rewritten entity and the warehouse identifiers left untranslated
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub entity: Entity,
    pub unmatched: Vec<WarehouseRef>,
}

/// Placeholder ID submitted for the card placement at `index`
///
/// The destination assigns real IDs; placeholders are `-1, -2, ...`.
pub fn card_placeholder(index: usize) -> i64 {
    -(index as i64) - 1
}

/// Rewrite with a mapping store only
///
/// # Errors
///
/// Returns `UnresolvedReference` for the first reference without a mapping
/// entry.
pub fn rewrite(entity: &Entity, store: &MappingStore) -> Result<Entity, CopyError> {
    ReferenceRewriter::new(store)
        .rewrite(entity)
        .map(|rewritten| rewritten.entity)
}

/// Translates the references of source representations
pub struct ReferenceRewriter<'a> {
    store: &'a MappingStore,
    remap: Option<&'a QueryRemap>,
}

impl<'a> ReferenceRewriter<'a> {
    pub fn new(store: &'a MappingStore) -> Self {
        Self { store, remap: None }
    }

    /// Also translate warehouse identifiers
    pub fn with_remap(mut self, remap: &'a QueryRemap) -> Self {
        if !remap.is_empty() {
            self.remap = Some(remap);
        }
        self
    }

    /// Rewrite one entity
    ///
    /// References are looked up in extraction order, so the error names the
    /// first missing dependency.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedReference` if a referenced entity has no mapping
    /// entry.
    pub fn rewrite(&self, entity: &Entity) -> Result<Rewritten, CopyError> {
        let referrer = entity.reference();
        let mut unmatched = Vec::new();
        let entity = match entity {
            Entity::Collection(c) => Entity::Collection(self.collection(c, referrer)?),
            Entity::Question(q) => Entity::Question(self.question(q, referrer, &mut unmatched)?),
            Entity::Dashboard(d) => {
                Entity::Dashboard(self.dashboard(d, referrer, &mut unmatched)?)
            }
        };
        unmatched.sort();
        unmatched.dedup();
        Ok(Rewritten { entity, unmatched })
    }

    fn lookup(&self, referrer: EntityRef, missing: EntityRef) -> Result<EntityId, CopyError> {
        self.store
            .get(missing)
            .ok_or(CopyError::UnresolvedReference { referrer, missing })
    }

    fn lookup_opt(
        &self,
        referrer: EntityRef,
        missing: Option<EntityRef>,
    ) -> Result<Option<EntityId>, CopyError> {
        missing.map(|m| self.lookup(referrer, m)).transpose()
    }

    fn collection(&self, c: &Collection, referrer: EntityRef) -> Result<Collection, CopyError> {
        Ok(Collection {
            parent: self.lookup_opt(referrer, c.parent.map(EntityRef::collection))?,
            ..c.clone()
        })
    }

    fn question(
        &self,
        q: &Question,
        referrer: EntityRef,
        unmatched: &mut Vec<WarehouseRef>,
    ) -> Result<Question, CopyError> {
        let collection = self.lookup_opt(referrer, q.collection.map(EntityRef::collection))?;

        let mut query = q.query.clone();
        query::rewrite_question_references(&mut query, &|id| {
            self.store.get(EntityRef::question(id))
        })
        .map_err(|id| CopyError::UnresolvedReference {
            referrer,
            missing: EntityRef::question(id),
        })?;

        if let Some(remap) = self.remap {
            unmatched.extend(remap.apply_to_query(&mut query));
        }

        Ok(Question {
            collection,
            query,
            ..q.clone()
        })
    }

    fn dashboard(
        &self,
        d: &Dashboard,
        referrer: EntityRef,
        unmatched: &mut Vec<WarehouseRef>,
    ) -> Result<Dashboard, CopyError> {
        let cards = d
            .cards
            .iter()
            .enumerate()
            .map(|(index, card)| self.card(card, index, referrer, unmatched))
            .collect::<Result<Vec<_>, _>>()?;

        let parameters = d
            .parameters
            .iter()
            .map(|parameter| self.parameter(parameter, referrer, unmatched))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dashboard {
            collection: self.lookup_opt(referrer, d.collection.map(EntityRef::collection))?,
            cards,
            parameters,
            ..d.clone()
        })
    }

    fn card(
        &self,
        card: &DashboardCard,
        index: usize,
        referrer: EntityRef,
        unmatched: &mut Vec<WarehouseRef>,
    ) -> Result<DashboardCard, CopyError> {
        let question = self.lookup_opt(referrer, card.question.map(EntityRef::question))?;
        let series = card
            .series
            .iter()
            .map(|id| self.lookup(referrer, EntityRef::question(*id)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut parameter_mappings = Vec::with_capacity(card.parameter_mappings.len());
        for mapping in &card.parameter_mappings {
            let mut mapping = mapping.clone();
            mapping.card = self.lookup_opt(referrer, mapping.card.map(EntityRef::question))?;
            if let Some(remap) = self.remap {
                unmatched.extend(remap.apply_to_clause(&mut mapping.target));
            }
            parameter_mappings.push(mapping);
        }

        Ok(DashboardCard {
            id: card_placeholder(index),
            question,
            series,
            parameter_mappings,
            attributes: card.attributes.clone(),
        })
    }

    fn parameter(
        &self,
        parameter: &Value,
        referrer: EntityRef,
        unmatched: &mut Vec<WarehouseRef>,
    ) -> Result<Value, CopyError> {
        let mut parameter = parameter.clone();
        if let Some(source) = parameter_source_question(&parameter) {
            let destination = self.lookup(referrer, EntityRef::question(source))?;
            if let Some(config) = parameter
                .get_mut("values_source_config")
                .and_then(Value::as_object_mut)
            {
                config.insert("card_id".to_string(), destination.into());
            }
        }
        if let Some(remap) = self.remap {
            if let Some(config) = parameter.get_mut("values_source_config") {
                unmatched.extend(remap.apply_to_clause(config));
            }
        }
        Ok(parameter)
    }
}
