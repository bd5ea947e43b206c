//! Shared fixtures for integration tests

#![allow(dead_code)]

use dashclone::adapters::MemoryInstance;
use dashclone::core::copy::{CopyOptions, CopyOrchestrator};
use dashclone::core::mapping::MappingStore;
use dashclone::domain::{EntityId, EntityKind, EntityRef, InstancePairKey};
use serde_json::{json, Value};
use std::sync::Arc;

pub const SOURCE_URL: &str = "https://staging.example.com";
pub const DESTINATION_URL: &str = "https://bi.example.com";

/// Destination IDs start here so leaked source IDs stand out
pub const FIRST_DESTINATION_ID: u64 = 100;

pub fn id(n: u64) -> EntityId {
    EntityId::new(n).unwrap()
}

pub fn collection(n: u64) -> EntityRef {
    EntityRef::collection(id(n))
}

pub fn question(n: u64) -> EntityRef {
    EntityRef::question(id(n))
}

pub fn dashboard(n: u64) -> EntityRef {
    EntityRef::dashboard(id(n))
}

pub fn pair() -> InstancePairKey {
    InstancePairKey::new(SOURCE_URL, DESTINATION_URL).unwrap()
}

pub fn source() -> Arc<MemoryInstance> {
    Arc::new(MemoryInstance::new(SOURCE_URL))
}

pub fn destination() -> Arc<MemoryInstance> {
    Arc::new(MemoryInstance::with_first_id(
        DESTINATION_URL,
        FIRST_DESTINATION_ID,
    ))
}

pub fn memory_store() -> Arc<MappingStore> {
    Arc::new(MappingStore::in_memory(pair()))
}

pub fn orchestrator(
    source: &Arc<MemoryInstance>,
    destination: &Arc<MemoryInstance>,
    store: &Arc<MappingStore>,
    options: CopyOptions,
) -> CopyOrchestrator {
    CopyOrchestrator::new(source.clone(), destination.clone(), store.clone(), options)
}

pub fn question_json(n: u64, name: &str, collection: Option<u64>, query: Value) -> Value {
    json!({
        "id": n,
        "name": name,
        "collection_id": collection,
        "display": "table",
        "visualization_settings": {},
        "dataset_query": query
    })
}

/// A structured query on a warehouse table
pub fn table_query(table: u64) -> Value {
    json!({"type": "query", "database": 2, "query": {"source-table": table}})
}

/// A structured query on top of another question
pub fn nested_query(source_question: u64) -> Value {
    json!({"type": "query", "database": 2, "query": {"source-table": format!("card__{source_question}")}})
}

pub fn dashboard_json(n: u64, name: &str, collection: Option<u64>, questions: &[u64]) -> Value {
    let cards: Vec<Value> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            json!({
                "id": n * 1000 + i as u64 + 1,
                "card_id": q,
                "row": i * 4,
                "col": 0,
                "size_x": 12,
                "size_y": 4,
                "parameter_mappings": [],
                "visualization_settings": {}
            })
        })
        .collect();
    json!({
        "id": n,
        "name": name,
        "collection_id": collection,
        "parameters": [],
        "dashcards": cards
    })
}

/// Collection 1 "Team", question 10 "Orders" in it, dashboard 20 "Sales" showing question 10
pub fn seed_sales_dashboard(source: &MemoryInstance) {
    source
        .insert_json(EntityKind::Collection, json!({"id": 1, "name": "Team", "location": "/"}))
        .unwrap();
    source
        .insert_json(
            EntityKind::Question,
            question_json(10, "Orders", Some(1), table_query(7)),
        )
        .unwrap();
    source
        .insert_json(
            EntityKind::Dashboard,
            dashboard_json(20, "Sales", Some(1), &[10]),
        )
        .unwrap();
}
