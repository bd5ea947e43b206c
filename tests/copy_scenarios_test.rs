//! Integration tests for copy passes against in-memory instances

mod common;

use common::*;
use dashclone::adapters::{DatabaseMetadata, FieldMetadata, MemoryInstance, TableMetadata};
use dashclone::config::DatabaseMappingConfig;
use dashclone::core::copy::{CopyOptions, Warning};
use dashclone::domain::{CopyError, Entity, EntityKind, EntityRef, InstanceError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_dashboard_with_dependencies_is_created_in_order() {
    let source = source();
    seed_sales_dashboard(&source);
    let destination = destination();
    let store = memory_store();

    let report = orchestrator(&source, &destination, &store, CopyOptions::default())
        .copy(&[dashboard(20)])
        .await
        .unwrap();

    assert!(report.is_successful());
    let created: Vec<EntityRef> = destination
        .created()
        .iter()
        .map(|entity| EntityRef::new(entity.kind(), entity.id()))
        .collect();
    assert_eq!(
        created,
        vec![
            EntityRef::collection(id(100)),
            EntityRef::question(id(101)),
            EntityRef::dashboard(id(102)),
        ]
    );

    // collection, question, dashboard and the dashboard's card placement
    assert_eq!(store.len(), 4);
    assert_eq!(store.get(collection(1)), Some(id(100)));
    assert_eq!(store.get(question(10)), Some(id(101)));
    assert_eq!(store.get(dashboard(20)), Some(id(102)));
    assert_eq!(store.get(EntityRef::card(id(20001))), Some(id(100)));

    let Some(Entity::Dashboard(copied)) = destination.entity(EntityRef::dashboard(id(102))) else {
        panic!("dashboard was not created");
    };
    assert_eq!(copied.collection, Some(id(100)));
    assert_eq!(copied.cards[0].question, Some(id(101)));

    let Some(Entity::Question(copied)) = destination.entity(EntityRef::question(id(101))) else {
        panic!("question was not created");
    };
    assert_eq!(copied.collection, Some(id(100)));
}

#[tokio::test]
async fn test_second_copy_creates_nothing() {
    let source = source();
    seed_sales_dashboard(&source);
    let destination = destination();
    let store = memory_store();
    let orchestrator = orchestrator(&source, &destination, &store, CopyOptions::default());

    orchestrator.copy(&[dashboard(20)]).await.unwrap();
    let second = orchestrator.copy(&[dashboard(20)]).await.unwrap();

    assert!(second.created.is_empty());
    assert_eq!(second.skipped.len(), 3);
    assert_eq!(destination.created().len(), 3);
}

#[tokio::test]
async fn test_dangling_reference_fails_without_creating_anything() {
    let source = source();
    source
        .insert_json(
            EntityKind::Question,
            question_json(2, "Derived", None, nested_query(3)),
        )
        .unwrap();
    let destination = destination();
    let store = memory_store();

    let report = orchestrator(&source, &destination, &store, CopyOptions::default())
        .copy(&[question(2)])
        .await
        .unwrap();

    assert!(!report.is_successful());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entity, question(2));
    assert_eq!(
        report.failed[0].error,
        CopyError::DanglingReference {
            referrer: question(2),
            missing: question(3),
        }
    );
    assert!(destination.created().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_cycle_fails_its_root_only() {
    let source = source();
    seed_sales_dashboard(&source);
    source
        .insert_json(EntityKind::Question, question_json(4, "A", None, nested_query(5)))
        .unwrap();
    source
        .insert_json(EntityKind::Question, question_json(5, "B", None, nested_query(4)))
        .unwrap();
    source
        .insert_json(EntityKind::Dashboard, dashboard_json(30, "Loop", None, &[4]))
        .unwrap();
    let destination = destination();
    let store = memory_store();

    let report = orchestrator(&source, &destination, &store, CopyOptions::default())
        .copy(&[dashboard(20), dashboard(30)])
        .await
        .unwrap();

    assert_eq!(report.created_id(dashboard(20)), Some(id(102)));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].root, dashboard(30));
    assert_eq!(
        report.failed[0].error,
        CopyError::CyclicDependency {
            cycle: vec![question(4), question(5), question(4)],
        }
    );
    assert_eq!(store.get(dashboard(30)), None);
}

#[tokio::test]
async fn test_failure_abandons_rest_of_root_and_continues() {
    let source = source();
    seed_sales_dashboard(&source);
    source
        .insert_json(EntityKind::Collection, json!({"id": 2, "name": "Other"}))
        .unwrap();
    let destination = destination();
    destination.fail_creates_named("Orders");
    let store = memory_store();

    let report = orchestrator(&source, &destination, &store, CopyOptions::default())
        .copy(&[dashboard(20), collection(2)])
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entity, question(10));
    assert_eq!(report.failed[0].error.category(), "InstanceClientError");
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].entity, dashboard(20));

    // The collection created before the failure stays mapped
    assert!(store.get(collection(1)).is_some());
    assert!(store.get(question(10)).is_none());
    assert!(store.get(collection(2)).is_some());
}

#[tokio::test]
async fn test_parallel_roots_share_dependencies() {
    let source = Arc::new(
        MemoryInstance::new(SOURCE_URL).with_latency(Duration::from_millis(5)),
    );
    seed_sales_dashboard(&source);
    source
        .insert_json(
            EntityKind::Dashboard,
            dashboard_json(21, "Sales again", Some(1), &[10]),
        )
        .unwrap();
    source
        .insert_json(
            EntityKind::Dashboard,
            dashboard_json(22, "Sales once more", Some(1), &[10]),
        )
        .unwrap();
    let destination = Arc::new(
        MemoryInstance::with_first_id(DESTINATION_URL, 100)
            .with_latency(Duration::from_millis(5)),
    );
    let store = memory_store();
    let options = CopyOptions {
        parallel_roots: 3,
        ..CopyOptions::default()
    };

    let roots = [dashboard(20), dashboard(21), dashboard(22)];
    let report = orchestrator(&source, &destination, &store, options)
        .copy(&roots)
        .await
        .unwrap();

    assert!(report.is_successful());
    assert_eq!(destination.count(EntityKind::Collection), 1);
    assert_eq!(destination.count(EntityKind::Question), 1);
    assert_eq!(destination.count(EntityKind::Dashboard), 3);

    // merged in root order
    let created_roots: Vec<EntityRef> = report
        .created
        .iter()
        .filter(|c| c.entity.kind == EntityKind::Dashboard)
        .map(|c| c.entity)
        .collect();
    assert_eq!(created_roots, roots.to_vec());
}

#[tokio::test]
async fn test_existing_destination_entity_is_reported() {
    let source = source();
    seed_sales_dashboard(&source);
    let destination = destination();
    destination
        .insert_json(EntityKind::Collection, json!({"id": 50, "name": "Team"}))
        .unwrap();
    let store = memory_store();

    let report = orchestrator(&source, &destination, &store, CopyOptions::default())
        .copy(&[collection(1)])
        .await
        .unwrap();

    assert_eq!(
        report.warnings,
        vec![Warning::ExistingDestinationEntity {
            entity: collection(1),
            existing: id(50),
        }]
    );
    // created anyway
    assert_eq!(report.created.len(), 1);
    assert_ne!(store.get(collection(1)), Some(id(50)));
}

#[tokio::test]
async fn test_existing_check_can_be_disabled() {
    let source = source();
    seed_sales_dashboard(&source);
    let destination = destination();
    destination
        .insert_json(EntityKind::Collection, json!({"id": 50, "name": "Team"}))
        .unwrap();
    let store = memory_store();
    let options = CopyOptions {
        warn_on_existing: false,
        ..CopyOptions::default()
    };

    let report = orchestrator(&source, &destination, &store, options)
        .copy(&[collection(1)])
        .await
        .unwrap();
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_native_question_reference_is_rewritten() {
    let source = source();
    source
        .insert_json(
            EntityKind::Question,
            question_json(10, "Base", None, table_query(7)),
        )
        .unwrap();
    source
        .insert_json(
            EntityKind::Question,
            question_json(
                11,
                "Native",
                None,
                json!({
                    "type": "native",
                    "database": 2,
                    "native": {
                        "query": "select count(*) from {{#10-base}}",
                        "template-tags": {
                            "#10-base": {"id": "abc", "type": "card", "name": "#10-base", "display-name": "Base", "card-id": 10}
                        }
                    }
                }),
            ),
        )
        .unwrap();
    let destination = destination();
    let store = memory_store();

    let report = orchestrator(&source, &destination, &store, CopyOptions::default())
        .copy(&[question(11)])
        .await
        .unwrap();
    assert!(report.is_successful());

    let destination_id = store.get(question(11)).unwrap();
    let Some(Entity::Question(copied)) = destination.entity(EntityRef::question(destination_id))
    else {
        panic!("question was not created");
    };
    let native = &copied.query["native"];
    assert_eq!(native["query"], "select count(*) from {{#100-base}}");
    assert_eq!(native["template-tags"]["#100-base"]["card-id"], 100);
}

fn warehouse(id: u64, table: u64, field: u64) -> DatabaseMetadata {
    DatabaseMetadata {
        id,
        name: format!("warehouse {id}"),
        tables: vec![TableMetadata {
            id: table,
            name: "orders".to_string(),
            schema: Some("public".to_string()),
            fields: vec![FieldMetadata {
                id: field,
                name: "total".to_string(),
            }],
        }],
    }
}

#[tokio::test]
async fn test_database_remap() {
    let source = source();
    source.insert_database(warehouse(2, 7, 70));
    source
        .insert_json(
            EntityKind::Question,
            question_json(
                10,
                "Orders",
                None,
                json!({
                    "type": "query",
                    "database": 2,
                    "query": {
                        "source-table": 7,
                        "aggregation": [["sum", ["field", 70, null]]],
                        "breakout": [["field", 71, null]]
                    }
                }),
            ),
        )
        .unwrap();
    let destination = destination();
    destination.insert_database(warehouse(5, 9, 90));
    let store = memory_store();
    let options = CopyOptions {
        databases: vec![DatabaseMappingConfig {
            source_id: 2,
            destination_id: 5,
            match_fields: true,
        }],
        ..CopyOptions::default()
    };

    let report = orchestrator(&source, &destination, &store, options)
        .copy(&[question(10)])
        .await
        .unwrap();
    assert!(report.is_successful());
    assert_eq!(
        report.warnings,
        vec![Warning::UnmatchedWarehouseId {
            entity: question(10),
            item: dashclone::core::rewrite::WarehouseRef::Field(71),
        }]
    );

    let Some(Entity::Question(copied)) = destination.entity(EntityRef::question(id(100))) else {
        panic!("question was not created");
    };
    assert_eq!(copied.query["database"], 5);
    assert_eq!(copied.query["query"]["source-table"], 9);
    assert_eq!(
        copied.query["query"]["aggregation"][0],
        json!(["sum", ["field", 90, null]])
    );
}

#[tokio::test]
async fn test_timed_out_create_is_failed_and_not_recorded() {
    let source = source();
    seed_sales_dashboard(&source);
    let destination = destination();
    destination.time_out_creates_named("Orders");
    let store = memory_store();

    let report = orchestrator(&source, &destination, &store, CopyOptions::default())
        .copy(&[dashboard(20)])
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.entity, question(10));
    assert_eq!(failure.error.category(), "InstanceClientError");
    assert!(matches!(
        failure.error,
        CopyError::InstanceClient {
            source: InstanceError::Timeout(_),
            ..
        }
    ));
    assert_eq!(store.get(question(10)), None);
    assert_eq!(store.get(collection(1)), Some(id(100)));
    // one attempt for the collection, one for the question
    assert_eq!(destination.create_attempts(), 2);
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].entity, dashboard(20));
}

#[tokio::test]
async fn test_dashboard_without_cards_is_recorded_then_completed() {
    let source = source();
    seed_sales_dashboard(&source);
    let destination = destination();
    destination.fail_cards_named("Sales");
    let store = memory_store();
    let orchestrator = orchestrator(&source, &destination, &store, CopyOptions::default());

    let first = orchestrator.copy(&[dashboard(20)]).await.unwrap();
    assert_eq!(first.failed.len(), 1);
    assert_eq!(first.failed[0].entity, dashboard(20));
    assert!(matches!(
        first.failed[0].error,
        CopyError::InstanceClient {
            source: InstanceError::PartiallyCreated { .. },
            ..
        }
    ));
    assert_eq!(store.get(dashboard(20)), Some(id(102)));
    assert_eq!(store.get(EntityRef::card(id(20001))), None);

    // Still failing: the recorded dashboard is not created again
    let second = orchestrator.copy(&[dashboard(20)]).await.unwrap();
    assert_eq!(second.failed.len(), 1);
    assert!(second.created.is_empty());
    assert_eq!(destination.create_attempts(), 3);

    destination.clear_failures();
    let third = orchestrator.copy(&[dashboard(20)]).await.unwrap();
    assert!(third.is_successful());
    assert_eq!(destination.create_attempts(), 3);
    assert_eq!(destination.count(EntityKind::Dashboard), 1);
    assert_eq!(store.get(EntityRef::card(id(20001))), Some(id(100)));
    assert_eq!(third.created_id(EntityRef::card(id(20001))), Some(id(100)));

    let Some(Entity::Dashboard(copied)) = destination.entity(EntityRef::dashboard(id(102))) else {
        panic!("dashboard missing");
    };
    assert_eq!(copied.cards.len(), 1);
    assert_eq!(copied.cards[0].question, Some(id(101)));

    let fourth = orchestrator.copy(&[dashboard(20)]).await.unwrap();
    assert!(fourth.created.is_empty());
    assert_eq!(fourth.skipped.len(), 3);
}
