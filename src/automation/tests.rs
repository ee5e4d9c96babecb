//! Engine lifecycle tests against the in-memory store

use std::sync::Arc;

use super::*;
use crate::model::{
    ActionData, ActionStatus, AutomationSource, AutomationStatus, Category, CreatedBy,
    ResourceKind,
};
use crate::storage::{OpenStore, SparkStore, SqliteStore};

fn engine() -> (AutomationEngine, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    (AutomationEngine::new(store.clone()), store)
}

fn engine_with(config: EngineConfig) -> (AutomationEngine, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    (
        AutomationEngine::new(store.clone()).with_config(config),
        store,
    )
}

async fn seed_book(store: &SqliteStore, id: &str, owner: &str) {
    store
        .insert_resource(ResourceKind::Book, id, owner, "Meditations")
        .await
        .unwrap();
}

fn request(owner: &str, actions: Vec<ActionData>) -> NewAutomation {
    NewAutomation {
        owner_id: owner.into(),
        name: "ai categorization".into(),
        source: AutomationSource::Ai,
        actions,
    }
}

// === Scenario: association resolves a sibling creation regardless of
// submission order ===
#[tokio::test]
async fn submission_order_does_not_change_resolution() {
    let (engine, store) = engine();
    seed_book(&store, "b1", "u1").await;

    // add_category first, create_category second — the add still ends up
    // pointing at the id the create produced.
    let receipt = engine
        .create_automation(request(
            "u1",
            vec![
                ActionData::AddCategory {
                    target: ResourceKind::Book,
                    target_id: "b1".into(),
                    category_id: "Ancient Philosophy".into(),
                },
                ActionData::CreateCategory {
                    category_name: "Ancient Philosophy".into(),
                    target: None,
                    target_id: None,
                },
            ],
        ))
        .await
        .unwrap();

    assert_eq!(receipt.created_categories.len(), 1);
    let category_id = receipt.created_categories[0].id.clone();

    let detail = engine
        .get_automation("u1", &receipt.automation_id)
        .await
        .unwrap()
        .unwrap();
    let add = detail
        .actions
        .iter()
        .find(|a| matches!(a.data, ActionData::AddCategory { .. }))
        .unwrap();
    match &add.data {
        ActionData::AddCategory { category_id: stored, .. } => {
            assert_eq!(stored, &category_id)
        }
        _ => unreachable!(),
    }

    let row = store
        .find_category_link(ResourceKind::Book, "b1", &category_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.created_by, CreatedBy::Automation);
    assert_eq!(row.action_id.as_deref(), Some(add.id.as_str()));
}

// === Scenario: creation actions run before association actions ===
#[tokio::test]
async fn creations_are_stored_before_associations() {
    let (engine, store) = engine();
    seed_book(&store, "b1", "u1").await;

    let receipt = engine
        .create_automation(request(
            "u1",
            vec![
                ActionData::AddTag {
                    target: ResourceKind::Book,
                    target_id: "b1".into(),
                    tag_id: String::new(),
                    tag_name: Some("later".into()),
                },
                ActionData::CreateCategory {
                    category_name: "First".into(),
                    target: None,
                    target_id: None,
                },
            ],
        ))
        .await
        .unwrap();

    let detail = engine
        .get_automation("u1", &receipt.automation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.actions.len(), 2);
    // The create was submitted second but executed (and stored) first
    assert!(matches!(detail.actions[0].data, ActionData::CreateCategory { .. }));
    assert!(matches!(detail.actions[1].data, ActionData::AddTag { .. }));
    let positions: Vec<i64> = detail.actions.iter().map(|a| a.position).collect();
    assert_eq!(positions, vec![0, 1]);
    assert!(detail.actions.iter().all(|a| a.status == ActionStatus::Executed));
    assert!(detail.actions.iter().all(|a| a.executed_at.is_some()));
}

// === Scenario: approving twice reports the current status ===
#[tokio::test]
async fn approve_is_guarded_by_status() {
    let (engine, _store) = engine();

    let receipt = engine
        .create_automation(request(
            "u1",
            vec![ActionData::CreateTag {
                tag_name: "once".into(),
                target: None,
                target_id: None,
            }],
        ))
        .await
        .unwrap();

    engine
        .approve_automation("u1", &receipt.automation_id)
        .await
        .unwrap();

    let err = engine
        .approve_automation("u1", &receipt.automation_id)
        .await
        .unwrap_err();
    match err {
        EngineError::Conflict(status) => assert_eq!(status, AutomationStatus::Approved),
        other => panic!("expected Conflict, got {:?}", other),
    }
    assert!(err.to_string().contains("approved"));

    // Nothing mutated by the failed call
    let detail = engine
        .get_automation("u1", &receipt.automation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(detail.actions.iter().all(|a| a.status == ActionStatus::Executed));
}

// === Scenario: rejected automations stay rejected ===
#[tokio::test]
async fn reject_is_terminal() {
    let (engine, _store) = engine_with(EngineConfig {
        execution: ExecutionMode::Deferred,
        ..Default::default()
    });

    let receipt = engine
        .create_automation(request(
            "u1",
            vec![ActionData::CreateTag {
                tag_name: "never".into(),
                target: None,
                target_id: None,
            }],
        ))
        .await
        .unwrap();

    engine.reject_automation("u1", &receipt.automation_id).await.unwrap();

    let detail = engine
        .get_automation("u1", &receipt.automation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.automation.status, AutomationStatus::Rejected);
    assert!(detail.actions.iter().all(|a| a.status == ActionStatus::Rejected));

    assert!(matches!(
        engine.approve_automation("u1", &receipt.automation_id).await,
        Err(EngineError::Conflict(AutomationStatus::Rejected))
    ));
}

// === Scenario: create dedupes against an existing category and rewrites
// the action ===
#[tokio::test]
async fn dedup_rewrites_create_into_add() {
    let (engine, store) = engine();
    seed_book(&store, "b1", "u1").await;

    // "History" already exists, created outside any automation
    let existing = Category::new("History", None, chrono::Utc::now());
    store.insert_category(&existing).await.unwrap();

    let receipt = engine
        .create_automation(request(
            "u1",
            vec![ActionData::CreateCategory {
                category_name: "History".into(),
                target: Some(ResourceKind::Book),
                target_id: Some("b1".into()),
            }],
        ))
        .await
        .unwrap();

    // Nothing genuinely created
    assert!(receipt.created_categories.is_empty());

    // The stored log holds the add action that actually happened
    let detail = engine
        .get_automation("u1", &receipt.automation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.actions.len(), 1);
    match &detail.actions[0].data {
        ActionData::AddCategory { category_id, .. } => assert_eq!(category_id, &existing.id),
        other => panic!("expected rewritten add_category, got {:?}", other),
    }

    // And the association landed on the pre-existing category
    assert!(store
        .find_category_link(ResourceKind::Book, "b1", &existing.id)
        .await
        .unwrap()
        .is_some());
}

// === Scenario: deferred mode executes at approval, not creation ===
#[tokio::test]
async fn deferred_mode_runs_actions_on_approval() {
    let (engine, store) = engine_with(EngineConfig {
        execution: ExecutionMode::Deferred,
        ..Default::default()
    });
    seed_book(&store, "b1", "u1").await;

    let receipt = engine
        .create_automation(request(
            "u1",
            vec![
                ActionData::CreateTag {
                    tag_name: "urgent".into(),
                    target: None,
                    target_id: None,
                },
                ActionData::AddTag {
                    target: ResourceKind::Book,
                    target_id: "b1".into(),
                    tag_id: String::new(),
                    tag_name: Some("urgent".into()),
                },
            ],
        ))
        .await
        .unwrap();

    // Nothing ran yet
    assert!(receipt.created_tags.is_empty());
    assert!(store.find_tag_by_name("u1", "urgent").await.unwrap().is_none());

    let approved = engine
        .approve_automation("u1", &receipt.automation_id)
        .await
        .unwrap();
    assert_eq!(approved.created_tags.len(), 1);

    let tag = store.find_tag_by_name("u1", "urgent").await.unwrap().unwrap();
    assert!(store
        .find_tag_link(ResourceKind::Book, "b1", &tag.id)
        .await
        .unwrap()
        .is_some());

    let detail = engine
        .get_automation("u1", &receipt.automation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(detail.actions.iter().all(|a| a.status == ActionStatus::Executed));
}

// === Scenario: a failing step keeps applied steps by default ===
#[tokio::test]
async fn keep_partial_leaves_earlier_effects() {
    let (engine, store) = engine();
    seed_book(&store, "b1", "u1").await;

    let err = engine
        .create_automation(request(
            "u1",
            vec![
                ActionData::CreateTag {
                    tag_name: "kept".into(),
                    target: None,
                    target_id: None,
                },
                ActionData::AddCategory {
                    target: ResourceKind::Book,
                    target_id: "b1".into(),
                    // Resolves neither as an id nor as a name
                    category_id: "no-such-category".into(),
                },
            ],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // The tag created before the failure survives
    assert!(store.find_tag_by_name("u1", "kept").await.unwrap().is_some());
}

// === Scenario: the unwind policy compensates applied steps ===
#[tokio::test]
async fn unwind_removes_this_calls_effects() {
    let (engine, store) = engine_with(EngineConfig {
        on_failure: FailurePolicy::Unwind,
        ..Default::default()
    });
    seed_book(&store, "b1", "u1").await;

    let err = engine
        .create_automation(request(
            "u1",
            vec![
                ActionData::CreateTag {
                    tag_name: "ephemeral".into(),
                    target: Some(ResourceKind::Book),
                    target_id: Some("b1".into()),
                },
                ActionData::AddCategory {
                    target: ResourceKind::Book,
                    target_id: "b1".into(),
                    category_id: "no-such-category".into(),
                },
            ],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // The tag and its attachment were unwound
    assert!(store.find_tag_by_name("u1", "ephemeral").await.unwrap().is_none());
}

// === Scenario: validation failures abort before any write ===
#[tokio::test]
async fn validation_precedes_all_writes() {
    let (engine, store) = engine();
    seed_book(&store, "b1", "u2").await; // owned by someone else

    let err = engine
        .create_automation(request(
            "u1",
            vec![
                ActionData::CreateTag {
                    tag_name: "never-created".into(),
                    target: None,
                    target_id: None,
                },
                ActionData::AddTag {
                    target: ResourceKind::Book,
                    target_id: "b1".into(),
                    tag_id: String::new(),
                    tag_name: Some("never-created".into()),
                },
            ],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    assert!(store.find_tag_by_name("u1", "never-created").await.unwrap().is_none());
    let listed = engine
        .list_automations("u1", Default::default())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

// === Scenario: names that slugify to nothing are rejected ===
#[tokio::test]
async fn unusable_category_name_is_invalid() {
    let (engine, _store) = engine();

    let err = engine
        .create_automation(request(
            "u1",
            vec![ActionData::CreateCategory {
                category_name: "!!!".into(),
                target: None,
                target_id: None,
            }],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// === Scenario: automations are invisible across users ===
#[tokio::test]
async fn automations_are_owner_scoped() {
    let (engine, _store) = engine();

    let receipt = engine
        .create_automation(request(
            "u1",
            vec![ActionData::CreateTag {
                tag_name: "mine".into(),
                target: None,
                target_id: None,
            }],
        ))
        .await
        .unwrap();

    assert!(engine
        .get_automation("u2", &receipt.automation_id)
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        engine.approve_automation("u2", &receipt.automation_id).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.revert_automation("u2", &receipt.automation_id).await,
        Err(EngineError::NotFound(_))
    ));
}

// === Scenario: timestamps come from the injected clock ===
#[tokio::test]
async fn timestamps_use_injected_clock() {
    use chrono::TimeZone;

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let pinned = chrono::Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap();
    let clock = Arc::new(crate::clock::test_support::FixedClock(pinned));
    let engine = AutomationEngine::with_clock(store, clock);

    let receipt = engine
        .create_automation(request(
            "u1",
            vec![ActionData::CreateTag {
                tag_name: "pinned".into(),
                target: None,
                target_id: None,
            }],
        ))
        .await
        .unwrap();

    let detail = engine
        .get_automation("u1", &receipt.automation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.automation.created_at, pinned);
    assert_eq!(detail.actions[0].executed_at, Some(pinned));
    assert_eq!(receipt.created_tags[0].created_at, pinned);
}

// === Scenario: an explicit tag id must exist and belong to the owner ===
#[tokio::test]
async fn foreign_tag_id_is_invalid() {
    let (engine, store) = engine();
    seed_book(&store, "b1", "u1").await;

    let theirs = crate::model::Tag::new("u2", "urgent", None, chrono::Utc::now());
    store.insert_tag(&theirs).await.unwrap();

    let err = engine
        .create_automation(request(
            "u1",
            vec![ActionData::AddTag {
                target: ResourceKind::Book,
                target_id: "b1".into(),
                tag_id: theirs.id.clone(),
                tag_name: None,
            }],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
