//! Shared helpers for automation integration tests

use std::sync::Arc;

use spark::{
    ActionData, AutomationEngine, AutomationSource, NewAutomation, OpenStore, ResourceKind,
    SparkStore, SqliteStore,
};

/// Engine over a fresh in-memory store, plus the store for direct
/// inspection.
pub fn engine() -> (AutomationEngine, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().expect("open in-memory store"));
    (AutomationEngine::new(store.clone()), store)
}

pub async fn seed_book(store: &SqliteStore, id: &str, owner: &str, title: &str) {
    store
        .insert_resource(ResourceKind::Book, id, owner, title)
        .await
        .expect("seed book");
}

pub async fn seed_spark(store: &SqliteStore, id: &str, owner: &str, content: &str) {
    store
        .insert_resource(ResourceKind::Spark, id, owner, content)
        .await
        .expect("seed spark");
}

/// An AI-sourced automation request, the common case.
pub fn ai_request(owner: &str, name: &str, actions: Vec<ActionData>) -> NewAutomation {
    NewAutomation {
        owner_id: owner.to_string(),
        name: name.to_string(),
        source: AutomationSource::Ai,
        actions,
    }
}
