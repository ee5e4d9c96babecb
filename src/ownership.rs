//! Row-level ownership checks
//!
//! The persistence layer does not enforce ownership; every mutating path
//! goes through here before touching a resource another user might own.

use std::sync::Arc;

use crate::model::ResourceRef;
use crate::storage::{SparkStore, StorageResult};

/// Read-only ownership verification against the resource tables.
#[derive(Clone)]
pub struct OwnershipGuard {
    store: Arc<dyn SparkStore>,
}

impl OwnershipGuard {
    pub fn new(store: Arc<dyn SparkStore>) -> Self {
        Self { store }
    }

    /// Whether the referenced row exists and belongs to `ref.owner_id`.
    ///
    /// An absent row and a row owned by someone else both return `false`,
    /// deliberately indistinguishable so callers cannot probe for the
    /// existence of other users' data.
    pub async fn verify(&self, resource: &ResourceRef) -> StorageResult<bool> {
        let owner = self.store.resource_owner(resource.kind, &resource.id).await?;
        Ok(owner.as_deref() == Some(resource.owner_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use crate::storage::{OpenStore, SqliteStore};

    #[tokio::test]
    async fn missing_and_foreign_rows_are_indistinguishable() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let guard = OwnershipGuard::new(store.clone());

        store
            .insert_resource(ResourceKind::Book, "b1", "u2", "Meditations")
            .await
            .unwrap();

        // Row absent entirely
        let missing = guard
            .verify(&ResourceRef::new(ResourceKind::Book, "nope", "u1"))
            .await
            .unwrap();
        // Row present but owned by u2
        let foreign = guard
            .verify(&ResourceRef::new(ResourceKind::Book, "b1", "u1"))
            .await
            .unwrap();

        assert_eq!(missing, foreign);
        assert!(!missing);
    }

    #[tokio::test]
    async fn own_row_verifies() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let guard = OwnershipGuard::new(store.clone());

        store
            .insert_resource(ResourceKind::Spark, "s1", "u1", "an idea")
            .await
            .unwrap();

        assert!(guard
            .verify(&ResourceRef::new(ResourceKind::Spark, "s1", "u1"))
            .await
            .unwrap());
    }
}
