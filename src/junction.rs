//! Junction writer: idempotent association rows with provenance
//!
//! Every attach/detach goes through here so that the provenance columns
//! (`automation_action_id`, `created_by`) are stamped consistently. The
//! entity side is expressed as [`EntityRef`] so a caller can never pass
//! both a category and a tag id.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::model::{CreatedBy, ResourceRef};
use crate::storage::{JunctionRow, SparkStore, StorageResult};

/// Exactly one of a category or a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Category(String),
    Tag(String),
}

impl EntityRef {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Category(id) => id,
            EntityRef::Tag(id) => id,
        }
    }
}

/// Writes and removes junction rows.
#[derive(Clone)]
pub struct JunctionWriter {
    store: Arc<dyn SparkStore>,
}

impl JunctionWriter {
    pub fn new(store: Arc<dyn SparkStore>) -> Self {
        Self { store }
    }

    /// Upsert the association row for (resource, entity).
    ///
    /// With a causing action the row is stamped `automation`; without one
    /// it is a direct user edit and carries no action id. Re-applying an
    /// existing association is a no-op at the uniqueness level (the row
    /// is replaced, not duplicated).
    pub async fn attach(
        &self,
        resource: &ResourceRef,
        entity: &EntityRef,
        causing_action_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let created_by = if causing_action_id.is_some() {
            CreatedBy::Automation
        } else {
            CreatedBy::User
        };
        match entity {
            EntityRef::Category(category_id) => {
                self.store
                    .upsert_category_link(
                        resource.kind,
                        &resource.id,
                        category_id,
                        causing_action_id,
                        created_by,
                        at,
                    )
                    .await
            }
            EntityRef::Tag(tag_id) => {
                self.store
                    .upsert_tag_link(
                        resource.kind,
                        &resource.id,
                        tag_id,
                        causing_action_id,
                        created_by,
                        at,
                    )
                    .await
            }
        }
    }

    /// Delete the association row for (resource, entity).
    ///
    /// With `causing_action_id` given, only a row carrying that exact
    /// provenance is removed; rows created by users or by other actions
    /// survive. Returns whether a row was removed.
    pub async fn detach(
        &self,
        resource: &ResourceRef,
        entity: &EntityRef,
        causing_action_id: Option<&str>,
    ) -> StorageResult<bool> {
        match entity {
            EntityRef::Category(category_id) => {
                self.store
                    .delete_category_link(resource.kind, &resource.id, category_id, causing_action_id)
                    .await
            }
            EntityRef::Tag(tag_id) => {
                self.store
                    .delete_tag_link(resource.kind, &resource.id, tag_id, causing_action_id)
                    .await
            }
        }
    }

    /// Read the association row for (resource, entity), if any.
    pub async fn find(
        &self,
        resource: &ResourceRef,
        entity: &EntityRef,
    ) -> StorageResult<Option<JunctionRow>> {
        match entity {
            EntityRef::Category(category_id) => {
                self.store
                    .find_category_link(resource.kind, &resource.id, category_id)
                    .await
            }
            EntityRef::Tag(tag_id) => {
                self.store
                    .find_tag_link(resource.kind, &resource.id, tag_id)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use crate::storage::{OpenStore, SqliteStore};

    fn writer() -> JunctionWriter {
        JunctionWriter::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    fn book(id: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::Book, id, "u1")
    }

    #[tokio::test]
    async fn attach_without_action_is_a_user_edit() {
        let writer = writer();
        let entity = EntityRef::Tag("t1".into());

        writer.attach(&book("b1"), &entity, None, Utc::now()).await.unwrap();

        let row = writer.find(&book("b1"), &entity).await.unwrap().unwrap();
        assert_eq!(row.created_by, CreatedBy::User);
        assert_eq!(row.action_id, None);
    }

    #[tokio::test]
    async fn reattach_is_not_an_error() {
        let writer = writer();
        let entity = EntityRef::Category("c1".into());

        writer
            .attach(&book("b1"), &entity, Some("a1"), Utc::now())
            .await
            .unwrap();
        writer
            .attach(&book("b1"), &entity, Some("a2"), Utc::now())
            .await
            .unwrap();

        let row = writer.find(&book("b1"), &entity).await.unwrap().unwrap();
        assert_eq!(row.action_id.as_deref(), Some("a2"));
        assert_eq!(row.created_by, CreatedBy::Automation);
    }

    #[tokio::test]
    async fn detach_with_provenance_spares_user_rows() {
        let writer = writer();
        let entity = EntityRef::Tag("t1".into());

        // User-created row: a provenance-scoped detach must not touch it
        writer.attach(&book("b1"), &entity, None, Utc::now()).await.unwrap();
        assert!(!writer.detach(&book("b1"), &entity, Some("a1")).await.unwrap());
        assert!(writer.find(&book("b1"), &entity).await.unwrap().is_some());

        // Unscoped detach removes it
        assert!(writer.detach(&book("b1"), &entity, None).await.unwrap());
        assert!(writer.find(&book("b1"), &entity).await.unwrap().is_none());
    }
}
