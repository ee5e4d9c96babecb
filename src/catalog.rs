//! Category/Tag store: create-or-get semantics and cascading deletes
//!
//! Categories dedupe on slug, tags on (owner, name). A lost race against
//! a concurrent insert shows up as a unique violation; the catalog
//! re-reads and returns what is now present instead of propagating it.

use std::sync::Arc;

use crate::clock::Clock;
use crate::model::{slugify, Category, Tag};
use crate::storage::{SparkStore, StorageError, StorageResult};

/// Create-or-get access to categories and tags.
#[derive(Clone)]
pub struct EntityCatalog {
    store: Arc<dyn SparkStore>,
    clock: Arc<dyn Clock>,
}

impl EntityCatalog {
    pub fn new(store: Arc<dyn SparkStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Resolve a category by name, creating it if absent.
    ///
    /// Returns the category and whether this call created it. A category
    /// that already exists keeps its original provenance; the
    /// `created_by_automation_id` stamp only lands on genuinely new rows.
    pub async fn get_or_create_category(
        &self,
        name: &str,
        created_by_automation_id: Option<&str>,
    ) -> StorageResult<(Category, bool)> {
        let slug = slugify(name);
        if let Some(existing) = self.store.find_category_by_slug(&slug).await? {
            return Ok((existing, false));
        }

        let category = Category::new(
            name.trim(),
            created_by_automation_id.map(|s| s.to_string()),
            self.clock.now(),
        );
        match self.store.insert_category(&category).await {
            Ok(()) => Ok((category, true)),
            Err(StorageError::UniqueViolation(_)) => {
                // Someone else created it between our read and write.
                match self.store.find_category_by_slug(&slug).await? {
                    Some(existing) => Ok((existing, false)),
                    None => Err(StorageError::UniqueViolation(slug)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve a tag by (owner, name), creating it if absent.
    pub async fn get_or_create_tag(
        &self,
        owner_id: &str,
        name: &str,
        created_by_automation_id: Option<&str>,
    ) -> StorageResult<(Tag, bool)> {
        let name = name.trim();
        if let Some(existing) = self.store.find_tag_by_name(owner_id, name).await? {
            return Ok((existing, false));
        }

        let tag = Tag::new(
            owner_id,
            name,
            created_by_automation_id.map(|s| s.to_string()),
            self.clock.now(),
        );
        match self.store.insert_tag(&tag).await {
            Ok(()) => Ok((tag, true)),
            Err(StorageError::UniqueViolation(_)) => {
                match self.store.find_tag_by_name(owner_id, name).await? {
                    Some(existing) => Ok((existing, false)),
                    None => Err(StorageError::UniqueViolation(name.to_string())),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a category and every junction row referencing it.
    ///
    /// The junction sweep comes first: the persistence layer does not
    /// cascade, so the catalog owns referential integrity here.
    pub async fn delete_category(&self, id: &str) -> StorageResult<bool> {
        self.store.purge_category_links(id).await?;
        self.store.delete_category(id).await
    }

    /// Delete a tag and every junction row referencing it.
    pub async fn delete_tag(&self, id: &str) -> StorageResult<bool> {
        self.store.purge_tag_links(id).await?;
        self.store.delete_tag(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::model::{CreatedBy, ResourceKind};
    use crate::storage::{OpenStore, SqliteStore};

    fn catalog() -> (EntityCatalog, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let catalog = EntityCatalog::new(store.clone(), Arc::new(SystemClock));
        (catalog, store)
    }

    #[tokio::test]
    async fn same_name_twice_yields_same_category() {
        let (catalog, _) = catalog();

        let (first, created_first) = catalog.get_or_create_category("Deep Work", None).await.unwrap();
        let (second, created_second) = catalog.get_or_create_category("deep work", None).await.unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn lost_insert_race_returns_the_winner() {
        let (catalog, store) = catalog();

        // Simulate a rival writer that won the race after our read:
        // the row exists with the same slug but a different id.
        let rival = Category::new("History", None, chrono::Utc::now());
        store.insert_category(&rival).await.unwrap();

        let fresh = Category::new("History", None, chrono::Utc::now());
        // Direct insert fails with a unique violation...
        assert!(matches!(
            store.insert_category(&fresh).await,
            Err(StorageError::UniqueViolation(_))
        ));
        // ...but the catalog resolves to the winner instead.
        let (resolved, created) = catalog.get_or_create_category("History", None).await.unwrap();
        assert!(!created);
        assert_eq!(resolved.id, rival.id);
    }

    #[tokio::test]
    async fn provenance_stamp_only_on_new_rows() {
        let (catalog, _) = catalog();

        let (first, _) = catalog.get_or_create_category("Stoicism", None).await.unwrap();
        assert_eq!(first.created_by_automation_id, None);

        // A later automation resolving the same name must not claim it
        let (again, created) = catalog
            .get_or_create_category("Stoicism", Some("auto-1"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.created_by_automation_id, None);
    }

    #[tokio::test]
    async fn tags_dedupe_per_owner() {
        let (catalog, _) = catalog();

        let (mine, created_mine) = catalog.get_or_create_tag("u1", "urgent", None).await.unwrap();
        let (theirs, created_theirs) = catalog.get_or_create_tag("u2", "urgent", None).await.unwrap();
        let (mine_again, created_again) = catalog.get_or_create_tag("u1", "urgent", None).await.unwrap();

        assert!(created_mine && created_theirs);
        assert!(!created_again);
        assert_eq!(mine.id, mine_again.id);
        assert_ne!(mine.id, theirs.id);
    }

    #[tokio::test]
    async fn delete_category_sweeps_junctions_first() {
        let (catalog, store) = catalog();
        let (category, _) = catalog.get_or_create_category("Travel", None).await.unwrap();

        let now = chrono::Utc::now();
        store
            .upsert_category_link(ResourceKind::Book, "b1", &category.id, None, CreatedBy::User, now)
            .await
            .unwrap();
        store
            .upsert_category_link(ResourceKind::Spark, "s1", &category.id, None, CreatedBy::User, now)
            .await
            .unwrap();

        assert!(catalog.delete_category(&category.id).await.unwrap());
        assert!(store.find_category(&category.id).await.unwrap().is_none());
        assert!(store
            .find_category_link(ResourceKind::Book, "b1", &category.id)
            .await
            .unwrap()
            .is_none());
    }
}
