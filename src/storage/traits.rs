//! Storage trait definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

use crate::model::{
    ActionData, ActionStatus, Automation, AutomationAction, AutomationSource,
    AutomationStatus, Category, CreatedBy, ResourceKind, Tag,
};

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique constraint fired on insert. The catalog treats this as
    /// "someone else just created it" and re-reads instead of failing.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One association row in a category- or tag-junction table.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionRow {
    pub resource_id: String,
    pub entity_id: String,
    /// Provenance back-reference; `None` for direct user edits
    pub action_id: Option<String>,
    pub created_by: CreatedBy,
    pub created_at: DateTime<Utc>,
}

/// Filter criteria for listing automations
#[derive(Debug, Clone, Default)]
pub struct AutomationFilter {
    pub status: Option<AutomationStatus>,
    pub source: Option<AutomationSource>,
}

impl AutomationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: AutomationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: AutomationSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Persistence contract for the automation engine.
///
/// Implementations must be thread-safe (Send + Sync). Every method is an
/// asynchronous I/O boundary: the engine awaits each call before issuing
/// the next, so within one automation operation writes never overlap.
///
/// Insert methods must surface unique-constraint failures as
/// [`StorageError::UniqueViolation`]; the catalog's create-or-get
/// discipline depends on being able to tell them apart from other
/// database errors.
#[async_trait]
pub trait SparkStore: Send + Sync {
    // === Resource operations ===

    /// Insert a resource row of the given kind. `label` lands in the
    /// kind's descriptive column (title for books, content otherwise).
    async fn insert_resource(
        &self,
        kind: ResourceKind,
        id: &str,
        owner_id: &str,
        label: &str,
    ) -> StorageResult<()>;

    /// Look up the owner of a resource row. `None` when absent.
    async fn resource_owner(&self, kind: ResourceKind, id: &str)
        -> StorageResult<Option<String>>;

    // === Category operations ===

    async fn insert_category(&self, category: &Category) -> StorageResult<()>;

    async fn find_category(&self, id: &str) -> StorageResult<Option<Category>>;

    async fn find_category_by_slug(&self, slug: &str) -> StorageResult<Option<Category>>;

    async fn list_categories(&self) -> StorageResult<Vec<Category>>;

    /// Delete the category row itself. Junction cleanup is the caller's
    /// job (the persistence layer does not cascade).
    async fn delete_category(&self, id: &str) -> StorageResult<bool>;

    // === Tag operations ===

    async fn insert_tag(&self, tag: &Tag) -> StorageResult<()>;

    async fn find_tag(&self, id: &str) -> StorageResult<Option<Tag>>;

    async fn find_tag_by_name(&self, owner_id: &str, name: &str)
        -> StorageResult<Option<Tag>>;

    async fn list_tags(&self, owner_id: &str) -> StorageResult<Vec<Tag>>;

    async fn delete_tag(&self, id: &str) -> StorageResult<bool>;

    // === Junction operations ===

    /// Insert-or-replace a (resource, category) association. Re-applying
    /// an existing association overwrites provenance rather than erroring.
    async fn upsert_category_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        category_id: &str,
        action_id: Option<&str>,
        created_by: CreatedBy,
        created_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn find_category_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        category_id: &str,
    ) -> StorageResult<Option<JunctionRow>>;

    /// Delete a (resource, category) association. With `action_id` given,
    /// only a row carrying that exact provenance is removed.
    async fn delete_category_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        category_id: &str,
        action_id: Option<&str>,
    ) -> StorageResult<bool>;

    /// Strip every junction row referencing the category, across all
    /// three resource kinds. Returns the number of rows removed.
    async fn purge_category_links(&self, category_id: &str) -> StorageResult<usize>;

    async fn upsert_tag_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        tag_id: &str,
        action_id: Option<&str>,
        created_by: CreatedBy,
        created_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn find_tag_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        tag_id: &str,
    ) -> StorageResult<Option<JunctionRow>>;

    async fn delete_tag_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        tag_id: &str,
        action_id: Option<&str>,
    ) -> StorageResult<bool>;

    async fn purge_tag_links(&self, tag_id: &str) -> StorageResult<usize>;

    // === Automation operations ===

    async fn insert_automation(&self, automation: &Automation) -> StorageResult<()>;

    async fn get_automation(&self, id: &str) -> StorageResult<Option<Automation>>;

    async fn list_automations(
        &self,
        owner_id: &str,
        filter: &AutomationFilter,
    ) -> StorageResult<Vec<Automation>>;

    async fn set_automation_status(
        &self,
        id: &str,
        status: AutomationStatus,
    ) -> StorageResult<()>;

    // === Action operations ===

    async fn insert_action(&self, action: &AutomationAction) -> StorageResult<()>;

    async fn get_action(&self, id: &str) -> StorageResult<Option<AutomationAction>>;

    /// All actions of an automation, ordered by position ascending.
    async fn actions_for_automation(
        &self,
        automation_id: &str,
    ) -> StorageResult<Vec<AutomationAction>>;

    async fn set_action_status(
        &self,
        id: &str,
        status: ActionStatus,
        executed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    /// Overwrite an action's payload. Used when a deferred create action
    /// is rewritten at approval time so the stored log reflects what
    /// actually happened.
    async fn update_action_data(&self, id: &str, data: &ActionData) -> StorageResult<()>;

    /// Bulk-move every still-pending action of an automation to
    /// `rejected`. Returns the number of actions updated.
    async fn reject_pending_actions(&self, automation_id: &str) -> StorageResult<usize>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: SparkStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
