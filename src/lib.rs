//! Spark: Categorization Automation Engine
//!
//! The approval-workflow core of the Spark personal knowledge base:
//! batches of categorization actions (create categories and tags, attach
//! them to books, highlights, and sparks) submitted as one automation,
//! executed with create-before-associate ordering, and carrying enough
//! provenance to be reverted exactly.
//!
//! # Core Concepts
//!
//! - **Resources**: books, highlights, and sparks — the categorizable kinds
//! - **Automations**: named action batches with a pending/approved/rejected/reverted lifecycle
//! - **Provenance**: every association row remembers the action that caused it
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use spark::{AutomationEngine, OpenStore, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::open_in_memory().unwrap());
//! let engine = AutomationEngine::new(store);
//! // Engine is ready for use
//! ```

pub mod automation;
mod catalog;
mod clock;
mod junction;
pub mod model;
mod ownership;
pub mod storage;

pub use automation::{
    AutomationDetail, AutomationEngine, AutomationReceipt, EngineConfig, EngineError,
    EngineResult, ExecutionMode, FailurePolicy, NewAutomation, RevertReport, SkippedRevert,
};
pub use catalog::EntityCatalog;
pub use clock::{Clock, SystemClock};
pub use junction::{EntityRef, JunctionWriter};
pub use model::{
    ActionData, ActionStatus, Automation, AutomationAction, AutomationSource,
    AutomationStatus, Category, CreatedBy, ResourceKind, ResourceRef, Tag,
};
pub use ownership::OwnershipGuard;
pub use storage::{
    AutomationFilter, JunctionRow, OpenStore, SparkStore, SqliteStore, StorageError,
    StorageResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
