//! Storage backends for Spark

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    AutomationFilter, JunctionRow, OpenStore, SparkStore, StorageError, StorageResult,
};
