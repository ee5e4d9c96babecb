//! Engine-facing request, result, and error types

use thiserror::Error;

use crate::model::{
    ActionData, Automation, AutomationAction, AutomationSource, AutomationStatus,
    Category, Tag,
};
use crate::storage::StorageError;

/// Errors that can occur in engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input to an action, or a referenced resource that does
    /// not exist (or is not owned by the caller). Raised before any
    /// write.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Referenced automation does not exist or is not owned by the
    /// caller. The two are deliberately indistinguishable.
    #[error("{0} not found")]
    NotFound(String),

    /// State-machine violation, e.g. approving a non-pending automation.
    /// Never retried automatically.
    #[error("automation is already {0}")]
    Conflict(AutomationStatus),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// A submitted automation: a named batch of categorization actions.
#[derive(Debug, Clone)]
pub struct NewAutomation {
    pub owner_id: String,
    pub name: String,
    pub source: AutomationSource,
    pub actions: Vec<ActionData>,
}

/// What an automation call produced.
///
/// The created lists contain only genuinely new entities — names that
/// resolved to pre-existing categories or tags are not repeated here.
#[derive(Debug, Clone, Default)]
pub struct AutomationReceipt {
    pub automation_id: String,
    pub created_categories: Vec<Category>,
    pub created_tags: Vec<Tag>,
}

/// A full automation with its action log, for detail views and
/// provenance answers.
#[derive(Debug, Clone)]
pub struct AutomationDetail {
    pub automation: Automation,
    pub actions: Vec<AutomationAction>,
}

/// One revert step that was skipped rather than applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRevert {
    pub action_id: String,
    pub reason: String,
}

/// Outcome of a revert: which actions were undone, which were skipped
/// and why. Reverts are best-effort for legacy or ambiguous data, so
/// skips are reported, not just logged.
#[derive(Debug, Clone, Default)]
pub struct RevertReport {
    pub automation_id: String,
    pub reverted: Vec<String>,
    pub skipped: Vec<SkippedRevert>,
}

/// When an automation's actions run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Actions execute during `create_automation`; approval just records
    /// the user's sign-off.
    #[default]
    Immediate,
    /// `create_automation` only records actions; nothing touches the
    /// library until `approve_automation` runs them.
    Deferred,
}

/// What happens to already-applied steps when a later step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the call, leave applied steps in place.
    #[default]
    KeepPartial,
    /// Abort the call and undo the steps this call applied, last first.
    Unwind,
}

/// Engine policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    pub execution: ExecutionMode,
    pub on_failure: FailurePolicy,
}
