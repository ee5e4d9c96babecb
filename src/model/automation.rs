//! Automations: a named batch of categorization actions with an
//! approval lifecycle, and the per-action records inside it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::resource::ResourceKind;

/// Who initiated an automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationSource {
    Ai,
    User,
    System,
}

impl fmt::Display for AutomationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AutomationSource::Ai => "ai",
            AutomationSource::User => "user",
            AutomationSource::System => "system",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AutomationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(AutomationSource::Ai),
            "user" => Ok(AutomationSource::User),
            "system" => Ok(AutomationSource::System),
            other => Err(format!("unknown automation source: {}", other)),
        }
    }
}

/// Lifecycle state of an automation.
///
/// `pending → {approved, rejected}`, `approved → reverted`. Nothing
/// leaves `rejected` or `reverted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    Pending,
    Approved,
    Rejected,
    Reverted,
}

impl AutomationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AutomationStatus::Rejected | AutomationStatus::Reverted)
    }
}

impl fmt::Display for AutomationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AutomationStatus::Pending => "pending",
            AutomationStatus::Approved => "approved",
            AutomationStatus::Rejected => "rejected",
            AutomationStatus::Reverted => "reverted",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AutomationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AutomationStatus::Pending),
            "approved" => Ok(AutomationStatus::Approved),
            "rejected" => Ok(AutomationStatus::Rejected),
            "reverted" => Ok(AutomationStatus::Reverted),
            other => Err(format!("unknown automation status: {}", other)),
        }
    }
}

/// Lifecycle state of a single action.
///
/// `pending → executing → {executed, failed}`, `executed → reverted`,
/// and any pre-executed state may go to `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Executing,
    Executed,
    Failed,
    Rejected,
    Reverted,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Executing => "executing",
            ActionStatus::Executed => "executed",
            ActionStatus::Failed => "failed",
            ActionStatus::Rejected => "rejected",
            ActionStatus::Reverted => "reverted",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "executing" => Ok(ActionStatus::Executing),
            "executed" => Ok(ActionStatus::Executed),
            "failed" => Ok(ActionStatus::Failed),
            "rejected" => Ok(ActionStatus::Rejected),
            "reverted" => Ok(ActionStatus::Reverted),
            other => Err(format!("unknown action status: {}", other)),
        }
    }
}

/// Provenance marker on junction rows: who caused the association.
///
/// Direct user edits carry no action id and are never touched by revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedBy {
    User,
    Automation,
}

impl fmt::Display for CreatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CreatedBy::User => "user",
            CreatedBy::Automation => "automation",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CreatedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(CreatedBy::User),
            "automation" => Ok(CreatedBy::Automation),
            other => Err(format!("unknown provenance marker: {}", other)),
        }
    }
}

/// The payload of one automation action.
///
/// Serialized as a tagged JSON blob (`{"action": "create_category", ...}`)
/// into the action row; every consumption site pattern-matches all four
/// variants.
///
/// The create variants optionally carry a resource to attach the new
/// entity to in the same step. When a create deduplicates against an
/// existing entity and a target is present, the action is rewritten to
/// the equivalent add action so the stored log reflects what actually
/// happened. `AddCategory.category_id` and `AddTag.tag_id` may arrive
/// empty or holding a name placeholder; resolution fills them before the
/// row is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionData {
    CreateCategory {
        category_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ResourceKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
    },
    CreateTag {
        tag_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ResourceKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
    },
    AddCategory {
        target: ResourceKind,
        target_id: String,
        category_id: String,
    },
    AddTag {
        target: ResourceKind,
        target_id: String,
        tag_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag_name: Option<String>,
    },
}

impl ActionData {
    /// Creation actions resolve entities; add actions associate them.
    /// Creation always runs before association within one automation.
    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            ActionData::CreateCategory { .. } | ActionData::CreateTag { .. }
        )
    }

    /// Short discriminator for logs and CLI output.
    pub fn kind_str(&self) -> &'static str {
        match self {
            ActionData::CreateCategory { .. } => "create_category",
            ActionData::CreateTag { .. } => "create_tag",
            ActionData::AddCategory { .. } => "add_category",
            ActionData::AddTag { .. } => "add_tag",
        }
    }
}

/// The automation header row. Immutable once created except for `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub source: AutomationSource,
    pub status: AutomationStatus,
    pub created_at: DateTime<Utc>,
}

impl Automation {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        source: AutomationSource,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            source,
            status: AutomationStatus::Pending,
            created_at,
        }
    }
}

/// One recorded action inside an automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationAction {
    pub id: String,
    pub automation_id: String,
    /// Execution order within the automation. Revert walks actions in
    /// strict reverse of this, so associations are undone before the
    /// entities they point at.
    pub position: i64,
    pub data: ActionData,
    pub status: ActionStatus,
    pub executed_at: Option<DateTime<Utc>>,
}

impl AutomationAction {
    pub fn new(automation_id: impl Into<String>, position: i64, data: ActionData) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            automation_id: automation_id.into(),
            position,
            data,
            status: ActionStatus::Pending,
            executed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_data_serializes_with_tag() {
        let data = ActionData::CreateCategory {
            category_name: "History".into(),
            target: None,
            target_id: None,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains(r#""action":"create_category""#));
        assert!(json.contains(r#""category_name":"History""#));

        let back: ActionData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn add_tag_tolerates_missing_tag_name() {
        let json = r#"{"action":"add_tag","target":"book","target_id":"b1","tag_id":""}"#;
        let data: ActionData = serde_json::from_str(json).unwrap();
        match data {
            ActionData::AddTag { target, tag_id, tag_name, .. } => {
                assert_eq!(target, ResourceKind::Book);
                assert!(tag_id.is_empty());
                assert!(tag_name.is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn creation_partition_covers_all_variants() {
        let create = ActionData::CreateTag {
            tag_name: "t".into(),
            target: None,
            target_id: None,
        };
        let add = ActionData::AddCategory {
            target: ResourceKind::Spark,
            target_id: "s1".into(),
            category_id: "c1".into(),
        };
        assert!(create.is_creation());
        assert!(!add.is_creation());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            AutomationStatus::Pending,
            AutomationStatus::Approved,
            AutomationStatus::Rejected,
            AutomationStatus::Reverted,
        ] {
            assert_eq!(s.to_string().parse::<AutomationStatus>().unwrap(), s);
        }
        for s in [
            ActionStatus::Pending,
            ActionStatus::Executing,
            ActionStatus::Executed,
            ActionStatus::Failed,
            ActionStatus::Rejected,
            ActionStatus::Reverted,
        ] {
            assert_eq!(s.to_string().parse::<ActionStatus>().unwrap(), s);
        }
    }
}
