//! Revert: undo exactly one automation's effects
//!
//! Executed actions are processed in strict reverse execution order, so
//! associations come off before the entities they point at. Junction
//! deletions are scoped by the causing action id and never touch rows
//! other actions or direct user edits created. Entity deletions only
//! happen when the entity's provenance proves this automation made it;
//! anything unattributable is skipped, warned about, and reported.

use tracing::{debug, warn};

use super::engine::AutomationEngine;
use super::types::{EngineError, EngineResult, RevertReport, SkippedRevert};
use crate::junction::EntityRef;
use crate::model::{
    slugify, ActionData, ActionStatus, Automation, AutomationAction, AutomationStatus,
};

impl AutomationEngine {
    /// Revert an approved automation.
    ///
    /// Best-effort by design: attribution failures on create-actions are
    /// skipped rather than aborting the revert, and every skip lands in
    /// the returned report so callers can see exactly what was left
    /// behind.
    pub async fn revert_automation(
        &self,
        owner_id: &str,
        automation_id: &str,
    ) -> EngineResult<RevertReport> {
        let automation = self.owned_automation(owner_id, automation_id).await?;
        if automation.status != AutomationStatus::Approved {
            return Err(EngineError::Conflict(automation.status));
        }

        let actions = self.store.actions_for_automation(automation_id).await?;
        let mut report = RevertReport {
            automation_id: automation_id.to_string(),
            ..Default::default()
        };

        // Reverse execution order: highest position first
        for action in actions
            .iter()
            .rev()
            .filter(|a| a.status == ActionStatus::Executed)
        {
            match self.undo_action(&automation, action).await? {
                None => report.reverted.push(action.id.clone()),
                Some(reason) => {
                    warn!(
                        automation = %automation_id,
                        action = %action.id,
                        %reason,
                        "revert step skipped"
                    );
                    report.skipped.push(SkippedRevert {
                        action_id: action.id.clone(),
                        reason,
                    });
                }
            }
            self.store
                .set_action_status(&action.id, ActionStatus::Reverted, None)
                .await?;
        }

        self.store
            .set_automation_status(automation_id, AutomationStatus::Reverted)
            .await?;
        debug!(
            automation = %automation_id,
            reverted = report.reverted.len(),
            skipped = report.skipped.len(),
            "automation reverted"
        );
        Ok(report)
    }

    /// Undo the effects of one executed action. `Ok(Some(reason))` means
    /// the step was deliberately skipped; storage failures propagate.
    pub(super) async fn undo_action(
        &self,
        automation: &Automation,
        action: &AutomationAction,
    ) -> EngineResult<Option<String>> {
        match &action.data {
            ActionData::AddCategory { target, target_id, category_id } => {
                let resource = resource_of(automation, *target, target_id);
                self.junctions
                    .detach(
                        &resource,
                        &EntityRef::Category(category_id.clone()),
                        Some(&action.id),
                    )
                    .await?;
                Ok(None)
            }
            ActionData::AddTag { target, target_id, tag_id, .. } => {
                let resource = resource_of(automation, *target, target_id);
                self.junctions
                    .detach(&resource, &EntityRef::Tag(tag_id.clone()), Some(&action.id))
                    .await?;
                Ok(None)
            }
            ActionData::CreateCategory { category_name, .. } => {
                let slug = slugify(category_name);
                match self.store.find_category_by_slug(&slug).await? {
                    None => Ok(Some(format!(
                        "category '{}' no longer exists",
                        category_name
                    ))),
                    Some(category)
                        if category.created_by_automation_id.as_deref()
                            == Some(automation.id.as_str()) =>
                    {
                        // The catalog strips every reference across all
                        // three kinds before the row goes, in case
                        // something outside this automation also pointed
                        // at it.
                        self.catalog.delete_category(&category.id).await?;
                        Ok(None)
                    }
                    Some(_) => Ok(Some(format!(
                        "category '{}' cannot be attributed to this automation",
                        category_name
                    ))),
                }
            }
            ActionData::CreateTag { tag_name, .. } => {
                match self
                    .store
                    .find_tag_by_name(&automation.owner_id, tag_name.trim())
                    .await?
                {
                    None => Ok(Some(format!("tag '{}' no longer exists", tag_name))),
                    Some(tag)
                        if tag.created_by_automation_id.as_deref()
                            == Some(automation.id.as_str()) =>
                    {
                        self.catalog.delete_tag(&tag.id).await?;
                        Ok(None)
                    }
                    Some(_) => Ok(Some(format!(
                        "tag '{}' cannot be attributed to this automation",
                        tag_name
                    ))),
                }
            }
        }
    }
}

fn resource_of(
    automation: &Automation,
    kind: crate::model::ResourceKind,
    id: &str,
) -> crate::model::ResourceRef {
    crate::model::ResourceRef::new(kind, id, &automation.owner_id)
}
