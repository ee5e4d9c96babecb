//! Provenance lookup: which automation caused an association
//!
//! Answers "why is this tagged?" by walking junction row → action →
//! automation. Every break in that chain (user-created row, deleted
//! action or automation) is a `None`, not an error.

use super::engine::AutomationEngine;
use super::types::{AutomationDetail, EngineResult};
use crate::junction::EntityRef;
use crate::model::ResourceRef;

impl AutomationEngine {
    /// Find the automation whose action attached the given category or
    /// tag to the resource.
    ///
    /// Returns `None` when the association was user-created (no action
    /// id), when no association exists, or when the provenance chain
    /// points at rows that no longer exist.
    pub async fn find_originating_automation(
        &self,
        resource: &ResourceRef,
        entity: &EntityRef,
    ) -> EngineResult<Option<AutomationDetail>> {
        if !self.ownership.verify(resource).await? {
            return Ok(None);
        }

        let Some(row) = self.junctions.find(resource, entity).await? else {
            return Ok(None);
        };
        let Some(action_id) = row.action_id else {
            return Ok(None);
        };
        let Some(action) = self.store.get_action(&action_id).await? else {
            return Ok(None);
        };
        let Some(automation) = self.store.get_automation(&action.automation_id).await? else {
            return Ok(None);
        };
        if automation.owner_id != resource.owner_id {
            return Ok(None);
        }

        let actions = self.store.actions_for_automation(&automation.id).await?;
        Ok(Some(AutomationDetail { automation, actions }))
    }
}
