//! Automation engine: lifecycle orchestration
//!
//! One engine instance drives every automation operation. All state
//! lives behind the injected store; the engine itself only holds the
//! collaborators it orchestrates.
//!
//! Execution of one automation is strictly sequential: creation actions
//! resolve first (so association actions can reference entities a
//! sibling creation is about to produce), then association actions
//! apply one at a time, each awaited before the next. Nothing here
//! pipelines writes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::types::{
    AutomationDetail, AutomationReceipt, EngineConfig, EngineError, EngineResult,
    ExecutionMode, FailurePolicy, NewAutomation,
};
use crate::catalog::EntityCatalog;
use crate::clock::{Clock, SystemClock};
use crate::junction::{EntityRef, JunctionWriter};
use crate::model::{
    slugify, ActionData, ActionStatus, Automation, AutomationAction, AutomationStatus,
    Category, ResourceKind, ResourceRef, Tag,
};
use crate::ownership::OwnershipGuard;
use crate::storage::{AutomationFilter, SparkStore};

/// The automation engine.
///
/// Constructed with an injected storage handle and clock; no ambient
/// globals.
pub struct AutomationEngine {
    pub(super) store: Arc<dyn SparkStore>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
    pub(super) catalog: EntityCatalog,
    pub(super) junctions: JunctionWriter,
    pub(super) ownership: OwnershipGuard,
}

/// One action scheduled for execution. `row` is present when the action
/// was recorded earlier (the deferred path) and absent when the row is
/// yet to be written.
struct Planned {
    row: Option<AutomationAction>,
    data: ActionData,
}

/// Working state of one execution pass.
#[derive(Default)]
struct ExecState {
    /// slug → category id, from this automation's creation actions
    category_ids: HashMap<String, String>,
    /// tag name → tag id, from this automation's creation actions
    tag_ids: HashMap<String, String>,
    created_categories: Vec<Category>,
    created_tags: Vec<Tag>,
    /// Actions executed by this call, in order, for the unwind policy
    applied: Vec<AutomationAction>,
    next_position: i64,
}

impl AutomationEngine {
    /// Create an engine over the given store, using the system clock and
    /// default policies.
    pub fn new(store: Arc<dyn SparkStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit clock (tests pin time this way).
    pub fn with_clock(store: Arc<dyn SparkStore>, clock: Arc<dyn Clock>) -> Self {
        let catalog = EntityCatalog::new(store.clone(), clock.clone());
        let junctions = JunctionWriter::new(store.clone());
        let ownership = OwnershipGuard::new(store.clone());
        Self {
            store,
            clock,
            config: EngineConfig::default(),
            catalog,
            junctions,
            ownership,
        }
    }

    /// Override the execution and failure policies.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The storage handle the engine was constructed with.
    pub fn store(&self) -> &Arc<dyn SparkStore> {
        &self.store
    }

    // === Public operations ===

    /// Create an automation from a batch of actions.
    ///
    /// Validation (field shape and ownership of every referenced
    /// resource) happens before any write; a validation failure leaves
    /// the store untouched. In immediate mode the actions execute here;
    /// in deferred mode they are recorded pending and run at approval.
    pub async fn create_automation(
        &self,
        request: NewAutomation,
    ) -> EngineResult<AutomationReceipt> {
        if request.name.trim().is_empty() {
            return Err(EngineError::Validation(
                "automation requires a name".to_string(),
            ));
        }
        self.validate_actions(&request.owner_id, &request.actions).await?;

        let automation = Automation::new(
            &request.owner_id,
            request.name.trim(),
            request.source,
            self.clock.now(),
        );
        self.store.insert_automation(&automation).await?;
        debug!(automation = %automation.id, actions = request.actions.len(), "automation created");

        // Creation actions always precede association actions, so the
        // stored order is the execution order regardless of how the
        // client arranged the batch.
        let (creations, associations) = partition_actions(request.actions);

        match self.config.execution {
            ExecutionMode::Immediate => {
                let planned_creations = creations
                    .into_iter()
                    .map(|data| Planned { row: None, data })
                    .collect();
                let planned_associations = associations
                    .into_iter()
                    .map(|data| Planned { row: None, data })
                    .collect();
                let state = self
                    .execute_batch(&automation, planned_creations, planned_associations)
                    .await?;
                Ok(AutomationReceipt {
                    automation_id: automation.id,
                    created_categories: state.created_categories,
                    created_tags: state.created_tags,
                })
            }
            ExecutionMode::Deferred => {
                let mut position = 0;
                for data in creations.into_iter().chain(associations) {
                    let action = AutomationAction::new(&automation.id, position, data);
                    self.store.insert_action(&action).await?;
                    position += 1;
                }
                Ok(AutomationReceipt {
                    automation_id: automation.id,
                    ..Default::default()
                })
            }
        }
    }

    /// Approve a pending automation, executing any actions that have not
    /// run yet (all of them in deferred mode, none in immediate mode).
    pub async fn approve_automation(
        &self,
        owner_id: &str,
        automation_id: &str,
    ) -> EngineResult<AutomationReceipt> {
        let automation = self.owned_automation(owner_id, automation_id).await?;
        if automation.status != AutomationStatus::Pending {
            return Err(EngineError::Conflict(automation.status));
        }

        let actions = self.store.actions_for_automation(automation_id).await?;
        let pending: Vec<AutomationAction> = actions
            .into_iter()
            .filter(|a| a.status == ActionStatus::Pending)
            .collect();

        // Re-check before any write: deferred actions may reference
        // resources that disappeared since the automation was created.
        let pending_data: Vec<ActionData> = pending.iter().map(|a| a.data.clone()).collect();
        self.validate_actions(owner_id, &pending_data).await?;

        self.store
            .set_automation_status(automation_id, AutomationStatus::Approved)
            .await?;

        let (creations, associations): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|row| Planned { data: row.data.clone(), row: Some(row) })
            .partition(|p| p.data.is_creation());

        let state = self
            .execute_batch(&automation, creations, associations)
            .await?;
        debug!(automation = %automation_id, "automation approved");

        Ok(AutomationReceipt {
            automation_id: automation_id.to_string(),
            created_categories: state.created_categories,
            created_tags: state.created_tags,
        })
    }

    /// Reject a pending automation. Still-pending actions move to
    /// `rejected`; anything already executed is deliberately left alone
    /// (rejection is not a revert).
    pub async fn reject_automation(
        &self,
        owner_id: &str,
        automation_id: &str,
    ) -> EngineResult<()> {
        let automation = self.owned_automation(owner_id, automation_id).await?;
        if automation.status != AutomationStatus::Pending {
            return Err(EngineError::Conflict(automation.status));
        }

        self.store
            .set_automation_status(automation_id, AutomationStatus::Rejected)
            .await?;
        let rejected = self.store.reject_pending_actions(automation_id).await?;
        debug!(automation = %automation_id, rejected, "automation rejected");
        Ok(())
    }

    /// Fetch one automation with its full action log. `None` covers both
    /// "does not exist" and "not yours".
    pub async fn get_automation(
        &self,
        owner_id: &str,
        automation_id: &str,
    ) -> EngineResult<Option<AutomationDetail>> {
        let automation = match self.store.get_automation(automation_id).await? {
            Some(a) if a.owner_id == owner_id => a,
            _ => return Ok(None),
        };
        let actions = self.store.actions_for_automation(automation_id).await?;
        Ok(Some(AutomationDetail { automation, actions }))
    }

    /// List automations for a user, optionally filtered by status and
    /// source. Summary only; actions are omitted for list views.
    pub async fn list_automations(
        &self,
        owner_id: &str,
        filter: AutomationFilter,
    ) -> EngineResult<Vec<Automation>> {
        Ok(self.store.list_automations(owner_id, &filter).await?)
    }

    // === Internal helpers ===

    /// Load an automation the caller owns, or NotFound. Absent and
    /// foreign automations produce the same error.
    pub(super) async fn owned_automation(
        &self,
        owner_id: &str,
        automation_id: &str,
    ) -> EngineResult<Automation> {
        match self.store.get_automation(automation_id).await? {
            Some(a) if a.owner_id == owner_id => Ok(a),
            _ => Err(EngineError::NotFound(format!("automation {}", automation_id))),
        }
    }

    /// Validate every action's shape and the ownership of every resource
    /// it references. Runs before any write.
    async fn validate_actions(
        &self,
        owner_id: &str,
        actions: &[ActionData],
    ) -> EngineResult<()> {
        for data in actions {
            match data {
                ActionData::CreateCategory { category_name, target, target_id } => {
                    if slugify(category_name).is_empty() {
                        return Err(EngineError::Validation(
                            "create_category requires a category name".to_string(),
                        ));
                    }
                    self.validate_target(owner_id, target, target_id, "create_category")
                        .await?;
                }
                ActionData::CreateTag { tag_name, target, target_id } => {
                    if tag_name.trim().is_empty() {
                        return Err(EngineError::Validation(
                            "create_tag requires a tag name".to_string(),
                        ));
                    }
                    self.validate_target(owner_id, target, target_id, "create_tag")
                        .await?;
                }
                ActionData::AddCategory { target, target_id, category_id } => {
                    if category_id.trim().is_empty() {
                        return Err(EngineError::Validation(
                            "add_category requires a category id or name".to_string(),
                        ));
                    }
                    self.require_resource(owner_id, *target, target_id).await?;
                }
                ActionData::AddTag { target, target_id, tag_id, tag_name } => {
                    let named = tag_name.as_deref().is_some_and(|n| !n.trim().is_empty());
                    if tag_id.trim().is_empty() && !named {
                        return Err(EngineError::Validation(
                            "add_tag requires a tag id or name".to_string(),
                        ));
                    }
                    self.require_resource(owner_id, *target, target_id).await?;
                }
            }
        }
        Ok(())
    }

    async fn validate_target(
        &self,
        owner_id: &str,
        target: &Option<ResourceKind>,
        target_id: &Option<String>,
        what: &str,
    ) -> EngineResult<()> {
        match (target, target_id) {
            (None, None) => Ok(()),
            (Some(kind), Some(id)) => self.require_resource(owner_id, *kind, id).await,
            _ => Err(EngineError::Validation(format!(
                "{} target requires both a kind and an id",
                what
            ))),
        }
    }

    /// Ownership check for mutating paths: absent rows and rows owned by
    /// someone else fail identically.
    async fn require_resource(
        &self,
        owner_id: &str,
        kind: ResourceKind,
        id: &str,
    ) -> EngineResult<()> {
        let resource = ResourceRef::new(kind, id, owner_id);
        if self.ownership.verify(&resource).await? {
            Ok(())
        } else {
            Err(EngineError::Validation(format!("{} {} not found", kind, id)))
        }
    }

    /// Run one automation's actions: all creations, then all
    /// associations (including creations rewritten to associations by
    /// dedup). On failure the configured policy decides whether applied
    /// steps stay.
    async fn execute_batch(
        &self,
        automation: &Automation,
        creations: Vec<Planned>,
        associations: Vec<Planned>,
    ) -> EngineResult<ExecState> {
        let mut state = ExecState::default();
        let mut assoc_queue = associations;

        for planned in creations {
            match self.run_creation(automation, planned, &mut state).await {
                Ok(Some(rewritten)) => assoc_queue.push(rewritten),
                Ok(None) => {}
                Err(e) => {
                    self.abort_batch(automation, &state).await?;
                    return Err(e);
                }
            }
        }

        for planned in assoc_queue {
            if let Err(e) = self.run_association(automation, planned, &mut state).await {
                self.abort_batch(automation, &state).await?;
                return Err(e);
            }
        }

        Ok(state)
    }

    /// Execute one creation action.
    ///
    /// When the name resolves to a pre-existing entity and the action
    /// carries a target, the action is rewritten to the equivalent add
    /// action against the existing id and handed back for the
    /// association pass — the stored log then reflects what actually
    /// happened rather than the client's original intent.
    async fn run_creation(
        &self,
        automation: &Automation,
        planned: Planned,
        state: &mut ExecState,
    ) -> EngineResult<Option<Planned>> {
        match planned.data.clone() {
            ActionData::CreateCategory { category_name, target, target_id } => {
                let (category, created) = self
                    .catalog
                    .get_or_create_category(&category_name, Some(&automation.id))
                    .await?;
                state
                    .category_ids
                    .insert(category.slug.clone(), category.id.clone());

                if !created {
                    if let (Some(kind), Some(resource_id)) = (target, target_id) {
                        debug!(
                            automation = %automation.id,
                            category = %category.id,
                            "create_category resolved to existing; rewriting to add_category"
                        );
                        return Ok(Some(Planned {
                            row: planned.row,
                            data: ActionData::AddCategory {
                                target: kind,
                                target_id: resource_id,
                                category_id: category.id,
                            },
                        }));
                    }
                    // Nothing to attach and nothing created: record the
                    // resolution and move on.
                    self.finish_noop(automation, planned, state).await?;
                    return Ok(None);
                }

                let attach_to = match (target, target_id) {
                    (Some(kind), Some(id)) => {
                        Some((ResourceRef::new(kind, id, &automation.owner_id),
                              EntityRef::Category(category.id.clone())))
                    }
                    _ => None,
                };
                self.apply_action(automation, planned, attach_to, state).await?;
                state.created_categories.push(category);
                Ok(None)
            }
            ActionData::CreateTag { tag_name, target, target_id } => {
                let (tag, created) = self
                    .catalog
                    .get_or_create_tag(&automation.owner_id, &tag_name, Some(&automation.id))
                    .await?;
                state.tag_ids.insert(tag.name.clone(), tag.id.clone());

                if !created {
                    if let (Some(kind), Some(resource_id)) = (target, target_id) {
                        debug!(
                            automation = %automation.id,
                            tag = %tag.id,
                            "create_tag resolved to existing; rewriting to add_tag"
                        );
                        return Ok(Some(Planned {
                            row: planned.row,
                            data: ActionData::AddTag {
                                target: kind,
                                target_id: resource_id,
                                tag_id: tag.id,
                                tag_name: Some(tag.name),
                            },
                        }));
                    }
                    self.finish_noop(automation, planned, state).await?;
                    return Ok(None);
                }

                let attach_to = match (target, target_id) {
                    (Some(kind), Some(id)) => {
                        Some((ResourceRef::new(kind, id, &automation.owner_id),
                              EntityRef::Tag(tag.id.clone())))
                    }
                    _ => None,
                };
                self.apply_action(automation, planned, attach_to, state).await?;
                state.created_tags.push(tag);
                Ok(None)
            }
            // Partitioning guarantees only creation variants arrive here
            other => Err(EngineError::Validation(format!(
                "{} is not a creation action",
                other.kind_str()
            ))),
        }
    }

    /// Execute one association action, resolving entity references
    /// through this automation's creation results first.
    async fn run_association(
        &self,
        automation: &Automation,
        planned: Planned,
        state: &mut ExecState,
    ) -> EngineResult<()> {
        match planned.data.clone() {
            ActionData::AddCategory { target, target_id, category_id } => {
                let resolved = self.resolve_category(&category_id, state).await?;
                let planned = Planned {
                    row: planned.row,
                    data: ActionData::AddCategory {
                        target,
                        target_id: target_id.clone(),
                        category_id: resolved.clone(),
                    },
                };
                let resource = ResourceRef::new(target, target_id, &automation.owner_id);
                let attach = Some((resource, EntityRef::Category(resolved)));
                self.apply_action(automation, planned, attach, state).await
            }
            ActionData::AddTag { target, target_id, tag_id, tag_name } => {
                let resolved = self
                    .resolve_tag(automation, &tag_id, tag_name.as_deref(), state)
                    .await?;
                let planned = Planned {
                    row: planned.row,
                    data: ActionData::AddTag {
                        target,
                        target_id: target_id.clone(),
                        tag_id: resolved.clone(),
                        tag_name,
                    },
                };
                let resource = ResourceRef::new(target, target_id, &automation.owner_id);
                let attach = Some((resource, EntityRef::Tag(resolved)));
                self.apply_action(automation, planned, attach, state).await
            }
            other => Err(EngineError::Validation(format!(
                "{} is not an association action",
                other.kind_str()
            ))),
        }
    }

    /// Resolve a category reference: explicit id, then this automation's
    /// creations by slug, then the store by slug.
    async fn resolve_category(
        &self,
        raw: &str,
        state: &ExecState,
    ) -> EngineResult<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EngineError::Validation(
                "add_category requires a category id or name".to_string(),
            ));
        }
        if let Some(category) = self.store.find_category(raw).await? {
            return Ok(category.id);
        }
        let slug = slugify(raw);
        if let Some(id) = state.category_ids.get(&slug) {
            return Ok(id.clone());
        }
        if let Some(category) = self.store.find_category_by_slug(&slug).await? {
            return Ok(category.id);
        }
        Err(EngineError::Validation(format!(
            "category '{}' not found",
            raw
        )))
    }

    /// Resolve a tag reference: explicit id (which must be the owner's),
    /// then this automation's creations by name, then create-or-get by
    /// name. A tag created here counts toward the receipt.
    async fn resolve_tag(
        &self,
        automation: &Automation,
        tag_id: &str,
        tag_name: Option<&str>,
        state: &mut ExecState,
    ) -> EngineResult<String> {
        let tag_id = tag_id.trim();
        if !tag_id.is_empty() {
            return match self.store.find_tag(tag_id).await? {
                Some(tag) if tag.owner_id == automation.owner_id => Ok(tag.id),
                _ => Err(EngineError::Validation(format!("tag '{}' not found", tag_id))),
            };
        }

        let name = tag_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                EngineError::Validation("add_tag requires a tag id or name".to_string())
            })?;
        if let Some(id) = state.tag_ids.get(name) {
            return Ok(id.clone());
        }

        let (tag, created) = self
            .catalog
            .get_or_create_tag(&automation.owner_id, name, Some(&automation.id))
            .await?;
        state.tag_ids.insert(tag.name.clone(), tag.id.clone());
        if created {
            state.created_tags.push(tag.clone());
        }
        Ok(tag.id)
    }

    /// Persist (or update) the action row, walk it through
    /// executing → executed, attaching on the way. A failure after the
    /// row exists marks it failed before propagating.
    async fn apply_action(
        &self,
        automation: &Automation,
        planned: Planned,
        attach: Option<(ResourceRef, EntityRef)>,
        state: &mut ExecState,
    ) -> EngineResult<()> {
        let action = self.persist_action(automation, planned, state).await?;

        self.store
            .set_action_status(&action.id, ActionStatus::Executing, None)
            .await?;

        if let Some((resource, entity)) = attach {
            if let Err(e) = self
                .junctions
                .attach(&resource, &entity, Some(&action.id), self.clock.now())
                .await
            {
                self.mark_failed(&action.id).await;
                return Err(e.into());
            }
        }

        let executed_at = self.clock.now();
        self.store
            .set_action_status(&action.id, ActionStatus::Executed, Some(executed_at))
            .await?;

        let mut done = action;
        done.status = ActionStatus::Executed;
        done.executed_at = Some(executed_at);
        state.applied.push(done);
        Ok(())
    }

    /// Record a creation action that resolved to an existing entity and
    /// has nothing to attach: stored executed, with nothing to undo.
    async fn finish_noop(
        &self,
        automation: &Automation,
        planned: Planned,
        state: &mut ExecState,
    ) -> EngineResult<()> {
        self.apply_action(automation, planned, None, state).await
    }

    /// Ensure the action row exists and carries the final (resolved,
    /// possibly rewritten) payload.
    async fn persist_action(
        &self,
        automation: &Automation,
        planned: Planned,
        state: &mut ExecState,
    ) -> EngineResult<AutomationAction> {
        match planned.row {
            Some(mut row) => {
                if row.data != planned.data {
                    self.store.update_action_data(&row.id, &planned.data).await?;
                    row.data = planned.data;
                }
                Ok(row)
            }
            None => {
                let action =
                    AutomationAction::new(&automation.id, state.next_position, planned.data);
                state.next_position += 1;
                self.store.insert_action(&action).await?;
                Ok(action)
            }
        }
    }

    /// Best-effort `executing → failed`; the original error is what the
    /// caller needs to see.
    async fn mark_failed(&self, action_id: &str) {
        let _ = self
            .store
            .set_action_status(action_id, ActionStatus::Failed, None)
            .await;
    }

    /// Failure policy hook: unwind this call's applied actions when
    /// configured to, otherwise leave them (the storage has no
    /// cross-row transaction to lean on).
    async fn abort_batch(
        &self,
        automation: &Automation,
        state: &ExecState,
    ) -> EngineResult<()> {
        if self.config.on_failure == FailurePolicy::Unwind {
            for action in state.applied.iter().rev() {
                self.undo_action(automation, action).await?;
                self.store
                    .set_action_status(&action.id, ActionStatus::Reverted, None)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Split a batch into (creations, associations), both preserving the
/// submitted relative order.
fn partition_actions(actions: Vec<ActionData>) -> (Vec<ActionData>, Vec<ActionData>) {
    actions.into_iter().partition(|a| a.is_creation())
}
