//! Pipeline engine: composition root and transactional entry points
//!
//! Every public operation opens exactly one store transaction, runs the
//! mutation together with readiness re-evaluation, the cascade walk and
//! callbacks inside it, and commits. Any error rolls everything back.
//! Operation log records and events are handed to the sinks only after
//! the commit succeeded.

use crate::callbacks::CallbackRegistry;
use crate::cascade::{activation_candidates, CascadeOutcome, CascadePropagator};
use crate::flow_graph::{FlowDefinitionProvider, FlowGraph};
use crate::lifecycle::{Actor, LifecycleController, StatusChange};
use crate::members::{MemberChangeHandler, MemberChangeOutcome};
use crate::sinks::{
    EventPublisher, OperationKind, OperationLogSink, OperationRecord, PendingEffects, ProjectEvent,
    ProjectEventKind, TracingEventPublisher, TracingOperationLog,
};
use crate::{aggregator, readiness, EngineError, EngineResult, PreconditionViolation};
use pipeline_store::{PipelineStore, StoreTx, TxScope};
use pipeline_types::{
    ConfigStatus, ExecutableStatus, FlowId, ItemStatus, MemberBinding, NodeId, NodeTotals,
    Project, ProjectId, ProjectStatus, RoleId, TaskRoleMap, UserId, WorkItem, WorkItemId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Outcomes ─────────────────────────────────────────────────────────

/// A work item after an operation, with the cascade it triggered
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemChange {
    pub item: WorkItem,
    pub cascade: CascadeOutcome,
}

/// Read-only readiness report for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatusReport {
    pub project_id: ProjectId,
    pub node_id: NodeId,
    pub totals: NodeTotals,
    pub completed: bool,
    pub executable: ExecutableStatus,
}

/// What one reconciliation pass over a project repaired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Items moved `Blocked → Executable`
    pub activated: Vec<WorkItemId>,
    /// Items moved back `Executable → Blocked`
    pub demoted: Vec<WorkItemId>,
    /// Nodes whose callbacks fired because items were activated
    pub started_nodes: Vec<NodeId>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.activated.is_empty() && self.demoted.is_empty()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

pub struct PipelineEngineBuilder {
    store: Arc<dyn PipelineStore>,
    flows: Arc<dyn FlowDefinitionProvider>,
    callbacks: CallbackRegistry,
    role_map: TaskRoleMap,
    operation_log: Arc<dyn OperationLogSink>,
    events: Arc<dyn EventPublisher>,
}

impl PipelineEngineBuilder {
    pub fn with_callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_role_map(mut self, role_map: TaskRoleMap) -> Self {
        self.role_map = role_map;
        self
    }

    pub fn with_operation_log(mut self, operation_log: Arc<dyn OperationLogSink>) -> Self {
        self.operation_log = operation_log;
        self
    }

    pub fn with_event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> PipelineEngine {
        tracing::debug!(
            callbacks = ?self.callbacks.names(),
            "Pipeline engine built"
        );
        PipelineEngine {
            store: self.store,
            flows: self.flows,
            callbacks: self.callbacks,
            role_map: self.role_map,
            operation_log: self.operation_log,
            events: self.events,
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

pub struct PipelineEngine {
    store: Arc<dyn PipelineStore>,
    flows: Arc<dyn FlowDefinitionProvider>,
    callbacks: CallbackRegistry,
    role_map: TaskRoleMap,
    operation_log: Arc<dyn OperationLogSink>,
    events: Arc<dyn EventPublisher>,
}

impl PipelineEngine {
    /// Start composing an engine. Sinks default to the tracing-backed ones.
    pub fn builder(
        store: Arc<dyn PipelineStore>,
        flows: Arc<dyn FlowDefinitionProvider>,
    ) -> PipelineEngineBuilder {
        PipelineEngineBuilder {
            store,
            flows,
            callbacks: CallbackRegistry::new(),
            role_map: TaskRoleMap::default(),
            operation_log: Arc::new(TracingOperationLog),
            events: Arc::new(TracingEventPublisher),
        }
    }

    pub fn store(&self) -> &Arc<dyn PipelineStore> {
        &self.store
    }

    pub fn role_map(&self) -> &TaskRoleMap {
        &self.role_map
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    // ── Projects ─────────────────────────────────────────────────────

    /// Create a `Ready` project from a flow version
    pub async fn create_project(
        &self,
        flow_id: &FlowId,
        version: u32,
        name: impl Into<String>,
    ) -> EngineResult<Project> {
        self.flows.list_nodes(flow_id, version).await?;
        let project = Project::new(name, flow_id.clone(), version);

        let mut tx = self.store.begin(TxScope::Project(project.id.clone())).await?;
        let result = tx.insert_project(&project).await.map_err(Into::into);
        self.finish(tx, result, PendingEffects::default()).await?;

        tracing::info!(
            project_id = %project.id,
            flow_id = %flow_id,
            version,
            "Project created"
        );
        Ok(project)
    }

    pub async fn get_project(&self, project_id: &ProjectId) -> EngineResult<Project> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let result = Self::require_project(tx.as_mut(), project_id).await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    /// Delete a project with its work items and bindings
    pub async fn delete_project(&self, actor: &Actor, project_id: &ProjectId) -> EngineResult<()> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let mut effects = PendingEffects::default();
        let result = self
            .delete_project_in(tx.as_mut(), actor, project_id, &mut effects)
            .await;
        self.finish(tx, result, effects).await
    }

    async fn delete_project_in(
        &self,
        tx: &mut dyn StoreTx,
        actor: &Actor,
        project_id: &ProjectId,
        effects: &mut PendingEffects,
    ) -> EngineResult<()> {
        Self::require_project(tx, project_id).await?;
        let items = tx.list_project_items(project_id).await?;
        tx.delete_project(project_id).await?;

        effects.publish(ProjectEvent::from_items(
            ProjectEventKind::Deleted,
            project_id.clone(),
            &items,
            actor.token.clone(),
        ));
        tracing::info!(
            project_id = %project_id,
            items = items.len(),
            actor = ?actor.user_id,
            "Project deleted"
        );
        Ok(())
    }

    /// Validate and apply a project status change
    pub async fn update_project_status(
        &self,
        actor: &Actor,
        project_id: &ProjectId,
        new: Option<ProjectStatus>,
    ) -> EngineResult<StatusChange> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let mut effects = PendingEffects::default();
        let result = async {
            let (project, graph) = self.load_project(tx.as_mut(), project_id).await?;
            let controller = LifecycleController::new(&graph, &self.callbacks);
            let change = controller
                .update_project_status(tx.as_mut(), actor, project, new, &mut effects)
                .await?;
            Ok::<_, EngineError>(change)
        }
        .await;
        self.finish(tx, result, effects).await
    }

    // ── Members ──────────────────────────────────────────────────────

    /// Bind a user to a role. Returns false if the binding already existed.
    pub async fn add_member(
        &self,
        project_id: &ProjectId,
        role_id: RoleId,
        user_id: UserId,
    ) -> EngineResult<bool> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let result = async {
            Self::require_project(tx.as_mut(), project_id).await?;
            let binding = MemberBinding::new(project_id.clone(), role_id, user_id);
            Ok::<_, EngineError>(tx.insert_member(&binding).await?)
        }
        .await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    pub async fn list_members(&self, project_id: &ProjectId) -> EngineResult<Vec<MemberBinding>> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let result = async {
            Self::require_project(tx.as_mut(), project_id).await?;
            Ok::<_, EngineError>(tx.list_members(project_id).await?)
        }
        .await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    /// Remove (role, user) bindings and detach the users from their tasks
    pub async fn remove_members(
        &self,
        project_id: &ProjectId,
        removed: &[(RoleId, UserId)],
    ) -> EngineResult<MemberChangeOutcome> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let mut effects = PendingEffects::default();
        let result = async {
            let (project, graph) = self.load_project(tx.as_mut(), project_id).await?;
            let handler = MemberChangeHandler::new(&graph, &self.role_map);
            let outcome = handler
                .on_member_removed(tx.as_mut(), &project, removed, &mut effects)
                .await?;
            Ok::<_, EngineError>(outcome)
        }
        .await;
        self.finish(tx, result, effects).await
    }

    // ── Work items ───────────────────────────────────────────────────

    /// Materialize a work item. Its executable status is derived from the
    /// project state and its node's readiness; whatever the caller set is
    /// ignored.
    pub async fn add_work_item(&self, item: WorkItem) -> EngineResult<WorkItem> {
        let scope = match &item.project_id {
            Some(id) => TxScope::Project(id.clone()),
            None => TxScope::FreeStanding,
        };
        let mut tx = self.store.begin(scope).await?;
        let result = self.add_work_item_in(tx.as_mut(), item).await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    async fn add_work_item_in(
        &self,
        tx: &mut dyn StoreTx,
        mut item: WorkItem,
    ) -> EngineResult<WorkItem> {
        if item.project_id.is_none() && item.node_id.is_some() {
            return Err(PreconditionViolation::InvalidItemState {
                item_id: item.id.clone(),
                detail: "node-bound work items must belong to a project".to_string(),
            }
            .into());
        }

        let context = self.item_context(tx, &item).await?;
        if let Some((project, graph)) = &context {
            if project.is_completed() {
                return Err(PreconditionViolation::TerminalState(project.status).into());
            }
            if let Some(node_id) = &item.node_id {
                graph.node(node_id)?;
            }
        }

        item.deleted = false;
        item.executable_status = if item.is_completed() {
            ExecutableStatus::Completed
        } else {
            self.derive_executable(tx, context.as_ref(), &item).await?
        };
        tx.insert_work_item(&item).await?;

        tracing::info!(
            work_item_id = %item.id,
            project_id = ?item.project_id,
            node_id = ?item.node_id,
            executable_status = %item.executable_status,
            "Work item added"
        );

        // an item added as completed may be the last one its node waited for
        if item.is_completed() {
            let cascade = self.cascade_from(tx, &item).await?;
            if !cascade.is_empty() {
                tracing::info!(
                    work_item_id = %item.id,
                    activated = cascade.activated.len(),
                    started_nodes = cascade.started_nodes.len(),
                    "Completed work item advanced its successors"
                );
            }
        }
        Ok(item)
    }

    pub async fn get_work_item(&self, item_id: &WorkItemId) -> EngineResult<WorkItem> {
        let mut tx = self.store.begin(self.item_scope(item_id).await?).await?;
        let result = Self::require_item(tx.as_mut(), item_id).await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    pub async fn list_project_items(&self, project_id: &ProjectId) -> EngineResult<Vec<WorkItem>> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let result = async {
            Self::require_project(tx.as_mut(), project_id).await?;
            Ok::<_, EngineError>(tx.list_project_items(project_id).await?)
        }
        .await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    /// Assign (or reassign) the executor of a work item
    pub async fn assign_executor(
        &self,
        item_id: &WorkItemId,
        user_id: UserId,
    ) -> EngineResult<WorkItem> {
        let mut tx = self.store.begin(self.item_scope(item_id).await?).await?;
        let result = self.assign_executor_in(tx.as_mut(), item_id, user_id).await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    async fn assign_executor_in(
        &self,
        tx: &mut dyn StoreTx,
        item_id: &WorkItemId,
        user_id: UserId,
    ) -> EngineResult<WorkItem> {
        let mut item = Self::require_item(tx, item_id).await?;
        if item.is_completed() {
            return Err(PreconditionViolation::InvalidItemState {
                item_id: item.id.clone(),
                detail: "completed work items cannot be reassigned".to_string(),
            }
            .into());
        }

        item.executor_id = Some(user_id);
        match item.executable_status {
            ExecutableStatus::Invalid => {
                item.config_status = ConfigStatus::Normal;
                item.status = ItemStatus::Ready;
                let context = self.item_context(tx, &item).await?;
                item.executable_status = self.derive_executable(tx, context.as_ref(), &item).await?;
            }
            ExecutableStatus::Blocked => {
                let context = self.item_context(tx, &item).await?;
                item.executable_status = self.derive_executable(tx, context.as_ref(), &item).await?;
            }
            ExecutableStatus::Executable | ExecutableStatus::Completed => {}
        }
        item.touch();
        tx.update_work_item(&item).await?;

        tracing::info!(
            work_item_id = %item.id,
            executor = ?item.executor_id,
            executable_status = %item.executable_status,
            "Work item executor assigned"
        );
        Ok(item)
    }

    /// Begin work on an executable item
    pub async fn start_work_item(&self, item_id: &WorkItemId) -> EngineResult<WorkItem> {
        let mut tx = self.store.begin(self.item_scope(item_id).await?).await?;
        let result = async {
            let mut item = Self::require_item(tx.as_mut(), item_id).await?;
            Self::require_executable(&item)?;
            if item.status != ItemStatus::Ready {
                return Err(PreconditionViolation::InvalidItemState {
                    item_id: item.id.clone(),
                    detail: format!("cannot start a work item that is {}", item.status),
                }
                .into());
            }
            item.status = ItemStatus::Ongoing;
            item.touch();
            tx.update_work_item(&item).await?;
            Ok::<_, EngineError>(item)
        }
        .await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    /// Mark an executable item completed and cascade readiness forward
    pub async fn complete_work_item(&self, item_id: &WorkItemId) -> EngineResult<WorkItemChange> {
        let mut tx = self.store.begin(self.item_scope(item_id).await?).await?;
        let result = self.complete_work_item_in(tx.as_mut(), item_id).await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    async fn complete_work_item_in(
        &self,
        tx: &mut dyn StoreTx,
        item_id: &WorkItemId,
    ) -> EngineResult<WorkItemChange> {
        let mut item = Self::require_item(tx, item_id).await?;
        Self::require_executable(&item)?;

        item.status = ItemStatus::Completed;
        item.executable_status = ExecutableStatus::Completed;
        item.touch();
        tx.update_work_item(&item).await?;
        tracing::info!(work_item_id = %item.id, node_id = ?item.node_id, "Work item completed");

        let cascade = self.cascade_from(tx, &item).await?;
        Ok(WorkItemChange { item, cascade })
    }

    /// Operator discard: soft-delete the item and re-run the cascade, since
    /// its node may now be complete
    pub async fn discard_work_item(
        &self,
        actor: &Actor,
        item_id: &WorkItemId,
    ) -> EngineResult<WorkItemChange> {
        let mut tx = self.store.begin(self.item_scope(item_id).await?).await?;
        let mut effects = PendingEffects::default();
        let result = self
            .discard_work_item_in(tx.as_mut(), actor, item_id, &mut effects)
            .await;
        self.finish(tx, result, effects).await
    }

    async fn discard_work_item_in(
        &self,
        tx: &mut dyn StoreTx,
        actor: &Actor,
        item_id: &WorkItemId,
        effects: &mut PendingEffects,
    ) -> EngineResult<WorkItemChange> {
        let mut item = Self::require_item(tx, item_id).await?;
        if item.is_completed() {
            return Err(PreconditionViolation::InvalidItemState {
                item_id: item.id.clone(),
                detail: "completed work items cannot be discarded".to_string(),
            }
            .into());
        }

        item.deleted = true;
        item.touch();
        tx.update_work_item(&item).await?;
        effects.record(OperationRecord::new(
            OperationKind::OperatorDiscard,
            &item,
            actor.user_id.clone(),
        ));
        tracing::info!(work_item_id = %item.id, actor = ?actor.user_id, "Work item discarded");

        let cascade = self.cascade_from(tx, &item).await?;
        Ok(WorkItemChange { item, cascade })
    }

    // ── Readiness ────────────────────────────────────────────────────

    /// Totals, completion and readiness of one node
    pub async fn node_status(
        &self,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> EngineResult<NodeStatusReport> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let result = async {
            let (project, graph) = self.load_project(tx.as_mut(), project_id).await?;
            let node = graph.node(node_id)?;
            let totals = aggregator::node_totals(tx.as_mut(), project_id, node_id).await?;
            let executable = readiness::node_executable(tx.as_mut(), &graph, &project, node).await?;
            Ok::<_, EngineError>(NodeStatusReport {
                project_id: project_id.clone(),
                node_id: node_id.clone(),
                totals,
                completed: totals.is_complete(),
                executable,
            })
        }
        .await;
        // read-only: nothing to publish
        match result {
            Ok(report) => {
                tx.rollback().await?;
                Ok(report)
            }
            Err(e) => self.finish(tx, Err(e), PendingEffects::default()).await,
        }
    }

    /// Re-derive executable status for every item of a project.
    ///
    /// Eligible `Blocked` items are activated; `Executable` items that have
    /// not started yet are returned to `Blocked` when their node is no
    /// longer executable. Callbacks fire for nodes that gained items.
    pub async fn reconcile_project(&self, project_id: &ProjectId) -> EngineResult<ReconcileOutcome> {
        let mut tx = self.store.begin(TxScope::Project(project_id.clone())).await?;
        let result = self.reconcile_project_in(tx.as_mut(), project_id).await;
        self.finish(tx, result, PendingEffects::default()).await
    }

    async fn reconcile_project_in(
        &self,
        tx: &mut dyn StoreTx,
        project_id: &ProjectId,
    ) -> EngineResult<ReconcileOutcome> {
        let (project, graph) = self.load_project(tx, project_id).await?;
        let mut outcome = ReconcileOutcome::default();
        if project.is_completed() {
            return Ok(outcome);
        }

        for node in graph.nodes() {
            let status = readiness::node_executable(tx, &graph, &project, node).await?;
            let items = tx.list_node_items(project_id, &node.id).await?;
            if status == ExecutableStatus::Executable {
                let activated = tx
                    .set_executable_status(
                        &activation_candidates(&items),
                        ExecutableStatus::Blocked,
                        ExecutableStatus::Executable,
                    )
                    .await?;
                if !activated.is_empty() {
                    self.callbacks.fire(tx, project_id, &node.id).await?;
                    outcome.started_nodes.push(node.id.clone());
                    outcome.activated.extend(activated);
                }
            } else {
                outcome
                    .demoted
                    .extend(Self::demote_unstarted(tx, &items).await?);
            }
        }

        let items = tx.list_project_items(project_id).await?;
        let free: Vec<WorkItem> = items.into_iter().filter(|i| i.is_free_standing()).collect();
        if project.is_started() {
            outcome.activated.extend(
                tx.set_executable_status(
                    &activation_candidates(&free),
                    ExecutableStatus::Blocked,
                    ExecutableStatus::Executable,
                )
                .await?,
            );
        } else {
            outcome
                .demoted
                .extend(Self::demote_unstarted(tx, &free).await?);
        }

        if !outcome.is_noop() {
            tracing::info!(
                project_id = %project_id,
                activated = outcome.activated.len(),
                demoted = outcome.demoted.len(),
                "Project readiness reconciled"
            );
        }
        Ok(outcome)
    }

    async fn demote_unstarted(
        tx: &mut dyn StoreTx,
        items: &[WorkItem],
    ) -> EngineResult<Vec<WorkItemId>> {
        let drifted: Vec<WorkItemId> = items
            .iter()
            .filter(|i| i.executable_status == ExecutableStatus::Executable && i.status == ItemStatus::Ready)
            .map(|i| i.id.clone())
            .collect();
        Ok(tx
            .set_executable_status(&drifted, ExecutableStatus::Executable, ExecutableStatus::Blocked)
            .await?)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Commit on success, roll back on failure, then release buffered effects
    async fn finish<T>(
        &self,
        tx: Box<dyn StoreTx>,
        result: EngineResult<T>,
        effects: PendingEffects,
    ) -> EngineResult<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                if !effects.is_empty() {
                    effects
                        .flush(self.operation_log.as_ref(), self.events.as_ref())
                        .await;
                }
                Ok(value)
            }
            Err(err) => {
                let scope = tx.scope().clone();
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        scope = %scope,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                tracing::debug!(scope = %scope, reason = err.reason(), "Transaction rolled back");
                Err(err)
            }
        }
    }

    async fn item_scope(&self, item_id: &WorkItemId) -> EngineResult<TxScope> {
        self.store
            .item_scope(item_id)
            .await?
            .ok_or_else(|| PreconditionViolation::WorkItemNotFound(item_id.clone()).into())
    }

    async fn require_project(tx: &mut dyn StoreTx, project_id: &ProjectId) -> EngineResult<Project> {
        tx.get_project(project_id)
            .await?
            .ok_or_else(|| PreconditionViolation::ProjectNotFound(project_id.clone()).into())
    }

    async fn require_item(tx: &mut dyn StoreTx, item_id: &WorkItemId) -> EngineResult<WorkItem> {
        match tx.get_work_item(item_id).await? {
            Some(item) if !item.deleted => Ok(item),
            _ => Err(PreconditionViolation::WorkItemNotFound(item_id.clone()).into()),
        }
    }

    fn require_executable(item: &WorkItem) -> EngineResult<()> {
        if item.executable_status == ExecutableStatus::Executable {
            Ok(())
        } else {
            Err(PreconditionViolation::NotExecutable {
                item_id: item.id.clone(),
                status: item.executable_status,
            }
            .into())
        }
    }

    async fn load_project(
        &self,
        tx: &mut dyn StoreTx,
        project_id: &ProjectId,
    ) -> EngineResult<(Project, FlowGraph)> {
        let project = Self::require_project(tx, project_id).await?;
        let graph = FlowGraph::load(self.flows.as_ref(), &project.flow_id, project.flow_version).await?;
        Ok((project, graph))
    }

    /// The owning project and its graph, for project-bound items
    async fn item_context(
        &self,
        tx: &mut dyn StoreTx,
        item: &WorkItem,
    ) -> EngineResult<Option<(Project, FlowGraph)>> {
        match &item.project_id {
            Some(project_id) => Ok(Some(self.load_project(tx, project_id).await?)),
            None => Ok(None),
        }
    }

    /// Executable status an item should have right now
    async fn derive_executable(
        &self,
        tx: &mut dyn StoreTx,
        context: Option<&(Project, FlowGraph)>,
        item: &WorkItem,
    ) -> EngineResult<ExecutableStatus> {
        if item.executor_id.is_none() {
            return Ok(ExecutableStatus::Blocked);
        }
        let Some((project, graph)) = context else {
            return Ok(ExecutableStatus::Executable);
        };
        if !project.is_started() {
            return Ok(ExecutableStatus::Blocked);
        }
        match &item.node_id {
            Some(node_id) => {
                let node = graph.node(node_id)?;
                readiness::node_executable(tx, graph, project, node).await
            }
            None => Ok(ExecutableStatus::Executable),
        }
    }

    /// Run the cascade for the node of a node-bound item
    async fn cascade_from(&self, tx: &mut dyn StoreTx, item: &WorkItem) -> EngineResult<CascadeOutcome> {
        let Some(node_id) = &item.node_id else {
            return Ok(CascadeOutcome::default());
        };
        let Some((project, graph)) = self.item_context(tx, item).await? else {
            return Ok(CascadeOutcome::default());
        };
        let node = graph.node(node_id)?;
        let propagator = CascadePropagator::new(&graph, &self.callbacks);
        let outcome = propagator.on_node_completed(tx, &project, node).await?;
        Ok(outcome)
    }
}
