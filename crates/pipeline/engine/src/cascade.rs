//! Cascade Propagator: moves readiness forward through the graph
//!
//! Activation is a compare-and-swap from `Blocked` to `Executable`, so
//! running a cascade twice leaves the same state behind.

use crate::callbacks::CallbackRegistry;
use crate::flow_graph::FlowGraph;
use crate::{aggregator, readiness, EngineResult};
use pipeline_store::StoreTx;
use pipeline_types::{ExecutableStatus, FlowNode, NodeId, Project, WorkItem, WorkItemId};

/// What a cascade changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    /// Work items moved from `Blocked` to `Executable`
    pub activated: Vec<WorkItemId>,
    /// Nodes evaluated executable; their callbacks have fired
    pub started_nodes: Vec<NodeId>,
}

impl CascadeOutcome {
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.started_nodes.is_empty()
    }

    pub fn merge(&mut self, other: CascadeOutcome) {
        self.activated.extend(other.activated);
        self.started_nodes.extend(other.started_nodes);
    }
}

/// Ids of items that may be switched to `Executable` once their node is ready
pub fn activation_candidates<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Vec<WorkItemId> {
    items
        .into_iter()
        .filter(|i| {
            !i.deleted
                && i.executable_status == ExecutableStatus::Blocked
                && i.executor_id.is_some()
        })
        .map(|i| i.id.clone())
        .collect()
}

pub struct CascadePropagator<'a> {
    graph: &'a FlowGraph,
    callbacks: &'a CallbackRegistry,
}

impl<'a> CascadePropagator<'a> {
    pub fn new(graph: &'a FlowGraph, callbacks: &'a CallbackRegistry) -> Self {
        Self { graph, callbacks }
    }

    /// Re-evaluate the successors of a node that may have just completed
    pub async fn on_node_completed(
        &self,
        tx: &mut dyn StoreTx,
        project: &Project,
        completed: &FlowNode,
    ) -> EngineResult<CascadeOutcome> {
        let mut outcome = CascadeOutcome::default();
        if !aggregator::is_node_completed(tx, &project.id, &completed.id).await? {
            return Ok(outcome);
        }

        tracing::info!(
            project_id = %project.id,
            node_id = %completed.id,
            "Node completed, evaluating successors"
        );

        for successor in self.graph.successors_of(&completed.unit_id)? {
            let status = readiness::node_executable(tx, self.graph, project, successor).await?;
            if status != ExecutableStatus::Executable {
                continue;
            }
            outcome.merge(self.start_node(tx, project, successor).await?);
        }
        Ok(outcome)
    }

    /// Activate the root nodes and the project's node-less items. Runs once,
    /// when the project moves from ready to ongoing.
    pub async fn start_project_executable(
        &self,
        tx: &mut dyn StoreTx,
        project: &Project,
    ) -> EngineResult<CascadeOutcome> {
        let mut outcome = CascadeOutcome::default();
        for root in self.graph.roots() {
            outcome.merge(self.start_node(tx, project, root).await?);
        }

        let items = tx.list_project_items(&project.id).await?;
        let free = activation_candidates(items.iter().filter(|i| i.is_free_standing()));
        outcome.activated.extend(
            tx.set_executable_status(&free, ExecutableStatus::Blocked, ExecutableStatus::Executable)
                .await?,
        );

        tracing::info!(
            project_id = %project.id,
            activated = outcome.activated.len(),
            started_nodes = outcome.started_nodes.len(),
            "Project execution started"
        );
        Ok(outcome)
    }

    /// Activate the waiting items of an executable node and fire its callbacks
    pub async fn start_node(
        &self,
        tx: &mut dyn StoreTx,
        project: &Project,
        node: &FlowNode,
    ) -> EngineResult<CascadeOutcome> {
        let items = tx.list_node_items(&project.id, &node.id).await?;
        let candidates = activation_candidates(&items);
        let activated = tx
            .set_executable_status(
                &candidates,
                ExecutableStatus::Blocked,
                ExecutableStatus::Executable,
            )
            .await?;

        if !activated.is_empty() {
            tracing::debug!(
                project_id = %project.id,
                node_id = %node.id,
                activated = activated.len(),
                "Work items activated"
            );
        }

        self.callbacks.fire(tx, &project.id, &node.id).await?;
        Ok(CascadeOutcome {
            activated,
            started_nodes: vec![node.id.clone()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::{NodeId, TaskType, UserId};

    fn item(executor: Option<&str>, status: ExecutableStatus) -> WorkItem {
        let mut item = WorkItem::task(TaskType::Produce).on_node(NodeId::new("n-a"));
        item.executor_id = executor.map(UserId::new);
        item.executable_status = status;
        item
    }

    #[test]
    fn test_activation_candidates() {
        let ready = item(Some("u1"), ExecutableStatus::Blocked);
        let unassigned = item(None, ExecutableStatus::Blocked);
        let running = item(Some("u1"), ExecutableStatus::Executable);
        let invalid = item(Some("u1"), ExecutableStatus::Invalid);
        let mut discarded = item(Some("u1"), ExecutableStatus::Blocked);
        discarded.deleted = true;

        let items = [ready.clone(), unassigned, running, invalid, discarded];
        assert_eq!(activation_candidates(&items), vec![ready.id]);
    }

    #[test]
    fn test_outcome_merge() {
        let mut outcome = CascadeOutcome::default();
        assert!(outcome.is_empty());

        outcome.merge(CascadeOutcome {
            activated: vec![WorkItemId::new("w1")],
            started_nodes: vec![NodeId::new("n-b")],
        });
        outcome.merge(CascadeOutcome {
            activated: Vec::new(),
            started_nodes: vec![NodeId::new("n-c")],
        });
        assert_eq!(outcome.activated.len(), 1);
        assert_eq!(
            outcome.started_nodes,
            vec![NodeId::new("n-b"), NodeId::new("n-c")]
        );
    }
}
