//! Member Change Handler
//!
//! Removing a (role, user) binding takes the user off every task of the
//! project they execute under that role. Unstarted tasks go back to the
//! pool; started ones are invalidated until an operator reassigns or
//! discards them. Work orders are not executor-bound and stay untouched.

use crate::flow_graph::FlowGraph;
use crate::sinks::{OperationKind, OperationRecord, PendingEffects};
use crate::EngineResult;
use pipeline_store::StoreTx;
use pipeline_types::{
    ConfigStatus, ExecutableStatus, ItemStatus, Project, RoleId, TaskRoleMap, UserId, WorkItem,
    WorkItemId,
};

/// What a member removal changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberChangeOutcome {
    /// Bindings that existed and were deleted
    pub removed_bindings: usize,
    /// Unstarted tasks whose executor was cleared
    pub returned_to_pool: Vec<WorkItemId>,
    /// Started tasks now `Invalid`
    pub invalidated: Vec<WorkItemId>,
}

pub struct MemberChangeHandler<'a> {
    graph: &'a FlowGraph,
    role_map: &'a TaskRoleMap,
}

impl<'a> MemberChangeHandler<'a> {
    pub fn new(graph: &'a FlowGraph, role_map: &'a TaskRoleMap) -> Self {
        Self { graph, role_map }
    }

    pub async fn on_member_removed(
        &self,
        tx: &mut dyn StoreTx,
        project: &Project,
        removed: &[(RoleId, UserId)],
        effects: &mut PendingEffects,
    ) -> EngineResult<MemberChangeOutcome> {
        let mut outcome = MemberChangeOutcome::default();
        for (role_id, user_id) in removed {
            if tx.delete_member(&project.id, role_id, user_id).await? {
                outcome.removed_bindings += 1;
            }
        }

        if project.is_completed() || removed.is_empty() {
            return Ok(outcome);
        }

        for mut task in tx.list_project_items(&project.id).await? {
            let Some(executor) = self.matching_executor(&task, removed) else {
                continue;
            };

            match task.status {
                ItemStatus::Ready => {
                    task.executor_id = None;
                    task.executable_status = ExecutableStatus::Blocked;
                    task.touch();
                    tx.update_work_item(&task).await?;
                    effects.record(OperationRecord::new(
                        OperationKind::ExecutorRemoved,
                        &task,
                        Some(executor),
                    ));
                    outcome.returned_to_pool.push(task.id);
                }
                ItemStatus::Ongoing => {
                    task.executor_id = None;
                    task.config_status = ConfigStatus::ExecutorDeleted;
                    task.executable_status = ExecutableStatus::Invalid;
                    task.touch();
                    tx.update_work_item(&task).await?;
                    effects.record(OperationRecord::new(
                        OperationKind::TaskInvalidated,
                        &task,
                        Some(executor),
                    ));
                    outcome.invalidated.push(task.id);
                }
                ItemStatus::Completed => {}
            }
        }

        tracing::info!(
            project_id = %project.id,
            bindings = outcome.removed_bindings,
            returned = outcome.returned_to_pool.len(),
            invalidated = outcome.invalidated.len(),
            "Project members removed"
        );
        Ok(outcome)
    }

    /// The removed executor of `item`, if one of the removed pairs covers it
    fn matching_executor(&self, item: &WorkItem, removed: &[(RoleId, UserId)]) -> Option<UserId> {
        if !item.is_task() {
            return None;
        }
        let executor = item.executor_id.as_ref()?;
        let role = self.role_map.role_for(item.task_type);
        if !removed.iter().any(|(r, u)| r == role && u == executor) {
            return None;
        }

        if let Some(node_id) = &item.node_id {
            // a node without declared task types accepts every type
            let node = self.graph.node(node_id).ok()?;
            if !node.required_task_types.is_empty()
                && !node.required_task_types.contains(&item.task_type)
            {
                return None;
            }
        }
        Some(executor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::{FlowId, FlowNode, NodeId, TaskType};

    fn graph() -> FlowGraph {
        FlowGraph::from_nodes(
            FlowId::new("flow"),
            1,
            vec![FlowNode::new("n-a", "a").requires(TaskType::Review)],
        )
    }

    fn removed() -> Vec<(RoleId, UserId)> {
        vec![(RoleId::new("reviewer"), UserId::new("u1"))]
    }

    #[test]
    fn test_matching_executor() {
        let graph = graph();
        let role_map = TaskRoleMap::default();
        let handler = MemberChangeHandler::new(&graph, &role_map);

        let review = WorkItem::task(TaskType::Review)
            .on_node(NodeId::new("n-a"))
            .with_executor(UserId::new("u1"));
        assert_eq!(
            handler.matching_executor(&review, &removed()),
            Some(UserId::new("u1"))
        );

        let untyped = FlowGraph::from_nodes(
            FlowId::new("flow"),
            1,
            vec![FlowNode::new("n-a", "a")],
        );
        let handler_untyped = MemberChangeHandler::new(&untyped, &role_map);
        assert_eq!(
            handler_untyped.matching_executor(&review, &removed()),
            Some(UserId::new("u1"))
        );

        // free-standing tasks only need the role to match
        let free = WorkItem::task(TaskType::Review).with_executor(UserId::new("u1"));
        assert!(handler.matching_executor(&free, &removed()).is_some());
    }

    #[test]
    fn test_non_matching_executor() {
        let graph = graph();
        let role_map = TaskRoleMap::default();
        let handler = MemberChangeHandler::new(&graph, &role_map);

        let other_user = WorkItem::task(TaskType::Review)
            .on_node(NodeId::new("n-a"))
            .with_executor(UserId::new("u2"));
        assert!(handler.matching_executor(&other_user, &removed()).is_none());

        let other_role = WorkItem::task(TaskType::Produce)
            .on_node(NodeId::new("n-a"))
            .with_executor(UserId::new("u1"));
        assert!(handler.matching_executor(&other_role, &removed()).is_none());

        let order = WorkItem::work_order(TaskType::Review)
            .on_node(NodeId::new("n-a"))
            .with_executor(UserId::new("u1"));
        assert!(handler.matching_executor(&order, &removed()).is_none());

        // reviewer mapped to a different role
        let role_map = TaskRoleMap::default().with_role(TaskType::Review, RoleId::new("qa"));
        let handler = MemberChangeHandler::new(&graph, &role_map);
        let review = WorkItem::task(TaskType::Review)
            .on_node(NodeId::new("n-a"))
            .with_executor(UserId::new("u1"));
        assert!(handler.matching_executor(&review, &removed()).is_none());
    }
}
