//! Work Item Aggregator: per-node totals over tasks and work orders alike

use crate::EngineResult;
use pipeline_store::StoreTx;
use pipeline_types::{NodeId, NodeTotals, ProjectId};

/// Counted (non-deleted, non-auxiliary) items bound to a node
pub async fn node_totals(
    tx: &mut dyn StoreTx,
    project_id: &ProjectId,
    node_id: &NodeId,
) -> EngineResult<NodeTotals> {
    Ok(tx.count_by_node(project_id, node_id).await?)
}

/// A node is completed once it has at least one counted item and all of
/// them are completed. An empty node is never completed.
pub async fn is_node_completed(
    tx: &mut dyn StoreTx,
    project_id: &ProjectId,
    node_id: &NodeId,
) -> EngineResult<bool> {
    let totals = node_totals(tx, project_id, node_id).await?;
    Ok(totals.is_complete())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_store::{InMemoryPipelineStore, PipelineStore, TxScope};
    use pipeline_types::{FlowId, ItemStatus, Project, TaskType, WorkItem};

    #[tokio::test]
    async fn test_completion_follows_counted_items() {
        let store = InMemoryPipelineStore::new();
        let project = Project::new("p", FlowId::new("f"), 1);
        let node = NodeId::new("n1");
        let mut tx = store.begin(TxScope::Project(project.id.clone())).await.unwrap();
        tx.insert_project(&project).await.unwrap();

        assert!(!is_node_completed(tx.as_mut(), &project.id, &node).await.unwrap());

        let mut task = WorkItem::task(TaskType::Produce)
            .in_project(project.id.clone())
            .on_node(node.clone());
        task.status = ItemStatus::Completed;
        tx.insert_work_item(&task).await.unwrap();
        let order = WorkItem::work_order(TaskType::Review)
            .in_project(project.id.clone())
            .on_node(node.clone());
        tx.insert_work_item(&order).await.unwrap();

        let totals = node_totals(tx.as_mut(), &project.id, &node).await.unwrap();
        assert_eq!(totals, NodeTotals::new(2, 1));
        assert!(!is_node_completed(tx.as_mut(), &project.id, &node).await.unwrap());

        let mut order = order;
        order.deleted = true;
        tx.update_work_item(&order).await.unwrap();
        assert!(is_node_completed(tx.as_mut(), &project.id, &node).await.unwrap());
    }
}
