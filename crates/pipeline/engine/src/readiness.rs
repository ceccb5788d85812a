//! Node Readiness Evaluator
//!
//! The decision is a pure function of the project status, the node and the
//! totals of its declared predecessors. [`node_executable`] only gathers
//! those totals from the open transaction, so it is always safe to rerun.

use crate::aggregator;
use crate::flow_graph::FlowGraph;
use crate::EngineResult;
use pipeline_store::StoreTx;
use pipeline_types::{ExecutableStatus, FlowNode, NodeTotals, Project, ProjectStatus, StartMode};

/// Decide whether work on `node` may start.
///
/// `predecessor_totals` holds one entry per declared predecessor; a
/// predecessor missing from the graph contributes empty totals.
pub fn evaluate(
    status: ProjectStatus,
    node: &FlowNode,
    predecessor_totals: &[NodeTotals],
) -> ExecutableStatus {
    if status == ProjectStatus::Ready {
        return ExecutableStatus::Blocked;
    }
    if node.is_root() {
        return ExecutableStatus::Executable;
    }

    let satisfied = match node.start_mode {
        StartMode::AllPredecessorsComplete => {
            !predecessor_totals.is_empty() && predecessor_totals.iter().all(NodeTotals::is_complete)
        }
        StartMode::AnyPredecessorComplete => predecessor_totals.iter().any(NodeTotals::is_complete),
    };

    if satisfied {
        ExecutableStatus::Executable
    } else {
        ExecutableStatus::Blocked
    }
}

/// Gather predecessor totals and evaluate `node`
pub async fn node_executable(
    tx: &mut dyn StoreTx,
    graph: &FlowGraph,
    project: &Project,
    node: &FlowNode,
) -> EngineResult<ExecutableStatus> {
    if project.status == ProjectStatus::Ready || node.is_root() {
        return Ok(evaluate(project.status, node, &[]));
    }

    let mut totals = Vec::with_capacity(node.predecessor_unit_ids.len());
    for unit_id in &node.predecessor_unit_ids {
        let entry = match graph.node_by_unit(unit_id) {
            Ok(pred) => aggregator::node_totals(tx, &project.id, &pred.id).await?,
            Err(_) => NodeTotals::default(),
        };
        totals.push(entry);
    }

    let status = evaluate(project.status, node, &totals);
    tracing::debug!(
        project_id = %project.id,
        node_id = %node.id,
        status = %status,
        "Node readiness evaluated"
    );
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(mode: StartMode) -> FlowNode {
        FlowNode::new("n-c", "c")
            .after("a")
            .after("b")
            .with_start_mode(mode)
    }

    #[test]
    fn test_ready_project_blocks_everything() {
        let root = FlowNode::new("n-a", "a");
        assert_eq!(
            evaluate(ProjectStatus::Ready, &root, &[]),
            ExecutableStatus::Blocked
        );
        assert_eq!(
            evaluate(ProjectStatus::Ongoing, &root, &[]),
            ExecutableStatus::Executable
        );
    }

    #[test]
    fn test_all_mode_needs_every_predecessor() {
        let node = join(StartMode::AllPredecessorsComplete);
        let done = NodeTotals::new(2, 2);
        let open = NodeTotals::new(2, 1);
        assert_eq!(
            evaluate(ProjectStatus::Ongoing, &node, &[done, open]),
            ExecutableStatus::Blocked
        );
        assert_eq!(
            evaluate(ProjectStatus::Ongoing, &node, &[done, done]),
            ExecutableStatus::Executable
        );
    }

    #[test]
    fn test_any_mode_needs_one_predecessor() {
        let node = join(StartMode::AnyPredecessorComplete);
        let done = NodeTotals::new(1, 1);
        let open = NodeTotals::new(3, 0);
        assert_eq!(
            evaluate(ProjectStatus::Ongoing, &node, &[open, done]),
            ExecutableStatus::Executable
        );
        assert_eq!(
            evaluate(ProjectStatus::Ongoing, &node, &[open, open]),
            ExecutableStatus::Blocked
        );
    }

    #[test]
    fn test_empty_predecessor_never_satisfies() {
        let node = join(StartMode::AnyPredecessorComplete);
        let empty = NodeTotals::default();
        assert_eq!(
            evaluate(ProjectStatus::Ongoing, &node, &[empty, empty]),
            ExecutableStatus::Blocked
        );
    }
}
