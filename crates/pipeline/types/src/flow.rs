//! Flow definitions: the versioned blueprint a project is created from
//!
//! A FlowDefinition is a directed acyclic graph of FlowNodes. Edges are
//! implicit: each node lists the unit ids of its predecessors. The graph
//! is produced externally and assumed to be well-formed.

use crate::{FlowId, NodeId, StageId, TaskType, UnitId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ── Start Mode ───────────────────────────────────────────────────────

/// How a node's predecessors gate it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StartMode {
    /// Every predecessor must be complete
    #[default]
    AllPredecessorsComplete,
    /// One complete predecessor is enough
    AnyPredecessorComplete,
}

// ── Flow Node ────────────────────────────────────────────────────────

/// A step in a project's pipeline graph
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    /// Row identifier; work items bind to this
    pub id: NodeId,
    /// Logical identifier referenced by other nodes' predecessor lists
    pub unit_id: UnitId,
    /// Human-readable name
    pub name: String,
    /// Unit ids of the predecessor nodes, in declaration order
    pub predecessor_unit_ids: Vec<UnitId>,
    /// How predecessors gate this node
    pub start_mode: StartMode,
    /// The stage this node is grouped under
    pub stage_id: StageId,
    /// Position of the stage within the flow
    pub stage_order: u32,
    /// Task types this node materializes
    #[serde(default)]
    pub required_task_types: BTreeSet<TaskType>,
}

impl FlowNode {
    /// Create a node with no predecessors in the default stage
    pub fn new(id: impl Into<String>, unit_id: impl Into<String>) -> Self {
        let unit_id = unit_id.into();
        Self {
            id: NodeId::new(id),
            name: unit_id.clone(),
            unit_id: UnitId::new(unit_id),
            predecessor_unit_ids: Vec::new(),
            start_mode: StartMode::default(),
            stage_id: StageId::new("default"),
            stage_order: 0,
            required_task_types: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a predecessor; duplicates are ignored so the list stays an ordered set
    pub fn after(mut self, unit_id: impl Into<String>) -> Self {
        let unit_id = UnitId::new(unit_id);
        if !self.predecessor_unit_ids.contains(&unit_id) {
            self.predecessor_unit_ids.push(unit_id);
        }
        self
    }

    pub fn with_start_mode(mut self, start_mode: StartMode) -> Self {
        self.start_mode = start_mode;
        self
    }

    pub fn in_stage(mut self, stage_id: impl Into<String>, stage_order: u32) -> Self {
        self.stage_id = StageId::new(stage_id);
        self.stage_order = stage_order;
        self
    }

    pub fn requires(mut self, task_type: TaskType) -> Self {
        self.required_task_types.insert(task_type);
        self
    }

    /// A node without predecessors is a root of the graph
    pub fn is_root(&self) -> bool {
        self.predecessor_unit_ids.is_empty()
    }

    /// Whether `unit_id` is one of this node's predecessors
    pub fn follows(&self, unit_id: &UnitId) -> bool {
        self.predecessor_unit_ids.contains(unit_id)
    }
}

// ── Flow Definition ──────────────────────────────────────────────────

/// One immutable version of a flow graph
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub flow_id: FlowId,
    pub version: u32,
    pub name: String,
    pub nodes: Vec<FlowNode>,
    pub created_at: DateTime<Utc>,
}

impl FlowDefinition {
    pub fn new(flow_id: impl Into<String>, version: u32, name: impl Into<String>) -> Self {
        Self {
            flow_id: FlowId::new(flow_id),
            version,
            name: name.into(),
            nodes: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_node(mut self, node: FlowNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Get a node by row id
    pub fn get_node(&self, id: &NodeId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Get a node by unit id
    pub fn node_by_unit(&self, unit_id: &UnitId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| &n.unit_id == unit_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predecessors_keep_declaration_order_without_duplicates() {
        let node = FlowNode::new("n3", "merge").after("b").after("a").after("b");
        assert_eq!(
            node.predecessor_unit_ids,
            vec![UnitId::new("b"), UnitId::new("a")]
        );
        assert!(!node.is_root());
        assert!(node.follows(&UnitId::new("a")));
    }

    #[test]
    fn test_lookup_by_id_and_unit() {
        let def = FlowDefinition::new("f", 1, "Flow")
            .with_node(FlowNode::new("n1", "collect"))
            .with_node(FlowNode::new("n2", "review").after("collect"));

        assert_eq!(def.node_count(), 2);
        assert_eq!(
            def.get_node(&NodeId::new("n2")).map(|n| n.unit_id.clone()),
            Some(UnitId::new("review"))
        );
        assert_eq!(
            def.node_by_unit(&UnitId::new("collect")).map(|n| n.id.clone()),
            Some(NodeId::new("n1"))
        );
        assert!(def.get_node(&NodeId::new("missing")).is_none());
    }

    #[test]
    fn test_start_mode_default() {
        assert_eq!(StartMode::default(), StartMode::AllPredecessorsComplete);
    }
}
