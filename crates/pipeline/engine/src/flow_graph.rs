//! Flow Graph Accessor: read-only view of a project's node graph
//!
//! Flow definitions are immutable once registered. A project pins one
//! `(flow_id, version)` at creation and every lookup goes through that pair.

use crate::{EngineResult, PreconditionViolation};
use async_trait::async_trait;
use pipeline_store::StorageError;
use pipeline_types::{FlowDefinition, FlowId, FlowNode, NodeId, StageId, UnitId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Source of flow definitions
#[async_trait]
pub trait FlowDefinitionProvider: Send + Sync {
    /// Fetch one node of a flow version by unit id
    async fn get_node(&self, flow_id: &FlowId, version: u32, unit_id: &UnitId)
        -> EngineResult<FlowNode>;

    /// Every node of a flow version, in declaration order
    async fn list_nodes(&self, flow_id: &FlowId, version: u32) -> EngineResult<Vec<FlowNode>>;
}

// ── Flow Catalog ─────────────────────────────────────────────────────

/// In-memory registry of flow definitions keyed by `(flow_id, version)`
#[derive(Default)]
pub struct FlowCatalog {
    definitions: RwLock<HashMap<(FlowId, u32), Arc<FlowDefinition>>>,
}

impl FlowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow version. Returns false, keeping the existing
    /// definition, if the version is already registered.
    pub fn register(&self, definition: FlowDefinition) -> EngineResult<bool> {
        let key = (definition.flow_id.clone(), definition.version);
        let mut guard = self
            .definitions
            .write()
            .map_err(|_| StorageError::Backend("flow catalog lock poisoned".to_string()))?;
        if guard.contains_key(&key) {
            return Ok(false);
        }

        tracing::info!(
            flow_id = %key.0,
            version = key.1,
            nodes = definition.nodes.len(),
            "Flow definition registered"
        );
        guard.insert(key, Arc::new(definition));
        Ok(true)
    }

    pub fn get(&self, flow_id: &FlowId, version: u32) -> EngineResult<Arc<FlowDefinition>> {
        let guard = self
            .definitions
            .read()
            .map_err(|_| StorageError::Backend("flow catalog lock poisoned".to_string()))?;
        guard
            .get(&(flow_id.clone(), version))
            .cloned()
            .ok_or_else(|| {
                PreconditionViolation::FlowNotFound {
                    flow_id: flow_id.clone(),
                    version,
                }
                .into()
            })
    }

    /// Highest registered version of a flow
    pub fn latest_version(&self, flow_id: &FlowId) -> Option<u32> {
        let guard = self.definitions.read().ok()?;
        guard
            .keys()
            .filter(|(id, _)| id == flow_id)
            .map(|(_, version)| *version)
            .max()
    }

    pub fn count(&self) -> usize {
        self.definitions.read().map(|g| g.len()).unwrap_or(0)
    }
}

#[async_trait]
impl FlowDefinitionProvider for FlowCatalog {
    async fn get_node(
        &self,
        flow_id: &FlowId,
        version: u32,
        unit_id: &UnitId,
    ) -> EngineResult<FlowNode> {
        let definition = self.get(flow_id, version)?;
        definition
            .node_by_unit(unit_id)
            .cloned()
            .ok_or_else(|| PreconditionViolation::NodeNotFound(unit_id.to_string()).into())
    }

    async fn list_nodes(&self, flow_id: &FlowId, version: u32) -> EngineResult<Vec<FlowNode>> {
        Ok(self.get(flow_id, version)?.nodes.clone())
    }
}

// ── Flow Graph ───────────────────────────────────────────────────────

/// Nodes of one stage, in declaration order
#[derive(Debug, Clone)]
pub struct Stage<'a> {
    pub stage_id: &'a StageId,
    pub stage_order: u32,
    pub nodes: Vec<&'a FlowNode>,
}

/// Loaded node graph of one flow version
#[derive(Debug, Clone)]
pub struct FlowGraph {
    flow_id: FlowId,
    version: u32,
    nodes: Vec<FlowNode>,
}

impl FlowGraph {
    /// Load a flow version through a provider
    pub async fn load(
        provider: &dyn FlowDefinitionProvider,
        flow_id: &FlowId,
        version: u32,
    ) -> EngineResult<Self> {
        let nodes = provider.list_nodes(flow_id, version).await?;
        Ok(Self::from_nodes(flow_id.clone(), version, nodes))
    }

    pub fn from_nodes(flow_id: FlowId, version: u32, nodes: Vec<FlowNode>) -> Self {
        Self {
            flow_id,
            version,
            nodes,
        }
    }

    pub fn flow_id(&self) -> &FlowId {
        &self.flow_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    pub fn node(&self, id: &NodeId) -> EngineResult<&FlowNode> {
        self.nodes
            .iter()
            .find(|n| &n.id == id)
            .ok_or_else(|| PreconditionViolation::NodeNotFound(id.to_string()).into())
    }

    pub fn node_by_unit(&self, unit_id: &UnitId) -> EngineResult<&FlowNode> {
        self.nodes
            .iter()
            .find(|n| &n.unit_id == unit_id)
            .ok_or_else(|| PreconditionViolation::NodeNotFound(unit_id.to_string()).into())
    }

    /// Predecessor nodes of `unit_id`, in the order the node declares them.
    /// Declared predecessors missing from the graph are skipped.
    pub fn predecessors_of(&self, unit_id: &UnitId) -> EngineResult<Vec<&FlowNode>> {
        let node = self.node_by_unit(unit_id)?;
        Ok(node
            .predecessor_unit_ids
            .iter()
            .filter_map(|pred| {
                let found = self.node_by_unit(pred).ok();
                if found.is_none() {
                    tracing::warn!(
                        flow_id = %self.flow_id,
                        node = %unit_id,
                        predecessor = %pred,
                        "Declared predecessor is missing from the flow"
                    );
                }
                found
            })
            .collect())
    }

    /// Nodes that list `unit_id` among their predecessors
    pub fn successors_of(&self, unit_id: &UnitId) -> EngineResult<Vec<&FlowNode>> {
        self.node_by_unit(unit_id)?;
        Ok(self.nodes.iter().filter(|n| n.follows(unit_id)).collect())
    }

    /// Nodes without predecessors
    pub fn roots(&self) -> Vec<&FlowNode> {
        self.nodes.iter().filter(|n| n.is_root()).collect()
    }

    /// Nodes grouped by stage, ordered by `stage_order`
    pub fn stages(&self) -> Vec<Stage<'_>> {
        let mut grouped: BTreeMap<(u32, &StageId), Vec<&FlowNode>> = BTreeMap::new();
        for node in &self.nodes {
            grouped
                .entry((node.stage_order, &node.stage_id))
                .or_default()
                .push(node);
        }
        grouped
            .into_iter()
            .map(|((stage_order, stage_id), nodes)| Stage {
                stage_id,
                stage_order,
                nodes,
            })
            .collect()
    }
}
