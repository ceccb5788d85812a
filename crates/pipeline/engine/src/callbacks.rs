//! Node-start callbacks
//!
//! Callbacks run inside the transaction that made a node executable and
//! see its uncommitted writes. A failing callback aborts that transaction.
//! Callbacks must be idempotent: a node may be reported as started more
//! than once (sibling completions, reconciler passes).

use crate::{EngineError, EngineResult, PreconditionViolation};
use async_trait::async_trait;
use pipeline_store::StoreTx;
use pipeline_types::{NodeId, ProjectId};
use std::fmt;
use std::sync::Arc;

/// Hook fired when a node becomes executable
#[async_trait]
pub trait NodeStartCallback: Send + Sync {
    async fn on_node_start(
        &self,
        tx: &mut dyn StoreTx,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> anyhow::Result<()>;
}

/// Ordered set of named callbacks, built at composition time
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    entries: Vec<(String, Arc<dyn NodeStartCallback>)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Names are unique; callbacks fire in
    /// registration order.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        callback: Arc<dyn NodeStartCallback>,
    ) -> EngineResult<()> {
        let name = name.into();
        if self.entries.iter().any(|(existing, _)| existing == &name) {
            return Err(PreconditionViolation::DuplicateCallbackName(name).into());
        }
        tracing::debug!(callback = %name, "Node-start callback registered");
        self.entries.push((name, callback));
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(
        mut self,
        name: impl Into<String>,
        callback: Arc<dyn NodeStartCallback>,
    ) -> EngineResult<Self> {
        self.register(name, callback)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fire every callback for a started node, stopping at the first failure
    pub async fn fire(
        &self,
        tx: &mut dyn StoreTx,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> EngineResult<()> {
        for (name, callback) in &self.entries {
            callback
                .on_node_start(tx, project_id, node_id)
                .await
                .map_err(|source| {
                    tracing::warn!(
                        callback = %name,
                        project_id = %project_id,
                        node_id = %node_id,
                        error = %source,
                        "Node-start callback failed"
                    );
                    EngineError::CallbackFailed {
                        name: name.clone(),
                        source,
                    }
                })?;
        }
        Ok(())
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_store::{InMemoryPipelineStore, PipelineStore, TxScope};
    use std::sync::Mutex;

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl NodeStartCallback for Recorder {
        async fn on_node_start(
            &self,
            _tx: &mut dyn StoreTx,
            _project_id: &ProjectId,
            node_id: &NodeId,
        ) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("{}:{}", self.tag, node_id));
            if self.fail {
                anyhow::bail!("{} refused", self.tag);
            }
            Ok(())
        }
    }

    fn recorder(tag: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            tag,
            log: log.clone(),
            fail,
        })
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        registry.register("notify", recorder("a", &log, false)).unwrap();
        let err = registry
            .register("notify", recorder("b", &log, false))
            .unwrap_err();
        assert_eq!(err.reason(), "duplicate_callback_name");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_fire_in_order_and_stop_on_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = CallbackRegistry::new()
            .with("first", recorder("first", &log, false))
            .unwrap()
            .with("second", recorder("second", &log, true))
            .unwrap()
            .with("third", recorder("third", &log, false))
            .unwrap();
        assert_eq!(registry.names(), vec!["first", "second", "third"]);

        let store = InMemoryPipelineStore::new();
        let project_id = ProjectId::new("p1");
        let mut tx = store.begin(TxScope::Project(project_id.clone())).await.unwrap();
        let err = registry
            .fire(tx.as_mut(), &project_id, &NodeId::new("n1"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::CallbackFailed { ref name, .. } if name == "second"));
        assert_eq!(*log.lock().unwrap(), vec!["first:n1", "second:n1"]);
    }
}
