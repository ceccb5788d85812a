//! Pipeline readiness engine
//!
//! Decides, for every node of a project's flow graph, whether its work
//! items may start, advances that readiness as work completes, reacts to
//! member removal, and governs the project lifecycle
//! (ready → ongoing → completed).
//!
//! # Architecture
//!
//! [`PipelineEngine`] is the composition root. It owns:
//!
//! - a [`PipelineStore`](pipeline_store::PipelineStore): every entry point
//!   runs in exactly one transaction
//! - a [`FlowDefinitionProvider`]: immutable flow graphs, read through
//!   [`FlowGraph`]
//! - a [`CallbackRegistry`] of [`NodeStartCallback`]s fired when a node
//!   becomes executable
//! - an [`OperationLogSink`] and an [`EventPublisher`], fed after commit
//!
//! The decision logic lives in small components that work on an open
//! transaction: the [`aggregator`], the [`readiness`] evaluator, the
//! [`CascadePropagator`], the [`MemberChangeHandler`] and the
//! [`LifecycleController`]. [`ReadinessReconciler`] repairs drift on a
//! schedule.
//!
//! # Example
//!
//! ```rust
//! use pipeline_engine::{Actor, FlowCatalog, PipelineEngine};
//! use pipeline_store::InMemoryPipelineStore;
//! use pipeline_types::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let catalog = Arc::new(FlowCatalog::new());
//! catalog
//!     .register(
//!         FlowDefinition::new("review", 1, "Review")
//!             .with_node(FlowNode::new("n-draft", "draft"))
//!             .with_node(FlowNode::new("n-check", "check").after("draft")),
//!     )
//!     .unwrap();
//!
//! let engine = PipelineEngine::builder(Arc::new(InMemoryPipelineStore::new()), catalog).build();
//! let project = engine
//!     .create_project(&FlowId::new("review"), 1, "Quarterly report")
//!     .await
//!     .unwrap();
//!
//! let draft = engine
//!     .add_work_item(
//!         WorkItem::task(TaskType::Produce)
//!             .in_project(project.id.clone())
//!             .on_node(NodeId::new("n-draft"))
//!             .with_executor(UserId::new("alice")),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(draft.executable_status, ExecutableStatus::Blocked);
//!
//! engine
//!     .update_project_status(&Actor::system(), &project.id, Some(ProjectStatus::Ongoing))
//!     .await
//!     .unwrap();
//! let draft = engine.get_work_item(&draft.id).await.unwrap();
//! assert_eq!(draft.executable_status, ExecutableStatus::Executable);
//! # });
//! ```

#![deny(unsafe_code)]

pub mod aggregator;
pub mod callbacks;
pub mod cascade;
pub mod config;
pub mod engine;
mod error;
pub mod flow_graph;
pub mod lifecycle;
pub mod members;
pub mod readiness;
pub mod reconciler;
pub mod sinks;

pub use callbacks::{CallbackRegistry, NodeStartCallback};
pub use cascade::{CascadeOutcome, CascadePropagator};
pub use config::{ConfigError, EngineConfig, LoggingConfig, ReconcilerConfig, StorageConfig};
pub use engine::{
    NodeStatusReport, PipelineEngine, PipelineEngineBuilder, ReconcileOutcome, WorkItemChange,
};
pub use error::{EngineError, EngineResult, PreconditionViolation};
pub use flow_graph::{FlowCatalog, FlowDefinitionProvider, FlowGraph, Stage};
pub use lifecycle::{check_transition, Actor, LifecycleController, StatusChange, Transition};
pub use members::{MemberChangeHandler, MemberChangeOutcome};
pub use reconciler::{ReadinessReconciler, ReconcileSummary};
pub use sinks::{
    EventPublisher, MemoryEventPublisher, MemoryOperationLog, OperationKind, OperationLogSink,
    OperationRecord, ProjectEvent, ProjectEventKind, TracingEventPublisher, TracingOperationLog,
};
