//! Pipeline Domain Types
//!
//! A project instantiates a predefined directed graph of flow nodes,
//! grouped into stages. Each node carries work items (tasks and work
//! orders) that assigned users execute. These types describe that
//! graph and the runtime records hanging off it; the readiness and
//! cascade logic lives in `pipeline-engine`.
//!
//! # Key Concepts
//!
//! - **FlowDefinition / FlowNode**: an immutable, versioned graph. Nodes
//!   reference their predecessors by [`UnitId`], never by row id.
//! - **WorkItem**: a single discriminated record for both tasks and work
//!   orders. Its own progress (`status`) is tracked separately from
//!   whether it may run (`executable_status`).
//! - **Project**: owns work items and member bindings, and moves through
//!   `Ready → Ongoing → Completed` one step at a time.
//! - **TaskRoleMap**: the fixed task-type → role lookup used to resolve
//!   which tasks a removed member can no longer execute.

#![deny(unsafe_code)]

mod flow;
mod ids;
mod project;
mod roles;
mod work_item;

pub use flow::*;
pub use ids::*;
pub use project::*;
pub use roles::*;
pub use work_item::*;
