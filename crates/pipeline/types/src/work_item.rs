//! Work items: the tasks and work orders hanging off flow nodes
//!
//! Tasks and work orders share one record type discriminated by
//! [`WorkItemKind`]. Counting per node therefore never needs to know
//! which kind it is looking at.

use crate::{NodeId, ProjectId, TaskType, UserId, WorkItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Status enums ─────────────────────────────────────────────────────

/// Which kind of work item a record is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKind {
    Task,
    WorkOrder,
}

/// Progress of the work itself
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Ready,
    Ongoing,
    Completed,
}

/// Whether the item may currently be worked on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutableStatus {
    #[default]
    Blocked,
    Executable,
    /// Interrupted; needs an operator to reassign or discard it
    Invalid,
    Completed,
}

/// Health of the item's configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    #[default]
    Normal,
    ExecutorDeleted,
    MainBusinessDeleted,
    FormDeleted,
}

impl WorkItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::WorkOrder => "work_order",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(Self::Task),
            "work_order" => Some(Self::WorkOrder),
            _ => None,
        }
    }
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(Self::Ready),
            "ongoing" => Some(Self::Ongoing),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl ExecutableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Executable => "executable",
            Self::Invalid => "invalid",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blocked" => Some(Self::Blocked),
            "executable" => Some(Self::Executable),
            "invalid" => Some(Self::Invalid),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl ConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ExecutorDeleted => "executor_deleted",
            Self::MainBusinessDeleted => "main_business_deleted",
            Self::FormDeleted => "form_deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "executor_deleted" => Some(Self::ExecutorDeleted),
            "main_business_deleted" => Some(Self::MainBusinessDeleted),
            "form_deleted" => Some(Self::FormDeleted),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Work Item ────────────────────────────────────────────────────────

/// A task or work order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub kind: WorkItemKind,
    /// Owning project; `None` for free-standing tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Owning node; `None` exempts the item from graph readiness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub task_type: TaskType,
    pub status: ItemStatus,
    pub executable_status: ExecutableStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<UserId>,
    pub config_status: ConfigStatus,
    /// Auxiliary data-sync item; closed out when the project finishes
    #[serde(default)]
    pub auxiliary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_process_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_process_id: Option<String>,
    /// Soft-deleted (discarded) items are invisible to every count
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a blocked, unassigned task
    pub fn task(task_type: TaskType) -> Self {
        Self::new(WorkItemKind::Task, task_type)
    }

    /// Create a blocked, unassigned work order
    pub fn work_order(task_type: TaskType) -> Self {
        Self::new(WorkItemKind::WorkOrder, task_type)
    }

    pub fn new(kind: WorkItemKind, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: WorkItemId::generate(),
            kind,
            project_id: None,
            node_id: None,
            task_type,
            status: ItemStatus::Ready,
            executable_status: ExecutableStatus::Blocked,
            executor_id: None,
            config_status: ConfigStatus::Normal,
            auxiliary: false,
            business_process_id: None,
            data_process_id: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = WorkItemId::new(id);
        self
    }

    pub fn in_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn on_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn with_executor(mut self, executor: UserId) -> Self {
        self.executor_id = Some(executor);
        self
    }

    pub fn auxiliary(mut self) -> Self {
        self.auxiliary = true;
        self
    }

    pub fn with_processes(
        mut self,
        business_process_id: impl Into<String>,
        data_process_id: impl Into<String>,
    ) -> Self {
        self.business_process_id = Some(business_process_id.into());
        self.data_process_id = Some(data_process_id.into());
        self
    }

    pub fn is_task(&self) -> bool {
        self.kind == WorkItemKind::Task
    }

    pub fn is_completed(&self) -> bool {
        self.status == ItemStatus::Completed
    }

    /// Free-standing items are not bound to any node
    pub fn is_free_standing(&self) -> bool {
        self.node_id.is_none()
    }

    /// Whether the item takes part in node totals and the completion gate
    pub fn is_counted(&self) -> bool {
        !self.deleted && !self.auxiliary
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ── Node Totals ──────────────────────────────────────────────────────

/// Item counts for one node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeTotals {
    pub total: u64,
    pub completed: u64,
}

impl NodeTotals {
    pub fn new(total: u64, completed: u64) -> Self {
        Self { total, completed }
    }

    /// Fold counted items into totals
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Self {
        items
            .into_iter()
            .filter(|i| i.is_counted())
            .fold(Self::default(), |mut acc, item| {
                acc.total += 1;
                if item.is_completed() {
                    acc.completed += 1;
                }
                acc
            })
    }

    /// Populated and fully completed; an empty node never counts as complete
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.total == self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_defaults() {
        let item = WorkItem::task(TaskType::Produce);
        assert!(item.is_task());
        assert!(item.is_free_standing());
        assert_eq!(item.status, ItemStatus::Ready);
        assert_eq!(item.executable_status, ExecutableStatus::Blocked);
        assert_eq!(item.config_status, ConfigStatus::Normal);
        assert!(item.is_counted());
    }

    #[test]
    fn test_totals_skip_deleted_and_auxiliary() {
        let mut done = WorkItem::task(TaskType::Produce);
        done.status = ItemStatus::Completed;
        let open = WorkItem::work_order(TaskType::Review);
        let mut deleted = WorkItem::task(TaskType::Produce);
        deleted.deleted = true;
        let aux = WorkItem::task(TaskType::Produce).auxiliary();

        let totals = NodeTotals::from_items([&done, &open, &deleted, &aux]);
        assert_eq!(totals, NodeTotals::new(2, 1));
        assert!(!totals.is_complete());
    }

    #[test]
    fn test_empty_node_is_not_complete() {
        assert!(!NodeTotals::default().is_complete());
        assert!(NodeTotals::new(2, 2).is_complete());
    }

    #[test]
    fn test_status_strings_round_trip() {
        for s in [
            ExecutableStatus::Blocked,
            ExecutableStatus::Executable,
            ExecutableStatus::Invalid,
            ExecutableStatus::Completed,
        ] {
            assert_eq!(ExecutableStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(
            ConfigStatus::parse("executor_deleted"),
            Some(ConfigStatus::ExecutorDeleted)
        );
        assert_eq!(WorkItemKind::parse("work_order"), Some(WorkItemKind::WorkOrder));
        assert_eq!(ItemStatus::parse("bogus"), None);
    }
}
