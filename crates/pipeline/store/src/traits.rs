use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use pipeline_types::{
    ExecutableStatus, MemberBinding, NodeId, NodeTotals, Project, ProjectId, RoleId, UserId,
    WorkItem, WorkItemId,
};
use std::fmt;

/// The set of rows a transaction serializes on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TxScope {
    /// One project: its row, its bindings and every work item it owns
    Project(ProjectId),
    /// Work items that belong to no project
    FreeStanding,
}

impl TxScope {
    pub fn project_id(&self) -> Option<&ProjectId> {
        match self {
            Self::Project(id) => Some(id),
            Self::FreeStanding => None,
        }
    }

    /// Whether an item owned by `project_id` lives inside this scope
    pub fn covers(&self, project_id: Option<&ProjectId>) -> bool {
        self.project_id() == project_id
    }

    /// Reject access to rows owned by another scope.
    pub fn ensure_covers(
        &self,
        project_id: Option<&ProjectId>,
        what: impl fmt::Display,
    ) -> StorageResult<()> {
        if self.covers(project_id) {
            Ok(())
        } else {
            Err(StorageError::InvalidInput(format!(
                "{what} is outside transaction scope {self}"
            )))
        }
    }
}

impl fmt::Display for TxScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project(id) => write!(f, "project:{id}"),
            Self::FreeStanding => f.write_str("free-standing"),
        }
    }
}

/// Entry point of a storage backend.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Open a transaction over `scope`. Transactions over the same scope
    /// are serialized; different scopes never contend.
    async fn begin(&self, scope: TxScope) -> StorageResult<Box<dyn StoreTx>>;

    /// Resolve which scope owns a work item, outside any transaction.
    /// An item never moves between scopes, so the answer stays valid.
    async fn item_scope(&self, id: &WorkItemId) -> StorageResult<Option<TxScope>>;

    /// Ids of projects that are not yet completed.
    async fn list_open_projects(&self) -> StorageResult<Vec<ProjectId>>;
}

/// One open transaction. Dropping it without `commit` discards every write.
#[async_trait]
pub trait StoreTx: Send {
    fn scope(&self) -> &TxScope;

    // ── Projects ─────────────────────────────────────────────────────

    async fn get_project(&mut self, id: &ProjectId) -> StorageResult<Option<Project>>;

    /// Insert a new project; fails with `Conflict` if the id is taken.
    async fn insert_project(&mut self, project: &Project) -> StorageResult<()>;

    async fn update_project(&mut self, project: &Project) -> StorageResult<()>;

    /// Delete a project with its bindings and work items.
    async fn delete_project(&mut self, id: &ProjectId) -> StorageResult<bool>;

    // ── Member bindings ──────────────────────────────────────────────

    async fn list_members(&mut self, project_id: &ProjectId) -> StorageResult<Vec<MemberBinding>>;

    /// Returns false if the binding already existed.
    async fn insert_member(&mut self, binding: &MemberBinding) -> StorageResult<bool>;

    /// Returns false if no such binding existed.
    async fn delete_member(
        &mut self,
        project_id: &ProjectId,
        role_id: &RoleId,
        user_id: &UserId,
    ) -> StorageResult<bool>;

    // ── Work items ───────────────────────────────────────────────────

    async fn get_work_item(&mut self, id: &WorkItemId) -> StorageResult<Option<WorkItem>>;

    async fn insert_work_item(&mut self, item: &WorkItem) -> StorageResult<()>;

    async fn update_work_item(&mut self, item: &WorkItem) -> StorageResult<()>;

    /// Every non-deleted work item of a project, tasks and work orders alike.
    async fn list_project_items(&mut self, project_id: &ProjectId) -> StorageResult<Vec<WorkItem>>;

    /// Non-deleted work items bound to one node.
    async fn list_node_items(
        &mut self,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> StorageResult<Vec<WorkItem>>;

    /// Totals over the non-deleted, non-auxiliary items bound to a node.
    async fn count_by_node(
        &mut self,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> StorageResult<NodeTotals>;

    /// Compare-and-swap: move the listed items still in `from` to `to`.
    /// Rows in any other state are left alone. Returns the ids moved.
    async fn set_executable_status(
        &mut self,
        ids: &[WorkItemId],
        from: ExecutableStatus,
        to: ExecutableStatus,
    ) -> StorageResult<Vec<WorkItemId>>;

    // ── Completion ───────────────────────────────────────────────────

    async fn commit(self: Box<Self>) -> StorageResult<()>;

    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_coverage() {
        let p1 = ProjectId::new("p1");
        let scope = TxScope::Project(p1.clone());
        assert!(scope.covers(Some(&p1)));
        assert!(!scope.covers(Some(&ProjectId::new("p2"))));
        assert!(!scope.covers(None));
        assert!(TxScope::FreeStanding.covers(None));

        let err = TxScope::FreeStanding
            .ensure_covers(Some(&p1), "work item w1")
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
        assert_eq!(scope.to_string(), "project:p1");
    }
}
