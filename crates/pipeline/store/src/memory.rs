//! In-memory reference implementation of the pipeline storage traits.
//!
//! This adapter is deterministic and test-friendly. Each scope owns a
//! partition guarded by an async mutex; a transaction holds that mutex
//! for its whole life and edits a private copy of the partition, which
//! replaces the shared one on commit. Production deployments should use
//! a transactional backend (e.g. PostgreSQL).

use crate::traits::{PipelineStore, StoreTx, TxScope};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use pipeline_types::{
    ExecutableStatus, MemberBinding, NodeId, NodeTotals, Project, ProjectId, RoleId, UserId,
    WorkItem, WorkItemId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Rows owned by one scope.
#[derive(Debug, Clone, Default)]
struct Partition {
    project: Option<Project>,
    members: BTreeSet<MemberBinding>,
    items: BTreeMap<WorkItemId, WorkItem>,
}

impl Partition {
    fn is_empty(&self) -> bool {
        self.project.is_none() && self.members.is_empty() && self.items.is_empty()
    }
}

type Partitions = Arc<RwLock<HashMap<TxScope, Arc<Mutex<Partition>>>>>;

/// Committed lookups that span partitions.
#[derive(Debug, Default)]
struct Index {
    item_scopes: HashMap<WorkItemId, TxScope>,
    open_projects: BTreeSet<ProjectId>,
}

/// In-memory pipeline storage adapter.
#[derive(Default)]
pub struct InMemoryPipelineStore {
    partitions: Partitions,
    index: Arc<RwLock<Index>>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, scope: &TxScope) -> StorageResult<Arc<Mutex<Partition>>> {
        let mut guard = self
            .partitions
            .write()
            .map_err(|_| StorageError::poisoned("partition"))?;
        Ok(guard.entry(scope.clone()).or_default().clone())
    }

    /// Number of live partitions, free-standing pool included
    pub fn partition_count(&self) -> usize {
        self.partitions.read().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn begin(&self, scope: TxScope) -> StorageResult<Box<dyn StoreTx>> {
        let partition = self.partition(&scope)?;
        let guard = partition.lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            scope,
            guard,
            working,
            index: self.index.clone(),
            partitions: self.partitions.clone(),
        }))
    }

    async fn item_scope(&self, id: &WorkItemId) -> StorageResult<Option<TxScope>> {
        let guard = self
            .index
            .read()
            .map_err(|_| StorageError::poisoned("index"))?;
        Ok(guard.item_scopes.get(id).cloned())
    }

    async fn list_open_projects(&self) -> StorageResult<Vec<ProjectId>> {
        let guard = self
            .index
            .read()
            .map_err(|_| StorageError::poisoned("index"))?;
        Ok(guard.open_projects.iter().cloned().collect())
    }
}

/// Transaction over one in-memory partition.
pub struct MemoryTx {
    scope: TxScope,
    guard: OwnedMutexGuard<Partition>,
    working: Partition,
    index: Arc<RwLock<Index>>,
    partitions: Partitions,
}

impl Drop for MemoryTx {
    /// Forget project partitions left without rows, unless another
    /// transaction is already queued on them.
    fn drop(&mut self) {
        if self.scope == TxScope::FreeStanding || !self.guard.is_empty() {
            return;
        }
        let Ok(mut partitions) = self.partitions.write() else {
            return;
        };
        // the map and this guard hold the only references
        if Arc::strong_count(OwnedMutexGuard::mutex(&self.guard)) == 2 {
            partitions.remove(&self.scope);
            tracing::trace!(scope = %self.scope, "empty partition released");
        }
    }
}

impl MemoryTx {
    fn ensure_project_scope(&self, id: &ProjectId) -> StorageResult<()> {
        self.scope.ensure_covers(Some(id), format_args!("project {id}"))
    }

    fn ensure_item_scope(&self, item: &WorkItem) -> StorageResult<()> {
        self.scope
            .ensure_covers(item.project_id.as_ref(), format_args!("work item {}", item.id))
    }

    fn publish_index(&self) -> StorageResult<()> {
        let mut index = self
            .index
            .write()
            .map_err(|_| StorageError::poisoned("index"))?;

        for id in self.guard.items.keys() {
            index.item_scopes.remove(id);
        }
        for id in self.working.items.keys() {
            index.item_scopes.insert(id.clone(), self.scope.clone());
        }

        if let TxScope::Project(project_id) = &self.scope {
            match &self.working.project {
                Some(project) if !project.is_completed() => {
                    index.open_projects.insert(project_id.clone());
                }
                _ => {
                    index.open_projects.remove(project_id);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    fn scope(&self) -> &TxScope {
        &self.scope
    }

    async fn get_project(&mut self, id: &ProjectId) -> StorageResult<Option<Project>> {
        self.ensure_project_scope(id)?;
        Ok(self.working.project.clone())
    }

    async fn insert_project(&mut self, project: &Project) -> StorageResult<()> {
        self.ensure_project_scope(&project.id)?;
        if self.working.project.is_some() {
            return Err(StorageError::Conflict(format!(
                "project {} already exists",
                project.id
            )));
        }
        self.working.project = Some(project.clone());
        Ok(())
    }

    async fn update_project(&mut self, project: &Project) -> StorageResult<()> {
        self.ensure_project_scope(&project.id)?;
        match self.working.project.as_mut() {
            Some(existing) => {
                *existing = project.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "project {} not found",
                project.id
            ))),
        }
    }

    async fn delete_project(&mut self, id: &ProjectId) -> StorageResult<bool> {
        self.ensure_project_scope(id)?;
        let existed = self.working.project.take().is_some();
        self.working.members.clear();
        self.working.items.clear();
        Ok(existed)
    }

    async fn list_members(&mut self, project_id: &ProjectId) -> StorageResult<Vec<MemberBinding>> {
        self.ensure_project_scope(project_id)?;
        Ok(self.working.members.iter().cloned().collect())
    }

    async fn insert_member(&mut self, binding: &MemberBinding) -> StorageResult<bool> {
        self.ensure_project_scope(&binding.project_id)?;
        Ok(self.working.members.insert(binding.clone()))
    }

    async fn delete_member(
        &mut self,
        project_id: &ProjectId,
        role_id: &RoleId,
        user_id: &UserId,
    ) -> StorageResult<bool> {
        self.ensure_project_scope(project_id)?;
        let binding = MemberBinding::new(project_id.clone(), role_id.clone(), user_id.clone());
        Ok(self.working.members.remove(&binding))
    }

    async fn get_work_item(&mut self, id: &WorkItemId) -> StorageResult<Option<WorkItem>> {
        Ok(self.working.items.get(id).cloned())
    }

    async fn insert_work_item(&mut self, item: &WorkItem) -> StorageResult<()> {
        self.ensure_item_scope(item)?;
        let taken_elsewhere = self
            .index
            .read()
            .map_err(|_| StorageError::poisoned("index"))?
            .item_scopes
            .get(&item.id)
            .is_some_and(|scope| scope != &self.scope);
        if taken_elsewhere || self.working.items.contains_key(&item.id) {
            return Err(StorageError::Conflict(format!(
                "work item {} already exists",
                item.id
            )));
        }
        self.working.items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn update_work_item(&mut self, item: &WorkItem) -> StorageResult<()> {
        self.ensure_item_scope(item)?;
        match self.working.items.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "work item {} not found",
                item.id
            ))),
        }
    }

    async fn list_project_items(&mut self, project_id: &ProjectId) -> StorageResult<Vec<WorkItem>> {
        self.ensure_project_scope(project_id)?;
        Ok(self
            .working
            .items
            .values()
            .filter(|i| !i.deleted)
            .cloned()
            .collect())
    }

    async fn list_node_items(
        &mut self,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> StorageResult<Vec<WorkItem>> {
        self.ensure_project_scope(project_id)?;
        Ok(self
            .working
            .items
            .values()
            .filter(|i| !i.deleted && i.node_id.as_ref() == Some(node_id))
            .cloned()
            .collect())
    }

    async fn count_by_node(
        &mut self,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> StorageResult<NodeTotals> {
        self.ensure_project_scope(project_id)?;
        Ok(NodeTotals::from_items(
            self.working
                .items
                .values()
                .filter(|i| i.node_id.as_ref() == Some(node_id)),
        ))
    }

    async fn set_executable_status(
        &mut self,
        ids: &[WorkItemId],
        from: ExecutableStatus,
        to: ExecutableStatus,
    ) -> StorageResult<Vec<WorkItemId>> {
        let mut moved = Vec::new();
        for id in ids {
            if let Some(item) = self.working.items.get_mut(id) {
                if !item.deleted && item.executable_status == from {
                    item.executable_status = to;
                    item.touch();
                    moved.push(id.clone());
                }
            }
        }
        Ok(moved)
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.publish_index()?;
        let working = std::mem::take(&mut self.working);
        *self.guard = working;
        tracing::trace!(scope = %self.scope, "memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        tracing::trace!(scope = %self.scope, "memory transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::{FlowId, ItemStatus, TaskType};

    fn project(id: &str) -> Project {
        Project::new("p", FlowId::new("f"), 1).with_id(id)
    }

    fn scope(id: &str) -> TxScope {
        TxScope::Project(ProjectId::new(id))
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = InMemoryPipelineStore::new();
        let p = project("p1");

        let mut tx = store.begin(scope("p1")).await.unwrap();
        tx.insert_project(&p).await.unwrap();
        let item = WorkItem::task(TaskType::Produce)
            .in_project(p.id.clone())
            .on_node(NodeId::new("n1"));
        tx.insert_work_item(&item).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(scope("p1")).await.unwrap();
        assert!(tx.get_project(&p.id).await.unwrap().is_some());
        assert_eq!(tx.list_project_items(&p.id).await.unwrap().len(), 1);
        tx.rollback().await.unwrap();

        assert_eq!(store.item_scope(&item.id).await.unwrap(), Some(scope("p1")));
        assert_eq!(store.list_open_projects().await.unwrap(), vec![p.id.clone()]);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = InMemoryPipelineStore::new();
        let p = project("p1");

        let mut tx = store.begin(scope("p1")).await.unwrap();
        tx.insert_project(&p).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin(scope("p1")).await.unwrap();
            assert!(tx.get_project(&p.id).await.unwrap().is_none());
            tx.insert_project(&p).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin(scope("p1")).await.unwrap();
        assert!(tx.get_project(&p.id).await.unwrap().is_none());
        assert!(store.list_open_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scope_is_enforced() {
        let store = InMemoryPipelineStore::new();
        let mut tx = store.begin(scope("p1")).await.unwrap();
        let err = tx.insert_project(&project("p2")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));

        let free = WorkItem::task(TaskType::Produce);
        let err = tx.insert_work_item(&free).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_set_executable_status_is_compare_and_swap() {
        let store = InMemoryPipelineStore::new();
        let p = project("p1");
        let blocked = WorkItem::task(TaskType::Produce).in_project(p.id.clone());
        let mut invalid = WorkItem::task(TaskType::Produce).in_project(p.id.clone());
        invalid.executable_status = ExecutableStatus::Invalid;

        let mut tx = store.begin(scope("p1")).await.unwrap();
        tx.insert_project(&p).await.unwrap();
        tx.insert_work_item(&blocked).await.unwrap();
        tx.insert_work_item(&invalid).await.unwrap();

        let ids = vec![blocked.id.clone(), invalid.id.clone()];
        let moved = tx
            .set_executable_status(&ids, ExecutableStatus::Blocked, ExecutableStatus::Executable)
            .await
            .unwrap();
        assert_eq!(moved, vec![blocked.id.clone()]);

        let again = tx
            .set_executable_status(&ids, ExecutableStatus::Blocked, ExecutableStatus::Executable)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_count_by_node() {
        let store = InMemoryPipelineStore::new();
        let p = project("p1");
        let node = NodeId::new("n1");
        let mut done = WorkItem::work_order(TaskType::Produce)
            .in_project(p.id.clone())
            .on_node(node.clone());
        done.status = ItemStatus::Completed;
        let open = WorkItem::task(TaskType::Review)
            .in_project(p.id.clone())
            .on_node(node.clone());
        let other = WorkItem::task(TaskType::Review)
            .in_project(p.id.clone())
            .on_node(NodeId::new("n2"));

        let mut tx = store.begin(scope("p1")).await.unwrap();
        tx.insert_project(&p).await.unwrap();
        for item in [&done, &open, &other] {
            tx.insert_work_item(item).await.unwrap();
        }

        let totals = tx.count_by_node(&p.id, &node).await.unwrap();
        assert_eq!(totals, NodeTotals::new(2, 1));
        assert_eq!(tx.list_node_items(&p.id, &node).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let store = InMemoryPipelineStore::new();
        let p = project("p1");
        let item = WorkItem::task(TaskType::Produce).in_project(p.id.clone());

        let mut tx = store.begin(scope("p1")).await.unwrap();
        tx.insert_project(&p).await.unwrap();
        tx.insert_work_item(&item).await.unwrap();
        tx.insert_member(&MemberBinding::new(
            p.id.clone(),
            RoleId::new("reviewer"),
            UserId::new("u1"),
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(scope("p1")).await.unwrap();
        assert!(tx.delete_project(&p.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(store.item_scope(&item.id).await.unwrap().is_none());
        assert!(store.list_open_projects().await.unwrap().is_empty());
        let mut tx = store.begin(scope("p1")).await.unwrap();
        assert!(tx.list_members(&p.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transactions_on_one_project_are_serialized() {
        let store = Arc::new(InMemoryPipelineStore::new());
        let p = project("p1");
        let mut tx = store.begin(scope("p1")).await.unwrap();
        tx.insert_project(&p).await.unwrap();
        tx.commit().await.unwrap();

        let first = store.begin(scope("p1")).await.unwrap();
        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.begin(scope("p1")).await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        // a different project does not contend
        let other = store.begin(scope("p2")).await.unwrap();
        other.rollback().await.unwrap();

        first.rollback().await.unwrap();
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_empty_partitions_are_released() {
        let store = InMemoryPipelineStore::new();

        // lookups of unknown projects leave nothing behind
        let mut tx = store.begin(scope("ghost")).await.unwrap();
        assert!(tx.get_project(&ProjectId::new("ghost")).await.unwrap().is_none());
        tx.rollback().await.unwrap();
        assert_eq!(store.partition_count(), 0);

        let p = project("p1");
        let mut tx = store.begin(scope("p1")).await.unwrap();
        tx.insert_project(&p).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.partition_count(), 1);

        let mut tx = store.begin(scope("p1")).await.unwrap();
        tx.delete_project(&p.id).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.partition_count(), 0);

        // a queued transaction keeps the partition alive
        let first = store.begin(scope("p2")).await.unwrap();
        let queued = store.partition(&scope("p2")).unwrap();
        first.rollback().await.unwrap();
        assert_eq!(store.partition_count(), 1);
        drop(queued);
    }
}
