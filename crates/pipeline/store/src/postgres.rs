//! PostgreSQL adapter for pipeline storage.
//!
//! Every transaction takes a transaction-scoped advisory lock keyed by its
//! scope before touching any row, so two transactions on one project run
//! strictly one after the other while different projects proceed in
//! parallel. Statements run at READ COMMITTED and therefore always see the
//! writes of the previous lock holder.

use crate::traits::{PipelineStore, StoreTx, TxScope};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline_types::{
    ConfigStatus, ExecutableStatus, FlowId, ItemStatus, MemberBinding, NodeId, NodeTotals,
    Project, ProjectId, ProjectStatus, RoleId, TaskType, UserId, WorkItem, WorkItemId,
    WorkItemKind,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

const FREE_STANDING_LOCK_KEY: &str = "pipeline:free-standing";

/// PostgreSQL-backed pipeline store.
#[derive(Clone)]
pub struct PostgresPipelineStore {
    pool: PgPool,
}

impl PostgresPipelineStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_projects (
                project_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                flow_id TEXT NOT NULL,
                flow_version INTEGER NOT NULL,
                status SMALLINT NOT NULL,
                complete_time TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_members (
                project_id TEXT NOT NULL REFERENCES pipeline_projects (project_id) ON DELETE CASCADE,
                role_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (project_id, role_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_work_items (
                item_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                project_id TEXT REFERENCES pipeline_projects (project_id) ON DELETE CASCADE,
                node_id TEXT,
                task_type TEXT NOT NULL,
                status TEXT NOT NULL,
                executable_status TEXT NOT NULL,
                executor_id TEXT,
                config_status TEXT NOT NULL,
                auxiliary BOOLEAN NOT NULL DEFAULT FALSE,
                business_process_id TEXT,
                data_process_id TEXT,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS pipeline_work_items_node_idx
                ON pipeline_work_items (project_id, node_id)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStore for PostgresPipelineStore {
    async fn begin(&self, scope: TxScope) -> StorageResult<Box<dyn StoreTx>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let key = match &scope {
            TxScope::Project(id) => format!("pipeline:project:{id}"),
            TxScope::FreeStanding => FREE_STANDING_LOCK_KEY.to_string(),
        };
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(Box::new(PostgresTx { scope, tx }))
    }

    async fn item_scope(&self, id: &WorkItemId) -> StorageResult<Option<TxScope>> {
        let row = sqlx::query("SELECT project_id FROM pipeline_work_items WHERE item_id = $1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let project_id: Option<String> = row
            .try_get("project_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Some(match project_id {
            Some(id) => TxScope::Project(ProjectId(id)),
            None => TxScope::FreeStanding,
        }))
    }

    async fn list_open_projects(&self) -> StorageResult<Vec<ProjectId>> {
        let rows = sqlx::query(
            "SELECT project_id FROM pipeline_projects WHERE status <> $1 ORDER BY project_id",
        )
        .bind(ProjectStatus::Completed.code())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("project_id")
                    .map(ProjectId)
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .collect()
    }
}

/// Open PostgreSQL transaction holding its scope's advisory lock.
pub struct PostgresTx {
    scope: TxScope,
    tx: Transaction<'static, Postgres>,
}

impl PostgresTx {
    fn ensure_project_scope(&self, id: &ProjectId) -> StorageResult<()> {
        self.scope.ensure_covers(Some(id), format_args!("project {id}"))
    }

    fn ensure_item_scope(&self, item: &WorkItem) -> StorageResult<()> {
        self.scope
            .ensure_covers(item.project_id.as_ref(), format_args!("work item {}", item.id))
    }

    fn scope_project(&self) -> Option<String> {
        self.scope.project_id().map(|id| id.0.clone())
    }
}

const ITEM_COLUMNS: &str = "item_id, kind, project_id, node_id, task_type, status, \
     executable_status, executor_id, config_status, auxiliary, business_process_id, \
     data_process_id, deleted, created_at, updated_at";

#[async_trait]
impl StoreTx for PostgresTx {
    fn scope(&self) -> &TxScope {
        &self.scope
    }

    async fn get_project(&mut self, id: &ProjectId) -> StorageResult<Option<Project>> {
        self.ensure_project_scope(id)?;
        let row = sqlx::query(
            r#"
            SELECT project_id, name, flow_id, flow_version, status, complete_time, created_at, updated_at
              FROM pipeline_projects
             WHERE project_id = $1
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(project_row_to_record).transpose()
    }

    async fn insert_project(&mut self, project: &Project) -> StorageResult<()> {
        self.ensure_project_scope(&project.id)?;
        sqlx::query(
            r#"
            INSERT INTO pipeline_projects
                (project_id, name, flow_id, flow_version, status, complete_time, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&project.id.0)
        .bind(&project.name)
        .bind(&project.flow_id.0)
        .bind(project.flow_version as i32)
        .bind(project.status.code())
        .bind(project.complete_time)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn update_project(&mut self, project: &Project) -> StorageResult<()> {
        self.ensure_project_scope(&project.id)?;
        let result = sqlx::query(
            r#"
            UPDATE pipeline_projects
               SET name = $2,
                   status = $3,
                   complete_time = $4,
                   updated_at = $5
             WHERE project_id = $1
            "#,
        )
        .bind(&project.id.0)
        .bind(&project.name)
        .bind(project.status.code())
        .bind(project.complete_time)
        .bind(project.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "project {} not found",
                project.id
            )));
        }
        Ok(())
    }

    async fn delete_project(&mut self, id: &ProjectId) -> StorageResult<bool> {
        self.ensure_project_scope(id)?;
        let result = sqlx::query("DELETE FROM pipeline_projects WHERE project_id = $1")
            .bind(&id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_members(&mut self, project_id: &ProjectId) -> StorageResult<Vec<MemberBinding>> {
        self.ensure_project_scope(project_id)?;
        let rows = sqlx::query(
            r#"
            SELECT role_id, user_id
              FROM pipeline_members
             WHERE project_id = $1
             ORDER BY role_id, user_id
            "#,
        )
        .bind(&project_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let role_id: String = row
                    .try_get("role_id")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let user_id: String = row
                    .try_get("user_id")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(MemberBinding::new(
                    project_id.clone(),
                    RoleId(role_id),
                    UserId(user_id),
                ))
            })
            .collect()
    }

    async fn insert_member(&mut self, binding: &MemberBinding) -> StorageResult<bool> {
        self.ensure_project_scope(&binding.project_id)?;
        let result = sqlx::query(
            r#"
            INSERT INTO pipeline_members (project_id, role_id, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&binding.project_id.0)
        .bind(&binding.role_id.0)
        .bind(&binding.user_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_member(
        &mut self,
        project_id: &ProjectId,
        role_id: &RoleId,
        user_id: &UserId,
    ) -> StorageResult<bool> {
        self.ensure_project_scope(project_id)?;
        let result = sqlx::query(
            "DELETE FROM pipeline_members WHERE project_id = $1 AND role_id = $2 AND user_id = $3",
        )
        .bind(&project_id.0)
        .bind(&role_id.0)
        .bind(&user_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_work_item(&mut self, id: &WorkItemId) -> StorageResult<Option<WorkItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM pipeline_work_items \
             WHERE item_id = $1 AND project_id IS NOT DISTINCT FROM $2"
        );
        let project = self.scope_project();
        let row = sqlx::query(&sql)
            .bind(&id.0)
            .bind(project)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(item_row_to_record).transpose()
    }

    async fn insert_work_item(&mut self, item: &WorkItem) -> StorageResult<()> {
        self.ensure_item_scope(item)?;
        let sql = format!(
            "INSERT INTO pipeline_work_items ({ITEM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        );
        sqlx::query(&sql)
            .bind(&item.id.0)
            .bind(item.kind.as_str())
            .bind(item.project_id.as_ref().map(|id| id.0.clone()))
            .bind(item.node_id.as_ref().map(|id| id.0.clone()))
            .bind(item.task_type.as_str())
            .bind(item.status.as_str())
            .bind(item.executable_status.as_str())
            .bind(item.executor_id.as_ref().map(|id| id.0.clone()))
            .bind(item.config_status.as_str())
            .bind(item.auxiliary)
            .bind(item.business_process_id.clone())
            .bind(item.data_process_id.clone())
            .bind(item.deleted)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn update_work_item(&mut self, item: &WorkItem) -> StorageResult<()> {
        self.ensure_item_scope(item)?;
        let result = sqlx::query(
            r#"
            UPDATE pipeline_work_items
               SET node_id = $2,
                   status = $3,
                   executable_status = $4,
                   executor_id = $5,
                   config_status = $6,
                   auxiliary = $7,
                   business_process_id = $8,
                   data_process_id = $9,
                   deleted = $10,
                   updated_at = $11
             WHERE item_id = $1
            "#,
        )
        .bind(&item.id.0)
        .bind(item.node_id.as_ref().map(|id| id.0.clone()))
        .bind(item.status.as_str())
        .bind(item.executable_status.as_str())
        .bind(item.executor_id.as_ref().map(|id| id.0.clone()))
        .bind(item.config_status.as_str())
        .bind(item.auxiliary)
        .bind(item.business_process_id.clone())
        .bind(item.data_process_id.clone())
        .bind(item.deleted)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "work item {} not found",
                item.id
            )));
        }
        Ok(())
    }

    async fn list_project_items(&mut self, project_id: &ProjectId) -> StorageResult<Vec<WorkItem>> {
        self.ensure_project_scope(project_id)?;
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM pipeline_work_items \
             WHERE project_id = $1 AND NOT deleted ORDER BY item_id"
        );
        let rows = sqlx::query(&sql)
            .bind(&project_id.0)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(item_row_to_record).collect()
    }

    async fn list_node_items(
        &mut self,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> StorageResult<Vec<WorkItem>> {
        self.ensure_project_scope(project_id)?;
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM pipeline_work_items \
             WHERE project_id = $1 AND node_id = $2 AND NOT deleted ORDER BY item_id"
        );
        let rows = sqlx::query(&sql)
            .bind(&project_id.0)
            .bind(&node_id.0)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(item_row_to_record).collect()
    }

    async fn count_by_node(
        &mut self,
        project_id: &ProjectId,
        node_id: &NodeId,
    ) -> StorageResult<NodeTotals> {
        self.ensure_project_scope(project_id)?;
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completed
              FROM pipeline_work_items
             WHERE project_id = $1
               AND node_id = $2
               AND NOT deleted
               AND NOT auxiliary
            "#,
        )
        .bind(&project_id.0)
        .bind(&node_id.0)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let total: i64 = row
            .try_get("total")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let completed: i64 = row
            .try_get("completed")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(NodeTotals::new(total as u64, completed as u64))
    }

    async fn set_executable_status(
        &mut self,
        ids: &[WorkItemId],
        from: ExecutableStatus,
        to: ExecutableStatus,
    ) -> StorageResult<Vec<WorkItemId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw_ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let rows = sqlx::query(
            r#"
            UPDATE pipeline_work_items
               SET executable_status = $1,
                   updated_at = $2
             WHERE item_id = ANY($3)
               AND executable_status = $4
               AND project_id IS NOT DISTINCT FROM $5
               AND NOT deleted
         RETURNING item_id
            "#,
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(raw_ids)
        .bind(from.as_str())
        .bind(self.scope_project())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("item_id")
                    .map(WorkItemId)
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

fn project_row_to_record(row: PgRow) -> StorageResult<Project> {
    let get_err = |e: sqlx::Error| StorageError::Backend(e.to_string());
    let status_code: i16 = row.try_get("status").map_err(get_err)?;
    let status = ProjectStatus::from_code(status_code).ok_or_else(|| {
        StorageError::Serialization(format!("unknown project status code: {status_code}"))
    })?;
    let flow_version: i32 = row.try_get("flow_version").map_err(get_err)?;

    Ok(Project {
        id: ProjectId(row.try_get("project_id").map_err(get_err)?),
        name: row.try_get("name").map_err(get_err)?,
        flow_id: FlowId(row.try_get("flow_id").map_err(get_err)?),
        flow_version: flow_version as u32,
        status,
        complete_time: row
            .try_get::<Option<DateTime<Utc>>, _>("complete_time")
            .map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn item_row_to_record(row: PgRow) -> StorageResult<WorkItem> {
    let get_err = |e: sqlx::Error| StorageError::Backend(e.to_string());
    let text = |column: &str| -> StorageResult<String> { row.try_get(column).map_err(get_err) };
    let opt_text =
        |column: &str| -> StorageResult<Option<String>> { row.try_get(column).map_err(get_err) };
    let bad = |column: &str, value: &str| {
        StorageError::Serialization(format!("invalid {column} value: {value}"))
    };

    let kind = text("kind")?;
    let task_type = text("task_type")?;
    let status = text("status")?;
    let executable_status = text("executable_status")?;
    let config_status = text("config_status")?;

    Ok(WorkItem {
        id: WorkItemId(text("item_id")?),
        kind: WorkItemKind::parse(&kind).ok_or_else(|| bad("kind", &kind))?,
        project_id: opt_text("project_id")?.map(ProjectId),
        node_id: opt_text("node_id")?.map(NodeId),
        task_type: task_type
            .parse::<TaskType>()
            .map_err(StorageError::Serialization)?,
        status: ItemStatus::parse(&status).ok_or_else(|| bad("status", &status))?,
        executable_status: ExecutableStatus::parse(&executable_status)
            .ok_or_else(|| bad("executable_status", &executable_status))?,
        executor_id: opt_text("executor_id")?.map(UserId),
        config_status: ConfigStatus::parse(&config_status)
            .ok_or_else(|| bad("config_status", &config_status))?,
        auxiliary: row.try_get("auxiliary").map_err(get_err)?,
        business_process_id: opt_text("business_process_id")?,
        data_process_id: opt_text("data_process_id")?,
        deleted: row.try_get("deleted").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}
