//! Operation log and project event sinks
//!
//! Both are fed only after the owning transaction commits. Records and
//! events produced inside a transaction wait in [`PendingEffects`] and are
//! dropped with it on rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline_types::{ProjectId, UserId, WorkItem, WorkItemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;

pub const MSG_EXECUTOR_REMOVED: &str = "executor removed, task returned to pool";
pub const MSG_TASK_INVALIDATED: &str = "task discarded: executor removed";
pub const MSG_OPERATOR_DISCARD: &str = "task discarded by operator";

// ── Operation records ────────────────────────────────────────────────

/// What happened to a work item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ExecutorRemoved,
    TaskInvalidated,
    OperatorDiscard,
}

impl OperationKind {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ExecutorRemoved => MSG_EXECUTOR_REMOVED,
            Self::TaskInvalidated => MSG_TASK_INVALIDATED,
            Self::OperatorDiscard => MSG_OPERATOR_DISCARD,
        }
    }
}

/// One append-only operation log entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub work_item_id: WorkItemId,
    /// User the entry is about (the removed executor, or the discarding operator)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl OperationRecord {
    pub fn new(kind: OperationKind, item: &WorkItem, user_id: Option<UserId>) -> Self {
        Self {
            kind,
            project_id: item.project_id.clone(),
            work_item_id: item.id.clone(),
            user_id,
            message: kind.message().to_string(),
            recorded_at: Utc::now(),
        }
    }
}

// ── Project events ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectEventKind {
    Finished,
    Deleted,
}

impl fmt::Display for ProjectEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => f.write_str("project_finished"),
            Self::Deleted => f.write_str("project_deleted"),
        }
    }
}

/// Notification for external collaborators about a project
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEvent {
    pub kind: ProjectEventKind,
    pub project_id: ProjectId,
    /// Distinct business process ids of the project's work items, sorted
    pub business_process_ids: Vec<String>,
    /// Distinct data process ids of the project's work items, sorted
    pub data_process_ids: Vec<String>,
    /// Caller credential forwarded to downstream services
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ProjectEvent {
    pub fn from_items<'a>(
        kind: ProjectEventKind,
        project_id: ProjectId,
        items: impl IntoIterator<Item = &'a WorkItem>,
        token: Option<String>,
    ) -> Self {
        let mut business = BTreeSet::new();
        let mut data = BTreeSet::new();
        for item in items {
            if let Some(id) = &item.business_process_id {
                business.insert(id.clone());
            }
            if let Some(id) = &item.data_process_id {
                data.insert(id.clone());
            }
        }
        Self {
            kind,
            project_id,
            business_process_ids: business.into_iter().collect(),
            data_process_ids: data.into_iter().collect(),
            token,
            occurred_at: Utc::now(),
        }
    }
}

// ── Sink contracts ───────────────────────────────────────────────────

/// Append-only operation log
#[async_trait]
pub trait OperationLogSink: Send + Sync {
    async fn append(&self, records: &[OperationRecord]) -> anyhow::Result<()>;
}

/// Fire-and-forget project event delivery
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &ProjectEvent) -> anyhow::Result<()>;
}

/// Side effects buffered until the transaction commits
#[derive(Debug, Default)]
pub struct PendingEffects {
    pub records: Vec<OperationRecord>,
    pub events: Vec<ProjectEvent>,
}

impl PendingEffects {
    pub fn record(&mut self, record: OperationRecord) {
        self.records.push(record);
    }

    pub fn publish(&mut self, event: ProjectEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.events.is_empty()
    }

    /// Hand everything to the sinks. Failures are logged, never returned.
    pub async fn flush(self, log: &dyn OperationLogSink, publisher: &dyn EventPublisher) {
        if !self.records.is_empty() {
            if let Err(e) = log.append(&self.records).await {
                tracing::warn!(
                    error = %e,
                    records = self.records.len(),
                    "Operation log append failed"
                );
            }
        }
        for event in &self.events {
            if let Err(e) = publisher.publish(event).await {
                tracing::warn!(
                    error = %e,
                    project_id = %event.project_id,
                    kind = %event.kind,
                    "Project event publish failed"
                );
            }
        }
    }
}

// ── In-memory sinks ──────────────────────────────────────────────────

/// Collects operation records; useful for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryOperationLog {
    records: Mutex<Vec<OperationRecord>>,
}

impl MemoryOperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OperationRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OperationLogSink for MemoryOperationLog {
    async fn append(&self, records: &[OperationRecord]) -> anyhow::Result<()> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("operation log lock poisoned"))?;
        guard.extend_from_slice(records);
        Ok(())
    }
}

/// Collects published events
#[derive(Debug, Default)]
pub struct MemoryEventPublisher {
    events: Mutex<Vec<ProjectEvent>>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProjectEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn publish(&self, event: &ProjectEvent) -> anyhow::Result<()> {
        let mut guard = self
            .events
            .lock()
            .map_err(|_| anyhow::anyhow!("event publisher lock poisoned"))?;
        guard.push(event.clone());
        Ok(())
    }
}

// ── Tracing sinks ────────────────────────────────────────────────────

/// Writes operation records to the `pipeline::oplog` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOperationLog;

#[async_trait]
impl OperationLogSink for TracingOperationLog {
    async fn append(&self, records: &[OperationRecord]) -> anyhow::Result<()> {
        for record in records {
            let payload = serde_json::to_string(record)?;
            tracing::info!(
                target: "pipeline::oplog",
                work_item_id = %record.work_item_id,
                %payload,
                "{}",
                record.message
            );
        }
        Ok(())
    }
}

/// Writes project events to the `pipeline::events` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: &ProjectEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(
            target: "pipeline::events",
            project_id = %event.project_id,
            kind = %event.kind,
            %payload,
            "Project event published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::TaskType;

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &ProjectEvent) -> anyhow::Result<()> {
            anyhow::bail!("broker unavailable")
        }
    }

    #[test]
    fn test_event_ids_are_distinct_and_sorted() {
        let items = [
            WorkItem::task(TaskType::Produce).with_processes("bp-2", "dp-1"),
            WorkItem::task(TaskType::Review).with_processes("bp-1", "dp-1"),
            WorkItem::work_order(TaskType::Accept),
        ];
        let event = ProjectEvent::from_items(
            ProjectEventKind::Finished,
            ProjectId::new("p1"),
            &items,
            Some("tok".to_string()),
        );
        assert_eq!(event.business_process_ids, vec!["bp-1", "bp-2"]);
        assert_eq!(event.data_process_ids, vec!["dp-1"]);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_stop_flush() {
        let log = MemoryOperationLog::new();
        let item = WorkItem::task(TaskType::Produce);
        let mut effects = PendingEffects::default();
        effects.record(OperationRecord::new(
            OperationKind::OperatorDiscard,
            &item,
            None,
        ));
        effects.publish(ProjectEvent::from_items(
            ProjectEventKind::Deleted,
            ProjectId::new("p1"),
            [],
            None,
        ));

        effects.flush(&log, &FailingPublisher).await;
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, MSG_OPERATOR_DISCARD);
    }

    #[tokio::test]
    async fn test_tracing_sinks_accept_records() {
        let item = WorkItem::task(TaskType::Review);
        let record = OperationRecord::new(OperationKind::ExecutorRemoved, &item, None);
        TracingOperationLog.append(&[record]).await.unwrap();
        let event =
            ProjectEvent::from_items(ProjectEventKind::Finished, ProjectId::new("p"), [&item], None);
        TracingEventPublisher.publish(&event).await.unwrap();
    }
}
