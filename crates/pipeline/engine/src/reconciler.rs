//! Scheduled readiness reconciliation
//!
//! Runs outside any request path. Every tick it walks the open projects
//! and re-derives executable status, one transaction per project, each
//! bounded by a timeout. Passes are idempotent, so a missed or repeated
//! tick is harmless.

use crate::config::ReconcilerConfig;
use crate::engine::{PipelineEngine, ReconcileOutcome};
use crate::EngineResult;
use pipeline_types::ProjectId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};

/// Totals of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub projects: usize,
    pub activated: usize,
    pub demoted: usize,
    pub failed: Vec<ProjectId>,
}

pub struct ReadinessReconciler {
    engine: Arc<PipelineEngine>,
    config: ReconcilerConfig,
}

impl ReadinessReconciler {
    pub fn new(engine: Arc<PipelineEngine>, config: ReconcilerConfig) -> Self {
        Self { engine, config }
    }

    /// Tick until `shutdown` flips to true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            "Readiness reconciler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reconcile_all().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Readiness reconciler stopped");
    }

    /// One pass over every open project
    pub async fn reconcile_all(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let projects = match self.engine.store().list_open_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list open projects");
                return summary;
            }
        };

        for project_id in projects {
            summary.projects += 1;
            match self.reconcile_one(&project_id).await {
                Ok(outcome) => {
                    summary.activated += outcome.activated.len();
                    summary.demoted += outcome.demoted.len();
                }
                Err(e) => {
                    tracing::warn!(project_id = %project_id, error = %e, "Project reconciliation failed");
                    summary.failed.push(project_id);
                }
            }
        }

        tracing::debug!(
            projects = summary.projects,
            activated = summary.activated,
            demoted = summary.demoted,
            failed = summary.failed.len(),
            "Reconciliation pass finished"
        );
        summary
    }

    async fn reconcile_one(&self, project_id: &ProjectId) -> anyhow::Result<ReconcileOutcome> {
        let limit = Duration::from_secs(self.config.timeout_secs.max(1));
        let outcome: EngineResult<ReconcileOutcome> =
            timeout(limit, self.engine.reconcile_project(project_id))
                .await
                .map_err(|_| anyhow::anyhow!("timed out after {}s", limit.as_secs()))?;
        Ok(outcome?)
    }
}
