//! Project Lifecycle Controller
//!
//! Status moves one step at a time, ready → ongoing → completed, and never
//! leaves completed. Starting a project activates its roots; completing it
//! requires every counted work item to be done.

use crate::callbacks::CallbackRegistry;
use crate::cascade::{CascadeOutcome, CascadePropagator};
use crate::flow_graph::FlowGraph;
use crate::sinks::{PendingEffects, ProjectEvent, ProjectEventKind};
use crate::{EngineResult, PreconditionViolation};
use chrono::Utc;
use pipeline_store::StoreTx;
use pipeline_types::{ExecutableStatus, ItemStatus, Project, ProjectStatus, UserId, WorkItem, WorkItemId};

/// Who asks for a lifecycle change
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Actor {
    pub user_id: Option<UserId>,
    /// Credential forwarded with published events
    pub token: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Self::default()
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Result of validating a requested status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing requested, or the status already holds
    Unchanged,
    Advance {
        from: ProjectStatus,
        to: ProjectStatus,
    },
}

/// Validate a requested status change against the lifecycle rules
pub fn check_transition(
    old: ProjectStatus,
    new: Option<ProjectStatus>,
) -> Result<Transition, PreconditionViolation> {
    let Some(new) = new else {
        return Ok(Transition::Unchanged);
    };
    if new == old {
        return Ok(Transition::Unchanged);
    }
    if old.is_terminal() {
        return Err(PreconditionViolation::TerminalState(old));
    }
    if new < old {
        return Err(PreconditionViolation::IllegalRegression { from: old, to: new });
    }
    if new.code() - old.code() > 1 {
        return Err(PreconditionViolation::IllegalSkip { from: old, to: new });
    }
    Ok(Transition::Advance { from: old, to: new })
}

/// Every counted item must be completed, and none may be invalid
pub fn check_completion_gate(project: &Project, items: &[WorkItem]) -> Result<(), PreconditionViolation> {
    let counted: Vec<&WorkItem> = items.iter().filter(|i| i.is_counted()).collect();

    let invalid = counted
        .iter()
        .filter(|i| i.executable_status == ExecutableStatus::Invalid)
        .count();
    if invalid > 0 {
        return Err(PreconditionViolation::HasInvalidItem {
            project_id: project.id.clone(),
            count: invalid,
        });
    }

    let remaining = counted.iter().filter(|i| !i.is_completed()).count();
    if remaining > 0 {
        return Err(PreconditionViolation::NotAllComplete {
            project_id: project.id.clone(),
            remaining,
        });
    }
    Ok(())
}

/// What a status update did
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub project: Project,
    pub transition: Transition,
    /// Items and nodes activated by starting the project
    pub activation: CascadeOutcome,
    /// Auxiliary items closed out by finishing the project
    pub closed_auxiliary: Vec<WorkItemId>,
}

pub struct LifecycleController<'a> {
    graph: &'a FlowGraph,
    callbacks: &'a CallbackRegistry,
}

impl<'a> LifecycleController<'a> {
    pub fn new(graph: &'a FlowGraph, callbacks: &'a CallbackRegistry) -> Self {
        Self { graph, callbacks }
    }

    pub async fn update_project_status(
        &self,
        tx: &mut dyn StoreTx,
        actor: &Actor,
        mut project: Project,
        new: Option<ProjectStatus>,
        effects: &mut PendingEffects,
    ) -> EngineResult<StatusChange> {
        let transition = check_transition(project.status, new)?;
        let mut change = StatusChange {
            project: project.clone(),
            transition,
            activation: CascadeOutcome::default(),
            closed_auxiliary: Vec::new(),
        };

        let Transition::Advance { from, to } = transition else {
            return Ok(change);
        };

        match to {
            ProjectStatus::Ongoing => {
                project.status = ProjectStatus::Ongoing;
                project.updated_at = Utc::now();
                tx.update_project(&project).await?;
                change.activation = CascadePropagator::new(self.graph, self.callbacks)
                    .start_project_executable(tx, &project)
                    .await?;
            }
            ProjectStatus::Completed => {
                let items = tx.list_project_items(&project.id).await?;
                check_completion_gate(&project, &items)?;
                change.closed_auxiliary = close_out_auxiliary(tx, &items).await?;

                let now = Utc::now();
                project.status = ProjectStatus::Completed;
                project.complete_time = Some(now);
                project.updated_at = now;
                tx.update_project(&project).await?;

                effects.publish(ProjectEvent::from_items(
                    ProjectEventKind::Finished,
                    project.id.clone(),
                    &items,
                    actor.token.clone(),
                ));
            }
            ProjectStatus::Ready => {}
        }

        tracing::info!(
            project_id = %project.id,
            from = %from,
            to = %to,
            actor = ?actor.user_id,
            "Project status changed"
        );
        change.project = project;
        Ok(change)
    }
}

/// Finish the auxiliary data-sync items of a completing project
async fn close_out_auxiliary(
    tx: &mut dyn StoreTx,
    items: &[WorkItem],
) -> EngineResult<Vec<WorkItemId>> {
    let mut closed = Vec::new();
    for item in items.iter().filter(|i| i.auxiliary && !i.is_completed()) {
        let mut item = item.clone();
        item.status = ItemStatus::Completed;
        item.executable_status = ExecutableStatus::Completed;
        item.touch();
        tx.update_work_item(&item).await?;
        closed.push(item.id);
    }
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::{FlowId, TaskType};

    #[test]
    fn test_transition_table() {
        use ProjectStatus::*;
        assert_eq!(
            check_transition(Ready, Some(Ongoing)),
            Ok(Transition::Advance { from: Ready, to: Ongoing })
        );
        assert_eq!(
            check_transition(Ongoing, Some(Completed)),
            Ok(Transition::Advance { from: Ongoing, to: Completed })
        );
        assert_eq!(check_transition(Ongoing, None), Ok(Transition::Unchanged));
        assert_eq!(check_transition(Completed, Some(Completed)), Ok(Transition::Unchanged));

        assert_eq!(
            check_transition(Ready, Some(Completed)).unwrap_err().reason(),
            "illegal_skip"
        );
        assert_eq!(
            check_transition(Ongoing, Some(Ready)).unwrap_err().reason(),
            "illegal_regression"
        );
        assert_eq!(
            check_transition(Completed, Some(Ongoing)).unwrap_err().reason(),
            "terminal_state"
        );
        assert_eq!(
            check_transition(Completed, Some(Ready)).unwrap_err().reason(),
            "terminal_state"
        );
    }

    #[test]
    fn test_completion_gate() {
        let project = Project::new("p", FlowId::new("f"), 1);
        let mut done = WorkItem::task(TaskType::Produce);
        done.status = ItemStatus::Completed;
        let aux = WorkItem::task(TaskType::Produce).auxiliary();
        assert!(check_completion_gate(&project, &[done.clone(), aux]).is_ok());

        let open = WorkItem::work_order(TaskType::Review);
        assert_eq!(
            check_completion_gate(&project, &[done.clone(), open.clone()])
                .unwrap_err()
                .reason(),
            "not_all_complete"
        );

        let mut invalid = WorkItem::task(TaskType::Review);
        invalid.executable_status = ExecutableStatus::Invalid;
        assert_eq!(
            check_completion_gate(&project, &[open, invalid]).unwrap_err().reason(),
            "has_invalid_item"
        );

        let mut discarded = WorkItem::task(TaskType::Accept);
        discarded.deleted = true;
        assert!(check_completion_gate(&project, &[done, discarded]).is_ok());
    }

    #[test]
    fn test_completing_empty_project_is_allowed() {
        let project = Project::new("p", FlowId::new("f"), 1);
        assert!(check_completion_gate(&project, &[]).is_ok());
    }
}
