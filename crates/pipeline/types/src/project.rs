//! Projects and their member pool
//!
//! A project is created `Ready` from one flow version, moves to `Ongoing`
//! when work starts, and to `Completed` once every owned work item is
//! done. `Completed` is terminal.

use crate::{FlowId, ProjectId, RoleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Project Status ───────────────────────────────────────────────────

/// Lifecycle state of a project; the discriminants define step distance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Ready = 1,
    Ongoing = 2,
    Completed = 3,
}

impl ProjectStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Ready),
            2 => Some(Self::Ongoing),
            3 => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

// ── Project ──────────────────────────────────────────────────────────

/// A project instantiated from a flow version
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub flow_id: FlowId,
    pub flow_version: u32,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, flow_id: FlowId, flow_version: u32) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::generate(),
            name: name.into(),
            flow_id,
            flow_version,
            status: ProjectStatus::Ready,
            complete_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = ProjectId::new(id);
        self
    }

    /// Nothing may execute before the project starts
    pub fn is_started(&self) -> bool {
        self.status != ProjectStatus::Ready
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProjectStatus::Completed
    }
}

// ── Member Binding ───────────────────────────────────────────────────

/// Grants a user a role within a project's member pool
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberBinding {
    pub project_id: ProjectId,
    pub role_id: RoleId,
    pub user_id: UserId,
}

impl MemberBinding {
    pub fn new(project_id: ProjectId, role_id: RoleId, user_id: UserId) -> Self {
        Self {
            project_id,
            role_id,
            user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_is_ready() {
        let project = Project::new("p", FlowId::new("f"), 1);
        assert_eq!(project.status, ProjectStatus::Ready);
        assert!(!project.is_started());
        assert!(project.complete_time.is_none());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ProjectStatus::Ongoing.code(), 2);
        assert_eq!(ProjectStatus::from_code(3), Some(ProjectStatus::Completed));
        assert_eq!(ProjectStatus::from_code(0), None);
        assert!(ProjectStatus::Ready < ProjectStatus::Completed);
        assert!(ProjectStatus::Completed.is_terminal());
    }
}
