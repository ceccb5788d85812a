//! Task types and the task-type → role lookup
//!
//! The lookup is a fixed array indexed by [`TaskType`], so resolving a
//! task's role never inspects anything at runtime beyond the enum tag.

use crate::RoleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a task asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Produce,
    Review,
    Accept,
}

impl TaskType {
    pub const COUNT: usize = 3;
    pub const ALL: [TaskType; Self::COUNT] = [Self::Produce, Self::Review, Self::Accept];

    /// Position of this type in [`TaskType::ALL`]
    pub const fn index(self) -> usize {
        match self {
            Self::Produce => 0,
            Self::Review => 1,
            Self::Accept => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Produce => "produce",
            Self::Review => "review",
            Self::Accept => "accept",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "produce" => Ok(Self::Produce),
            "review" => Ok(Self::Review),
            "accept" => Ok(Self::Accept),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Maps every task type to the project role that executes it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RoleMapEntries", into = "RoleMapEntries")]
pub struct TaskRoleMap {
    roles: [RoleId; TaskType::COUNT],
}

impl TaskRoleMap {
    pub fn new(produce: RoleId, review: RoleId, accept: RoleId) -> Self {
        Self {
            roles: [produce, review, accept],
        }
    }

    /// The role whose members execute tasks of `task_type`
    pub fn role_for(&self, task_type: TaskType) -> &RoleId {
        &self.roles[task_type.index()]
    }

    /// Task types executed by `role`
    pub fn task_types_for(&self, role: &RoleId) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|t| self.role_for(*t) == role)
            .collect()
    }

    pub fn with_role(mut self, task_type: TaskType, role: RoleId) -> Self {
        self.roles[task_type.index()] = role;
        self
    }
}

impl Default for TaskRoleMap {
    fn default() -> Self {
        Self::new(
            RoleId::new("producer"),
            RoleId::new("reviewer"),
            RoleId::new("acceptor"),
        )
    }
}

/// Named-field form used for (de)serialization so configuration files stay readable
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RoleMapEntries {
    #[serde(default = "default_produce_role")]
    produce: RoleId,
    #[serde(default = "default_review_role")]
    review: RoleId,
    #[serde(default = "default_accept_role")]
    accept: RoleId,
}

fn default_produce_role() -> RoleId {
    RoleId::new("producer")
}

fn default_review_role() -> RoleId {
    RoleId::new("reviewer")
}

fn default_accept_role() -> RoleId {
    RoleId::new("acceptor")
}

impl From<RoleMapEntries> for TaskRoleMap {
    fn from(entries: RoleMapEntries) -> Self {
        Self::new(entries.produce, entries.review, entries.accept)
    }
}

impl From<TaskRoleMap> for RoleMapEntries {
    fn from(map: TaskRoleMap) -> Self {
        let [produce, review, accept] = map.roles;
        Self {
            produce,
            review,
            accept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_all_order() {
        for (i, t) in TaskType::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
    }

    #[test]
    fn test_default_roles() {
        let map = TaskRoleMap::default();
        assert_eq!(map.role_for(TaskType::Review), &RoleId::new("reviewer"));
        assert_eq!(
            map.task_types_for(&RoleId::new("acceptor")),
            vec![TaskType::Accept]
        );
    }

    #[test]
    fn test_shared_role() {
        let map = TaskRoleMap::default().with_role(TaskType::Accept, RoleId::new("reviewer"));
        assert_eq!(
            map.task_types_for(&RoleId::new("reviewer")),
            vec![TaskType::Review, TaskType::Accept]
        );
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let map: TaskRoleMap = serde_json::from_str(r#"{"review": "qa"}"#).unwrap();
        assert_eq!(map.role_for(TaskType::Review), &RoleId::new("qa"));
        assert_eq!(map.role_for(TaskType::Produce), &RoleId::new("producer"));
    }

    #[test]
    fn test_task_type_parse() {
        assert_eq!("review".parse::<TaskType>(), Ok(TaskType::Review));
        assert!("other".parse::<TaskType>().is_err());
    }
}
