//! Storage errors shared by every backend

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// An update targeted a project or work item that does not exist
    #[error("record not found: {0}")]
    NotFound(String),

    /// Duplicate key, e.g. a work item id already used in another scope
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request touched rows outside its transaction scope
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A stored value could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// A poisoned in-process lock
    pub(crate) fn poisoned(lock: &str) -> Self {
        Self::Backend(format!("{lock} lock poisoned"))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            StorageError::poisoned("index").to_string(),
            "backend error: index lock poisoned"
        );
        assert!(StorageError::Conflict("w1".into()).is_conflict());
        assert!(!StorageError::NotFound("w1".into()).is_conflict());
    }
}
