use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Error vocabulary shared by every adapter.
///
/// Adapters build these values themselves; nothing checks invariants on
/// their behalf.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("{collection} id {id} already exists")]
    AlreadyExists { collection: &'static str, id: i64 },

    #[error("{collection} id {id} does not exist")]
    NotFound { collection: &'static str, id: i64 },

    #[error("author with id {author_id} does not exist")]
    ReferencedEntityMissing { author_id: i64 },

    /// Connection, pool or timeout failure talking to the store
    #[error("{backend} unavailable: {message}")]
    BackendUnavailable {
        backend: &'static str,
        message: String,
    },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The store answered, but with an error
    #[error("{backend} error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

/// Fieldless discriminant of [`StorageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    ReferencedEntityMissing,
    BackendUnavailable,
    MalformedInput,
    Backend,
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::ReferencedEntityMissing { .. } => ErrorKind::ReferencedEntityMissing,
            StorageError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            StorageError::MalformedInput(_) => ErrorKind::MalformedInput,
            StorageError::Backend { .. } => ErrorKind::Backend,
        }
    }

    pub fn unavailable(backend: &'static str, message: impl ToString) -> Self {
        StorageError::BackendUnavailable {
            backend,
            message: message.to_string(),
        }
    }

    pub fn backend(backend: &'static str, message: impl ToString) -> Self {
        StorageError::Backend {
            backend,
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::MalformedInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entity() {
        let err = StorageError::AlreadyExists {
            collection: "authors",
            id: 1,
        };
        assert_eq!(err.to_string(), "authors id 1 already exists");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = StorageError::ReferencedEntityMissing { author_id: 9 };
        assert_eq!(err.to_string(), "author with id 9 does not exist");
    }

    #[test]
    fn json_errors_are_malformed_input() {
        let err: StorageError = serde_json::from_str::<Vec<i64>>("[1,")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }
}
