use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by [`FlowRunner`](crate::FlowRunner).
///
/// `E` is the workflow's own error type; it is carried as-is so callers can
/// match on domain failures (validation, effects) separately from plumbing.
#[derive(Debug, Error)]
pub enum FlowError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Workflow(E),
}

impl<E> FlowError<E>
where
    E: std::error::Error + 'static,
{
    /// The workflow error, if this is one.
    pub fn workflow_error(&self) -> Option<&E> {
        match self {
            FlowError::Workflow(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
