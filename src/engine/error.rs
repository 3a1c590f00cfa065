use crate::model::Timestamp;
use crate::repository::RepositoryError;

#[derive(Debug)]
pub enum SchedulerError {
    /// Lookup failure from the repository collaborator, passed through untouched.
    Repository(RepositoryError),
    InvalidInterval {
        start: Timestamp,
        end: Timestamp,
    },
    InvalidRequest(&'static str),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Repository(e) => write!(f, "repository error: {e}"),
            SchedulerError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            SchedulerError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            SchedulerError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Repository(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RepositoryError> for SchedulerError {
    fn from(e: RepositoryError) -> Self {
        SchedulerError::Repository(e)
    }
}
