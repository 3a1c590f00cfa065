//! Read (and single write) contract the engine needs from the persistence layer.
//!
//! Implementations own tenancy: every call is already scoped to `owner_id`
//! and the engine never second-guesses which records it was handed.

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    Unavailable(String),
    Corrupt(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::Unavailable(e) => write!(f, "repository unavailable: {e}"),
            RepositoryError::Corrupt(e) => write!(f, "corrupt record: {e}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Scheduled appointments of `owner_id` in `scope` that could overlap `hint`.
    ///
    /// The pre-filter is `stored.start <= hint.end && stored.end >= hint.start`;
    /// it is deliberately inclusive, callers re-check with the exact predicate.
    async fn find_scheduled_appointments(
        &self,
        owner_id: Ulid,
        scope: Scope,
        hint: Span,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    /// Blocked times of `owner_id` that may apply to `scope`. Callers filter again.
    async fn find_blocked_times(
        &self,
        owner_id: Ulid,
        scope: Scope,
    ) -> Result<Vec<BlockedTime>, RepositoryError>;

    async fn get_provider(&self, provider_id: Ulid) -> Result<Option<Provider>, RepositoryError>;
}

/// Write side used only by the booking gate.
#[async_trait]
pub trait AppointmentWriter: Send + Sync {
    /// Insert, or replace the appointment with the same id (reschedule).
    async fn save_appointment(&self, appointment: Appointment) -> Result<(), RepositoryError>;
}
