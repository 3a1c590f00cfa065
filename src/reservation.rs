//! Check-then-write booking under per-owner and per-scope locks.
//!
//! The scheduler itself is read-only; two callers that check the same slot
//! concurrently would both see it free. The gate closes that window inside
//! one process: writers touching the same provider or resource are
//! serialised, and an unscoped booking (which competes with every
//! appointment of the owner) excludes all other writers of that owner.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::engine::{Scheduler, SchedulerError};
use crate::model::*;
use crate::repository::{AppointmentWriter, Repository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BookingOutcome {
    Booked { appointment: Appointment },
    Rejected { check: ConflictCheck },
}

pub struct BookingGate<R> {
    scheduler: Scheduler<R>,
    owners: DashMap<Ulid, Arc<RwLock<()>>>,
    scopes: DashMap<Scope, Arc<Mutex<()>>>,
}

enum OwnerGuard {
    Exclusive { _guard: OwnedRwLockWriteGuard<()> },
    Shared { _guard: OwnedRwLockReadGuard<()> },
}

/// Held for the duration of one check-and-write.
struct BookingLocks {
    _owner: OwnerGuard,
    _scopes: Vec<OwnedMutexGuard<()>>,
}

impl<R: Repository + AppointmentWriter> BookingGate<R> {
    pub fn new(scheduler: Scheduler<R>) -> Self {
        Self {
            scheduler,
            owners: DashMap::new(),
            scopes: DashMap::new(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler<R> {
        &self.scheduler
    }

    /// Book `appointment` if nothing conflicts, atomically with respect to other gate callers.
    ///
    /// Writing an existing id replaces it; the check excludes that id so a
    /// reschedule never collides with its own old slot.
    pub async fn book(&self, appointment: Appointment) -> Result<BookingOutcome, SchedulerError> {
        if !appointment.is_scheduled() {
            return Err(SchedulerError::InvalidRequest("only scheduled appointments can be booked"));
        }
        if !appointment.span().is_valid() {
            return Err(SchedulerError::InvalidInterval {
                start: appointment.start_time,
                end: appointment.end_time,
            });
        }

        let target = BookingTarget::of(&appointment);
        let wait = Instant::now();
        let _locks = self.acquire(appointment.owner_id, target).await;
        metrics::histogram!(crate::observability::BOOKING_LOCK_WAIT_SECONDS)
            .record(wait.elapsed().as_secs_f64());

        let check = self
            .scheduler
            .check_conflict(
                appointment.owner_id,
                target,
                appointment.start_time,
                appointment.end_time,
                Some(appointment.id),
            )
            .await?;

        if check.has_conflict {
            debug!(
                "booking {} rejected: {} conflict(s)",
                appointment.id,
                check.conflicts.len()
            );
            metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => "rejected")
                .increment(1);
            return Ok(BookingOutcome::Rejected { check });
        }

        self.scheduler
            .repository()
            .save_appointment(appointment.clone())
            .await?;
        info!(
            "booked {} [{}, {})",
            appointment.id, appointment.start_time, appointment.end_time
        );
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => "booked").increment(1);
        Ok(BookingOutcome::Booked { appointment })
    }

    /// Drop lock entries nobody is holding or waiting on.
    ///
    /// Entries are created per owner, provider and resource and never removed
    /// otherwise; long-running callers should run this periodically.
    pub fn prune_idle(&self) {
        self.owners.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.scopes.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn lock_count(&self) -> usize {
        self.owners.len() + self.scopes.len()
    }

    /// Owner lock first, then scope mutexes in `BookingTarget::scopes` order
    /// (provider before resource). Every caller uses the same order.
    async fn acquire(&self, owner_id: Ulid, target: BookingTarget) -> BookingLocks {
        let owner_lock = self.owners.entry(owner_id).or_default().clone();
        let scopes = target.scopes();

        if scopes == [Scope::Global] {
            return BookingLocks {
                _owner: OwnerGuard::Exclusive { _guard: owner_lock.write_owned().await },
                _scopes: Vec::new(),
            };
        }

        let owner = OwnerGuard::Shared { _guard: owner_lock.read_owned().await };
        let mut guards = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let lock = self.scopes.entry(scope).or_default().clone();
            guards.push(lock.lock_owned().await);
        }
        BookingLocks { _owner: owner, _scopes: guards }
    }
}
