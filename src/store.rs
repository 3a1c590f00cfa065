use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::{appointment_in_scope, in_scope};
use crate::limits::*;
use crate::model::*;
use crate::repository::{AppointmentWriter, Repository, RepositoryError};

/// DashMap-backed repository. Used by the command binary and by tests.
pub struct InMemoryStore {
    appointments: DashMap<Ulid, Appointment>,
    blocked_times: DashMap<Ulid, BlockedTime>,
    providers: DashMap<Ulid, Provider>,
    resources: DashMap<Ulid, Resource>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            appointments: DashMap::new(),
            blocked_times: DashMap::new(),
            providers: DashMap::new(),
            resources: DashMap::new(),
        }
    }

    /// Load a JSON snapshot `{ appointments, blocked_times, providers, resources }`.
    ///
    /// Blocked times whose timestamps do not parse are skipped with a warning
    /// instead of failing the load.
    pub fn from_snapshot_json(json: &str) -> Result<Self, RepositoryError> {
        let snapshot: Snapshot =
            serde_json::from_str(json).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        if snapshot.appointments.len() > MAX_SNAPSHOT_RECORDS
            || snapshot.blocked_times.len() > MAX_SNAPSHOT_RECORDS
            || snapshot.providers.len() > MAX_SNAPSHOT_RECORDS
            || snapshot.resources.len() > MAX_SNAPSHOT_RECORDS
        {
            return Err(RepositoryError::Corrupt("snapshot too large".into()));
        }

        let store = Self::new();
        for appointment in snapshot.appointments {
            store.insert_appointment(appointment);
        }
        let mut skipped = 0usize;
        for raw in snapshot.blocked_times {
            match raw.parse() {
                Ok(blocked) => store.insert_blocked_time(blocked),
                Err(e) => {
                    skipped += 1;
                    warn!("skipping blocked time: {e}");
                    metrics::counter!(crate::observability::RECORDS_SKIPPED_TOTAL).increment(1);
                }
            }
        }
        for provider in snapshot.providers {
            store.insert_provider(provider);
        }
        for resource in snapshot.resources {
            store.insert_resource(resource);
        }

        info!(
            "snapshot loaded: {} appointments, {} blocked times ({skipped} skipped), {} providers, {} resources",
            store.appointments.len(),
            store.blocked_times.len(),
            store.providers.len(),
            store.resources.len()
        );
        Ok(store)
    }

    // ── Mutation (snapshot assembly and tests) ───────────────

    pub fn insert_appointment(&self, appointment: Appointment) {
        self.appointments.insert(appointment.id, appointment);
    }

    pub fn insert_blocked_time(&self, blocked: BlockedTime) {
        self.blocked_times.insert(blocked.id, blocked);
    }

    pub fn insert_provider(&self, provider: Provider) {
        self.providers.insert(provider.id, provider);
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.resources.insert(resource.id, resource);
    }

    // ── Lookup ───────────────────────────────────────────────

    pub fn appointment_count(&self) -> usize {
        self.appointments.len()
    }

    pub fn blocked_time_count(&self) -> usize {
        self.blocked_times.len()
    }

    pub fn get_appointment(&self, id: &Ulid) -> Option<Appointment> {
        self.appointments.get(id).map(|e| e.value().clone())
    }

    /// Every appointment of the owner (any status) overlapping `window`, for calendar views.
    pub fn appointments_between(&self, owner_id: Ulid, window: Span) -> Vec<Appointment> {
        let mut found: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|e| e.owner_id == owner_id && window.overlaps(&e.span()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|a| (a.start_time, a.end_time));
        found
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn find_scheduled_appointments(
        &self,
        owner_id: Ulid,
        scope: Scope,
        hint: Span,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        Ok(self
            .appointments
            .iter()
            .filter(|e| {
                e.owner_id == owner_id
                    && appointment_in_scope(e.value(), &scope)
                    && e.start_time <= hint.end
                    && e.end_time >= hint.start
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn find_blocked_times(
        &self,
        owner_id: Ulid,
        scope: Scope,
    ) -> Result<Vec<BlockedTime>, RepositoryError> {
        Ok(self
            .blocked_times
            .iter()
            .filter(|e| e.owner_id == owner_id && in_scope(e.value(), &scope))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_provider(&self, provider_id: Ulid) -> Result<Option<Provider>, RepositoryError> {
        Ok(self.providers.get(&provider_id).map(|e| e.value().clone()))
    }
}

#[async_trait]
impl AppointmentWriter for InMemoryStore {
    async fn save_appointment(&self, appointment: Appointment) -> Result<(), RepositoryError> {
        self.insert_appointment(appointment);
        Ok(())
    }
}

// ── Snapshot format ──────────────────────────────────────────────

#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    appointments: Vec<Appointment>,
    #[serde(default)]
    blocked_times: Vec<RawBlockedTime>,
    #[serde(default)]
    providers: Vec<Provider>,
    #[serde(default)]
    resources: Vec<Resource>,
}

/// Blocked time as stored; timestamps stay strings until validated.
#[derive(Deserialize)]
struct RawBlockedTime {
    id: Ulid,
    owner_id: Ulid,
    #[serde(default)]
    provider_id: Option<Ulid>,
    #[serde(default)]
    resource_id: Option<Ulid>,
    start_time: String,
    end_time: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    recurrence_group_id: Option<Ulid>,
}

impl RawBlockedTime {
    fn parse(self) -> Result<BlockedTime, String> {
        let parse = |field: &str, value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| format!("{} has bad {field} {value:?}: {e}", self.id))
        };
        let start_time = parse("start_time", &self.start_time)?;
        let end_time = parse("end_time", &self.end_time)?;
        Ok(BlockedTime {
            id: self.id,
            owner_id: self.owner_id,
            provider_id: self.provider_id,
            resource_id: self.resource_id,
            start_time,
            end_time,
            reason: self.reason,
            recurrence: self.recurrence,
            recurrence_group_id: self.recurrence_group_id,
        })
    }
}
