use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::overlaps;

/// Instants are always stored in UTC; local-day reasoning goes through the configured offset.
pub type Timestamp = DateTime<Utc>;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    /// No ordering check here: stored records may be malformed and the
    /// predicate treats those as non-overlapping.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Persisted entities (owned by the repository) ─────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub owner_id: Ulid,
    #[serde(default)]
    pub provider_id: Option<Ulid>,
    #[serde(default)]
    pub resource_id: Option<Ulid>,
    #[serde(default)]
    pub client_id: Option<Ulid>,
    pub service_id: Ulid,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub recurrence_group_id: Option<Ulid>,
}

impl Appointment {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Every N days / weeks / months.
    pub interval: u32,
    /// Informational only (1 = Monday … 7 = Sunday).
    #[serde(default)]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Total occurrences, including the first one.
    #[serde(default)]
    pub count: Option<u32>,
}

/// An explicitly reserved unavailable interval. `None` on either id is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTime {
    pub id: Ulid,
    pub owner_id: Ulid,
    #[serde(default)]
    pub provider_id: Option<Ulid>,
    #[serde(default)]
    pub resource_id: Option<Ulid>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub reason: String,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub recurrence_group_id: Option<Ulid>,
}

impl BlockedTime {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }

    pub fn is_global(&self) -> bool {
        self.provider_id.is_none() && self.resource_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakWindow {
    pub start: String,
    pub end: String,
}

/// One weekday entry of a provider's schedule, as stored (`"HH:MM"` strings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDay {
    pub start: String,
    pub end: String,
    /// Informational; breaks never raise conflicts.
    #[serde(default)]
    pub breaks: Vec<BreakWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Ulid,
    pub owner_id: Ulid,
    #[serde(default)]
    pub name: Option<String>,
    /// Keyed by lowercase weekday name (`"monday"`). A missing day is unconstrained.
    #[serde(default)]
    pub working_hours: HashMap<String, WorkingDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Chair,
    Room,
    Equipment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub owner_id: Ulid,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: ResourceKind,
}

// ── Scopes ───────────────────────────────────────────────────────

/// The dimension a single availability phase is evaluated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Scope {
    Global,
    Provider(Ulid),
    Resource(Ulid),
}

/// What a booking request is for. Neither id set means an unscoped booking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingTarget {
    #[serde(default)]
    pub provider_id: Option<Ulid>,
    #[serde(default)]
    pub resource_id: Option<Ulid>,
}

impl BookingTarget {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn provider(id: Ulid) -> Self {
        Self { provider_id: Some(id), resource_id: None }
    }

    pub fn resource(id: Ulid) -> Self {
        Self { provider_id: None, resource_id: Some(id) }
    }

    pub fn of(appointment: &Appointment) -> Self {
        Self {
            provider_id: appointment.provider_id,
            resource_id: appointment.resource_id,
        }
    }

    /// Phases to evaluate, in order: global only when unscoped, otherwise provider then resource.
    pub fn scopes(&self) -> Vec<Scope> {
        match (self.provider_id, self.resource_id) {
            (None, None) => vec![Scope::Global],
            (p, r) => p
                .map(Scope::Provider)
                .into_iter()
                .chain(r.map(Scope::Resource))
                .collect(),
        }
    }
}

// ── Derived results ──────────────────────────────────────────────

/// Daily bookable window, already parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse a stored weekday entry. Returns None if either bound is not `HH:MM`.
    pub fn parse(day: &WorkingDay) -> Option<Self> {
        let start = NaiveTime::parse_from_str(day.start.trim(), "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(day.end.trim(), "%H:%M").ok()?;
        Some(Self { start, end })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: Timestamp,
    pub end: Timestamp,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
}

/// One reason a candidate interval cannot be booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictRecord {
    ProviderAppointment { appointment: Appointment },
    ResourceAppointment { appointment: Appointment },
    BlockedTime { blocked_time: BlockedTime },
    OutsideWorkingHours { working_day: WorkingDay },
}

impl ConflictRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            ConflictRecord::ProviderAppointment { .. } => "provider_appointment",
            ConflictRecord::ResourceAppointment { .. } => "resource_appointment",
            ConflictRecord::BlockedTime { .. } => "blocked_time",
            ConflictRecord::OutsideWorkingHours { .. } => "outside_working_hours",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub conflicts: Vec<ConflictRecord>,
    pub suggestions: Vec<Span>,
}

impl ConflictCheck {
    pub fn from_conflicts(conflicts: Vec<ConflictRecord>) -> Self {
        Self {
            has_conflict: !conflicts.is_empty(),
            conflicts,
            suggestions: Vec::new(),
        }
    }
}

/// Rendering position of one appointment within its overlap group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneAssignment {
    pub appointment_id: Ulid,
    pub lane_index: usize,
    pub total_lanes: usize,
}

impl LaneAssignment {
    pub fn width_percent(&self) -> f64 {
        100.0 / self.total_lanes as f64
    }

    pub fn left_percent(&self) -> f64 {
        self.lane_index as f64 * self.width_percent()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringPlan {
    pub bookable: Vec<Span>,
    pub conflicting: Vec<(Span, Vec<ConflictRecord>)>,
}
