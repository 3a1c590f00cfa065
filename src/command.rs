//! JSON-lines command surface: one request object per line in, one response line out.

use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{Scheduler, SchedulerError};
use crate::layout;
use crate::limits::*;
use crate::model::*;
use crate::observability::{command_label, COMMANDS_TOTAL, COMMAND_DURATION_SECONDS};
use crate::reservation::BookingGate;
use crate::store::InMemoryStore;

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CheckConflict {
        owner_id: Ulid,
        #[serde(default)]
        provider_id: Option<Ulid>,
        #[serde(default)]
        resource_id: Option<Ulid>,
        start_time: Timestamp,
        end_time: Timestamp,
        #[serde(default)]
        exclude_id: Option<Ulid>,
        #[serde(default = "yes")]
        include_suggestions: bool,
    },
    AvailableSlots {
        owner_id: Ulid,
        #[serde(default)]
        provider_id: Option<Ulid>,
        #[serde(default)]
        resource_id: Option<Ulid>,
        date: NaiveDate,
        #[serde(default)]
        duration_minutes: Option<i64>,
        #[serde(default)]
        working_hours: Option<WorkingDay>,
    },
    SuggestedSlots {
        owner_id: Ulid,
        #[serde(default)]
        provider_id: Option<Ulid>,
        #[serde(default)]
        resource_id: Option<Ulid>,
        from: NaiveDate,
        #[serde(default)]
        duration_minutes: Option<i64>,
        #[serde(default)]
        days_ahead: Option<u32>,
        #[serde(default)]
        working_hours: Option<WorkingDay>,
    },
    IsSlotAvailable {
        owner_id: Ulid,
        scope: Scope,
        start_time: Timestamp,
        end_time: Timestamp,
    },
    PackDay {
        owner_id: Ulid,
        date: NaiveDate,
    },
    PlanRecurring {
        owner_id: Ulid,
        #[serde(default)]
        provider_id: Option<Ulid>,
        #[serde(default)]
        resource_id: Option<Ulid>,
        start_time: Timestamp,
        end_time: Timestamp,
        recurrence: RecurrenceRule,
    },
    Book {
        appointment: Appointment,
    },
}

/// One output line.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { ok: serde_json::Value },
    Error { error: String },
}

impl Response {
    pub fn to_line(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"error\":\"response encoding failed: {e}\"}}"))
    }
}

pub struct Dispatcher {
    store: Arc<InMemoryStore>,
    gate: BookingGate<InMemoryStore>,
}

impl Dispatcher {
    pub fn new(scheduler: Scheduler<InMemoryStore>) -> Self {
        Self {
            store: scheduler.repository().clone(),
            gate: BookingGate::new(scheduler),
        }
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    fn scheduler(&self) -> &Scheduler<InMemoryStore> {
        self.gate.scheduler()
    }

    /// Drop booking-lock entries nobody holds. Returns how many went.
    pub fn prune_locks(&self) -> usize {
        let before = self.gate.lock_count();
        self.gate.prune_idle();
        let pruned = before.saturating_sub(self.gate.lock_count());
        debug!("pruned {pruned} idle booking lock(s)");
        pruned
    }

    /// Parse, run and encode one input line. Never fails; errors become `{"error": ...}`.
    pub async fn handle_line(&self, line: &str) -> String {
        if line.len() > MAX_COMMAND_LEN {
            return Response::Error { error: "command too long".into() }.to_line();
        }
        let cmd: Command = match serde_json::from_str(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                metrics::counter!(COMMANDS_TOTAL, "command" => "unknown", "status" => "error")
                    .increment(1);
                return Response::Error { error: format!("bad command: {e}") }.to_line();
            }
        };

        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute(cmd).await;
        metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(ok) => {
                metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => "ok").increment(1);
                Response::Ok { ok }
            }
            Err(e) => {
                warn!("{label} failed: {e}");
                metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => "error")
                    .increment(1);
                Response::Error { error: e.to_string() }
            }
        };
        response.to_line()
    }

    pub async fn execute(&self, cmd: Command) -> Result<serde_json::Value, SchedulerError> {
        debug!("execute {cmd:?}");
        let scheduler = self.scheduler();
        match cmd {
            Command::CheckConflict {
                owner_id,
                provider_id,
                resource_id,
                start_time,
                end_time,
                exclude_id,
                include_suggestions,
            } => {
                let target = BookingTarget { provider_id, resource_id };
                let check = if include_suggestions {
                    scheduler
                        .check_conflict(owner_id, target, start_time, end_time, exclude_id)
                        .await?
                } else {
                    scheduler
                        .check_conflict_only(owner_id, target, start_time, end_time, exclude_id)
                        .await?
                };
                encode(&check)
            }
            Command::AvailableSlots {
                owner_id,
                provider_id,
                resource_id,
                date,
                duration_minutes,
                working_hours,
            } => {
                let hours = parse_hours(working_hours)?.unwrap_or(scheduler.config().working_hours);
                let duration = duration_minutes.unwrap_or(scheduler.config().default_service_minutes);
                let slots = scheduler
                    .available_slots(
                        owner_id,
                        BookingTarget { provider_id, resource_id },
                        date,
                        duration,
                        hours,
                    )
                    .await?;
                encode(&slots)
            }
            Command::SuggestedSlots {
                owner_id,
                provider_id,
                resource_id,
                from,
                duration_minutes,
                days_ahead,
                working_hours,
            } => {
                let hours = parse_hours(working_hours)?;
                let duration = duration_minutes.unwrap_or(scheduler.config().default_service_minutes);
                let days = scheduler
                    .suggested_slots(
                        owner_id,
                        BookingTarget { provider_id, resource_id },
                        from,
                        duration,
                        days_ahead,
                        hours,
                    )
                    .await?;
                encode(&days)
            }
            Command::IsSlotAvailable {
                owner_id,
                scope,
                start_time,
                end_time,
            } => {
                let available = scheduler
                    .is_slot_available(owner_id, scope, start_time, end_time)
                    .await?;
                Ok(serde_json::Value::Bool(available))
            }
            Command::PackDay { owner_id, date } => {
                let offset = scheduler.config().utc_offset;
                let day_start = date
                    .and_time(NaiveTime::MIN)
                    .and_local_timezone(offset)
                    .single()
                    .ok_or(SchedulerError::InvalidRequest("date out of range"))?
                    .with_timezone(&Utc);
                let day_end = day_start
                    .checked_add_signed(chrono::Duration::days(1))
                    .ok_or(SchedulerError::InvalidRequest("date out of range"))?;
                let day = Span::new(day_start, day_end);
                let appointments: Vec<Appointment> = self
                    .store
                    .appointments_between(owner_id, day)
                    .into_iter()
                    .filter(|a| a.status != AppointmentStatus::Cancelled)
                    .filter(|a| a.start_time.with_timezone(&offset).date_naive() == date)
                    .collect();
                encode(&layout::pack_day(&appointments))
            }
            Command::PlanRecurring {
                owner_id,
                provider_id,
                resource_id,
                start_time,
                end_time,
                recurrence,
            } => {
                let plan = scheduler
                    .plan_recurring(
                        owner_id,
                        BookingTarget { provider_id, resource_id },
                        start_time,
                        end_time,
                        &recurrence,
                    )
                    .await?;
                encode(&plan)
            }
            Command::Book { appointment } => encode(&self.gate.book(appointment).await?),
        }
    }
}

fn parse_hours(day: Option<WorkingDay>) -> Result<Option<WorkingHours>, SchedulerError> {
    match day {
        None => Ok(None),
        Some(day) => WorkingHours::parse(&day)
            .map(Some)
            .ok_or(SchedulerError::InvalidRequest("working_hours must be HH:MM")),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, SchedulerError> {
    serde_json::to_value(value).map_err(|_| SchedulerError::InvalidRequest("result not encodable"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    use crate::config::SchedulerConfig;

    fn dispatcher() -> Dispatcher {
        let store = Arc::new(InMemoryStore::new());
        Dispatcher::new(Scheduler::new(store, Arc::new(SchedulerConfig::default())))
    }

    fn parse(line: &str) -> Value {
        serde_json::from_str(line).unwrap()
    }

    fn appointment_json(owner: Ulid, provider: Ulid, start: &str, end: &str) -> Value {
        json!({
            "id": Ulid::new(),
            "owner_id": owner,
            "provider_id": provider,
            "service_id": Ulid::new(),
            "start_time": start,
            "end_time": end,
            "status": "scheduled",
        })
    }

    #[test]
    fn commands_parse_with_defaults() {
        let owner = Ulid::new();
        let cmd: Command = serde_json::from_value(json!({
            "op": "check_conflict",
            "owner_id": owner,
            "start_time": "2025-03-03T10:00:00Z",
            "end_time": "2025-03-03T11:00:00Z",
        }))
        .unwrap();
        match cmd {
            Command::CheckConflict { provider_id, include_suggestions, exclude_id, .. } => {
                assert!(provider_id.is_none());
                assert!(exclude_id.is_none());
                assert!(include_suggestions);
            }
            other => panic!("unexpected {other:?}"),
        }

        let cmd: Command = serde_json::from_value(json!({
            "op": "is_slot_available",
            "owner_id": owner,
            "scope": { "kind": "provider", "id": owner },
            "start_time": "2025-03-03T10:00:00Z",
            "end_time": "2025-03-03T11:00:00Z",
        }))
        .unwrap();
        assert!(matches!(cmd, Command::IsSlotAvailable { scope: Scope::Provider(_), .. }));
        assert_eq!(command_label(&cmd), "is_slot_available");
    }

    #[tokio::test]
    async fn malformed_lines_become_error_responses() {
        let d = dispatcher();
        let out = parse(&d.handle_line("{\"op\": \"teleport\"}").await);
        assert!(out["error"].as_str().unwrap().starts_with("bad command"));

        let long = "x".repeat(MAX_COMMAND_LEN + 1);
        let out = parse(&d.handle_line(&long).await);
        assert_eq!(out["error"], "command too long");
    }

    #[tokio::test]
    async fn book_then_check_then_pack() {
        let d = dispatcher();
        let owner = Ulid::new();
        let provider = Ulid::new();

        for (start, end) in [
            ("2025-03-03T09:00:00Z", "2025-03-03T10:00:00Z"),
            ("2025-03-03T09:30:00Z", "2025-03-03T10:30:00Z"),
        ] {
            // Second booking lands on another provider so both are stored.
            let p = if start.contains("09:00") { provider } else { Ulid::new() };
            let line = json!({ "op": "book", "appointment": appointment_json(owner, p, start, end) });
            let out = parse(&d.handle_line(&line.to_string()).await);
            assert_eq!(out["ok"]["outcome"], "booked");
        }
        // Owner plus one lock per provider, all idle again.
        assert_eq!(d.prune_locks(), 3);
        assert_eq!(d.prune_locks(), 0);

        let check = json!({
            "op": "check_conflict",
            "owner_id": owner,
            "provider_id": provider,
            "start_time": "2025-03-03T09:30:00Z",
            "end_time": "2025-03-03T10:00:00Z",
        });
        let out = parse(&d.handle_line(&check.to_string()).await);
        assert_eq!(out["ok"]["has_conflict"], true);
        assert_eq!(out["ok"]["conflicts"][0]["type"], "provider_appointment");
        assert_eq!(out["ok"]["suggestions"].as_array().unwrap().len(), 3);

        let pack = json!({ "op": "pack_day", "owner_id": owner, "date": "2025-03-03" });
        let out = parse(&d.handle_line(&pack.to_string()).await);
        let lanes = out["ok"].as_array().unwrap();
        assert_eq!(lanes.len(), 2);
        assert!(lanes.iter().all(|l| l["total_lanes"] == 2));
    }

    #[tokio::test]
    async fn available_slots_uses_request_hours() {
        let d = dispatcher();
        let owner = Ulid::new();
        let line = json!({
            "op": "available_slots",
            "owner_id": owner,
            "date": "2025-03-03",
            "duration_minutes": 30,
            "working_hours": { "start": "09:00", "end": "10:00" },
        });
        let out = parse(&d.handle_line(&line.to_string()).await);
        let slots = out["ok"].as_array().unwrap();
        // 09:00, 09:15, 09:30; 09:45 would end past 10:00.
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|s| s["available"] == true));

        let bad = json!({
            "op": "available_slots",
            "owner_id": owner,
            "date": "2025-03-03",
            "working_hours": { "start": "nine", "end": "10:00" },
        });
        let out = parse(&d.handle_line(&bad.to_string()).await);
        assert!(out["error"].as_str().unwrap().contains("HH:MM"));
    }

    #[tokio::test]
    async fn is_slot_available_and_plan_recurring() {
        let d = dispatcher();
        let owner = Ulid::new();
        let provider = Ulid::new();
        d.store().insert_appointment(Appointment {
            id: Ulid::new(),
            owner_id: owner,
            provider_id: Some(provider),
            resource_id: None,
            client_id: None,
            service_id: Ulid::new(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 10, 11, 0, 0).unwrap(),
            status: AppointmentStatus::Scheduled,
            notes: None,
            recurrence_group_id: None,
        });

        let free = json!({
            "op": "is_slot_available",
            "owner_id": owner,
            "scope": { "kind": "provider", "id": provider },
            "start_time": "2025-03-03T10:00:00Z",
            "end_time": "2025-03-03T11:00:00Z",
        });
        assert_eq!(parse(&d.handle_line(&free.to_string()).await)["ok"], true);

        let plan = json!({
            "op": "plan_recurring",
            "owner_id": owner,
            "provider_id": provider,
            "start_time": "2025-03-03T10:00:00Z",
            "end_time": "2025-03-03T11:00:00Z",
            "recurrence": { "frequency": "weekly", "interval": 1, "count": 3 },
        });
        let out = parse(&d.handle_line(&plan.to_string()).await);
        assert_eq!(out["ok"]["bookable"].as_array().unwrap().len(), 2);
        assert_eq!(out["ok"]["conflicting"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn far_future_dates_are_rejected_not_fatal() {
        let d = dispatcher();
        let owner = Ulid::new();

        let pack = json!({ "op": "pack_day", "owner_id": owner, "date": "+262142-12-31" });
        let out = parse(&d.handle_line(&pack.to_string()).await);
        assert_eq!(out["error"], "invalid request: date out of range");

        let check = json!({
            "op": "is_slot_available",
            "owner_id": owner,
            "scope": { "kind": "global" },
            "start_time": "+262142-12-31T10:00:00Z",
            "end_time": "+262142-12-31T11:00:00Z",
        });
        let out = parse(&d.handle_line(&check.to_string()).await);
        assert_eq!(out["error"], "invalid request: date out of range");

        // The loop keeps serving after a rejected line.
        let pack = json!({ "op": "pack_day", "owner_id": owner, "date": "2025-03-03" });
        let out = parse(&d.handle_line(&pack.to_string()).await);
        assert!(out["ok"].as_array().unwrap().is_empty());
    }
}
