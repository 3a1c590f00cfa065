use chrono::{Days, NaiveDate};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::repository::Repository;

use super::interval::{busy_spans, overlaps_any};
use super::scope::{appointment_in_scope, in_scope};
use super::{provider_hours, Scheduler, SchedulerError};

impl<R: Repository> Scheduler<R> {
    /// Fixed-cadence slots across one working day, each labelled available or not.
    ///
    /// Slots start every `slot_step` from `hours.start`; a slot whose end would
    /// pass `hours.end` is omitted. Appointments and blocked times are fetched
    /// once for the whole day.
    pub async fn available_slots(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        date: NaiveDate,
        duration_minutes: i64,
        hours: WorkingHours,
    ) -> Result<Vec<TimeSlot>, SchedulerError> {
        if duration_minutes <= 0 {
            return Err(SchedulerError::InvalidRequest("duration must be positive"));
        }
        if duration_minutes > MAX_SERVICE_MINUTES {
            return Err(SchedulerError::LimitExceeded("service duration too long"));
        }

        let day_start = self.at_local(date, hours.start)?;
        let day_end = self.at_local(date, hours.end)?;
        let mut slots = Vec::new();
        if day_start >= day_end {
            return Ok(slots);
        }

        let busy = self.busy_for(owner_id, target, Span::new(day_start, day_end)).await?;
        let duration = chrono::Duration::minutes(duration_minutes);

        let mut slot_start = day_start;
        while slot_start < day_end {
            let Some(slot_end) = slot_start.checked_add_signed(duration) else { break };
            if slot_end <= day_end {
                slots.push(TimeSlot {
                    start: slot_start,
                    end: slot_end,
                    available: !overlaps_any(&busy, &Span::new(slot_start, slot_end)),
                });
            }
            let Some(next) = slot_start.checked_add_signed(self.config.slot_step) else { break };
            slot_start = next;
        }

        Ok(slots)
    }

    /// First few open slots on each of the next days, stopping after enough days with room.
    ///
    /// For a provider target, the provider's own hours for a weekday replace
    /// `hours` on that day, so every returned slot also passes the
    /// working-hours phase of a conflict check.
    pub async fn suggested_slots(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        from: NaiveDate,
        duration_minutes: i64,
        days_ahead: Option<u32>,
        hours: Option<WorkingHours>,
    ) -> Result<Vec<DaySlots>, SchedulerError> {
        let days_ahead = days_ahead.unwrap_or(self.config.days_ahead);
        if days_ahead > MAX_DAYS_AHEAD {
            return Err(SchedulerError::LimitExceeded("days_ahead too large"));
        }
        let default_hours = hours.unwrap_or(self.config.working_hours);
        let provider = match target.provider_id {
            Some(pid) => self.repo.get_provider(pid).await?,
            None => None,
        };

        let mut result = Vec::new();
        for offset in 0..days_ahead {
            let Some(date) = from.checked_add_days(Days::new(offset as u64)) else {
                break;
            };
            let day_hours = provider
                .as_ref()
                .and_then(|p| provider_hours(p, date))
                .and_then(|(_, parsed)| parsed)
                .unwrap_or(default_hours);

            let open: Vec<TimeSlot> = self
                .available_slots(owner_id, target, date, duration_minutes, day_hours)
                .await?
                .into_iter()
                .filter(|s| s.available)
                .take(self.config.slots_per_day)
                .collect();

            if !open.is_empty() {
                result.push(DaySlots { date, slots: open });
            }
            if result.len() >= self.config.suggested_days {
                break;
            }
        }

        Ok(result)
    }

    /// Merged busy spans for every scope of the target within `window`.
    async fn busy_for(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        window: Span,
    ) -> Result<Vec<Span>, SchedulerError> {
        let mut spans = Vec::new();
        for scope in target.scopes() {
            let (appointments, blocked) = futures::try_join!(
                self.repo.find_scheduled_appointments(owner_id, scope, window),
                self.repo.find_blocked_times(owner_id, scope),
            )?;
            spans.extend(
                appointments
                    .iter()
                    .filter(|a| appointment_in_scope(a, &scope))
                    .map(Appointment::span),
            );
            spans.extend(
                blocked
                    .iter()
                    .filter(|b| in_scope(b, &scope))
                    .map(BlockedTime::span),
            );
        }
        Ok(busy_spans(spans))
    }
}
