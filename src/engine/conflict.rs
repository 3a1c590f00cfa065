use tracing::{debug, warn};
use ulid::Ulid;

use crate::model::*;
use crate::repository::Repository;

use super::scope::appointment_in_scope;
use super::{overlaps, provider_hours, Scheduler, SchedulerError};

impl<R: Repository> Scheduler<R> {
    /// Full conflict check for a candidate booking.
    ///
    /// When anything conflicts, the result also carries up to
    /// `suggestion_limit` alternative slots of the same duration.
    /// `exclude` skips one appointment id so a reschedule does not collide
    /// with its own current booking.
    pub async fn check_conflict(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        start: Timestamp,
        end: Timestamp,
        exclude: Option<Ulid>,
    ) -> Result<ConflictCheck, SchedulerError> {
        let mut check = self
            .check_conflict_only(owner_id, target, start, end, exclude)
            .await?;
        if check.has_conflict {
            check.suggestions = self
                .suggest_alternatives(owner_id, target, start, end, exclude)
                .await?;
        }
        Ok(check)
    }

    /// Conflict check without suggestion search.
    pub async fn check_conflict_only(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        start: Timestamp,
        end: Timestamp,
        exclude: Option<Ulid>,
    ) -> Result<ConflictCheck, SchedulerError> {
        let conflicts = self
            .collect_conflicts(owner_id, target, start, end, exclude)
            .await?;
        let outcome = if conflicts.is_empty() { "clear" } else { "conflict" };
        metrics::counter!(crate::observability::CONFLICT_CHECKS_TOTAL, "outcome" => outcome)
            .increment(1);
        for c in &conflicts {
            metrics::counter!(crate::observability::CONFLICTS_FOUND_TOTAL, "type" => c.kind())
                .increment(1);
        }
        Ok(ConflictCheck::from_conflicts(conflicts))
    }

    /// Boolean-only check used while probing candidate slots. Never searches for suggestions.
    pub(crate) async fn probe(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        start: Timestamp,
        end: Timestamp,
        exclude: Option<Ulid>,
    ) -> Result<bool, SchedulerError> {
        let conflicts = self
            .collect_conflicts(owner_id, target, start, end, exclude)
            .await?;
        Ok(!conflicts.is_empty())
    }

    async fn collect_conflicts(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        start: Timestamp,
        end: Timestamp,
        exclude: Option<Ulid>,
    ) -> Result<Vec<ConflictRecord>, SchedulerError> {
        let candidate = Span::new(start, end);
        let mut conflicts = Vec::new();

        for scope in target.scopes() {
            self.appointment_conflicts(owner_id, scope, &candidate, exclude, &mut conflicts)
                .await?;
            self.blocked_time_conflicts(owner_id, scope, &candidate, &mut conflicts)
                .await?;
            if let Scope::Provider(provider_id) = scope {
                self.working_hours_conflict(provider_id, &candidate, &mut conflicts)
                    .await?;
            }
        }

        debug!(
            "conflict check [{}, {}) for {:?}: {} conflict(s)",
            start,
            end,
            target,
            conflicts.len()
        );
        Ok(conflicts)
    }

    async fn appointment_conflicts(
        &self,
        owner_id: Ulid,
        scope: Scope,
        candidate: &Span,
        exclude: Option<Ulid>,
        out: &mut Vec<ConflictRecord>,
    ) -> Result<(), SchedulerError> {
        // The repository pre-filter is inclusive at both ends; the exact
        // half-open predicate below drops touching neighbours.
        let competing = self
            .repo
            .find_scheduled_appointments(owner_id, scope, *candidate)
            .await?;

        for appointment in competing {
            if exclude == Some(appointment.id) || !appointment_in_scope(&appointment, &scope) {
                continue;
            }
            if !overlaps(candidate.start, candidate.end, appointment.start_time, appointment.end_time) {
                continue;
            }
            out.push(match scope {
                Scope::Resource(_) => ConflictRecord::ResourceAppointment { appointment },
                Scope::Global | Scope::Provider(_) => {
                    ConflictRecord::ProviderAppointment { appointment }
                }
            });
        }
        Ok(())
    }

    async fn blocked_time_conflicts(
        &self,
        owner_id: Ulid,
        scope: Scope,
        candidate: &Span,
        out: &mut Vec<ConflictRecord>,
    ) -> Result<(), SchedulerError> {
        for blocked_time in self.scoped_blocked_times(owner_id, scope).await? {
            if overlaps(candidate.start, candidate.end, blocked_time.start_time, blocked_time.end_time) {
                out.push(ConflictRecord::BlockedTime { blocked_time });
            }
        }
        Ok(())
    }

    /// Flags a candidate not fully inside the provider's hours for the weekday of its start.
    /// Breaks are not consulted. No provider or no entry for the day means unconstrained.
    async fn working_hours_conflict(
        &self,
        provider_id: Ulid,
        candidate: &Span,
        out: &mut Vec<ConflictRecord>,
    ) -> Result<(), SchedulerError> {
        let Some(provider) = self.repo.get_provider(provider_id).await? else {
            return Ok(());
        };
        let date = self.local_date(candidate.start);
        let Some((working_day, hours)) = provider_hours(&provider, date) else {
            return Ok(());
        };
        let Some(hours) = hours else {
            warn!(
                "provider {provider_id} has unparsable working hours {}-{}, skipping hours check",
                working_day.start, working_day.end
            );
            return Ok(());
        };

        let working = Span::new(self.at_local(date, hours.start)?, self.at_local(date, hours.end)?);
        if !working.contains_span(candidate) {
            out.push(ConflictRecord::OutsideWorkingHours {
                working_day: working_day.clone(),
            });
        }
        Ok(())
    }
}
