use std::collections::HashMap;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::repository::Repository;

use super::scope::appointment_in_scope;
use super::{overlaps, Scheduler, SchedulerError};

impl<R: Repository> Scheduler<R> {
    /// Cheap yes/no check for the booking write path.
    ///
    /// Looks only at the local calendar day(s) the candidate touches plus a
    /// one-day lookback for appointments that start earlier and run into the
    /// window. No working-hours check and no conflict detail.
    pub async fn is_slot_available(
        &self,
        owner_id: Ulid,
        scope: Scope,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<bool, SchedulerError> {
        if start >= end {
            // Same fail-open policy as the predicate: nothing overlaps an invalid interval.
            tracing::warn!("availability check on invalid interval [{start}, {end})");
            metrics::counter!(crate::observability::INVALID_INTERVALS_TOTAL).increment(1);
            return Ok(true);
        }

        let window_start = self.local_day(self.local_date(start))?.start;
        // Inclusive end of the last local day touched.
        let window_end = self.local_day(self.local_date(end))?.end - chrono::Duration::milliseconds(1);
        if window_end - window_start > chrono::Duration::days(MAX_QUERY_WINDOW_DAYS) {
            return Err(SchedulerError::LimitExceeded("query window too wide"));
        }
        let lookback_start = window_start
            .checked_sub_signed(chrono::Duration::days(1))
            .ok_or(SchedulerError::InvalidRequest("date out of range"))?;

        let (same_day, earlier) = futures::try_join!(
            self.repo
                .find_scheduled_appointments(owner_id, scope, Span::new(window_start, window_end)),
            self.repo
                .find_scheduled_appointments(owner_id, scope, Span::new(lookback_start, window_start)),
        )?;

        // Keyed by (start, end): two bookings with identical times block the same instants.
        let mut unique: HashMap<(Timestamp, Timestamp), Appointment> = HashMap::new();
        let in_window = same_day
            .into_iter()
            .filter(|a| a.start_time >= window_start && a.start_time <= window_end);
        let spilling_in = earlier.into_iter().filter(|a| {
            a.start_time >= lookback_start && a.start_time < window_start && a.end_time >= window_start
        });
        for appointment in in_window.chain(spilling_in) {
            unique.insert((appointment.start_time, appointment.end_time), appointment);
        }

        for appointment in unique.values() {
            if appointment_in_scope(appointment, &scope)
                && overlaps(start, end, appointment.start_time, appointment.end_time)
            {
                return Ok(false);
            }
        }

        for blocked in self.scoped_blocked_times(owner_id, scope).await? {
            if overlaps(start, end, blocked.start_time, blocked.end_time) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
