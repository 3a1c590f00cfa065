use ulid::Ulid;

use crate::model::*;
use crate::repository::Repository;

use super::{Scheduler, SchedulerError};

impl<R: Repository> Scheduler<R> {
    /// Scan forward from the end of a rejected candidate for free slots of the same length.
    ///
    /// Candidates start at `end` and advance by `slot_step` whether or not
    /// they were free. The scan stops after `suggestion_limit` hits or once
    /// it has moved more than `suggestion_horizon` past the original start.
    pub(super) async fn suggest_alternatives(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        start: Timestamp,
        end: Timestamp,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Span>, SchedulerError> {
        let duration = end - start;
        let mut suggestions = Vec::new();
        if duration <= chrono::Duration::zero() {
            tracing::debug!("no suggestions for empty or inverted interval [{start}, {end})");
            return Ok(suggestions);
        }

        let step = self.config.slot_step;
        let limit = self.config.suggestion_limit;
        let horizon = self.config.suggestion_horizon;

        let mut search_start = end;
        while suggestions.len() < limit {
            let Some(search_end) = search_start.checked_add_signed(duration) else { break };
            metrics::counter!(crate::observability::SUGGESTION_PROBES_TOTAL).increment(1);
            if !self
                .probe(owner_id, target, search_start, search_end, exclude)
                .await?
            {
                suggestions.push(Span::new(search_start, search_end));
            }

            let Some(next) = search_start.checked_add_signed(step) else { break };
            search_start = next;
            if search_start - start > horizon {
                break;
            }
        }

        Ok(suggestions)
    }
}
