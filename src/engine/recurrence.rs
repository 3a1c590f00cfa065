use chrono::{Days, FixedOffset, Months, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::repository::Repository;

use super::{Scheduler, SchedulerError};

/// Materialise the occurrences of a recurring booking or block.
///
/// The first occurrence is `[start, end)` itself. Later ones are computed
/// from the original start (`k * interval` days / weeks / months), so month
/// clamping on short months does not drift the series: Jan 31 monthly gives
/// Feb 28, Mar 31, Apr 30. Generation stops at `count` occurrences (default
/// 52) or after the local `end_date`, whichever comes first.
pub fn expand_recurrence(
    start: Timestamp,
    end: Timestamp,
    rule: &RecurrenceRule,
    offset: FixedOffset,
) -> Result<Vec<Span>, SchedulerError> {
    if start >= end {
        return Err(SchedulerError::InvalidInterval { start, end });
    }
    if rule.interval == 0 {
        return Err(SchedulerError::InvalidRequest("recurrence interval must be at least 1"));
    }
    let count = rule
        .count
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_RECURRENCE_COUNT);
    if count > MAX_RECURRENCE_COUNT {
        return Err(SchedulerError::LimitExceeded("too many recurrence occurrences"));
    }

    let duration = end - start;
    let local_start = start.with_timezone(&offset);
    let mut occurrences = Vec::with_capacity(count as usize);

    for k in 0..count {
        let Some(step) = k.checked_mul(rule.interval) else { break };
        let next = match rule.frequency {
            Frequency::Daily => local_start.checked_add_days(Days::new(step as u64)),
            Frequency::Weekly => local_start.checked_add_days(Days::new(step as u64 * 7)),
            Frequency::Monthly => local_start.checked_add_months(Months::new(step)),
        };
        let Some(next) = next else { break };
        if let Some(end_date) = rule.end_date
            && next.date_naive() > end_date {
                break;
            }
        let occurrence_start = next.with_timezone(&Utc);
        let Some(occurrence_end) = occurrence_start.checked_add_signed(duration) else { break };
        occurrences.push(Span::new(occurrence_start, occurrence_end));
    }

    Ok(occurrences)
}

impl<R: Repository> Scheduler<R> {
    /// Check every occurrence of a recurring booking. Conflicting ones are
    /// reported and left out; the rest can be written as one series.
    pub async fn plan_recurring(
        &self,
        owner_id: Ulid,
        target: BookingTarget,
        start: Timestamp,
        end: Timestamp,
        rule: &RecurrenceRule,
    ) -> Result<RecurringPlan, SchedulerError> {
        let mut plan = RecurringPlan::default();
        for occurrence in expand_recurrence(start, end, rule, self.config.utc_offset)? {
            let check = self
                .check_conflict_only(owner_id, target, occurrence.start, occurrence.end, None)
                .await?;
            if check.has_conflict {
                plan.conflicting.push((occurrence, check.conflicts));
            } else {
                plan.bookable.push(occurrence);
            }
        }
        tracing::debug!(
            "recurring plan: {} bookable, {} conflicting",
            plan.bookable.len(),
            plan.conflicting.len()
        );
        Ok(plan)
    }
}
