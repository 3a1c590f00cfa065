mod availability;
mod conflict;
mod error;
mod existence;
mod interval;
mod recurrence;
mod scope;
mod suggest;

pub use error::SchedulerError;
pub use interval::{busy_spans, merge_overlapping, overlaps, overlaps_any};
pub use recurrence::expand_recurrence;
pub use scope::{appointment_in_scope, in_scope};

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use ulid::Ulid;

use crate::config::SchedulerConfig;
use crate::model::*;
use crate::repository::Repository;

/// Stateless scheduling engine over a read-only repository handle.
///
/// Every operation fetches what it needs at call time; nothing is cached
/// between calls, so clones can be used freely from concurrent tasks.
pub struct Scheduler<R> {
    repo: Arc<R>,
    config: Arc<SchedulerConfig>,
}

impl<R> Clone for Scheduler<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R: Repository> Scheduler<R> {
    pub fn new(repo: Arc<R>, config: Arc<SchedulerConfig>) -> Self {
        Self { repo, config }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Blocked times of the owner that apply to `scope`, re-filtered locally.
    pub(super) async fn scoped_blocked_times(
        &self,
        owner_id: Ulid,
        scope: Scope,
    ) -> Result<Vec<BlockedTime>, SchedulerError> {
        let mut blocked = self.repo.find_blocked_times(owner_id, scope).await?;
        blocked.retain(|b| in_scope(b, &scope));
        Ok(blocked)
    }

    /// UTC instant of a wall-clock time on a local calendar day.
    pub(super) fn at_local(&self, date: NaiveDate, time: NaiveTime) -> Result<Timestamp, SchedulerError> {
        let offset = chrono::Duration::seconds(self.config.utc_offset.local_minus_utc() as i64);
        date.and_time(time)
            .checked_sub_signed(offset)
            .map(|local| local.and_utc())
            .ok_or(SchedulerError::InvalidRequest("date out of range"))
    }

    pub(super) fn local_date(&self, ts: Timestamp) -> NaiveDate {
        ts.with_timezone(&self.config.utc_offset).date_naive()
    }

    /// `[00:00, next day 00:00)` of a local calendar day, in UTC.
    pub(super) fn local_day(&self, date: NaiveDate) -> Result<Span, SchedulerError> {
        let start = self.at_local(date, NaiveTime::MIN)?;
        let end = start
            .checked_add_signed(chrono::Duration::days(1))
            .ok_or(SchedulerError::InvalidRequest("date out of range"))?;
        Ok(Span::new(start, end))
    }
}

/// Key used for a weekday in `Provider::working_hours`.
pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// The provider's parsed hours for a local date, if it has a usable entry.
pub(crate) fn provider_hours(provider: &Provider, date: NaiveDate) -> Option<(&WorkingDay, Option<WorkingHours>)> {
    let day = provider.working_hours.get(weekday_key(date.weekday()))?;
    Some((day, WorkingHours::parse(day)))
}
