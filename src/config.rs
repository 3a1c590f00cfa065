use chrono::{Duration, FixedOffset, NaiveTime, Offset, Utc};

use crate::model::WorkingHours;

/// Engine tunables. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Cadence of both slot enumeration and suggestion search.
    pub slot_step: Duration,
    /// Suggestions returned by a failed conflict check.
    pub suggestion_limit: usize,
    /// How far past the original start the suggestion search may advance.
    pub suggestion_horizon: Duration,
    /// Default day count for suggested slots.
    pub days_ahead: u32,
    /// Available slots kept per day by suggested slots.
    pub slots_per_day: usize,
    /// Days with availability after which suggested slots stops.
    pub suggested_days: usize,
    /// Used when neither the request nor the provider supplies hours.
    pub working_hours: WorkingHours,
    pub default_service_minutes: i64,
    /// Offset used for calendar days, weekdays and `HH:MM` wall-clock times.
    pub utc_offset: FixedOffset,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slot_step: Duration::minutes(15),
            suggestion_limit: 3,
            suggestion_horizon: Duration::days(7),
            days_ahead: 7,
            slots_per_day: 3,
            suggested_days: 3,
            working_hours: WorkingHours::new(hm(9, 0), hm(18, 0)),
            default_service_minutes: 60,
            utc_offset: Utc.fix(),
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("literal time is valid")
}

impl SchedulerConfig {
    /// Read `SLOTWISE_*` variables, falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let positive = |key: &str| -> Option<i64> {
            lookup(key)
                .and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|v| *v > 0)
        };
        let time = |key: &str| -> Option<NaiveTime> {
            lookup(key).and_then(|s| NaiveTime::parse_from_str(s.trim(), "%H:%M").ok())
        };

        let mut working_hours = defaults.working_hours;
        if let Some(start) = time("SLOTWISE_WORK_START") {
            working_hours.start = start;
        }
        if let Some(end) = time("SLOTWISE_WORK_END") {
            working_hours.end = end;
        }
        if working_hours.start >= working_hours.end {
            tracing::warn!(
                "ignoring working hours {}-{}: start must precede end",
                working_hours.start,
                working_hours.end
            );
            working_hours = defaults.working_hours;
        }

        let utc_offset = lookup("SLOTWISE_UTC_OFFSET_MINUTES")
            .and_then(|s| s.trim().parse::<i32>().ok())
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .unwrap_or(defaults.utc_offset);

        Self {
            slot_step: positive("SLOTWISE_SLOT_STEP_MINUTES")
                .and_then(Duration::try_minutes)
                .unwrap_or(defaults.slot_step),
            suggestion_limit: positive("SLOTWISE_SUGGESTION_LIMIT")
                .map(|v| v as usize)
                .unwrap_or(defaults.suggestion_limit),
            suggestion_horizon: positive("SLOTWISE_SUGGESTION_HORIZON_DAYS")
                .and_then(Duration::try_days)
                .unwrap_or(defaults.suggestion_horizon),
            days_ahead: positive("SLOTWISE_DAYS_AHEAD")
                .map(|v| v.min(crate::limits::MAX_DAYS_AHEAD as i64) as u32)
                .unwrap_or(defaults.days_ahead),
            slots_per_day: positive("SLOTWISE_SLOTS_PER_DAY")
                .map(|v| v as usize)
                .unwrap_or(defaults.slots_per_day),
            suggested_days: positive("SLOTWISE_SUGGESTED_DAYS")
                .map(|v| v as usize)
                .unwrap_or(defaults.suggested_days),
            working_hours,
            default_service_minutes: positive("SLOTWISE_DEFAULT_SERVICE_MINUTES")
                .unwrap_or(defaults.default_service_minutes),
            utc_offset,
        }
    }
}
