use std::net::SocketAddr;

use crate::command::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "slotwise_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "slotwise_command_duration_seconds";

// ── Engine metrics ──────────────────────────────────────────────

/// Counter: conflict checks run. Labels: outcome (clear, conflict).
pub const CONFLICT_CHECKS_TOTAL: &str = "slotwise_conflict_checks_total";

/// Counter: conflict records produced. Labels: type.
pub const CONFLICTS_FOUND_TOTAL: &str = "slotwise_conflicts_found_total";

/// Counter: candidate slots probed by suggestion search.
pub const SUGGESTION_PROBES_TOTAL: &str = "slotwise_suggestion_probes_total";

/// Counter: intervals with start >= end seen by the overlap predicate.
pub const INVALID_INTERVALS_TOTAL: &str = "slotwise_invalid_intervals_total";

/// Counter: stored records skipped because their timestamps could not be parsed.
pub const RECORDS_SKIPPED_TOTAL: &str = "slotwise_records_skipped_total";

/// Counter: booking attempts through the gate. Labels: outcome (booked, rejected).
pub const BOOKINGS_TOTAL: &str = "slotwise_bookings_total";

/// Histogram: time spent waiting for booking locks in seconds.
pub const BOOKING_LOCK_WAIT_SECONDS: &str = "slotwise_booking_lock_wait_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::CheckConflict { .. } => "check_conflict",
        Command::AvailableSlots { .. } => "available_slots",
        Command::SuggestedSlots { .. } => "suggested_slots",
        Command::IsSlotAvailable { .. } => "is_slot_available",
        Command::PackDay { .. } => "pack_day",
        Command::PlanRecurring { .. } => "plan_recurring",
        Command::Book { .. } => "book",
    }
}
