//! Hard caps on request shape. These bound work per call; tunable defaults live in `config`.

/// Widest window a single slot or existence query may cover.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 31;

/// Upper bound on `days_ahead` for suggested slots.
pub const MAX_DAYS_AHEAD: u32 = 90;

/// Upper bound on occurrences expanded from one recurrence rule.
pub const MAX_RECURRENCE_COUNT: u32 = 366;

/// Occurrence cap for a rule that sets no `count`.
pub const DEFAULT_RECURRENCE_COUNT: u32 = 52;

/// Longest service duration accepted by the slot generator.
pub const MAX_SERVICE_MINUTES: i64 = 24 * 60;

/// Upper bound on records of each kind in a loaded snapshot.
pub const MAX_SNAPSHOT_RECORDS: usize = 1_000_000;

/// Longest accepted JSON command line (bytes).
pub const MAX_COMMAND_LEN: usize = 1 << 20;
