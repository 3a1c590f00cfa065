use chrono::{DateTime, TimeZone};

use crate::model::Span;

/// Half-open overlap test: `[start_a, end_a)` and `[start_b, end_b)` share an instant.
///
/// Touching intervals do not overlap. An interval with `start >= end` never
/// overlaps anything: the anomaly is logged and counted, and the caller sees
/// `false` (fail open).
pub fn overlaps<Tz: TimeZone>(
    start_a: DateTime<Tz>,
    end_a: DateTime<Tz>,
    start_b: DateTime<Tz>,
    end_b: DateTime<Tz>,
) -> bool {
    if start_a >= end_a || start_b >= end_b {
        tracing::warn!(
            "invalid interval in overlap check: [{}, {}) vs [{}, {})",
            start_a.naive_utc(),
            end_a.naive_utc(),
            start_b.naive_utc(),
            end_b.naive_utc()
        );
        metrics::counter!(crate::observability::INVALID_INTERVALS_TOTAL).increment(1);
        return false;
    }
    start_a < end_b && end_a > start_b
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Drop invalid spans (logging each), then sort and merge the rest.
pub fn busy_spans(spans: impl IntoIterator<Item = Span>) -> Vec<Span> {
    let mut valid: Vec<Span> = spans
        .into_iter()
        .filter(|s| {
            if s.is_valid() {
                return true;
            }
            tracing::warn!("skipping invalid busy interval [{}, {})", s.start, s.end);
            metrics::counter!(crate::observability::INVALID_INTERVALS_TOTAL).increment(1);
            false
        })
        .collect();
    valid.sort_by_key(|s| s.start);
    merge_overlapping(&valid)
}

/// Whether `candidate` overlaps any of `busy` (sorted, disjoint).
pub fn overlaps_any(busy: &[Span], candidate: &Span) -> bool {
    // Everything at index >= right_bound starts at or after candidate.end → can't overlap.
    let right_bound = busy.partition_point(|b| b.start < candidate.end);
    busy[..right_bound]
        .last()
        .is_some_and(|b| overlaps(b.start, b.end, candidate.start, candidate.end))
}
