//! Side-by-side placement of concurrent appointments for calendar rendering.
//!
//! Appointments are grouped into connected components of the overlap graph;
//! within a group each one takes the first lane that is free for its whole
//! interval. Lane numbers never leak across groups. Output has no bearing on
//! booking correctness.

use std::collections::BTreeMap;

use chrono::{FixedOffset, NaiveDate};

use crate::model::{Appointment, LaneAssignment};

/// Assign a lane to every appointment of one calendar day.
///
/// Output follows the `(start, end)` order of the input.
pub fn pack_day(appointments: &[Appointment]) -> Vec<LaneAssignment> {
    let mut order: Vec<&Appointment> = appointments.iter().collect();
    order.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then(a.end_time.cmp(&b.end_time))
            .then(a.id.cmp(&b.id))
    });

    let mut placed: Vec<Option<LaneAssignment>> = vec![None; order.len()];
    for group in overlap_groups(&order) {
        let lanes = assign_lanes(&order, &group);
        let total_lanes = lanes.iter().map(|&(_, lane)| lane + 1).max().unwrap_or(0);
        for (idx, lane_index) in lanes {
            placed[idx] = Some(LaneAssignment {
                appointment_id: order[idx].id,
                lane_index,
                total_lanes,
            });
        }
    }

    placed.into_iter().flatten().collect()
}

/// Bucket appointments by the local date they start on and pack each day on its own.
pub fn pack_days(
    appointments: &[Appointment],
    offset: FixedOffset,
) -> BTreeMap<NaiveDate, Vec<LaneAssignment>> {
    let mut days: BTreeMap<NaiveDate, Vec<Appointment>> = BTreeMap::new();
    for appointment in appointments {
        let date = appointment.start_time.with_timezone(&offset).date_naive();
        days.entry(date).or_default().push(appointment.clone());
    }
    days.into_iter()
        .map(|(date, day)| (date, pack_day(&day)))
        .collect()
}

/// Connected components over sorted indices, each returned in ascending (sorted) order.
///
/// Worklist traversal: pop, add to the group, enqueue every unprocessed
/// appointment overlapping it. Items are marked when enqueued so nothing is
/// pushed twice.
fn overlap_groups(order: &[&Appointment]) -> Vec<Vec<usize>> {
    let mut processed = vec![false; order.len()];
    let mut groups = Vec::new();

    for seed in 0..order.len() {
        if processed[seed] {
            continue;
        }
        processed[seed] = true;
        let mut group = Vec::new();
        let mut worklist = vec![seed];

        while let Some(current) = worklist.pop() {
            group.push(current);
            let span = order[current].span();
            for (other, appointment) in order.iter().enumerate() {
                if !processed[other] && span.overlaps(&appointment.span()) {
                    processed[other] = true;
                    worklist.push(other);
                }
            }
        }

        group.sort_unstable();
        groups.push(group);
    }

    groups
}

/// Greedy first-fit lanes for one group, visited in sorted order. Returns `(index, lane)`.
fn assign_lanes(order: &[&Appointment], group: &[usize]) -> Vec<(usize, usize)> {
    let mut lanes: Vec<Vec<usize>> = Vec::new();
    let mut result = Vec::with_capacity(group.len());

    for &idx in group {
        let span = order[idx].span();
        let free = lanes
            .iter()
            .position(|lane| lane.iter().all(|&m| !order[m].span().overlaps(&span)));
        let lane_index = match free {
            Some(lane) => lane,
            None => {
                lanes.push(Vec::new());
                lanes.len() - 1
            }
        };
        lanes[lane_index].push(idx);
        result.push((idx, lane_index));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use ulid::Ulid;

    use crate::model::AppointmentStatus;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, h, m, 0).unwrap()
    }

    fn apt(start: DateTime<Utc>, end: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Ulid::new(),
            owner_id: Ulid::nil(),
            provider_id: None,
            resource_id: None,
            client_id: None,
            service_id: Ulid::nil(),
            start_time: start,
            end_time: end,
            status: AppointmentStatus::Scheduled,
            notes: None,
            recurrence_group_id: None,
        }
    }

    fn lane_of(out: &[LaneAssignment], id: Ulid) -> LaneAssignment {
        *out.iter().find(|l| l.appointment_id == id).unwrap()
    }

    #[test]
    fn empty_day() {
        assert!(pack_day(&[]).is_empty());
    }

    #[test]
    fn single_appointment_full_width() {
        let a = apt(at(3, 9, 0), at(3, 10, 0));
        let out = pack_day(std::slice::from_ref(&a));
        assert_eq!(out, vec![LaneAssignment { appointment_id: a.id, lane_index: 0, total_lanes: 1 }]);
        assert_eq!(out[0].width_percent(), 100.0);
    }

    #[test]
    fn chain_forms_one_group_with_two_lanes() {
        let a = apt(at(3, 9, 0), at(3, 10, 0));
        let b = apt(at(3, 9, 30), at(3, 10, 30));
        let c = apt(at(3, 10, 15), at(3, 11, 0));
        // Input order should not matter.
        let out = pack_day(&[c.clone(), a.clone(), b.clone()]);

        assert_eq!(lane_of(&out, a.id).lane_index, 0);
        assert_eq!(lane_of(&out, b.id).lane_index, 1);
        assert_eq!(lane_of(&out, c.id).lane_index, 0);
        assert!(out.iter().all(|l| l.total_lanes == 2));
        assert_eq!(out.iter().map(|l| l.appointment_id).collect::<Vec<_>>(), vec![a.id, b.id, c.id]);
    }

    #[test]
    fn disjoint_groups_number_lanes_independently() {
        let a = apt(at(3, 9, 0), at(3, 10, 0));
        let b = apt(at(3, 9, 0), at(3, 10, 0));
        let c = apt(at(3, 9, 0), at(3, 10, 0));
        let d = apt(at(3, 14, 0), at(3, 15, 0));
        let out = pack_day(&[a.clone(), b.clone(), c.clone(), d.clone()]);

        assert_eq!(lane_of(&out, d.id), LaneAssignment { appointment_id: d.id, lane_index: 0, total_lanes: 1 });
        let mut lanes: Vec<usize> = [a.id, b.id, c.id].iter().map(|id| lane_of(&out, *id).lane_index).collect();
        lanes.sort();
        assert_eq!(lanes, vec![0, 1, 2]);
        assert!([a.id, b.id, c.id].iter().all(|id| lane_of(&out, *id).total_lanes == 3));
    }

    #[test]
    fn touching_appointments_share_a_lane() {
        let a = apt(at(3, 9, 0), at(3, 10, 0));
        let b = apt(at(3, 10, 0), at(3, 11, 0));
        let out = pack_day(&[a.clone(), b.clone()]);
        assert_eq!(lane_of(&out, a.id).total_lanes, 1);
        assert_eq!(lane_of(&out, b.id).total_lanes, 1);
    }

    #[test]
    fn lane_is_reused_once_free() {
        // a and b overlap; c overlaps b only and d overlaps c only.
        let a = apt(at(3, 9, 0), at(3, 10, 0));
        let b = apt(at(3, 9, 0), at(3, 11, 0));
        let c = apt(at(3, 10, 30), at(3, 12, 0));
        let d = apt(at(3, 11, 30), at(3, 12, 30));
        let out = pack_day(&[a.clone(), b.clone(), c.clone(), d.clone()]);
        assert_eq!(lane_of(&out, a.id).lane_index, 0);
        assert_eq!(lane_of(&out, b.id).lane_index, 1);
        assert_eq!(lane_of(&out, c.id).lane_index, 0);
        assert_eq!(lane_of(&out, d.id).lane_index, 1);
        assert!(out.iter().all(|l| l.total_lanes == 2));
    }

    #[test]
    fn invalid_interval_sits_alone() {
        let good = apt(at(3, 9, 0), at(3, 10, 0));
        let bad = apt(at(3, 9, 30), at(3, 9, 0));
        let out = pack_day(&[good.clone(), bad.clone()]);
        assert_eq!(lane_of(&out, good.id).total_lanes, 1);
        assert_eq!(lane_of(&out, bad.id).total_lanes, 1);
    }

    #[test]
    fn overlapping_pairs_never_share_a_lane() {
        // Deterministic pseudo-random day: 60 appointments between 08:00 and 18:00.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: u64| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed % bound
        };
        let base = at(3, 8, 0);
        let appointments: Vec<Appointment> = (0..60)
            .map(|_| {
                let start = base + chrono::Duration::minutes((next(40) * 15) as i64);
                let end = start + chrono::Duration::minutes(((next(8) + 1) * 15) as i64);
                apt(start, end)
            })
            .collect();

        let out = pack_day(&appointments);
        assert_eq!(out.len(), appointments.len());
        for (i, a) in appointments.iter().enumerate() {
            let la = lane_of(&out, a.id);
            assert!(la.lane_index < la.total_lanes);
            for b in &appointments[i + 1..] {
                if a.span().overlaps(&b.span()) {
                    let lb = lane_of(&out, b.id);
                    assert_ne!(la.lane_index, lb.lane_index);
                    assert_eq!(la.total_lanes, lb.total_lanes);
                }
            }
        }
    }

    #[test]
    fn pack_days_keeps_days_apart() {
        let monday = apt(at(3, 9, 0), at(3, 10, 0));
        let tuesday = apt(at(4, 9, 0), at(4, 10, 0));
        let offset = FixedOffset::east_opt(0).unwrap();
        let days = pack_days(&[monday.clone(), tuesday.clone()], offset);
        assert_eq!(days.len(), 2);
        for lanes in days.values() {
            assert_eq!(lanes.len(), 1);
            assert_eq!(lanes[0].total_lanes, 1);
        }
        assert_eq!(days[&NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()][0].appointment_id, tuesday.id);
    }
}
