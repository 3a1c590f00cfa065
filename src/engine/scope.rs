use crate::model::*;

/// Whether a blocked time applies to a phase.
///
/// An unset provider/resource on the block is a wildcard for that dimension,
/// so "all providers" blocks reach every provider query without being copied.
/// Unscoped (global) queries only see blocks with both dimensions unset.
pub fn in_scope(blocked: &BlockedTime, scope: &Scope) -> bool {
    match scope {
        Scope::Global => blocked.is_global(),
        Scope::Provider(pid) => blocked.provider_id.is_none_or(|p| p == *pid),
        Scope::Resource(rid) => blocked.resource_id.is_none_or(|r| r == *rid),
    }
}

/// Whether an appointment competes for time within a phase. Only scheduled ones do.
pub fn appointment_in_scope(appointment: &Appointment, scope: &Scope) -> bool {
    if !appointment.is_scheduled() {
        return false;
    }
    match scope {
        Scope::Global => true,
        Scope::Provider(pid) => appointment.provider_id == Some(*pid),
        Scope::Resource(rid) => appointment.resource_id == Some(*rid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn block(provider_id: Option<Ulid>, resource_id: Option<Ulid>) -> BlockedTime {
        BlockedTime {
            id: Ulid::new(),
            owner_id: Ulid::new(),
            provider_id,
            resource_id,
            start_time: Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 3, 13, 0, 0).unwrap(),
            reason: "lunch".into(),
            recurrence: None,
            recurrence_group_id: None,
        }
    }

    fn appointment(provider_id: Option<Ulid>, resource_id: Option<Ulid>, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Ulid::new(),
            owner_id: Ulid::new(),
            provider_id,
            resource_id,
            client_id: None,
            service_id: Ulid::new(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 3, 11, 0, 0).unwrap(),
            status,
            notes: None,
            recurrence_group_id: None,
        }
    }

    #[test]
    fn global_block_reaches_every_scope() {
        let b = block(None, None);
        assert!(in_scope(&b, &Scope::Global));
        assert!(in_scope(&b, &Scope::Provider(Ulid::new())));
        assert!(in_scope(&b, &Scope::Resource(Ulid::new())));
    }

    #[test]
    fn provider_block_only_matches_its_provider() {
        let p = Ulid::new();
        let b = block(Some(p), None);
        assert!(in_scope(&b, &Scope::Provider(p)));
        assert!(!in_scope(&b, &Scope::Provider(Ulid::new())));
        assert!(!in_scope(&b, &Scope::Global));
        // Resource unset on the block → wildcard for resource queries.
        assert!(in_scope(&b, &Scope::Resource(Ulid::new())));
    }

    #[test]
    fn resource_block_only_matches_its_resource() {
        let r = Ulid::new();
        let b = block(None, Some(r));
        assert!(in_scope(&b, &Scope::Resource(r)));
        assert!(!in_scope(&b, &Scope::Resource(Ulid::new())));
        assert!(!in_scope(&b, &Scope::Global));
        assert!(in_scope(&b, &Scope::Provider(Ulid::new())));
    }

    #[test]
    fn fully_scoped_block_is_not_global() {
        let b = block(Some(Ulid::new()), Some(Ulid::new()));
        assert!(!in_scope(&b, &Scope::Global));
        assert!(!in_scope(&b, &Scope::Provider(Ulid::new())));
        assert!(!in_scope(&b, &Scope::Resource(Ulid::new())));
    }

    #[test]
    fn appointment_scope_rules() {
        let p = Ulid::new();
        let r = Ulid::new();
        let a = appointment(Some(p), Some(r), AppointmentStatus::Scheduled);
        assert!(appointment_in_scope(&a, &Scope::Global));
        assert!(appointment_in_scope(&a, &Scope::Provider(p)));
        assert!(appointment_in_scope(&a, &Scope::Resource(r)));
        assert!(!appointment_in_scope(&a, &Scope::Provider(Ulid::new())));

        let unassigned = appointment(None, None, AppointmentStatus::Scheduled);
        assert!(appointment_in_scope(&unassigned, &Scope::Global));
        assert!(!appointment_in_scope(&unassigned, &Scope::Provider(p)));
    }

    #[test]
    fn only_scheduled_appointments_compete() {
        let p = Ulid::new();
        for status in [AppointmentStatus::Completed, AppointmentStatus::Cancelled, AppointmentStatus::NoShow] {
            let a = appointment(Some(p), None, status);
            assert!(!appointment_in_scope(&a, &Scope::Global));
            assert!(!appointment_in_scope(&a, &Scope::Provider(p)));
        }
    }
}
