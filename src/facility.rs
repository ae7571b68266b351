//! The host's exact alarm service: register a wake request for an instant,
//! cancel it by id. Delivery is best effort.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::{firing_state::Payload, occurrence::OccurrenceId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FacilityError {
    #[error("exact alarms are not permitted")]
    PermissionDenied,
    #[error("too many alarms registered (limit {limit})")]
    QuotaExceeded { limit: usize },
}

pub trait AlarmFacility {
    /// registers a wake request, replacing any request already registered under `id`
    fn register(
        &mut self,
        id: OccurrenceId,
        trigger_at: NaiveDateTime,
        payload: Payload,
    ) -> Result<(), FacilityError>;

    /// removes the wake request registered under `id`, if there is one
    fn cancel(&mut self, id: OccurrenceId);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: OccurrenceId,
    pub trigger_at: NaiveDateTime,
    pub payload: Payload,
}

#[derive(Debug)]
struct TableState {
    entries: BTreeMap<OccurrenceId, Registration>,
    quota: Option<usize>,
    exact_allowed: bool,
}

/// in process alarm facility.
/// clones share one table, so the wake thread can drain what the scheduler registers
#[derive(Debug, Clone)]
pub struct TimerTable {
    state: Arc<Mutex<TableState>>,
}

impl Default for TimerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TableState {
                entries: BTreeMap::new(),
                quota: None,
                exact_allowed: true,
            })),
        }
    }

    /// limits how many requests can be registered at once
    #[must_use]
    pub fn with_quota(self, limit: usize) -> Self {
        self.lock().quota = Some(limit);
        self
    }

    pub fn set_exact_allowed(&self, allowed: bool) {
        self.lock().exact_allowed = allowed;
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// removes and returns every request due at or before `now`, earliest first
    pub fn take_due(&self, now: NaiveDateTime) -> Vec<Registration> {
        let mut state = self.lock();
        let due = state
            .entries
            .values()
            .filter(|registration| registration.trigger_at <= now)
            .map(|registration| registration.id)
            .collect::<Vec<_>>();
        let mut fired = due
            .into_iter()
            .filter_map(|id| state.entries.remove(&id))
            .collect::<Vec<_>>();
        fired.sort_by_key(|registration| registration.trigger_at);
        fired
    }

    /// when the earliest pending request is due
    #[must_use]
    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.lock()
            .entries
            .values()
            .map(|registration| registration.trigger_at)
            .min()
    }

    #[must_use]
    pub fn get(&self, id: OccurrenceId) -> Option<Registration> {
        self.lock().entries.get(&id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlarmFacility for TimerTable {
    fn register(
        &mut self,
        id: OccurrenceId,
        trigger_at: NaiveDateTime,
        payload: Payload,
    ) -> Result<(), FacilityError> {
        let mut state = self.lock();
        if !state.exact_allowed {
            return Err(FacilityError::PermissionDenied);
        }
        if let Some(limit) = state.quota {
            if !state.entries.contains_key(&id) && state.entries.len() >= limit {
                return Err(FacilityError::QuotaExceeded { limit });
            }
        }
        state.entries.insert(
            id,
            Registration {
                id,
                trigger_at,
                payload,
            },
        );
        Ok(())
    }

    fn cancel(&mut self, id: OccurrenceId) {
        self.lock().entries.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Weekday};
    use pretty_assertions::assert_eq;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn payload(text: &str) -> Payload {
        Payload::new(format!("title = \"{text}\"\n"))
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut table = TimerTable::new();
        let id = OccurrenceId::new("alarm", Weekday::Mon);
        table.register(id, at(7), payload("first")).unwrap();
        table.register(id, at(8), payload("second")).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(id).unwrap().trigger_at, at(8));
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let mut table = TimerTable::new();
        table.cancel(OccurrenceId::new("missing", Weekday::Fri));
        assert!(table.is_empty());
    }

    #[test]
    fn test_quota_and_permission() {
        let mut table = TimerTable::new().with_quota(1);
        let monday = OccurrenceId::new("alarm", Weekday::Mon);
        table.register(monday, at(7), payload("a")).unwrap();
        // replacing doesn't count against the quota
        table.register(monday, at(9), payload("a")).unwrap();
        assert_eq!(
            table.register(OccurrenceId::new("alarm", Weekday::Tue), at(7), payload("b")),
            Err(FacilityError::QuotaExceeded { limit: 1 })
        );
        table.set_exact_allowed(false);
        assert_eq!(
            table.register(monday, at(7), payload("a")),
            Err(FacilityError::PermissionDenied)
        );
    }

    #[test]
    fn test_take_due_drains_in_order() {
        let mut table = TimerTable::new();
        let shared = table.clone();
        table
            .register(OccurrenceId::new("a", Weekday::Mon), at(9), payload("late"))
            .unwrap();
        table
            .register(OccurrenceId::new("b", Weekday::Mon), at(7), payload("early"))
            .unwrap();
        table
            .register(OccurrenceId::new("c", Weekday::Mon), at(12), payload("later"))
            .unwrap();
        assert_eq!(shared.next_due(), Some(at(7)));
        let due = shared.take_due(at(10));
        assert_eq!(
            due.iter().map(|r| r.trigger_at).collect::<Vec<_>>(),
            vec![at(7), at(9)]
        );
        assert_eq!(table.len(), 1);
        assert!(shared.take_due(at(10) + Duration::minutes(1)).is_empty());
    }
}
