//! One weekday of a recurring alarm, and the bookkeeping of which ones are armed.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use chrono::{NaiveDateTime, Weekday};

use crate::{
    alarm::WEEK,
    facility::{AlarmFacility, FacilityError},
    firing_state::Payload,
};

/// identifies a wake request with the alarm facility.
/// derived only from its inputs, so it is the same after a restart and
/// re-arming an occurrence overwrites its old request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceId(u64);

impl OccurrenceId {
    #[must_use]
    pub fn new(alarm_id: &str, weekday: Weekday) -> Self {
        Self::digest(&format!("{alarm_id}{}", weekday.num_days_from_monday()))
    }

    /// the slot a snooze of `alarm_id` is registered under, apart from the weekly ones
    #[must_use]
    pub fn snooze(alarm_id: &str) -> Self {
        Self::digest(&format!("{alarm_id}snooze"))
    }

    fn digest(key: &str) -> Self {
        let hash = blake3::hash(key.as_bytes());
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        Self(u64::from_le_bytes(bytes))
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub alarm_id: String,
    pub weekday: Weekday,
}

impl Occurrence {
    #[must_use]
    pub fn new(alarm_id: impl Into<String>, weekday: Weekday) -> Self {
        Self {
            alarm_id: alarm_id.into(),
            weekday,
        }
    }

    /// all seven possible occurrences of an alarm, whether or not their day is selected
    pub fn week_of(alarm_id: &str) -> impl Iterator<Item = Self> + '_ {
        WEEK.into_iter().map(move |weekday| Self::new(alarm_id, weekday))
    }

    #[must_use]
    pub fn id(&self) -> OccurrenceId {
        OccurrenceId::new(&self.alarm_id, self.weekday)
    }
}

/// what the registry knows about an armed wake request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Armed {
    pub alarm_id: String,
    /// `None` for snoozes
    pub weekday: Option<Weekday>,
    pub trigger_at: NaiveDateTime,
}

#[derive(Debug, Default)]
pub struct OccurrenceRegistry {
    armed: HashMap<OccurrenceId, Armed>,
}

impl OccurrenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// registers with the facility and remembers the request.
    /// on failure the registry is left as it was
    pub fn arm<F: AlarmFacility + ?Sized>(
        &mut self,
        facility: &mut F,
        id: OccurrenceId,
        armed: Armed,
        payload: Payload,
    ) -> Result<(), FacilityError> {
        facility.register(id, armed.trigger_at, payload)?;
        self.armed.insert(id, armed);
        Ok(())
    }

    pub fn disarm<F: AlarmFacility + ?Sized>(&mut self, facility: &mut F, id: OccurrenceId) {
        facility.cancel(id);
        self.armed.remove(&id);
    }

    /// drops a request the facility has already delivered
    pub fn forget(&mut self, id: OccurrenceId) -> Option<Armed> {
        self.armed.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: OccurrenceId) -> Option<&Armed> {
        self.armed.get(&id)
    }

    /// whether a delivered wake for `id` matches what is armed right now.
    /// a wake without a trigger instant matches any armed request for the id
    #[must_use]
    pub fn is_current(&self, id: OccurrenceId, trigger_at: Option<NaiveDateTime>) -> bool {
        match (self.armed.get(&id), trigger_at) {
            (Some(armed), Some(trigger_at)) => armed.trigger_at == trigger_at,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    #[must_use]
    pub fn armed_ids(&self) -> BTreeSet<OccurrenceId> {
        self.armed.keys().copied().collect()
    }

    #[must_use]
    pub fn armed_for(&self, alarm_id: &str) -> BTreeSet<OccurrenceId> {
        self.armed
            .iter()
            .filter(|(_, armed)| armed.alarm_id == alarm_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// alarms with anything armed, snoozes included
    #[must_use]
    pub fn alarm_ids(&self) -> BTreeSet<String> {
        self.armed
            .values()
            .map(|armed| armed.alarm_id.clone())
            .collect()
    }

    /// earliest armed trigger
    #[must_use]
    pub fn next(&self) -> Option<(OccurrenceId, &Armed)> {
        self.armed
            .iter()
            .min_by_key(|(_, armed)| armed.trigger_at)
            .map(|(id, armed)| (*id, armed))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
