//! Editing an alarm, from the draft the user works on to saving and arming it.
//!
//! The alarm being edited lives in its [`AlarmDraft`], which is handed from
//! screen to screen (or command to command) instead of sitting in shared state.

use log::{info, warn};

use crate::{
    alarm::{Alarm, AlarmEdit},
    facility::AlarmFacility,
    scheduler::{ScheduleOutcome, Scheduler},
    store::{AlarmStore, StoreError},
    time_calc::Clock,
};

#[derive(Debug, Clone, PartialEq)]
pub enum EditingState {
    Cancelled,
    Editing,
    Done(Alarm),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditAction {
    Edit(AlarmEdit),
    Done,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmDraft {
    alarm: Alarm,
    original: Option<Alarm>,
}

impl AlarmDraft {
    /// starts a brand new alarm from the defaults
    #[must_use]
    pub fn new_alarm() -> Self {
        Self {
            alarm: Alarm::new_default(),
            original: None,
        }
    }

    /// starts editing an existing alarm, keeping its id
    #[must_use]
    pub fn edit(alarm: Alarm) -> Self {
        Self {
            original: Some(alarm.clone()),
            alarm,
        }
    }

    #[must_use]
    pub const fn alarm(&self) -> &Alarm {
        &self.alarm
    }

    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.alarm.is_new
    }

    /// whether saving would change anything
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.original.as_ref() != Some(&self.alarm)
    }

    pub fn step(&mut self, action: EditAction) -> EditingState {
        match action {
            EditAction::Edit(edit) => {
                self.alarm.apply(edit);
                EditingState::Editing
            }
            EditAction::Done => EditingState::Done(self.alarm.clone()),
            EditAction::Cancel => EditingState::Cancelled,
        }
    }

    /// applies every action in order, stopping at the first that ends the edit
    pub fn run(&mut self, actions: impl IntoIterator<Item = EditAction>) -> EditingState {
        for action in actions {
            match self.step(action) {
                EditingState::Editing => {}
                finished => return finished,
            }
        }
        EditingState::Editing
    }
}

/// saves the alarm and arms it.
/// if the store refuses the alarm it is not armed and the error goes back to the user
pub fn commit<S, F, C>(
    store: &mut S,
    scheduler: &mut Scheduler<F, C>,
    alarm: Alarm,
) -> Result<ScheduleOutcome, StoreError>
where
    S: AlarmStore + ?Sized,
    F: AlarmFacility,
    C: Clock,
{
    let mut alarm = alarm;
    alarm.is_new = false;
    if let Err(err) = store.upsert(alarm.clone()) {
        warn!("couldn't save alarm {}: {err}", alarm.id);
        return Err(err);
    }
    info!("alarm {} saved", alarm.id);
    Ok(scheduler.schedule(&alarm))
}

/// deletes the alarm, then disarms it together with any pending snooze.
/// if deleting fails the alarm stays armed
pub fn remove<S, F, C>(
    store: &mut S,
    scheduler: &mut Scheduler<F, C>,
    id: &str,
) -> Result<Option<Alarm>, StoreError>
where
    S: AlarmStore + ?Sized,
    F: AlarmFacility,
    C: Clock,
{
    let removed = store.delete(id)?;
    scheduler.cancel_by_id(id);
    scheduler.cancel_snooze(id);
    Ok(removed)
}

/// turns an alarm on or off, `None` if there is no such alarm
pub fn set_enabled<S, F, C>(
    store: &mut S,
    scheduler: &mut Scheduler<F, C>,
    id: &str,
    enabled: bool,
) -> Result<Option<ScheduleOutcome>, StoreError>
where
    S: AlarmStore + ?Sized,
    F: AlarmFacility,
    C: Clock,
{
    let Some(alarm) = store.get(id) else {
        return Ok(None);
    };
    let mut draft = AlarmDraft::edit(alarm);
    match draft.run([EditAction::Edit(AlarmEdit::Enable(enabled)), EditAction::Done]) {
        EditingState::Done(alarm) => commit(store, scheduler, alarm).map(Some),
        EditingState::Editing | EditingState::Cancelled => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alarm::{clock_time, Days},
        facility::TimerTable,
        occurrence::OccurrenceId,
        store::MemoryStore,
        time_calc::FixedClock,
    };
    use chrono::{NaiveDate, Weekday};
    use pretty_assertions::assert_eq;

    fn scheduler() -> (Scheduler<TimerTable, FixedClock>, TimerTable) {
        let table = TimerTable::new();
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        (Scheduler::new(table.clone(), FixedClock::new(now)), table)
    }

    fn weekday_draft() -> AlarmDraft {
        let mut draft = AlarmDraft::new_alarm();
        let state = draft.run([
            EditAction::Edit(AlarmEdit::Time(clock_time(6, 30).unwrap())),
            EditAction::Edit(AlarmEdit::Days(Days::weekdays())),
            EditAction::Edit(AlarmEdit::Enable(true)),
        ]);
        assert!(matches!(state, EditingState::Editing));
        draft
    }

    #[test]
    fn test_new_draft_saves_and_arms() {
        let mut store = MemoryStore::new();
        let (mut scheduler, table) = scheduler();
        let mut draft = weekday_draft();
        assert!(draft.is_new());
        let EditingState::Done(alarm) = draft.step(EditAction::Done) else {
            panic!("expected the draft to be done");
        };
        let outcome = commit(&mut store, &mut scheduler, alarm.clone()).unwrap();
        assert_eq!(outcome, ScheduleOutcome { armed: 5, failed: 0 });
        assert_eq!(table.len(), 5);
        assert!(!store.get(&alarm.id).unwrap().is_new);
    }

    #[test]
    fn test_cancelled_draft_changes_nothing() {
        let mut draft = AlarmDraft::edit(Alarm::new_default());
        assert!(!draft.is_dirty());
        let state = draft.run([
            EditAction::Edit(AlarmEdit::Title("nap".to_string())),
            EditAction::Cancel,
            EditAction::Edit(AlarmEdit::Title("ignored".to_string())),
        ]);
        assert!(matches!(state, EditingState::Cancelled));
        assert!(draft.is_dirty());
        assert_eq!(draft.alarm().title, "nap");
    }

    #[test]
    fn test_full_store_is_not_armed() {
        let mut store = MemoryStore::with_capacity(0);
        let (mut scheduler, table) = scheduler();
        let draft = weekday_draft();
        let result = commit(&mut store, &mut scheduler, draft.alarm().clone());
        assert!(matches!(result, Err(StoreError::Full { limit: 0 })));
        assert!(table.is_empty());
    }

    #[test]
    fn test_disable_and_remove() {
        let mut store = MemoryStore::new();
        let (mut scheduler, table) = scheduler();
        let alarm = weekday_draft().alarm().clone();
        commit(&mut store, &mut scheduler, alarm.clone()).unwrap();

        let outcome = set_enabled(&mut store, &mut scheduler, &alarm.id, false).unwrap();
        assert_eq!(outcome, Some(ScheduleOutcome::default()));
        assert!(table.is_empty());
        assert!(!store.get(&alarm.id).unwrap().enabled);

        set_enabled(&mut store, &mut scheduler, &alarm.id, true).unwrap();
        let state = crate::firing_state::FiringState::for_occurrence(
            &alarm,
            Weekday::Mon,
            scheduler.clock().now(),
        );
        scheduler.schedule_snooze(&state, 10);
        assert_eq!(table.len(), 6);

        let removed = remove(&mut store, &mut scheduler, &alarm.id).unwrap();
        assert_eq!(removed.map(|alarm| alarm.id), Some(alarm.id.clone()));
        assert!(table.is_empty());
        assert!(table.get(OccurrenceId::snooze(&alarm.id)).is_none());
        assert_eq!(
            set_enabled(&mut store, &mut scheduler, &alarm.id, true).unwrap(),
            None
        );
    }
}
