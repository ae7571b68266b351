//! Arms and disarms the weekly occurrences of alarms with the alarm facility.
//!
//! Every operation here is best effort: a wake request the facility refuses is
//! logged and counted, never returned as an error.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDateTime, NaiveTime, Weekday};
use log::{debug, error, info, warn};

use crate::{
    alarm::Alarm,
    facility::AlarmFacility,
    firing_state::FiringState,
    occurrence::{Armed, Occurrence, OccurrenceId, OccurrenceRegistry},
    time_calc::{next_trigger, next_trigger_on, Clock, SystemClock},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub armed: usize,
    pub failed: usize,
}

/// result of re-arming every alarm after a restart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub armed: usize,
    /// disabled alarms or alarms without days
    pub skipped: usize,
    pub failed: usize,
    /// alarms left as they were armed
    pub unchanged: usize,
}

#[derive(Debug)]
pub struct Scheduler<F, C = SystemClock> {
    facility: F,
    clock: C,
    registry: OccurrenceRegistry,
    /// each alarm as it was last fully armed
    last_armed: HashMap<String, Alarm>,
}

impl<F: AlarmFacility, C: Clock> Scheduler<F, C> {
    pub fn new(facility: F, clock: C) -> Self {
        Self {
            facility,
            clock,
            registry: OccurrenceRegistry::new(),
            last_armed: HashMap::new(),
        }
    }

    /// clears all seven occurrences of the alarm, then arms one per selected day
    /// if the alarm is enabled
    pub fn schedule(&mut self, alarm: &Alarm) -> ScheduleOutcome {
        // the selected days may have shrunk since the last time
        self.cancel(alarm);
        let mut outcome = ScheduleOutcome::default();
        if !alarm.is_schedulable() {
            debug!("alarm {} is off or has no days, nothing to arm", alarm.id);
            return outcome;
        }
        let now = self.clock.now();
        for weekday in alarm.days.enabled() {
            let trigger_at = next_trigger_on(alarm.time, weekday, now);
            let state = FiringState::for_occurrence(alarm, weekday, trigger_at);
            if self.arm(Occurrence::new(alarm.id.as_str(), weekday).id(), &state) {
                outcome.armed += 1;
            } else {
                outcome.failed += 1;
            }
        }
        info!(
            "alarm {} ({}) armed for {} day(s), {} failed",
            alarm.id, alarm.title, outcome.armed, outcome.failed
        );
        if outcome.failed == 0 {
            self.last_armed.insert(alarm.id.clone(), alarm.clone());
        }
        outcome
    }

    /// disarms all seven possible occurrences, armed or not.
    /// a pending snooze is left alone
    pub fn cancel(&mut self, alarm: &Alarm) {
        self.cancel_by_id(&alarm.id);
    }

    pub fn cancel_by_id(&mut self, alarm_id: &str) {
        for occurrence in Occurrence::week_of(alarm_id) {
            self.registry.disarm(&mut self.facility, occurrence.id());
        }
        self.last_armed.remove(alarm_id);
        debug!("alarm {alarm_id} disarmed");
    }

    pub fn cancel_snooze(&mut self, alarm_id: &str) {
        self.registry
            .disarm(&mut self.facility, OccurrenceId::snooze(alarm_id));
    }

    /// rings the firing again in `minutes` as a one shot outside the weekly schedule.
    /// returns when, if it could be armed
    pub fn schedule_snooze(&mut self, state: &FiringState, minutes: u32) -> Option<NaiveDateTime> {
        let trigger_at = self.clock.now() + Duration::minutes(i64::from(minutes.max(1)));
        let snoozed = state.snoozed(trigger_at);
        let armed = self.arm(OccurrenceId::snooze(&state.alarm_id), &snoozed);
        if armed {
            info!("alarm {} snoozed until {trigger_at}", state.alarm_id);
        }
        armed.then_some(trigger_at)
    }

    /// re-arms a fired occurrence a week after it was due (not a week from now).
    /// if that is already gone by, whole weeks are added until it isn't
    pub fn schedule_next_week_occurrence(&mut self, state: &FiringState) -> Option<NaiveDateTime> {
        let Some(weekday) = state.weekday else {
            warn!("firing of alarm {} has no weekday, can't re-arm it", state.alarm_id);
            return None;
        };
        if !state.has_alarm() {
            warn!("firing without an alarm id, can't re-arm it");
            return None;
        }
        let now = self.clock.now();
        let trigger_at = match state.trigger_at {
            Some(original) => {
                let mut next = original + Duration::weeks(1);
                if next <= now {
                    next += Duration::weeks((now - next).num_weeks() + 1);
                }
                next
            }
            None => next_trigger_on(NaiveTime::from_hms_opt(state.hour, state.minute, 0)?, weekday, now),
        };
        let armed = self.arm(
            OccurrenceId::new(&state.alarm_id, weekday),
            &state.rearmed(trigger_at),
        );
        armed.then_some(trigger_at)
    }

    /// cancels the wake request a firing was delivered for
    pub fn disarm_fired(&mut self, state: &FiringState) {
        if let Some(id) = occurrence_of(state) {
            self.registry.disarm(&mut self.facility, id);
        }
    }

    /// whether a delivered firing belongs to a wake request that is still armed.
    /// a wake for a cancelled or already re-armed occurrence is stale
    #[must_use]
    pub fn is_current(&self, state: &FiringState) -> bool {
        occurrence_of(state).is_some_and(|id| self.registry.is_current(id, state.trigger_at))
    }

    /// a delivered snooze has been consumed by the facility
    pub fn forget_snooze(&mut self, alarm_id: &str) {
        self.registry.forget(OccurrenceId::snooze(alarm_id));
    }

    /// re-arms every alarm, e.g. after the device restarted.
    /// one alarm failing doesn't stop the others
    pub fn reschedule_all<'a>(&mut self, alarms: impl IntoIterator<Item = &'a Alarm>) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        for alarm in alarms {
            if !alarm.is_schedulable() {
                report.skipped += 1;
                continue;
            }
            let outcome = self.schedule(alarm);
            report.armed += outcome.armed;
            report.failed += outcome.failed;
        }
        if report.failed > 0 {
            error!(
                "recovery armed {} occurrence(s), {} failed",
                report.armed, report.failed
            );
        } else {
            info!(
                "recovery armed {} occurrence(s), skipped {} alarm(s)",
                report.armed, report.skipped
            );
        }
        report
    }

    /// brings the armed occurrences in line with `alarms` after they changed:
    /// alarms that are gone lose their occurrences and snoozes, changed ones are
    /// re-armed. alarms armed exactly as given are left alone, so a request that is
    /// due but not handled yet keeps its place
    pub fn resync(&mut self, alarms: &[Alarm]) -> RecoveryReport {
        let known = alarms
            .iter()
            .map(|alarm| alarm.id.as_str())
            .collect::<HashSet<_>>();
        let gone = self
            .registry
            .alarm_ids()
            .into_iter()
            .filter(|alarm_id| !known.contains(alarm_id.as_str()))
            .collect::<Vec<_>>();
        for alarm_id in &gone {
            info!("alarm {alarm_id} was removed, disarming it");
            self.cancel_by_id(alarm_id);
            self.cancel_snooze(alarm_id);
        }
        let mut unchanged = 0;
        let mut changed = Vec::new();
        for alarm in alarms {
            if !alarm.is_schedulable() {
                self.cancel(alarm);
            }
            if self.is_armed_as(alarm) {
                unchanged += 1;
            } else {
                changed.push(alarm);
            }
        }
        debug!("{unchanged} alarm(s) unchanged, {} to re-arm", changed.len());
        RecoveryReport {
            unchanged,
            ..self.reschedule_all(changed)
        }
    }

    /// whether `alarm` is armed with this exact definition on every selected day
    fn is_armed_as(&self, alarm: &Alarm) -> bool {
        alarm.is_schedulable()
            && self.last_armed.get(&alarm.id) == Some(alarm)
            && alarm
                .days
                .enabled()
                .all(|weekday| self.registry.get(OccurrenceId::new(&alarm.id, weekday)).is_some())
    }

    /// the alarm that goes off first and when
    pub fn next_alarm<'a>(
        &self,
        alarms: impl IntoIterator<Item = &'a Alarm>,
    ) -> Option<(&'a Alarm, NaiveDateTime)> {
        let now = self.clock.now();
        alarms
            .into_iter()
            .filter(|alarm| alarm.is_schedulable())
            .filter_map(|alarm| next_trigger(alarm.time, alarm.days, now).map(|at| (alarm, at)))
            .min_by_key(|(_, at)| *at)
    }

    fn arm(&mut self, id: OccurrenceId, state: &FiringState) -> bool {
        let Some(trigger_at) = state.trigger_at else {
            error!("refusing to arm {id} without a trigger instant");
            return false;
        };
        let payload = match state.to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                error!("couldn't encode wake payload for alarm {}: {err}", state.alarm_id);
                return false;
            }
        };
        let armed = Armed {
            alarm_id: state.alarm_id.clone(),
            weekday: if state.is_snooze { None } else { state.weekday },
            trigger_at,
        };
        match self.registry.arm(&mut self.facility, id, armed, payload) {
            Ok(()) => {
                debug!("armed {id} for alarm {} at {trigger_at}", state.alarm_id);
                true
            }
            Err(err) => {
                warn!("couldn't arm {id} for alarm {}: {err}", state.alarm_id);
                false
            }
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &OccurrenceRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn facility(&self) -> &F {
        &self.facility
    }

    pub fn facility_mut(&mut self) -> &mut F {
        &mut self.facility
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }
}

/// the id a firing was registered under
fn occurrence_of(state: &FiringState) -> Option<OccurrenceId> {
    if state.is_snooze {
        Some(OccurrenceId::snooze(&state.alarm_id))
    } else {
        state
            .weekday
            .map(|weekday: Weekday| OccurrenceId::new(&state.alarm_id, weekday))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alarm::{clock_time, AlarmEdit, Days},
        facility::TimerTable,
        time_calc::FixedClock,
    };
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    /// 2024-01-01 is a monday
    fn monday_at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn scheduler_at(now: NaiveDateTime) -> (Scheduler<TimerTable, FixedClock>, TimerTable, FixedClock) {
        let table = TimerTable::new();
        let clock = FixedClock::new(now);
        (Scheduler::new(table.clone(), clock.clone()), table, clock)
    }

    fn alarm_on(days: &[Weekday]) -> Alarm {
        let mut alarm = Alarm::new_default();
        alarm.apply(AlarmEdit::Time(clock_time(7, 0).unwrap()));
        alarm.apply(AlarmEdit::Days(Days::only(days)));
        alarm.apply(AlarmEdit::Enable(true));
        alarm
    }

    #[test]
    fn test_schedule_arms_each_selected_day() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        let alarm = alarm_on(&[Weekday::Mon, Weekday::Wed]);
        let outcome = scheduler.schedule(&alarm);
        assert_eq!(outcome, ScheduleOutcome { armed: 2, failed: 0 });

        let wednesday = table.get(OccurrenceId::new(&alarm.id, Weekday::Wed)).unwrap();
        assert_eq!(wednesday.trigger_at, monday_at(7, 0) + Duration::days(2));
        let monday = table.get(OccurrenceId::new(&alarm.id, Weekday::Mon)).unwrap();
        assert_eq!(monday.trigger_at, monday_at(7, 0) + Duration::weeks(1));

        let state = wednesday.payload.decode();
        assert_eq!(state.alarm_id, alarm.id);
        assert_eq!(state.weekday, Some(Weekday::Wed));
        assert_eq!((state.hour, state.minute), (7, 0));
        assert!(!state.is_snooze);
    }

    #[test]
    fn test_schedule_twice_is_idempotent() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        let alarm = alarm_on(&[Weekday::Tue, Weekday::Fri]);
        scheduler.schedule(&alarm);
        let first = scheduler.registry().armed_ids();
        scheduler.schedule(&alarm);
        assert_eq!(scheduler.registry().armed_ids(), first);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_schedule_drops_days_no_longer_selected() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        let mut alarm = alarm_on(&[Weekday::Mon, Weekday::Tue, Weekday::Wed]);
        scheduler.schedule(&alarm);
        alarm.apply(AlarmEdit::Day(Weekday::Mon, false));
        alarm.apply(AlarmEdit::Day(Weekday::Wed, false));
        scheduler.schedule(&alarm);
        assert_eq!(table.len(), 1);
        assert!(table.get(OccurrenceId::new(&alarm.id, Weekday::Tue)).is_some());
    }

    #[test]
    fn test_disabled_or_dayless_alarm_is_not_armed() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        let mut alarm = alarm_on(&[Weekday::Mon]);
        scheduler.schedule(&alarm);
        alarm.apply(AlarmEdit::Enable(false));
        assert_eq!(scheduler.schedule(&alarm), ScheduleOutcome::default());
        assert!(table.is_empty());

        alarm.apply(AlarmEdit::Enable(true));
        alarm.apply(AlarmEdit::Days(Days::none()));
        assert_eq!(scheduler.schedule(&alarm), ScheduleOutcome::default());
        assert!(table.is_empty());
    }

    #[test]
    fn test_cancel_is_safe_when_nothing_is_armed() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        scheduler.cancel(&alarm_on(&[Weekday::Mon]));
        assert!(table.is_empty());
        assert!(scheduler.registry().is_empty());
    }

    #[test]
    fn test_snooze_survives_cancel() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        let alarm = alarm_on(&[Weekday::Mon]);
        scheduler.schedule(&alarm);
        let state = FiringState::for_occurrence(&alarm, Weekday::Mon, monday_at(7, 0));
        let snooze_at = scheduler.schedule_snooze(&state, 10).unwrap();
        assert_eq!(snooze_at, monday_at(9, 10));

        scheduler.cancel(&alarm);
        let snooze = table.get(OccurrenceId::snooze(&alarm.id)).unwrap();
        assert_eq!(table.len(), 1);
        let snoozed = snooze.payload.decode();
        assert!(snoozed.is_snooze);
        assert_eq!(snoozed.title, "Alarm (snoozed)");

        scheduler.cancel_snooze(&alarm.id);
        assert!(table.is_empty());
    }

    #[test]
    fn test_next_week_is_measured_from_the_original_trigger() {
        // tuesday 07:00 fired, delivered late at 07:20
        let tuesday = monday_at(7, 0) + Duration::days(1);
        let (mut scheduler, table, _) = scheduler_at(tuesday + Duration::minutes(20));
        let alarm = alarm_on(&[Weekday::Tue]);
        let state = FiringState::for_occurrence(&alarm, Weekday::Tue, tuesday);
        let next = scheduler.schedule_next_week_occurrence(&state).unwrap();
        assert_eq!(next, tuesday + Duration::weeks(1));
        assert_eq!(
            table
                .get(OccurrenceId::new(&alarm.id, Weekday::Tue))
                .unwrap()
                .trigger_at,
            tuesday + Duration::weeks(1)
        );
    }

    #[test]
    fn test_next_week_skips_weeks_already_gone() {
        let tuesday = monday_at(7, 0) + Duration::days(1);
        let (mut scheduler, _, _) = scheduler_at(tuesday + Duration::days(15));
        let alarm = alarm_on(&[Weekday::Tue]);
        let state = FiringState::for_occurrence(&alarm, Weekday::Tue, tuesday);
        assert_eq!(
            scheduler.schedule_next_week_occurrence(&state),
            Some(tuesday + Duration::weeks(3))
        );
    }

    #[test]
    fn test_failed_registration_is_counted_not_raised() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        table.set_exact_allowed(false);
        let outcome = scheduler.schedule(&alarm_on(&[Weekday::Mon, Weekday::Fri]));
        assert_eq!(outcome, ScheduleOutcome { armed: 0, failed: 2 });
        assert!(scheduler.registry().is_empty());
    }

    #[test]
    fn test_recovery_keeps_going_after_a_failure() {
        let (mut scheduler, _, _) = scheduler_at(monday_at(9, 0));
        *scheduler.facility_mut() = TimerTable::new().with_quota(3);
        let mut off = alarm_on(&[Weekday::Sat]);
        off.enabled = false;
        let alarms = vec![
            alarm_on(&[Weekday::Mon, Weekday::Tue]),
            off,
            alarm_on(&[Weekday::Wed, Weekday::Thu]),
            alarm_on(&[Weekday::Sun]),
        ];
        let report = scheduler.reschedule_all(&alarms);
        assert_eq!(
            report,
            RecoveryReport {
                armed: 3,
                skipped: 1,
                failed: 2,
                unchanged: 0
            }
        );
    }

    #[test]
    fn test_stale_firing_after_cancel() {
        let (mut scheduler, _, _) = scheduler_at(monday_at(6, 0));
        let alarm = alarm_on(&[Weekday::Mon]);
        scheduler.schedule(&alarm);
        let state = FiringState::for_occurrence(&alarm, Weekday::Mon, monday_at(7, 0));
        assert!(scheduler.is_current(&state));
        scheduler.cancel(&alarm);
        assert!(!scheduler.is_current(&state));
    }

    #[test]
    fn test_resync_drops_removed_and_disabled_alarms() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        let kept = alarm_on(&[Weekday::Mon]);
        let mut turned_off = alarm_on(&[Weekday::Tue]);
        let removed = alarm_on(&[Weekday::Wed]);
        scheduler.reschedule_all([&kept, &turned_off, &removed]);
        assert_eq!(table.len(), 3);

        turned_off.enabled = false;
        let report = scheduler.resync(&[kept.clone(), turned_off]);
        assert_eq!(
            report,
            RecoveryReport {
                armed: 0,
                skipped: 1,
                failed: 0,
                unchanged: 1
            }
        );
        assert_eq!(table.len(), 1);
        assert!(table.get(OccurrenceId::new(&kept.id, Weekday::Mon)).is_some());
    }

    #[test]
    fn test_resync_keeps_a_due_request_of_an_unchanged_alarm() {
        let (mut scheduler, table, clock) = scheduler_at(monday_at(9, 0));
        let tuesday = alarm_on(&[Weekday::Tue]);
        scheduler.schedule(&tuesday);
        let due_at = monday_at(7, 0) + Duration::days(1);

        // another alarm is added just as tuesday's comes due
        clock.set(due_at + Duration::milliseconds(300));
        let added = alarm_on(&[Weekday::Fri]);
        let report = scheduler.resync(&[tuesday.clone(), added.clone()]);
        assert_eq!((report.armed, report.unchanged), (1, 1));

        let due = table.take_due(clock.now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].trigger_at, due_at);
        let state = due[0].payload.decode();
        assert_eq!(state.alarm_id, tuesday.id);
        assert!(scheduler.is_current(&state));
        assert!(table.get(OccurrenceId::new(&added.id, Weekday::Fri)).is_some());
    }

    #[test]
    fn test_resync_rearms_an_edited_alarm() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        let mut alarm = alarm_on(&[Weekday::Tue]);
        scheduler.schedule(&alarm);

        alarm.apply(AlarmEdit::Time(clock_time(8, 30).unwrap()));
        let report = scheduler.resync(&[alarm.clone()]);
        assert_eq!((report.armed, report.unchanged), (1, 0));
        assert_eq!(
            table
                .get(OccurrenceId::new(&alarm.id, Weekday::Tue))
                .unwrap()
                .trigger_at,
            monday_at(8, 30) + Duration::days(1)
        );
    }

    #[test]
    fn test_resync_rearms_an_alarm_missing_a_day() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(9, 0));
        let alarm = alarm_on(&[Weekday::Tue, Weekday::Wed]);
        scheduler.schedule(&alarm);
        let state = FiringState::for_occurrence(&alarm, Weekday::Wed, monday_at(7, 0) + Duration::days(2));
        scheduler.disarm_fired(&state);
        assert_eq!(table.len(), 1);

        let report = scheduler.resync(&[alarm]);
        assert_eq!((report.armed, report.unchanged), (2, 0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_resync_cancels_the_snooze_of_a_disabled_then_removed_alarm() {
        let (mut scheduler, table, _) = scheduler_at(monday_at(6, 0));
        let mut alarm = alarm_on(&[Weekday::Mon]);
        scheduler.schedule(&alarm);
        let state = FiringState::for_occurrence(&alarm, Weekday::Mon, monday_at(7, 0));
        scheduler.schedule_snooze(&state, 10).unwrap();

        alarm.enabled = false;
        scheduler.resync(&[alarm.clone()]);
        assert!(table.get(OccurrenceId::new(&alarm.id, Weekday::Mon)).is_none());
        assert!(table.get(OccurrenceId::snooze(&alarm.id)).is_some());

        scheduler.resync(&[]);
        assert!(table.get(OccurrenceId::snooze(&alarm.id)).is_none());
        assert!(scheduler.registry().is_empty());
    }

    #[test]
    fn test_next_alarm_picks_earliest() {
        let (scheduler, _, _) = scheduler_at(monday_at(9, 0));
        let wednesday = alarm_on(&[Weekday::Wed]);
        let tuesday = alarm_on(&[Weekday::Tue]);
        let alarms = vec![wednesday, tuesday.clone()];
        let (alarm, at) = scheduler.next_alarm(&alarms).unwrap();
        assert_eq!(alarm.id, tuesday.id);
        assert_eq!(at, monday_at(7, 0) + Duration::days(1));
    }
}
