//! Works out when an alarm goes off next.
//!
//! All instants are local wall clock times (`NaiveDateTime`); the caller
//! supplies "now" through a [`Clock`] so the math stays deterministic.

use std::{cell::Cell, rc::Rc};

use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime, Weekday};

use crate::alarm::Days;

/// source of the current local time
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// a clock that only moves when told to, shared between clones
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Rc<Cell<NaiveDateTime>>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }
}

/// the next instant after `now` that falls on one of `days` at `time`.
/// a trigger exactly at `now` counts as already passed.
/// returns `None` when no day is selected
#[must_use]
pub fn next_trigger(time: NaiveTime, days: Days, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if days.is_empty() {
        return None;
    }
    let today = now.date().and_time(time);
    // start looking tomorrow if today's time has gone by
    let start = i64::from(today <= now);
    (start..start + 7)
        .map(|offset| today + Duration::days(offset))
        .find(|candidate| days.contains(candidate.weekday()))
}

/// how long until the alarm goes off next.
/// zero means it never will and must not be armed
#[must_use]
pub fn until_next(time: NaiveTime, days: Days, now: NaiveDateTime) -> Duration {
    next_trigger(time, days, now).map_or_else(Duration::zero, |trigger| trigger - now)
}

/// the next `weekday` at `time`: today if that is `weekday` and the time hasn't
/// passed yet, otherwise up to a week out
#[must_use]
pub fn next_trigger_on(time: NaiveTime, weekday: Weekday, now: NaiveDateTime) -> NaiveDateTime {
    let days_ahead = (weekday.num_days_from_monday() + 7 - now.weekday().num_days_from_monday()) % 7;
    let candidate = now.date().and_time(time) + Duration::days(i64::from(days_ahead));
    if candidate <= now {
        candidate + Duration::weeks(1)
    } else {
        candidate
    }
}

/// `1 day, 2 hours and 5 minutes`, rounding up to the next whole minute
#[must_use]
pub fn describe_until(until: Duration) -> String {
    let seconds = until.num_seconds().max(0);
    let total_minutes = (seconds + 59) / 60;
    let (days, hours, minutes) = (
        total_minutes / (24 * 60),
        (total_minutes / 60) % 24,
        total_minutes % 60,
    );
    let parts = [(days, "day"), (hours, "hour"), (minutes, "minute")]
        .into_iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| {
            if amount == 1 {
                format!("{amount} {unit}")
            } else {
                format!("{amount} {unit}s")
            }
        })
        .collect::<Vec<_>>();
    match parts.as_slice() {
        [] => "less than a minute".to_string(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{} and {last}", rest.join(", ")),
    }
}
