//! Reacts to delivered wake requests: re-arms the recurrence, rings, and
//! waits for the user to dismiss or snooze.
//!
//! ```text
//! Idle --wake--> Firing --dismiss--> Resolved(Dismiss)
//!                       --snooze---> Resolved(Snooze)
//! ```

use chrono::{Duration, NaiveDateTime};
use log::{debug, info, warn};

use crate::{
    communication::{Message, Resolution},
    drivers::Drivers,
    facility::AlarmFacility,
    firing_state::{FiringState, Payload},
    scheduler::Scheduler,
    time_calc::{Clock, SystemClock},
};

pub const DEFAULT_SNOOZE_MINUTES: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFiring {
    pub state: FiringState,
    pub started_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerState {
    Idle,
    Firing(ActiveFiring),
    Resolved(Resolution),
}

pub struct FiringHandler<F, C = SystemClock> {
    scheduler: Scheduler<F, C>,
    drivers: Drivers,
    state: HandlerState,
    snooze_minutes: u32,
    ring_timeout: Option<Duration>,
}

impl<F: AlarmFacility, C: Clock> FiringHandler<F, C> {
    pub fn new(scheduler: Scheduler<F, C>, drivers: Drivers) -> Self {
        Self {
            scheduler,
            drivers,
            state: HandlerState::Idle,
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            ring_timeout: None,
        }
    }

    #[must_use]
    pub fn with_snooze_minutes(mut self, minutes: u32) -> Self {
        self.snooze_minutes = minutes;
        self
    }

    /// dismisses an alarm nobody answered after `minutes`, 0 rings until answered
    #[must_use]
    pub fn with_ring_timeout(mut self, minutes: u32) -> Self {
        self.ring_timeout = (minutes > 0).then(|| Duration::minutes(i64::from(minutes)));
        self
    }

    /// the single entry point for wake requests and the user's answers.
    /// reload and shutdown belong to the event loop and are ignored here
    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Wake(payload) => self.wake(&payload),
            Message::Resolve(resolution) => self.resolve(resolution),
            Message::Reload | Message::Shutdown => {
                debug!("{message:?} isn't for the firing handler");
            }
        }
    }

    fn wake(&mut self, payload: &Payload) {
        let state = payload.decode();
        if let HandlerState::Firing(active) = &self.state {
            if is_same_firing(&active.state, &state) {
                debug!("alarm {} is already ringing", state.alarm_id);
                return;
            }
        }

        if state.is_snooze {
            if state.has_alarm() {
                if !self.scheduler.is_current(&state) {
                    info!("ignoring stale snooze of alarm {}", state.alarm_id);
                    return;
                }
                self.scheduler.forget_snooze(&state.alarm_id);
            }
        } else if state.has_alarm() && state.weekday.is_some() {
            if !self.scheduler.is_current(&state) {
                info!(
                    "ignoring stale wake of alarm {} (cancelled or already re-armed)",
                    state.alarm_id
                );
                return;
            }
            // next week is armed before anything rings
            self.scheduler.disarm_fired(&state);
            if let Some(next) = self.scheduler.schedule_next_week_occurrence(&state) {
                info!("alarm {} re-armed for {next}", state.alarm_id);
            }
        } else {
            warn!("wake without a usable occurrence, ringing without re-arming");
        }

        if matches!(self.state, HandlerState::Firing(_)) {
            info!("another alarm went off, dismissing the one ringing");
            self.resolve(Resolution::Dismiss);
        }
        self.ring(state);
    }

    fn ring(&mut self, state: FiringState) {
        self.drivers.volume.override_level(state.volume);
        self.drivers.ringer.start(state.ringtone.as_ref(), state.volume);
        if state.vibrate {
            self.drivers.vibrator.start();
        }
        self.drivers.presenter.present(&state);
        info!("alarm {} ({}) ringing", state.alarm_id, state.title);
        self.state = HandlerState::Firing(ActiveFiring {
            state,
            started_at: self.scheduler.clock().now(),
        });
    }

    fn resolve(&mut self, resolution: Resolution) {
        let active = match std::mem::replace(&mut self.state, HandlerState::Resolved(resolution)) {
            HandlerState::Firing(active) => active,
            other => {
                debug!("{resolution:?} with nothing ringing");
                self.state = other;
                return;
            }
        };
        if resolution == Resolution::Snooze && active.state.has_alarm() {
            self.scheduler
                .schedule_snooze(&active.state, self.snooze_minutes);
        }
        self.drivers.ringer.stop();
        self.drivers.vibrator.stop();
        self.drivers.volume.restore();
        self.drivers.presenter.clear();
        self.drivers.presenter.finish(resolution);
        info!("alarm {} {resolution:?}", active.state.alarm_id);
    }

    /// dismisses the ringing alarm once it has rung past the timeout.
    /// returns whether it did
    pub fn expire_overdue(&mut self) -> bool {
        let (HandlerState::Firing(active), Some(timeout)) = (&self.state, self.ring_timeout) else {
            return false;
        };
        if self.scheduler.clock().now() - active.started_at < timeout {
            return false;
        }
        info!("alarm {} wasn't answered, dismissing it", active.state.alarm_id);
        self.resolve(Resolution::Dismiss);
        true
    }

    #[must_use]
    pub const fn state(&self) -> &HandlerState {
        &self.state
    }

    #[must_use]
    pub const fn is_firing(&self) -> bool {
        matches!(self.state, HandlerState::Firing(_))
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler<F, C> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<F, C> {
        &mut self.scheduler
    }
}

fn is_same_firing(ringing: &FiringState, delivered: &FiringState) -> bool {
    ringing.alarm_id == delivered.alarm_id
        && ringing.weekday == delivered.weekday
        && ringing.is_snooze == delivered.is_snooze
        && ringing.trigger_at == delivered.trigger_at
}
