#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(
    clippy::multiple_crate_versions,
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

//! Recurring alarms: when they go off next, arming them with an alarm
//! facility one weekday at a time, and ringing, snoozing and re-arming them
//! when they fire.

pub mod alarm;
pub mod communication;
pub mod config;
pub mod drivers;
/// implementation of alarm editing, from draft to armed alarm
pub mod edit;
pub mod facility;
pub mod firing;
pub mod firing_state;
pub mod occurrence;
pub mod scheduler;
pub mod store;
pub mod time_calc;

pub use alarm::{Alarm, AlarmEdit, Days, Ringtone};
pub use communication::{Message, Resolution};
pub use facility::{AlarmFacility, FacilityError, TimerTable};
pub use firing::{FiringHandler, HandlerState};
pub use firing_state::{FiringState, Payload};
pub use occurrence::{Occurrence, OccurrenceId, OccurrenceRegistry};
pub use scheduler::{RecoveryReport, ScheduleOutcome, Scheduler};
pub use store::{AlarmStore, FileStore, MemoryStore, StoreError};
pub use time_calc::{Clock, FixedClock, SystemClock};
