use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// volume given to freshly created alarms
pub const DEFAULT_VOLUME: f32 = 0.5;

/// Monday first, the order the days are shown and stored in
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlarmError {
    #[error("invalid alarm time {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },
    #[error("couldn't parse `{0}` as a time (expected HH:MM)")]
    UnparsableTime(String),
    #[error("unknown weekday `{0}`")]
    UnknownWeekday(String),
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// creates a new opaque alarm id.
/// ids are never reused, so every alarm keeps its own set of occurrences
#[must_use]
pub fn new_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let mut hasher = blake3::Hasher::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.finalize().to_hex().as_str()[..16].to_string()
}

/// builds a minute resolution time of day
pub fn clock_time(hour: u32, minute: u32) -> Result<NaiveTime, AlarmError> {
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or(AlarmError::InvalidTime { hour, minute })
}

/// parses `HH:MM` (24 hour)
pub fn parse_time(input: &str) -> Result<NaiveTime, AlarmError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|_| AlarmError::UnparsableTime(input.to_string()))
}

#[inline]
#[must_use]
pub const fn always_true() -> bool {
    true
}

const fn default_volume() -> f32 {
    DEFAULT_VOLUME
}

fn default_title() -> String {
    "Alarm".to_string()
}

/// the days of the week an alarm repeats on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Days {
    #[serde(default)]
    pub monday: bool,
    #[serde(default)]
    pub tuesday: bool,
    #[serde(default)]
    pub wednesday: bool,
    #[serde(default)]
    pub thursday: bool,
    #[serde(default)]
    pub friday: bool,
    #[serde(default)]
    pub saturday: bool,
    #[serde(default)]
    pub sunday: bool,
}

impl Days {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: true,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            monday: false,
            tuesday: false,
            wednesday: false,
            thursday: false,
            friday: false,
            saturday: false,
            sunday: false,
        }
    }

    #[must_use]
    pub const fn weekdays() -> Self {
        Self {
            saturday: false,
            sunday: false,
            ..Self::all()
        }
    }

    #[must_use]
    pub const fn weekends() -> Self {
        Self {
            saturday: true,
            sunday: true,
            ..Self::none()
        }
    }

    #[must_use]
    pub fn only(days: &[Weekday]) -> Self {
        let mut selection = Self::none();
        for day in days {
            selection.set(*day, true);
        }
        selection
    }

    #[must_use]
    pub const fn contains(self, day: Weekday) -> bool {
        match day {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    pub fn set(&mut self, day: Weekday, on: bool) {
        let slot = match day {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        };
        *slot = on;
    }

    /// enabled days, monday first
    pub fn enabled(self) -> impl Iterator<Item = Weekday> {
        WEEK.into_iter().filter(move |day| self.contains(*day))
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.enabled().next().is_none()
    }

    /// short human description, e.g. `Weekdays` or `Mon, Wed`
    #[must_use]
    pub fn summary(self) -> String {
        let days = self.enabled().collect::<Vec<_>>();
        match days.len() {
            0 => "Never".to_string(),
            7 => "Every day".to_string(),
            _ if self == Self::weekdays() => "Weekdays".to_string(),
            _ if self == Self::weekends() => "Weekends".to_string(),
            _ => days
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// parses a comma separated list of days (`mon,wed`) or one of
    /// `daily`, `weekdays`, `weekends`, `never`
    pub fn parse_list(input: &str) -> Result<Self, AlarmError> {
        match input.trim().to_lowercase().as_str() {
            "daily" | "all" | "every day" => return Ok(Self::all()),
            "weekdays" => return Ok(Self::weekdays()),
            "weekends" => return Ok(Self::weekends()),
            "never" | "none" | "" => return Ok(Self::none()),
            _ => {}
        }
        let mut selection = Self::none();
        for day in input.split(',').map(str::trim).filter(|day| !day.is_empty()) {
            let weekday = day
                .parse::<Weekday>()
                .map_err(|_| AlarmError::UnknownWeekday(day.to_string()))?;
            selection.set(weekday, true);
        }
        Ok(selection)
    }
}

impl fmt::Display for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// a sound to ring with, referenced by uri (a file path for the desktop player)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ringtone {
    pub title: String,
    pub uri: String,
}

impl Ringtone {
    #[must_use]
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

impl fmt::Display for Ringtone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.uri)
    }
}

/// a single edit made to an alarm while it is being edited
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmEdit {
    Time(NaiveTime),
    Title(String),
    Day(Weekday, bool),
    Days(Days),
    Ringtone(Option<Ringtone>),
    Volume(f32),
    Vibrate(bool),
    Enable(bool),
}

/// represents a recurring alarm
/// the time it should go off at, the days it repeats on and how it rings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(with = "toml_datetime_compat")]
    pub time: NaiveTime,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "always_true")]
    pub vibrate: bool,
    /// set for alarms the user has added but not saved yet
    #[serde(skip)]
    pub is_new: bool,
    #[serde(default = "Days::all")]
    pub days: Days,
    /// `None` rings silently (vibration only)
    #[serde(default)]
    pub ringtone: Option<Ringtone>,
}

impl Default for Alarm {
    fn default() -> Self {
        Self::new_default()
    }
}

impl Alarm {
    /// the alarm the user starts from when adding one: every day, disabled, half volume
    #[must_use]
    pub fn new_default() -> Self {
        Self {
            id: new_id(),
            title: default_title(),
            time: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
            enabled: false,
            volume: DEFAULT_VOLUME,
            vibrate: true,
            is_new: true,
            days: Days::all(),
            ringtone: None,
        }
    }

    #[must_use]
    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    #[must_use]
    pub fn minute(&self) -> u32 {
        self.time.minute()
    }

    /// an alarm without days never goes off so it must never be armed
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        self.enabled && !self.days.is_empty()
    }

    pub fn apply(&mut self, edit: AlarmEdit) {
        match edit {
            // seconds are dropped, alarms go off on the minute
            AlarmEdit::Time(time) => {
                self.time = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
            }
            AlarmEdit::Title(title) => self.title = title,
            AlarmEdit::Day(day, on) => self.days.set(day, on),
            AlarmEdit::Days(days) => self.days = days,
            AlarmEdit::Ringtone(ringtone) => self.ringtone = ringtone,
            AlarmEdit::Volume(volume) => self.volume = volume.clamp(0.0, 1.0),
            AlarmEdit::Vibrate(vibrate) => self.vibrate = vibrate,
            AlarmEdit::Enable(enabled) => self.enabled = enabled,
        }
    }

    #[must_use]
    pub fn time_label(&self, time_format: &str) -> String {
        self.time.format(time_format).to_string()
    }
}
