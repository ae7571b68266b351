//! The snapshot carried by every wake request, and its wire form.

use chrono::{NaiveDateTime, Weekday};
use log::warn;
use toml::{Table, Value};

use crate::alarm::{Alarm, Ringtone, WEEK};

/// used when a payload has no usable volume, loud enough to wake someone
pub const FALLBACK_VOLUME: f32 = 0.8;

const SNOOZED_SUFFIX: &str = " (snoozed)";
const TRIGGER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// everything needed to ring and act on one firing without going back to the store
#[derive(Debug, Clone, PartialEq)]
pub struct FiringState {
    pub alarm_id: String,
    pub title: String,
    pub volume: f32,
    pub vibrate: bool,
    pub ringtone: Option<Ringtone>,
    pub hour: u32,
    pub minute: u32,
    /// `None` for firings that are not tied to a day (or lost it in transit)
    pub weekday: Option<Weekday>,
    pub is_snooze: bool,
    /// when the wake request was due
    pub trigger_at: Option<NaiveDateTime>,
}

impl Default for FiringState {
    fn default() -> Self {
        Self {
            alarm_id: String::new(),
            title: "Alarm".to_string(),
            volume: FALLBACK_VOLUME,
            vibrate: true,
            ringtone: None,
            hour: 0,
            minute: 0,
            weekday: None,
            is_snooze: false,
            trigger_at: None,
        }
    }
}

impl FiringState {
    #[must_use]
    pub fn for_occurrence(alarm: &Alarm, weekday: Weekday, trigger_at: NaiveDateTime) -> Self {
        Self {
            alarm_id: alarm.id.clone(),
            title: alarm.title.clone(),
            volume: alarm.volume,
            vibrate: alarm.vibrate,
            ringtone: alarm.ringtone.clone(),
            hour: alarm.hour(),
            minute: alarm.minute(),
            weekday: Some(weekday),
            is_snooze: false,
            trigger_at: Some(trigger_at),
        }
    }

    /// the same alarm rung again later as a one shot
    #[must_use]
    pub fn snoozed(&self, trigger_at: NaiveDateTime) -> Self {
        let title = if self.title.ends_with(SNOOZED_SUFFIX) {
            self.title.clone()
        } else {
            format!("{}{SNOOZED_SUFFIX}", self.title)
        };
        Self {
            title,
            is_snooze: true,
            trigger_at: Some(trigger_at),
            ..self.clone()
        }
    }

    /// the same occurrence moved to a new trigger instant
    #[must_use]
    pub fn rearmed(&self, trigger_at: NaiveDateTime) -> Self {
        Self {
            is_snooze: false,
            trigger_at: Some(trigger_at),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn has_alarm(&self) -> bool {
        !self.alarm_id.trim().is_empty()
    }

    pub fn to_payload(&self) -> Result<Payload, toml::ser::Error> {
        let mut table = Table::new();
        table.insert("alarm_id".into(), Value::String(self.alarm_id.clone()));
        table.insert("title".into(), Value::String(self.title.clone()));
        table.insert("volume".into(), Value::Float(f64::from(self.volume)));
        table.insert("vibrate".into(), Value::Boolean(self.vibrate));
        if let Some(ringtone) = &self.ringtone {
            table.insert("ringtone_title".into(), Value::String(ringtone.title.clone()));
            table.insert("ringtone_uri".into(), Value::String(ringtone.uri.clone()));
        }
        table.insert("hour".into(), Value::Integer(i64::from(self.hour)));
        table.insert("minute".into(), Value::Integer(i64::from(self.minute)));
        if let Some(weekday) = self.weekday {
            table.insert(
                "weekday".into(),
                Value::Integer(i64::from(weekday.num_days_from_monday())),
            );
        }
        table.insert("is_snooze".into(), Value::Boolean(self.is_snooze));
        if let Some(trigger_at) = self.trigger_at {
            table.insert(
                "trigger_at".into(),
                Value::String(trigger_at.format(TRIGGER_FORMAT).to_string()),
            );
        }
        toml::to_string(&table).map(Payload)
    }
}

/// the encoded form of a [`FiringState`] handed to the alarm facility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(String);

impl Payload {
    #[must_use]
    pub const fn new(raw: String) -> Self {
        Self(raw)
    }

    /// never fails: fields that are missing or malformed fall back to defaults
    /// so the alarm still rings
    #[must_use]
    pub fn decode(&self) -> FiringState {
        let table = match self.0.parse::<Table>() {
            Ok(table) => table,
            Err(err) => {
                warn!("undecodable wake payload, ringing with defaults: {err}");
                return FiringState::default();
            }
        };
        let defaults = FiringState::default();
        let text = |key: &str| table.get(key).and_then(Value::as_str).map(str::to_string);
        let flag = |key: &str| table.get(key).and_then(Value::as_bool);
        let number = |key: &str| table.get(key).and_then(Value::as_integer);

        let volume = table
            .get("volume")
            .and_then(|volume| volume.as_float().or_else(|| volume.as_integer().map(|v| v as f64)))
            .map(|volume| volume as f32)
            .filter(|volume| (0.0..=1.0).contains(volume))
            .unwrap_or(defaults.volume);
        let ringtone = text("ringtone_uri").map(|uri| Ringtone {
            title: text("ringtone_title").unwrap_or_else(|| uri.clone()),
            uri,
        });

        FiringState {
            alarm_id: text("alarm_id").unwrap_or(defaults.alarm_id),
            title: text("title").unwrap_or(defaults.title),
            volume,
            vibrate: flag("vibrate").unwrap_or(defaults.vibrate),
            ringtone,
            hour: number("hour")
                .and_then(|hour| u32::try_from(hour).ok())
                .filter(|hour| *hour < 24)
                .unwrap_or(defaults.hour),
            minute: number("minute")
                .and_then(|minute| u32::try_from(minute).ok())
                .filter(|minute| *minute < 60)
                .unwrap_or(defaults.minute),
            weekday: number("weekday")
                .and_then(|ordinal| usize::try_from(ordinal).ok())
                .and_then(|ordinal| WEEK.get(ordinal).copied()),
            is_snooze: flag("is_snooze").unwrap_or(defaults.is_snooze),
            trigger_at: text("trigger_at")
                .and_then(|at| NaiveDateTime::parse_from_str(&at, TRIGGER_FORMAT).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn tuesday_seven() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap()
    }

    fn sample() -> FiringState {
        let mut alarm = Alarm::new_default();
        alarm.title = "work".to_string();
        alarm.volume = 0.3;
        alarm.vibrate = false;
        alarm.ringtone = Some(Ringtone::new("rain", "/sounds/rain.mp3"));
        FiringState::for_occurrence(&alarm, Weekday::Tue, tuesday_seven())
    }

    #[test]
    fn test_payload_carries_every_field() {
        let state = sample();
        let decoded = state.to_payload().unwrap().decode();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let decoded = Payload::new("alarm_id = \"abc\"\nhour = 6\n".to_string()).decode();
        assert_eq!(decoded.alarm_id, "abc");
        assert_eq!(decoded.hour, 6);
        assert!((decoded.volume - FALLBACK_VOLUME).abs() < f32::EPSILON);
        assert!(decoded.vibrate);
        assert_eq!(decoded.weekday, None);
        assert_eq!(decoded.trigger_at, None);
    }

    #[test]
    fn test_malformed_fields_are_defaulted() {
        let raw = "volume = \"loud\"\nhour = 99\nweekday = 12\ntrigger_at = \"soon\"\n";
        let decoded = Payload::new(raw.to_string()).decode();
        assert!((decoded.volume - FALLBACK_VOLUME).abs() < f32::EPSILON);
        assert_eq!(decoded.hour, 0);
        assert_eq!(decoded.weekday, None);
        assert_eq!(decoded.trigger_at, None);
    }

    #[test]
    fn test_garbage_payload_still_rings() {
        let decoded = Payload::new("{{ not toml".to_string()).decode();
        assert_eq!(decoded, FiringState::default());
    }

    #[test]
    fn test_snoozed_title_is_suffixed_once() {
        let state = sample();
        let snoozed = state.snoozed(tuesday_seven()).snoozed(tuesday_seven());
        assert_eq!(snoozed.title, "work (snoozed)");
        assert!(snoozed.is_snooze);
        assert_eq!(snoozed.weekday, Some(Weekday::Tue));
    }
}
