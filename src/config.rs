use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    alarm::{Alarm, Ringtone},
    firing::DEFAULT_SNOOZE_MINUTES,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't find a home directory for the config")]
    NoProjectDirs,
    #[error("couldn't access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("couldn't parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// https://stackoverflow.com/questions/79314434/rust-serde-serialization-to-from-vec-into-hashmap
pub trait GetId<T> {
    fn get_id(&self) -> &T;
}

impl GetId<String> for Alarm {
    fn get_id(&self) -> &String {
        &self.id
    }
}

/// Serializable collection, written out as a list and kept as a map by id
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "Vec<V>", into = "Vec<V>")]
pub struct Collection<K, V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    pub data: BTreeMap<K, V>,
}

impl<K, V> Default for Collection<K, V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Collection<K, V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, item: V) -> Option<V> {
        let id = item.get_id().to_owned();
        self.data.insert(id, item)
    }

    pub fn remove(&mut self, id: &K) -> Option<V> {
        self.data.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &K) -> Option<&V> {
        self.data.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &K) -> bool {
        self.data.contains_key(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.data.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<K, V> From<Vec<V>> for Collection<K, V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    fn from(value: Vec<V>) -> Self {
        let mut obj: Self = Self::new();
        value.into_iter().for_each(|v| {
            obj.insert(v);
        });
        obj
    }
}

impl<K, V> From<Collection<K, V>> for Vec<V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    fn from(val: Collection<K, V>) -> Self {
        Self::from_iter(val.data.into_values())
    }
}

fn default_time_format() -> String {
    "%l:%M %p".to_string()
}

const fn default_snooze_minutes() -> u32 {
    DEFAULT_SNOOZE_MINUTES
}

const fn default_ring_timeout_minutes() -> u32 {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u32,
    /// 0 rings until answered
    #[serde(default = "default_ring_timeout_minutes")]
    pub ring_timeout_minutes: u32,
    #[serde(default)]
    pub alarms: Collection<String, Alarm>,
    /// ringtones alarms can pick by name
    #[serde(default)]
    pub ringtones: HashMap<String, Ringtone>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_format: default_time_format(),
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            ring_timeout_minutes: default_ring_timeout_minutes(),
            alarms: Collection::new(),
            ringtones: HashMap::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&config)?)
    }

    /// like [`Config::load`] but a missing file is an empty config
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, config)?;
        Ok(())
    }

    fn project_dirs() -> Result<directories::ProjectDirs, ConfigError> {
        directories::ProjectDirs::from("", "", "roosty_alarm").ok_or(ConfigError::NoProjectDirs)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let mut path = Self::project_dirs()?.config_dir().to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    pub fn sounds_path() -> Result<PathBuf, ConfigError> {
        let mut path = Self::project_dirs()?.data_dir().to_path_buf();
        path.push("sounds");
        Ok(path)
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }
}
