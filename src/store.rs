//! Where alarms are kept between runs.

use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info};
use thiserror::Error;

use crate::{
    alarm::Alarm,
    config::{Collection, Config, ConfigError},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("alarm store is full ({limit} alarms)")]
    Full { limit: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub trait AlarmStore {
    /// every alarm, earliest time of day first
    fn all(&self) -> Vec<Alarm>;
    fn get(&self, id: &str) -> Option<Alarm>;
    fn upsert(&mut self, alarm: Alarm) -> Result<(), StoreError>;
    fn delete(&mut self, id: &str) -> Result<Option<Alarm>, StoreError>;
    /// receives the full list of alarms now and after every change
    fn subscribe(&mut self) -> Receiver<Vec<Alarm>>;

    fn enabled(&self) -> Vec<Alarm> {
        self.all().into_iter().filter(|alarm| alarm.enabled).collect()
    }
}

#[derive(Debug, Default)]
struct Subscribers {
    senders: Vec<Sender<Vec<Alarm>>>,
}

impl Subscribers {
    fn subscribe(&mut self, current: Vec<Alarm>) -> Receiver<Vec<Alarm>> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        // can't fail, the receiver is right here
        let _ = sender.send(current);
        self.senders.push(sender);
        receiver
    }

    /// drops subscribers that went away
    fn notify(&mut self, alarms: &[Alarm]) {
        self.senders
            .retain(|sender| sender.send(alarms.to_vec()).is_ok());
    }
}

fn sorted(alarms: &Collection<String, Alarm>) -> Vec<Alarm> {
    let mut alarms = alarms.values().cloned().collect::<Vec<_>>();
    alarms.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
    alarms
}

/// alarms kept in memory, optionally capped
#[derive(Debug, Default)]
pub struct MemoryStore {
    alarms: Collection<String, Alarm>,
    capacity: Option<usize>,
    subscribers: Subscribers,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(limit: usize) -> Self {
        Self {
            capacity: Some(limit),
            ..Self::default()
        }
    }
}

impl AlarmStore for MemoryStore {
    fn all(&self) -> Vec<Alarm> {
        sorted(&self.alarms)
    }

    fn get(&self, id: &str) -> Option<Alarm> {
        self.alarms.get(&id.to_string()).cloned()
    }

    fn upsert(&mut self, mut alarm: Alarm) -> Result<(), StoreError> {
        if let Some(limit) = self.capacity {
            if !self.alarms.contains(&alarm.id) && self.alarms.len() >= limit {
                return Err(StoreError::Full { limit });
            }
        }
        alarm.is_new = false;
        self.alarms.insert(alarm);
        self.subscribers.notify(&sorted(&self.alarms));
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<Option<Alarm>, StoreError> {
        let removed = self.alarms.remove(&id.to_string());
        if removed.is_some() {
            self.subscribers.notify(&sorted(&self.alarms));
        }
        Ok(removed)
    }

    fn subscribe(&mut self) -> Receiver<Vec<Alarm>> {
        self.subscribers.subscribe(sorted(&self.alarms))
    }
}

/// alarms kept in the config file, written through on every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    config: Config,
    subscribers: Subscribers,
}

impl FileStore {
    /// opens the config at `path`, a missing file starts out empty
    pub fn open(path: PathBuf) -> Result<Self, ConfigError> {
        let config = Config::load_or_default(&path)?;
        debug!(
            "loaded {} alarm(s) from {}",
            config.alarms.len(),
            path.display()
        );
        Ok(Self {
            path,
            config,
            subscribers: Subscribers::default(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// applies `change` to the config and writes it out.
    /// nothing changes in memory if writing fails
    pub fn update(&mut self, change: impl FnOnce(&mut Config)) -> Result<(), StoreError> {
        let mut config = self.config.clone();
        change(&mut config);
        config.save(&self.path)?;
        self.config = config;
        self.subscribers.notify(&sorted(&self.config.alarms));
        Ok(())
    }

    /// re-reads the file after someone else changed it
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.config = Config::load_or_default(&self.path)?;
        info!("reloaded {} alarm(s)", self.config.alarms.len());
        self.subscribers.notify(&sorted(&self.config.alarms));
        Ok(())
    }
}

impl AlarmStore for FileStore {
    fn all(&self) -> Vec<Alarm> {
        sorted(&self.config.alarms)
    }

    fn get(&self, id: &str) -> Option<Alarm> {
        self.config.alarms.get(&id.to_string()).cloned()
    }

    fn upsert(&mut self, mut alarm: Alarm) -> Result<(), StoreError> {
        alarm.is_new = false;
        self.update(|config| {
            config.alarms.insert(alarm);
        })
    }

    fn delete(&mut self, id: &str) -> Result<Option<Alarm>, StoreError> {
        let Some(existing) = self.get(id) else {
            return Ok(None);
        };
        self.update(|config| {
            config.alarms.remove(&id.to_string());
        })?;
        Ok(Some(existing))
    }

    fn subscribe(&mut self) -> Receiver<Vec<Alarm>> {
        self.subscribers.subscribe(sorted(&self.config.alarms))
    }
}
