use std::{
    error::Error,
    io::BufReader,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use clap::{command, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use log::{error, info};
use roosty_alarm::{
    alarm::{parse_time, Alarm, AlarmEdit, Days, Ringtone},
    communication::{spawn_input_thread, spawn_wake_thread, Message},
    config::Config,
    drivers::{Capabilities, Drivers},
    edit::{self, AlarmDraft, EditAction, EditingState},
    facility::{AlarmFacility, TimerTable},
    firing::FiringHandler,
    scheduler::Scheduler,
    store::{AlarmStore, FileStore},
    time_calc::{describe_until, until_next, Clock, SystemClock},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// writes a fresh config file
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// adds a ringtone alarms can pick by name
    NewSound { name: String, path: PathBuf },
    /// adds an alarm
    NewAlarm {
        /// HH:MM, 24 hour
        time: String,
        /// `mon,wed`, `daily`, `weekdays` or `weekends`
        #[clap(long, short, default_value = "daily")]
        days: String,
        #[clap(long, short)]
        title: Option<String>,
        /// name of a ringtone added with new-sound, rings silently without one
        #[clap(long, short)]
        sound: Option<String>,
        /// 0.0 to 1.0
        #[clap(long, short)]
        volume: Option<f32>,
        #[clap(long)]
        no_vibrate: bool,
        /// saves the alarm turned off
        #[clap(long)]
        disabled: bool,
    },
    /// changes an alarm
    Edit {
        id: String,
        #[clap(long)]
        time: Option<String>,
        #[clap(long, short)]
        days: Option<String>,
        #[clap(long, short)]
        title: Option<String>,
        /// ringtone name, or `none` to ring silently
        #[clap(long, short)]
        sound: Option<String>,
        #[clap(long, short)]
        volume: Option<f32>,
        #[clap(long)]
        vibrate: Option<bool>,
    },
    /// lists all alarms
    List,
    /// shows which alarm goes off next
    Next,
    Enable { id: String },
    Disable { id: String },
    Remove { id: String },
    /// rings alarms as they come due (the default)
    Run {
        #[clap(long)]
        no_sound: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    if let Err(err) = simple_file_logger::init_logger!("roosty_alarm") {
        eprintln!("couldn't initialize logger: {err:?}");
    }

    let args = Args::parse();
    match args.command {
        Some(Command::Init { force }) => {
            if force || !Config::is_config_present() {
                let path = Config::config_path()?;
                Config::new().save(&path)?;
                std::fs::create_dir_all(Config::sounds_path()?)?;
                println!("wrote {}", path.display());
            } else {
                println!("config already exists, use --force to overwrite it");
            }
            Ok(())
        }
        Some(Command::NewSound { name, path }) => {
            let mut store = open_store()?;
            let ringtone = Ringtone::new(name.clone(), path.to_string_lossy());
            store.update(|config| {
                config.ringtones.insert(name, ringtone);
            })?;
            Ok(())
        }
        Some(Command::NewAlarm {
            time,
            days,
            title,
            sound,
            volume,
            no_vibrate,
            disabled,
        }) => {
            let mut store = open_store()?;
            let mut edits = vec![
                AlarmEdit::Time(parse_time(&time)?),
                AlarmEdit::Days(Days::parse_list(&days)?),
                AlarmEdit::Vibrate(!no_vibrate),
                AlarmEdit::Enable(!disabled),
            ];
            edits.extend(title.map(AlarmEdit::Title));
            edits.extend(volume.map(AlarmEdit::Volume));
            if let Some(sound) = sound {
                edits.push(AlarmEdit::Ringtone(find_ringtone(store.config(), &sound)?));
            }
            save_draft(&mut store, AlarmDraft::new_alarm(), edits)
        }
        Some(Command::Edit {
            id,
            time,
            days,
            title,
            sound,
            volume,
            vibrate,
        }) => {
            let mut store = open_store()?;
            let alarm = store.get(&id).ok_or_else(|| format!("no alarm with id {id}"))?;
            let mut edits = vec![];
            if let Some(time) = time {
                edits.push(AlarmEdit::Time(parse_time(&time)?));
            }
            if let Some(days) = days {
                edits.push(AlarmEdit::Days(Days::parse_list(&days)?));
            }
            edits.extend(title.map(AlarmEdit::Title));
            edits.extend(volume.map(AlarmEdit::Volume));
            edits.extend(vibrate.map(AlarmEdit::Vibrate));
            if let Some(sound) = sound {
                edits.push(AlarmEdit::Ringtone(find_ringtone(store.config(), &sound)?));
            }
            save_draft(&mut store, AlarmDraft::edit(alarm), edits)
        }
        Some(Command::List) => {
            let store = open_store()?;
            let time_format = store.config().time_format.clone();
            for alarm in store.all() {
                println!("{}", describe_alarm(&alarm, &time_format));
            }
            Ok(())
        }
        Some(Command::Next) => {
            let store = open_store()?;
            let scheduler = Scheduler::new(TimerTable::new(), SystemClock);
            match scheduler.next_alarm(&store.all()) {
                Some((alarm, at)) => println!(
                    "{} at {} (in {})",
                    alarm.title,
                    at.format("%a %Y-%m-%d %H:%M"),
                    describe_until(at - SystemClock.now())
                ),
                None => println!("no alarms are on"),
            }
            Ok(())
        }
        Some(Command::Enable { id }) => toggle(&id, true),
        Some(Command::Disable { id }) => toggle(&id, false),
        Some(Command::Remove { id }) => {
            let mut store = open_store()?;
            let mut scheduler = Scheduler::new(TimerTable::new(), SystemClock);
            match edit::remove(&mut store, &mut scheduler, &id)? {
                Some(alarm) => println!("removed {} ({})", alarm.title, alarm.id),
                None => println!("no alarm with id {id}"),
            }
            Ok(())
        }
        Some(Command::Run { no_sound }) => run(no_sound),
        None => run(false),
    }
}

fn open_store() -> Result<FileStore, Box<dyn Error>> {
    Ok(FileStore::open(Config::config_path()?)?)
}

fn find_ringtone(config: &Config, name: &str) -> Result<Option<Ringtone>, Box<dyn Error>> {
    if matches!(name, "none" | "silent") {
        return Ok(None);
    }
    config
        .ringtones
        .get(name)
        .cloned()
        .map(Some)
        .ok_or_else(|| format!("unknown sound `{name}`, add it with new-sound").into())
}

/// applies the edits and saves the alarm.
/// arming happens in a throwaway scheduler so the user sees when it will ring,
/// the running daemon re-arms it once it notices the config changed
fn save_draft(
    store: &mut FileStore,
    mut draft: AlarmDraft,
    edits: Vec<AlarmEdit>,
) -> Result<(), Box<dyn Error>> {
    let actions = edits
        .into_iter()
        .map(EditAction::Edit)
        .chain([EditAction::Done]);
    let EditingState::Done(alarm) = draft.run(actions) else {
        return Ok(());
    };
    let mut scheduler = Scheduler::new(TimerTable::new(), SystemClock);
    let outcome = edit::commit(store, &mut scheduler, alarm.clone())?;
    println!("{}", describe_alarm(&alarm, &store.config().time_format));
    if outcome.armed > 0 {
        let until = until_next(alarm.time, alarm.days, SystemClock.now());
        println!("alarm set for {} from now", describe_until(until));
    }
    Ok(())
}

fn toggle(id: &str, enabled: bool) -> Result<(), Box<dyn Error>> {
    let mut store = open_store()?;
    let mut scheduler = Scheduler::new(TimerTable::new(), SystemClock);
    match edit::set_enabled(&mut store, &mut scheduler, id, enabled)? {
        Some(outcome) if enabled => println!("alarm on, {} day(s) armed", outcome.armed),
        Some(_) => println!("alarm off"),
        None => println!("no alarm with id {id}"),
    }
    Ok(())
}

fn describe_alarm(alarm: &Alarm, time_format: &str) -> String {
    format!(
        "{}  {}  {}  [{}]  {}  {}  vol {:.0}%{}",
        alarm.id,
        alarm.time_label(time_format),
        alarm.title,
        alarm.days,
        if alarm.enabled { "on" } else { "off" },
        alarm
            .ringtone
            .as_ref()
            .map_or_else(|| "silent".to_string(), |ringtone| ringtone.title.clone()),
        alarm.volume * 100.0,
        if alarm.vibrate { "  vibrate" } else { "" },
    )
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn reload<F: AlarmFacility, C: Clock>(store: &mut FileStore, handler: &mut FiringHandler<F, C>) {
    match store.reload() {
        Ok(()) => {
            handler.scheduler_mut().resync(&store.all());
        }
        Err(err) => error!("couldn't reload alarms: {err}"),
    }
}

fn run(no_sound: bool) -> Result<(), Box<dyn Error>> {
    let mut store = open_store()?;
    let config = store.config().clone();
    let table = TimerTable::new();
    let drivers = Drivers::for_host(Capabilities::detect(!no_sound), &config.time_format);
    let mut handler = FiringHandler::new(Scheduler::new(table.clone(), SystemClock), drivers)
        .with_snooze_minutes(config.snooze_minutes)
        .with_ring_timeout(config.ring_timeout_minutes);

    // nothing registered survives a restart, so arm everything again
    let report = handler.scheduler_mut().reschedule_all(&store.enabled());
    println!(
        "armed {} occurrence(s), {} failed. [d]ismiss, [s]nooze, [r]eload, [q]uit",
        report.armed, report.failed
    );

    let (sender, receiver) = crossbeam_channel::unbounded();
    spawn_wake_thread(table, SystemClock, sender.clone(), Duration::from_millis(500));
    spawn_input_thread(BufReader::new(std::io::stdin()), sender);

    let mut last_modified = modified(store.path());
    loop {
        match receiver.recv_timeout(Duration::from_secs(1)) {
            Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Message::Reload) => reload(&mut store, &mut handler),
            Ok(message) => handler.handle(message),
            Err(RecvTimeoutError::Timeout) => {
                handler.expire_overdue();
                let now_modified = modified(store.path());
                if now_modified != last_modified {
                    last_modified = now_modified;
                    info!("config changed on disk");
                    reload(&mut store, &mut handler);
                }
            }
        }
    }
    info!("shutting down");
    Ok(())
}
