use std::{
    io::BufRead,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::Sender;
use log::{debug, info};

use crate::{facility::TimerTable, firing_state::Payload, time_calc::Clock};

/// how the user answered a ringing alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Dismiss,
    Snooze,
}

impl Resolution {
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "d" | "dismiss" | "stop" => Some(Self::Dismiss),
            "s" | "snooze" => Some(Self::Snooze),
            _ => None,
        }
    }
}

/// everything the daemon's event loop reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// the alarm facility delivered a wake request
    Wake(Payload),
    /// the user answered the ringing alarm
    Resolve(Resolution),
    /// alarms changed on disk, re-arm all of them
    Reload,
    Shutdown,
}

/// polls the timer table and forwards every due request as a [`Message::Wake`].
/// stops once the receiving side is gone
pub fn spawn_wake_thread<C>(
    table: TimerTable,
    clock: C,
    sender: Sender<Message>,
    poll: Duration,
) -> JoinHandle<()>
where
    C: Clock + Send + 'static,
{
    thread::spawn(move || loop {
        for registration in table.take_due(clock.now()) {
            debug!("wake request {} is due", registration.id);
            if sender.send(Message::Wake(registration.payload)).is_err() {
                return;
            }
        }
        thread::sleep(poll);
    })
}

/// turns lines typed by the user into messages:
/// `d`/`dismiss`, `s`/`snooze`, `r`/`reload` and `q`/`quit`
pub fn spawn_input_thread<R>(input: R, sender: Sender<Message>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else { break };
            let message = match line.trim() {
                "r" | "reload" => Message::Reload,
                "q" | "quit" => Message::Shutdown,
                other => match Resolution::parse(other) {
                    Some(resolution) => Message::Resolve(resolution),
                    None => {
                        info!("ignoring unknown input `{other}`");
                        continue;
                    }
                },
            };
            let shutdown = message == Message::Shutdown;
            if sender.send(message).is_err() || shutdown {
                return;
            }
        }
        // input closed, alarms can still time out on their own
        info!("no more input, alarms have to be answered by timing out");
    })
}
