//! What a ringing alarm does to the host: sound, vibration, volume and the
//! on screen prompt. Which variant is used is decided once at startup from
//! [`Capabilities`].

use std::{
    io::{IsTerminal, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};

use crate::{alarm::Ringtone, communication::Resolution, firing_state::FiringState};

pub trait Ringer {
    /// starts looping `ringtone`, `None` rings silently
    fn start(&mut self, ringtone: Option<&Ringtone>, volume: f32);
    fn stop(&mut self);
}

pub trait Vibrator {
    fn start(&mut self);
    fn stop(&mut self);
}

/// raises the host's alarm volume while ringing and puts it back afterwards
pub trait VolumeDriver {
    fn override_level(&mut self, level: f32);
    fn restore(&mut self);
}

/// shows the ringing alarm to the user
pub trait Presenter {
    fn present(&mut self, state: &FiringState);
    fn clear(&mut self);
    fn finish(&mut self, resolution: Resolution);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub audio: bool,
    pub vibration: bool,
    pub volume_override: bool,
}

impl Capabilities {
    #[must_use]
    pub fn detect(allow_sound: bool) -> Self {
        Self {
            audio: allow_sound && cfg!(feature = "sound"),
            vibration: std::io::stderr().is_terminal(),
            volume_override: false,
        }
    }
}

pub struct Drivers {
    pub ringer: Box<dyn Ringer>,
    pub vibrator: Box<dyn Vibrator>,
    pub volume: Box<dyn VolumeDriver>,
    pub presenter: Box<dyn Presenter>,
}

impl Drivers {
    #[must_use]
    pub fn for_host(capabilities: Capabilities, time_format: &str) -> Self {
        let ringer: Box<dyn Ringer> = if capabilities.audio {
            audio_ringer().unwrap_or_else(|| Box::new(SilentRinger))
        } else {
            Box::new(SilentRinger)
        };
        let vibrator: Box<dyn Vibrator> = if capabilities.vibration {
            Box::new(BellVibrator::default())
        } else {
            Box::new(NoVibration)
        };
        info!("drivers selected for {capabilities:?}");
        Self {
            ringer,
            vibrator,
            volume: Box::new(FixedVolume),
            presenter: Box::new(TerminalPresenter::new(time_format)),
        }
    }
}

#[cfg(feature = "sound")]
fn audio_ringer() -> Option<Box<dyn Ringer>> {
    match RodioRinger::open() {
        Ok(ringer) => Some(Box::new(ringer)),
        Err(err) => {
            warn!("no audio output, ringing silently: {err}");
            None
        }
    }
}

#[cfg(not(feature = "sound"))]
fn audio_ringer() -> Option<Box<dyn Ringer>> {
    warn!("built without the `sound` feature, ringing silently");
    None
}

#[derive(Debug, Default)]
pub struct SilentRinger;

impl Ringer for SilentRinger {
    fn start(&mut self, ringtone: Option<&Ringtone>, volume: f32) {
        if let Some(ringtone) = ringtone {
            debug!("would ring {ringtone} at volume {volume}");
        }
    }

    fn stop(&mut self) {}
}

/// loops the ringtone file on the default audio output
#[cfg(feature = "sound")]
pub struct RodioRinger {
    // the stream has to outlive the sink or playback stops
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<rodio::Sink>,
}

#[cfg(feature = "sound")]
impl RodioRinger {
    pub fn open() -> Result<Self, rodio::StreamError> {
        let (stream, handle) = rodio::OutputStream::try_default()?;
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
        })
    }
}

#[cfg(feature = "sound")]
impl Ringer for RodioRinger {
    fn start(&mut self, ringtone: Option<&Ringtone>, volume: f32) {
        use rodio::Source;

        self.stop();
        let Some(ringtone) = ringtone else { return };
        let file = match std::fs::File::open(&ringtone.uri) {
            Ok(file) => file,
            Err(err) => {
                warn!("couldn't open ringtone {ringtone}: {err}");
                return;
            }
        };
        let source = match rodio::Decoder::new(std::io::BufReader::new(file)) {
            Ok(source) => source,
            Err(err) => {
                warn!("couldn't decode ringtone {ringtone}: {err}");
                return;
            }
        };
        match rodio::Sink::try_new(&self.handle) {
            Ok(sink) => {
                sink.set_volume(volume);
                sink.append(source.repeat_infinite());
                sink.play();
                self.sink = Some(sink);
            }
            Err(err) => warn!("couldn't play ringtone {ringtone}: {err}"),
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

/// for hosts that can't vibrate
#[derive(Debug, Default)]
pub struct NoVibration;

impl Vibrator for NoVibration {
    fn start(&mut self) {}

    fn stop(&mut self) {}
}

/// stands in for vibration on a terminal: rings the bell once a second
#[derive(Debug, Default)]
pub struct BellVibrator {
    running: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl Vibrator for BellVibrator {
    fn start(&mut self) {
        self.stop();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let pulses = thread::spawn(move || {
            while flag.load(Ordering::Relaxed) {
                let mut stderr = std::io::stderr();
                let _ = stderr.write_all(b"\x07");
                let _ = stderr.flush();
                thread::sleep(Duration::from_secs(1));
            }
        });
        self.running = Some((running, pulses));
    }

    fn stop(&mut self) {
        if let Some((running, pulses)) = self.running.take() {
            running.store(false, Ordering::Relaxed);
            let _ = pulses.join();
        }
    }
}

/// the host volume can't be changed from here, the ringer's own volume is used
#[derive(Debug, Default)]
pub struct FixedVolume;

impl VolumeDriver for FixedVolume {
    fn override_level(&mut self, level: f32) {
        debug!("host volume override to {level} not supported");
    }

    fn restore(&mut self) {}
}

/// prints the ringing alarm and how to answer it
#[derive(Debug)]
pub struct TerminalPresenter {
    time_format: String,
}

impl TerminalPresenter {
    #[must_use]
    pub fn new(time_format: &str) -> Self {
        Self {
            time_format: time_format.to_string(),
        }
    }
}

impl Presenter for TerminalPresenter {
    fn present(&mut self, state: &FiringState) {
        let time = chrono::NaiveTime::from_hms_opt(state.hour, state.minute, 0)
            .map(|time| time.format(&self.time_format).to_string())
            .unwrap_or_default();
        println!("alarm: {} {time}", state.title);
        println!("   [d]ismiss or [s]nooze");
    }

    fn clear(&mut self) {
        debug!("alarm prompt cleared");
    }

    fn finish(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Dismiss => println!("alarm dismissed"),
            Resolution::Snooze => println!("alarm snoozed"),
        }
    }
}
