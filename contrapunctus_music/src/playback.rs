// Real-time playback of a finished two-voice setting.
//
// The finished melodies are flattened into `NoteEvent`s (one on and one off
// per note), sorted by tick with note-offs before note-ons so a repeated
// pitch is released before it is struck again. `Player` then walks the
// events in order against a wall-clock schedule of `tick_seconds` per tick
// and hands each one to a `PlaybackDriver`.
//
// Drivers are tried in the configured preference order; a driver that
// fails to start is logged and skipped. Presets are likewise tried in
// order per channel. Built-in drivers:
//   - "smf": collects the events and writes a Standard MIDI File (midi.rs)
//     when playback finishes;
//   - "log": reports every event through `tracing`;
//   - "midi-port" (feature `midi-out`): streams to a live MIDI output port,
//     for example a running software synthesizer.
//
// Playback blocks until the last event and the fade-out have passed.

use crate::error::{Error, Result};
use crate::melody::{Melody, Tick, Voice, pitch_name};
use crate::midi::{SmfOptions, events_to_smf, write_smf};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// MIDI controller number for channel volume.
pub const CC_VOLUME: u8 = 7;
/// MIDI controller number for expression.
pub const CC_EXPRESSION: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // Off sorts before On.
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub tick: Tick,
    pub kind: EventKind,
    pub pitch: u8,
    pub voice: Voice,
}

/// Flatten both voices into a tick-ordered event list.
pub fn note_events(cantus: &Melody, counterpoint: &Melody) -> Vec<NoteEvent> {
    let mut events = Vec::with_capacity(2 * (cantus.len() + counterpoint.len()));
    for (voice, melody) in [(Voice::Cantus, cantus), (Voice::Counterpoint, counterpoint)] {
        for (onset, note) in melody.onsets() {
            events.push(NoteEvent {
                tick: onset,
                kind: EventKind::On,
                pitch: note.pitch,
                voice,
            });
            events.push(NoteEvent {
                tick: onset + note.duration,
                kind: EventKind::Off,
                pitch: note.pitch,
                voice,
            });
        }
    }
    events.sort_by_key(|e| (e.tick, e.kind));
    events
}

/// A General MIDI bank/program pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub bank: u16,
    pub program: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Wall-clock length of one tick (one eighth note).
    pub tick_seconds: f64,
    pub fadeout_seconds: f64,
    /// Driver names, most preferred first.
    pub drivers: Vec<String>,
    /// Presets to try per channel, first success wins.
    pub presets: Vec<Preset>,
    pub velocity: u8,
    pub cc_volume: u8,
    pub cc_expression: u8,
    /// Output file of the "smf" driver.
    pub smf_path: PathBuf,
    /// Substring of the output port name the "midi-port" driver connects to.
    pub midi_port: String,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        PlaybackSettings {
            tick_seconds: 0.25,
            fadeout_seconds: 1.0,
            drivers: vec!["midi-port".into(), "smf".into(), "log".into()],
            presets: vec![
                Preset { bank: 0, program: 0 },
                Preset { bank: 0, program: 65 },
            ],
            velocity: 100,
            cc_volume: 127,
            cc_expression: 127,
            smf_path: PathBuf::from("counterpoint.mid"),
            midi_port: "FLUID".into(),
        }
    }
}

impl PlaybackSettings {
    fn tick_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.tick_seconds).unwrap_or(Duration::ZERO)
    }

    fn fadeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.fadeout_seconds).unwrap_or(Duration::ZERO)
    }
}

/// An output device the player can drive.
pub trait PlaybackDriver {
    fn name(&self) -> &str;

    /// Open the device. A failure makes the player move on to the next driver.
    fn start(&mut self) -> Result<()>;

    fn select_preset(&mut self, channel: u8, preset: Preset) -> Result<()>;

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<()>;

    fn dispatch(&mut self, event: &NoteEvent, velocity: u8) -> Result<()>;

    /// Release the device after the fade-out.
    fn finish(&mut self) -> Result<()>;
}

/// Build the drivers named in `settings`, in preference order. Unknown
/// names are skipped with a warning.
pub fn drivers_from_settings(settings: &PlaybackSettings) -> Vec<Box<dyn PlaybackDriver>> {
    let mut drivers: Vec<Box<dyn PlaybackDriver>> = Vec::new();
    for name in &settings.drivers {
        match name.as_str() {
            "smf" => drivers.push(Box::new(SmfDriver::new(
                settings.smf_path.clone(),
                settings.tick_seconds,
            ))),
            "log" => drivers.push(Box::new(LogDriver::default())),
            #[cfg(feature = "midi-out")]
            "midi-port" => drivers.push(Box::new(port::MidiPortDriver::new(&settings.midi_port))),
            other => warn!(driver = other, "unknown or unavailable playback driver"),
        }
    }
    drivers
}

pub struct Player {
    settings: PlaybackSettings,
}

impl Player {
    pub fn new(settings: PlaybackSettings) -> Self {
        Player { settings }
    }

    /// Play `events` on the first driver that starts. Returns its name.
    pub fn play(
        &self,
        events: &[NoteEvent],
        drivers: Vec<Box<dyn PlaybackDriver>>,
    ) -> Result<String> {
        let mut tried = Vec::new();
        for mut driver in drivers {
            let name = driver.name().to_string();
            match driver.start() {
                Ok(()) => {
                    info!(driver = %name, "playback driver started");
                    self.perform(driver.as_mut(), events)?;
                    return Ok(name);
                }
                Err(e) => {
                    warn!(driver = %name, error = %e, "playback driver failed to start");
                    tried.push(name);
                }
            }
        }
        Err(Error::NoPlaybackDriver { tried })
    }

    /// Play on an already started driver.
    pub fn perform(&self, driver: &mut dyn PlaybackDriver, events: &[NoteEvent]) -> Result<()> {
        for voice in Voice::BOTH {
            let channel = voice.channel();
            let selected = self
                .settings
                .presets
                .iter()
                .find(|&&preset| driver.select_preset(channel, preset).is_ok());
            match selected {
                Some(preset) => debug!(channel, bank = preset.bank, program = preset.program, "preset selected"),
                None => warn!(channel, "no preset could be selected, keeping the driver default"),
            }
            for (controller, value) in [
                (CC_VOLUME, self.settings.cc_volume),
                (CC_EXPRESSION, self.settings.cc_expression),
            ] {
                if let Err(e) = driver.control_change(channel, controller, value) {
                    warn!(channel, controller, error = %e, "control change rejected");
                }
            }
        }

        let tick = self.settings.tick_duration();
        let start = Instant::now();
        for event in events {
            sleep_until(start + tick * event.tick);
            driver.dispatch(event, self.settings.velocity)?;
        }
        thread::sleep(self.settings.fadeout());
        driver.finish()
    }
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

/// Collects events and writes them as a Standard MIDI File on finish.
pub struct SmfDriver {
    path: PathBuf,
    options: SmfOptions,
    events: Vec<NoteEvent>,
}

impl SmfDriver {
    pub fn new(path: PathBuf, tick_seconds: f64) -> Self {
        SmfDriver {
            path,
            options: SmfOptions {
                tick_seconds,
                ..SmfOptions::default()
            },
            events: Vec::new(),
        }
    }
}

impl PlaybackDriver for SmfDriver {
    fn name(&self) -> &str {
        "smf"
    }

    fn start(&mut self) -> Result<()> {
        self.events.clear();
        Ok(())
    }

    fn select_preset(&mut self, _channel: u8, preset: Preset) -> Result<()> {
        self.options.program = preset.program;
        Ok(())
    }

    fn control_change(&mut self, _channel: u8, _controller: u8, _value: u8) -> Result<()> {
        Ok(())
    }

    fn dispatch(&mut self, event: &NoteEvent, velocity: u8) -> Result<()> {
        self.options.velocity = velocity;
        self.events.push(*event);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let smf = events_to_smf(&self.events, &self.options);
        write_smf(&smf, &self.path)?;
        info!(path = %self.path.display(), "playback written as MIDI file");
        Ok(())
    }
}

/// Reports events through the log instead of sounding them.
#[derive(Debug, Default)]
pub struct LogDriver {
    dispatched: usize,
}

impl PlaybackDriver for LogDriver {
    fn name(&self) -> &str {
        "log"
    }

    fn start(&mut self) -> Result<()> {
        self.dispatched = 0;
        Ok(())
    }

    fn select_preset(&mut self, channel: u8, preset: Preset) -> Result<()> {
        info!(channel, bank = preset.bank, program = preset.program, "preset");
        Ok(())
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<()> {
        debug!(channel, controller, value, "control change");
        Ok(())
    }

    fn dispatch(&mut self, event: &NoteEvent, velocity: u8) -> Result<()> {
        self.dispatched += 1;
        info!(
            tick = event.tick,
            voice = event.voice.label(),
            kind = ?event.kind,
            pitch = %pitch_name(event.pitch),
            velocity,
            "note"
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!(events = self.dispatched, "playback finished");
        Ok(())
    }
}

#[cfg(feature = "midi-out")]
mod port {
    use super::{EventKind, NoteEvent, PlaybackDriver, Preset};
    use crate::error::{Error, Result};
    use midir::{MidiOutput, MidiOutputConnection};

    /// Streams events to the first MIDI output port whose name contains a
    /// configured substring.
    pub struct MidiPortDriver {
        port_match: String,
        connection: Option<MidiOutputConnection>,
    }

    impl MidiPortDriver {
        pub fn new(port_match: &str) -> Self {
            MidiPortDriver {
                port_match: port_match.to_lowercase(),
                connection: None,
            }
        }

        fn send(&mut self, bytes: &[u8]) -> Result<()> {
            let connection = self.connection.as_mut().ok_or_else(|| driver_error("not connected"))?;
            connection.send(bytes).map_err(|e| driver_error(&e.to_string()))
        }
    }

    fn driver_error(message: &str) -> Error {
        Error::Driver {
            driver: "midi-port".into(),
            message: message.into(),
        }
    }

    impl PlaybackDriver for MidiPortDriver {
        fn name(&self) -> &str {
            "midi-port"
        }

        fn start(&mut self) -> Result<()> {
            let output = MidiOutput::new("contrapunctus").map_err(|e| driver_error(&e.to_string()))?;
            let ports = output.ports();
            let port = ports
                .iter()
                .find(|p| {
                    output
                        .port_name(p)
                        .is_ok_and(|name| name.to_lowercase().contains(&self.port_match))
                })
                .ok_or_else(|| driver_error(&format!("no output port matching '{}'", self.port_match)))?;
            let connection = output
                .connect(port, "contrapunctus-out")
                .map_err(|e| driver_error(&e.to_string()))?;
            self.connection = Some(connection);
            Ok(())
        }

        fn select_preset(&mut self, channel: u8, preset: Preset) -> Result<()> {
            let channel = channel.min(15);
            // Bank select MSB/LSB, then program change.
            self.send(&[0xB0 | channel, 0, ((preset.bank >> 7) & 0x7F) as u8])?;
            self.send(&[0xB0 | channel, 32, (preset.bank & 0x7F) as u8])?;
            self.send(&[0xC0 | channel, preset.program & 0x7F])
        }

        fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<()> {
            self.send(&[0xB0 | channel.min(15), controller & 0x7F, value & 0x7F])
        }

        fn dispatch(&mut self, event: &NoteEvent, velocity: u8) -> Result<()> {
            let channel = event.voice.channel().min(15);
            let (status, velocity) = match event.kind {
                EventKind::On => (0x90 | channel, velocity & 0x7F),
                EventKind::Off => (0x80 | channel, 0),
            };
            self.send(&[status, event.pitch & 0x7F, velocity])
        }

        fn finish(&mut self) -> Result<()> {
            drop(self.connection.take());
            Ok(())
        }
    }
}
