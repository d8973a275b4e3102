// MIDI output from note events.
//
// Converts a tick-ordered `NoteEvent` list (playback.rs) into a Standard
// MIDI File. Each voice maps to a separate MIDI track on its own channel;
// track 0 carries the tempo. One generator tick (an eighth note) maps to
// half a MIDI quarter, and the tempo is derived from the playback tick
// length so the file plays at the same speed as live playback.
//
// Uses the `midly` crate for MIDI writing. Output is SMF Format 1 (multi-track).

use crate::error::Result;
use crate::melody::{Melody, Voice};
use crate::playback::{EventKind, NoteEvent, note_events};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Ticks per eighth note (half a quarter note).
const TICKS_PER_EIGHTH: u32 = TICKS_PER_QUARTER as u32 / 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmfOptions {
    /// Seconds per generator tick.
    pub tick_seconds: f64,
    pub program: u8,
    pub velocity: u8,
}

impl Default for SmfOptions {
    fn default() -> Self {
        SmfOptions {
            tick_seconds: 0.25,
            program: 0,
            velocity: 100,
        }
    }
}

impl SmfOptions {
    fn microseconds_per_quarter(&self) -> u32 {
        let micros = (2.0 * self.tick_seconds * 1_000_000.0).round();
        if micros.is_finite() {
            micros.clamp(1.0, f64::from(0x00FF_FFFF)) as u32
        } else {
            500_000
        }
    }
}

/// Render both voices and write them to `path`.
pub fn write_midi(
    cantus: &Melody,
    counterpoint: &Melody,
    options: &SmfOptions,
    path: &Path,
) -> Result<()> {
    let smf = events_to_smf(&note_events(cantus, counterpoint), options);
    write_smf(&smf, path)
}

pub fn write_smf(smf: &Smf<'_>, path: &Path) -> Result<()> {
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Convert tick-ordered note events to an in-memory SMF.
pub fn events_to_smf(events: &[NoteEvent], options: &SmfOptions) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo track
    let tempo_track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
                options.microseconds_per_quarter(),
            ))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(tempo_track);

    for voice in Voice::BOTH {
        let channel = u4::new(voice.channel());
        let mut track: Track<'static> = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(voice.label().as_bytes())),
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange {
                        program: u7::new(options.program & 0x7F),
                    },
                },
            },
        ];

        let mut last_tick: u32 = 0;
        for event in events.iter().filter(|e| e.voice == voice) {
            let tick = event.tick * TICKS_PER_EIGHTH;
            let key = u7::new(event.pitch & 0x7F);
            let message = match event.kind {
                EventKind::On => MidiMessage::NoteOn {
                    key,
                    vel: u7::new(options.velocity & 0x7F),
                },
                EventKind::Off => MidiMessage::NoteOff { key, vel: u7::new(0) },
            };
            track.push(TrackEvent {
                delta: u28::new(tick - last_tick),
                kind: TrackEventKind::Midi { channel, message },
            });
            last_tick = tick;
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    smf
}
