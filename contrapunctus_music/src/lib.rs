// Contrapunctus: species-style counterpoint generator
//
// Composes a second voice against a fixed cantus firmus on an eighth-note
// grid. A randomized backtracking search picks one counterpoint note at a
// time; each candidate must pass harmonic (consonance, tritone, parallel
// perfect) and melodic (allowed leaps) rules, and the final two notes are
// forced into a cadence derived from the cantus's closing shape. When no
// candidate survives, the search rolls back and retries with fresh
// randomness, within bounded retry budgets.
//
// Architecture:
// - melody.rs: Notes, melodies and tick lookups; melodic extremum tracking
// - scale.rs: The two 13-pitch scale variants (natural / lowered seventh)
// - harmony.rs: Interval classification, metrical classes, durations,
//   sustain state between the two voices
// - rules.rs: Rule tables, cadence detection and the per-decision search
// - generator.rs: The run loop with rollback and escalation
// - config.rs: JSON configuration with built-in defaults (chorale cantus)
// - midi.rs: Standard MIDI File output
// - lilypond.rs: LilyPond sheet music output (.ly files for engraving)
// - musescore.rs: MuseScore template export of the counterpoint
// - playback.rs: Note events and real-time playback through a driver chain
// - error.rs: The crate error type
//
// The generator is deterministic given a seed, supporting reproducible output.

pub mod config;
pub mod error;
pub mod generator;
pub mod harmony;
pub mod lilypond;
pub mod melody;
pub mod midi;
pub mod musescore;
pub mod playback;
pub mod rules;
pub mod scale;
