// Error type for the counterpoint generator and its collaborators.
//
// Classification failures, malformed cadences, and exhausted retry budgets
// are hard errors here; nothing in the crate prints a warning and silently
// substitutes a default classification.

use crate::melody::Tick;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// An interval fell outside every consonance class after octave reduction.
    #[error("interval {interval} (reduced to {reduced}) has no consonance classification")]
    UnclassifiedInterval { interval: u8, reduced: u8 },

    /// A tick's remainder within the measure matched no metrical class.
    #[error("measure remainder {remainder} has no metrical classification")]
    UnclassifiedPosition { remainder: Tick },

    /// The cantus does not approach its final note by a recognized clausula.
    #[error(
        "cantus ends {penultimate} -> {last}: neither a tenor clausula (step of 2 down \
         into the final note) nor a soprano clausula"
    )]
    MalformedCadence { penultimate: u8, last: u8 },

    /// The backtracking search exceeded its retry budget.
    #[error("generation failed at tick {position} after {attempts} rollbacks")]
    GenerationFailed { position: Tick, attempts: u32 },

    /// Every admitted opening duration would run into a tritone pair or a
    /// repeated perfect interval.
    #[error("no duration at tick {position} keeps the opening {pitch} clear of the cantus")]
    OpeningBlocked { position: Tick, pitch: u8 },

    #[error("tick {position} lies outside the cantus (length {length})")]
    PositionOutOfRange { position: Tick, length: Tick },

    #[error("cantus needs at least two notes to form a cadence, got {notes}")]
    CantusTooShort { notes: usize },

    #[error("note {index} has zero duration")]
    ZeroDuration { index: usize },

    #[error("scale table must hold {expected} ascending pitches, got {actual:?}")]
    InvalidScale { expected: usize, actual: Vec<u8> },

    #[error("extremum tracker saw note {index} after note {previous}; indices must increase")]
    ExtremaOutOfOrder { previous: usize, index: usize },

    #[error("pitch {pitch} has no scale step below it")]
    NoStepBelow { pitch: u8 },

    #[error("no notation glyph for duration {duration}")]
    UnsupportedDuration { duration: Tick },

    #[error("template of {len} bytes cannot be split into a {head}-byte head and {tail}-byte tail")]
    TemplateSplit { len: usize, head: usize, tail: usize },

    #[error("no playback driver could be started (tried: {})", .tried.join(", "))]
    NoPlaybackDriver { tried: Vec<String> },

    #[error("playback driver {driver}: {message}")]
    Driver { driver: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
