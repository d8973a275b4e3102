// Harmonic analysis: interval classification, metrical position, and the
// durations each metrical position admits.
//
// Intervals are flat numeric distances between two MIDI pitches, not
// spelled music-theoretic intervals. Consonance classification folds
// intervals above an octave down by 12 once; anything that still falls
// outside the three consonance classes is an `UnclassifiedInterval` error.
//
// The measure is 8 ticks (a 4/4 bar of eighths). Downbeats (ticks 0 and 4)
// admit every note value up to a whole note; the weak halves (2 and 6)
// admit values up to a half note; the off-beat eighths admit only eighths
// and quarters.
//
// Also here: `IntervalRecord`, one entry of the interval history the
// generator keeps, and `SustainState`, the "which voice is holding"
// classification the dissonance rules in rules.rs are built on.

use crate::error::{Error, Result};
use crate::melody::{Melody, Tick, Voice};
use contrapunctus_prng::SeededRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticks per measure.
pub const MEASURE_TICKS: Tick = 8;

/// Interval values that count as perfect consonances.
pub const PERFECT_INTERVALS: [u8; 3] = [0, 7, 12];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalQuality {
    PerfectConsonance,
    ImperfectConsonance,
    Dissonance,
}

impl IntervalQuality {
    pub fn is_consonant(self) -> bool {
        self != IntervalQuality::Dissonance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricalClass {
    /// Ticks 0 and 4 of the measure.
    DownBeat,
    /// Ticks 2 and 6.
    WeakHalf,
    /// The odd ticks.
    WeakQuarter,
}

impl MetricalClass {
    /// Note values (in ticks) that may begin at a position of this class.
    pub fn allowed_durations(self) -> &'static [Tick] {
        match self {
            MetricalClass::DownBeat => &[1, 2, 3, 4, 6, 8],
            MetricalClass::WeakHalf => &[1, 2, 3, 4],
            MetricalClass::WeakQuarter => &[1, 2],
        }
    }

    /// Whether a rest of a half note or longer may begin here.
    pub fn admits_long_rest(self) -> bool {
        self == MetricalClass::DownBeat
    }
}

/// Absolute distance between two pitches.
pub fn interval(pitch_a: u8, pitch_b: u8) -> u8 {
    pitch_a.abs_diff(pitch_b)
}

/// Fold an interval above the octave down by one octave.
pub fn reduce_interval(interval: u8) -> u8 {
    if interval > 12 { interval - 12 } else { interval }
}

pub fn interval_quality(interval: u8) -> Result<IntervalQuality> {
    let reduced = reduce_interval(interval);
    match reduced {
        0 | 7 | 12 => Ok(IntervalQuality::PerfectConsonance),
        3 | 4 | 8 | 9 => Ok(IntervalQuality::ImperfectConsonance),
        1 | 2 | 5 | 6 | 10 | 11 => Ok(IntervalQuality::Dissonance),
        _ => Err(Error::UnclassifiedInterval { interval, reduced }),
    }
}

pub fn metrical_class(position: Tick) -> Result<MetricalClass> {
    match position % MEASURE_TICKS {
        0 | 4 => Ok(MetricalClass::DownBeat),
        2 | 6 => Ok(MetricalClass::WeakHalf),
        1 | 3 | 5 | 7 => Ok(MetricalClass::WeakQuarter),
        remainder => Err(Error::UnclassifiedPosition { remainder }),
    }
}

pub fn allowed_durations(class: MetricalClass) -> &'static [Tick] {
    class.allowed_durations()
}

/// Uniform pick from an allowed-duration set. `None` only for an empty set.
pub fn choose_duration(allowed: &[Tick], rng: &mut SeededRng) -> Option<Tick> {
    rng.choose(allowed).copied()
}

/// Traditional name of an interval, up to the octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalName {
    Prime,
    MinorSecond,
    MajorSecond,
    MinorThird,
    MajorThird,
    Fourth,
    Tritone,
    Fifth,
    MinorSixth,
    MajorSixth,
    MinorSeventh,
    MajorSeventh,
    Octave,
    /// Anything wider than an octave.
    Compound,
}

impl IntervalName {
    pub fn of(interval: u8) -> IntervalName {
        use IntervalName::*;
        match interval {
            0 => Prime,
            1 => MinorSecond,
            2 => MajorSecond,
            3 => MinorThird,
            4 => MajorThird,
            5 => Fourth,
            6 => Tritone,
            7 => Fifth,
            8 => MinorSixth,
            9 => MajorSixth,
            10 => MinorSeventh,
            11 => MajorSeventh,
            12 => Octave,
            _ => Compound,
        }
    }
}

impl fmt::Display for IntervalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntervalName::Prime => "prime",
            IntervalName::MinorSecond => "minor second",
            IntervalName::MajorSecond => "major second",
            IntervalName::MinorThird => "minor third",
            IntervalName::MajorThird => "major third",
            IntervalName::Fourth => "fourth",
            IntervalName::Tritone => "tritone",
            IntervalName::Fifth => "fifth",
            IntervalName::MinorSixth => "minor sixth",
            IntervalName::MajorSixth => "major sixth",
            IntervalName::MinorSeventh => "minor seventh",
            IntervalName::MajorSeventh => "major seventh",
            IntervalName::Octave => "octave",
            IntervalName::Compound => "more than an octave",
        };
        f.write_str(name)
    }
}

/// One entry of the interval history: the harmonic interval sounding at a
/// tick where at least one voice begins a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub position: Tick,
    /// Octave-reduced distance between the two voices.
    pub interval: u8,
    pub quality: IntervalQuality,
}

impl IntervalRecord {
    pub fn between(position: Tick, cantus: u8, counterpoint: u8) -> Result<Self> {
        let raw = interval(cantus, counterpoint);
        Ok(IntervalRecord {
            position,
            interval: reduce_interval(raw),
            quality: interval_quality(raw)?,
        })
    }

    pub fn is_perfect(&self) -> bool {
        PERFECT_INTERVALS.contains(&self.interval)
    }
}

/// Which voices hold (do not begin a note) at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SustainState {
    /// Exactly this voice is holding; the other one moves.
    Sustaining(Voice),
    /// Neither voice begins a note.
    Both,
    /// Both voices begin a note.
    Neither,
}

impl SustainState {
    /// The voice that begins a note while the other holds.
    pub fn moving_voice(self) -> Option<Voice> {
        match self {
            SustainState::Sustaining(voice) => Some(voice.other()),
            SustainState::Both | SustainState::Neither => None,
        }
    }
}

pub fn sustain_state(cantus_starts_now: bool, counterpoint_starts_now: bool) -> SustainState {
    match (cantus_starts_now, counterpoint_starts_now) {
        (true, true) => SustainState::Neither,
        (false, false) => SustainState::Both,
        (false, true) => SustainState::Sustaining(Voice::Cantus),
        (true, false) => SustainState::Sustaining(Voice::Counterpoint),
    }
}

/// Sustain state of two melodies at `position`.
pub fn sustain_state_at(position: Tick, cantus: &Melody, counterpoint: &Melody) -> SustainState {
    sustain_state(cantus.starts_now(position), counterpoint.starts_now(position))
}

/// How long the single sustaining voice keeps holding after `position`.
///
/// `None` unless exactly one voice is sustaining.
pub fn sustain_remaining(position: Tick, cantus: &Melody, counterpoint: &Melody) -> Option<Tick> {
    let held = match sustain_state_at(position, cantus, counterpoint) {
        SustainState::Sustaining(Voice::Cantus) => cantus,
        SustainState::Sustaining(Voice::Counterpoint) => counterpoint,
        SustainState::Both | SustainState::Neither => return None,
    };
    held.note_end_at(position).map(|end| end - position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_symmetric_distance() {
        assert_eq!(interval(53, 65), 12);
        assert_eq!(interval(65, 53), 12);
        assert_eq!(interval(60, 60), 0);
    }

    #[test]
    fn quality_classes() {
        for i in [0, 7, 12] {
            assert_eq!(interval_quality(i).unwrap(), IntervalQuality::PerfectConsonance);
        }
        for i in [3, 4, 8, 9] {
            assert_eq!(interval_quality(i).unwrap(), IntervalQuality::ImperfectConsonance);
        }
        for i in [1, 2, 5, 6, 10, 11] {
            assert_eq!(interval_quality(i).unwrap(), IntervalQuality::Dissonance);
        }
    }

    #[test]
    fn compound_intervals_fold_once() {
        assert_eq!(interval_quality(19).unwrap(), IntervalQuality::PerfectConsonance);
        assert_eq!(interval_quality(16).unwrap(), IntervalQuality::ImperfectConsonance);
        assert_eq!(interval_quality(14).unwrap(), IntervalQuality::Dissonance);
        assert_eq!(interval_quality(24).unwrap(), IntervalQuality::PerfectConsonance);
    }

    #[test]
    fn intervals_beyond_two_octaves_are_errors() {
        let err = interval_quality(25).unwrap_err();
        assert!(matches!(err, Error::UnclassifiedInterval { interval: 25, reduced: 13 }));
    }

    #[test]
    fn metrical_classes_repeat_every_measure() {
        let classes: Vec<MetricalClass> = (0..8).map(|p| metrical_class(p).unwrap()).collect();
        use MetricalClass::*;
        assert_eq!(
            classes,
            vec![DownBeat, WeakQuarter, WeakHalf, WeakQuarter, DownBeat, WeakQuarter, WeakHalf, WeakQuarter]
        );
        assert_eq!(metrical_class(124).unwrap(), DownBeat);
        assert_eq!(metrical_class(126).unwrap(), WeakHalf);
    }

    #[test]
    fn allowed_durations_per_class() {
        assert_eq!(allowed_durations(MetricalClass::DownBeat), &[1, 2, 3, 4, 6, 8]);
        assert_eq!(allowed_durations(MetricalClass::WeakHalf), &[1, 2, 3, 4]);
        assert_eq!(allowed_durations(MetricalClass::WeakQuarter), &[1, 2]);
    }

    #[test]
    fn long_rests_only_on_downbeats() {
        let admitted: Vec<Tick> = (0..8)
            .filter(|&p| metrical_class(p).unwrap().admits_long_rest())
            .collect();
        assert_eq!(admitted, vec![0, 4]);
    }

    #[test]
    fn choose_duration_stays_in_set() {
        let mut rng = SeededRng::new(3);
        let set = allowed_durations(MetricalClass::WeakHalf);
        for _ in 0..200 {
            let d = choose_duration(set, &mut rng).unwrap();
            assert!(set.contains(&d));
        }
        assert_eq!(choose_duration(&[], &mut rng), None);
    }

    #[test]
    fn interval_names() {
        assert_eq!(IntervalName::of(0), IntervalName::Prime);
        assert_eq!(IntervalName::of(6), IntervalName::Tritone);
        assert_eq!(IntervalName::of(12), IntervalName::Octave);
        assert_eq!(IntervalName::of(13), IntervalName::Compound);
        assert_eq!(IntervalName::of(8).to_string(), "minor sixth");
    }

    #[test]
    fn interval_record_reduces_and_classifies() {
        let record = IntervalRecord::between(16, 53, 72).unwrap();
        assert_eq!(record.interval, 7);
        assert_eq!(record.quality, IntervalQuality::PerfectConsonance);
        assert!(record.is_perfect());

        let third = IntervalRecord::between(0, 53, 57).unwrap();
        assert!(!third.is_perfect());
    }

    #[test]
    fn sustain_state_names_the_holding_voice() {
        assert_eq!(sustain_state(true, true), SustainState::Neither);
        assert_eq!(sustain_state(false, false), SustainState::Both);
        assert_eq!(sustain_state(false, true), SustainState::Sustaining(Voice::Cantus));
        assert_eq!(sustain_state(true, false), SustainState::Sustaining(Voice::Counterpoint));
        assert_eq!(
            sustain_state(false, true).moving_voice(),
            Some(Voice::Counterpoint)
        );
        assert_eq!(SustainState::Both.moving_voice(), None);
    }

    #[test]
    fn sustain_remaining_counts_to_note_end() {
        let cantus = Melody::from_pairs(&[(53, 4), (55, 4)]).unwrap();
        let counterpoint = Melody::from_pairs(&[(65, 2), (64, 2), (67, 4)]).unwrap();
        // Tick 2: counterpoint moves, cantus holds until tick 4.
        assert_eq!(sustain_remaining(2, &cantus, &counterpoint), Some(2));
        // Tick 0: both start.
        assert_eq!(sustain_remaining(0, &cantus, &counterpoint), None);
        // Tick 5: both hold.
        assert_eq!(sustain_remaining(5, &cantus, &counterpoint), None);
    }
}
