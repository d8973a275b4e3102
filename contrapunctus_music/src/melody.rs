// Melody model: an ordered, time-partitioned sequence of notes.
//
// Time is measured in ticks, one tick per eighth note. A melody's notes tile
// the range `[0, length)` with no gaps or overlaps, so every tick inside that
// range is owned by exactly one note. The cantus firmus is built once from
// fixed data and never changes; the counterpoint grows note by note and may
// lose its last note when the search backtracks (see generator.rs).
//
// The extremum tracker at the bottom of this file follows a melody's local
// peaks and troughs. It feeds the melodic tritone and "una nota supra la"
// rules in rules.rs, which are available but not part of the default search.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Time unit: one eighth note.
pub type Tick = u32;

/// The two voices of a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    /// The fixed, given melody.
    Cantus,
    /// The generated voice.
    Counterpoint,
}

impl Voice {
    pub const BOTH: [Voice; 2] = [Voice::Cantus, Voice::Counterpoint];

    pub fn other(self) -> Voice {
        match self {
            Voice::Cantus => Voice::Counterpoint,
            Voice::Counterpoint => Voice::Cantus,
        }
    }

    /// MIDI channel used when this voice is rendered or played.
    pub fn channel(self) -> u8 {
        match self {
            Voice::Cantus => 0,
            Voice::Counterpoint => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Voice::Cantus => "Cantus",
            Voice::Counterpoint => "Counterpoint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch number.
    pub pitch: u8,
    /// Length in ticks; always positive.
    pub duration: Tick,
}

impl Note {
    pub fn new(pitch: u8, duration: Tick) -> Self {
        Note { pitch, duration }
    }
}

/// An append-only sequence of notes with single-note rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Melody {
    notes: Vec<Note>,
}

impl Melody {
    /// Build a melody, rejecting zero-length notes.
    pub fn new(notes: Vec<Note>) -> Result<Self> {
        if let Some(index) = notes.iter().position(|n| n.duration == 0) {
            return Err(Error::ZeroDuration { index });
        }
        Ok(Melody { notes })
    }

    /// Build a melody from `(pitch, duration)` pairs.
    pub fn from_pairs(pairs: &[(u8, Tick)]) -> Result<Self> {
        Melody::new(pairs.iter().map(|&(p, d)| Note::new(p, d)).collect())
    }

    pub fn empty() -> Self {
        Melody::default()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn first(&self) -> Option<&Note> {
        self.notes.first()
    }

    pub fn last(&self) -> Option<&Note> {
        self.notes.last()
    }

    /// Append a note at the melody's current end.
    pub fn push(&mut self, note: Note) {
        debug_assert!(note.duration > 0, "appended a zero-length note");
        self.notes.push(note);
    }

    /// Remove the most recent note (the backtracking rollback).
    pub fn pop(&mut self) -> Option<Note> {
        self.notes.pop()
    }

    /// Total length in ticks: the sum of all note durations.
    pub fn length(&self) -> Tick {
        self.notes.iter().map(|n| n.duration).sum()
    }

    /// Index of the note that owns `position`.
    ///
    /// Returns 0 for an empty melody (a voice that is not built yet still
    /// has a position) and `len()` when `position` lies past the end.
    pub fn note_index_at(&self, position: Tick) -> usize {
        if self.notes.is_empty() {
            return 0;
        }
        let mut end = 0;
        for (i, note) in self.notes.iter().enumerate() {
            end += note.duration;
            if end > position {
                return i;
            }
        }
        self.notes.len()
    }

    /// Sum of the durations of all notes strictly before `note_index`.
    pub fn ticks_before(&self, note_index: usize) -> Tick {
        self.notes.iter().take(note_index).map(|n| n.duration).sum()
    }

    pub fn note_at(&self, position: Tick) -> Option<&Note> {
        self.notes.get(self.note_index_at(position))
    }

    pub fn pitch_at(&self, position: Tick) -> Option<u8> {
        self.note_at(position).map(|n| n.pitch)
    }

    /// Tick at which the note owning `position` ends.
    pub fn note_end_at(&self, position: Tick) -> Option<Tick> {
        let index = self.note_index_at(position);
        self.notes
            .get(index)
            .map(|n| self.ticks_before(index) + n.duration)
    }

    /// True iff a note begins exactly at `position`.
    ///
    /// An empty melody "starts" at tick 0 only. Positions at or past the
    /// end of a non-empty melody never start a note.
    pub fn starts_now(&self, position: Tick) -> bool {
        if self.notes.is_empty() {
            return position == 0;
        }
        let index = self.note_index_at(position);
        index < self.notes.len() && self.ticks_before(index) == position
    }

    /// `(onset, note)` pairs in order.
    pub fn onsets(&self) -> impl Iterator<Item = (Tick, &Note)> + '_ {
        self.notes.iter().scan(0, |onset, note| {
            let start = *onset;
            *onset += note.duration;
            Some((start, note))
        })
    }
}

/// Shape classification of a melody's turning point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremumKind {
    /// The opening note, before any direction is established.
    StartTone,
    LocalMinimum,
    LocalMaximum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extremum {
    pub kind: ExtremumKind,
    pub pitch: u8,
}

/// Follows the two most recent turning points of a melody.
///
/// Fed one note index at a time, in strictly increasing order. Each update
/// looks at the new note and its two predecessors and classifies the middle
/// one.
#[derive(Debug, Clone, Default)]
pub struct ExtremumTracker {
    last_index: Option<usize>,
    previous: Option<Extremum>,
    current: Option<Extremum>,
}

impl ExtremumTracker {
    pub fn new() -> Self {
        ExtremumTracker::default()
    }

    /// The older of the two retained extrema.
    pub fn previous(&self) -> Option<Extremum> {
        self.previous
    }

    /// The most recently found extremum.
    pub fn current(&self) -> Option<Extremum> {
        self.current
    }

    /// Observe note `note_index` of `melody`. Returns true when a new
    /// extremum was found.
    ///
    /// At index 1 only an ascending opening counts as found (the opening
    /// note becomes a minimum); a descending or level opening is recorded
    /// but reported as not found.
    pub fn update(&mut self, melody: &Melody, note_index: usize) -> Result<bool> {
        if let Some(previous) = self.last_index {
            if note_index <= previous {
                return Err(Error::ExtremaOutOfOrder {
                    previous,
                    index: note_index,
                });
            }
        }
        let notes = melody.notes();
        let Some(new) = notes.get(note_index).map(|n| n.pitch) else {
            return Ok(false);
        };
        self.last_index = Some(note_index);

        match note_index {
            0 => {
                self.previous = Some(Extremum {
                    kind: ExtremumKind::StartTone,
                    pitch: new,
                });
                Ok(false)
            }
            1 => {
                let last = notes[0].pitch;
                let kind = if last < new {
                    ExtremumKind::LocalMinimum
                } else if last > new {
                    ExtremumKind::LocalMaximum
                } else {
                    ExtremumKind::StartTone
                };
                self.current = Some(Extremum { kind, pitch: last });
                Ok(kind == ExtremumKind::LocalMinimum)
            }
            _ => {
                let last = notes[note_index - 1].pitch;
                let before_last = notes[note_index - 2].pitch;
                let kind = if last < before_last && last < new {
                    ExtremumKind::LocalMinimum
                } else if last > before_last && last > new {
                    ExtremumKind::LocalMaximum
                } else {
                    return Ok(false);
                };
                self.previous = self.current;
                self.current = Some(Extremum { kind, pitch: last });
                Ok(true)
            }
        }
    }
}

/// Compact note name for a MIDI pitch, with middle C (60) as "C4".
pub fn pitch_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
    ];
    let octave = pitch as i16 / 12 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn melody(pairs: &[(u8, Tick)]) -> Melody {
        Melody::from_pairs(pairs).unwrap()
    }

    #[test]
    fn length_sums_durations() {
        let m = melody(&[(53, 4), (55, 2), (57, 2)]);
        assert_eq!(m.length(), 8);
        assert_eq!(Melody::empty().length(), 0);
    }

    #[test]
    fn zero_duration_rejected() {
        let err = Melody::from_pairs(&[(53, 4), (55, 0)]).unwrap_err();
        assert!(matches!(err, Error::ZeroDuration { index: 1 }));
    }

    #[test]
    fn note_index_at_scans_cumulative_ends() {
        let m = melody(&[(53, 4), (55, 2), (57, 2)]);
        assert_eq!(m.note_index_at(0), 0);
        assert_eq!(m.note_index_at(3), 0);
        assert_eq!(m.note_index_at(4), 1);
        assert_eq!(m.note_index_at(5), 1);
        assert_eq!(m.note_index_at(6), 2);
        assert_eq!(m.note_index_at(7), 2);
        // Past the end: the sequence length.
        assert_eq!(m.note_index_at(8), 3);
        assert_eq!(m.note_index_at(100), 3);
    }

    #[test]
    fn empty_melody_still_has_a_position() {
        let m = Melody::empty();
        assert_eq!(m.note_index_at(0), 0);
        assert_eq!(m.note_index_at(17), 0);
        assert!(m.starts_now(0));
        assert!(!m.starts_now(3));
        assert_eq!(m.note_at(0), None);
    }

    #[test]
    fn ticks_before_and_starts_now() {
        let m = melody(&[(53, 4), (55, 2), (57, 2)]);
        assert_eq!(m.ticks_before(0), 0);
        assert_eq!(m.ticks_before(1), 4);
        assert_eq!(m.ticks_before(2), 6);
        assert_eq!(m.ticks_before(3), 8);

        let starts: Vec<Tick> = (0..10).filter(|&t| m.starts_now(t)).collect();
        assert_eq!(starts, vec![0, 4, 6]);
    }

    #[test]
    fn lookups_and_note_end() {
        let m = melody(&[(53, 4), (55, 2), (57, 2)]);
        assert_eq!(m.pitch_at(2), Some(53));
        assert_eq!(m.pitch_at(5), Some(55));
        assert_eq!(m.pitch_at(8), None);
        assert_eq!(m.note_end_at(1), Some(4));
        assert_eq!(m.note_end_at(6), Some(8));
        assert_eq!(m.note_end_at(8), None);
    }

    #[test]
    fn push_and_pop_roll_back_length() {
        let mut m = Melody::empty();
        m.push(Note::new(65, 4));
        m.push(Note::new(64, 2));
        assert_eq!(m.length(), 6);
        assert_eq!(m.pop(), Some(Note::new(64, 2)));
        assert_eq!(m.length(), 4);
    }

    #[test]
    fn onsets_enumerate_start_ticks() {
        let m = melody(&[(53, 4), (55, 2), (57, 2)]);
        let onsets: Vec<(Tick, u8)> = m.onsets().map(|(t, n)| (t, n.pitch)).collect();
        assert_eq!(onsets, vec![(0, 53), (4, 55), (6, 57)]);
    }

    #[test]
    fn extremum_tracker_classifies_turning_points() {
        let m = melody(&[(53, 2), (55, 2), (57, 2), (55, 2), (53, 2), (55, 2)]);
        let mut tracker = ExtremumTracker::new();

        assert!(!tracker.update(&m, 0).unwrap());
        assert_eq!(
            tracker.previous(),
            Some(Extremum { kind: ExtremumKind::StartTone, pitch: 53 })
        );

        // Ascending opening: the first note is a minimum.
        assert!(tracker.update(&m, 1).unwrap());
        assert_eq!(
            tracker.current(),
            Some(Extremum { kind: ExtremumKind::LocalMinimum, pitch: 53 })
        );

        // 55 between 53 and 57 is no turning point.
        assert!(!tracker.update(&m, 2).unwrap());

        // 57 between 55 and 55 is a peak.
        assert!(tracker.update(&m, 3).unwrap());
        assert_eq!(
            tracker.current(),
            Some(Extremum { kind: ExtremumKind::LocalMaximum, pitch: 57 })
        );
        assert_eq!(
            tracker.previous(),
            Some(Extremum { kind: ExtremumKind::LocalMinimum, pitch: 53 })
        );

        assert!(!tracker.update(&m, 4).unwrap());

        // 53 between 55 and 55 is a trough.
        assert!(tracker.update(&m, 5).unwrap());
        assert_eq!(
            tracker.current(),
            Some(Extremum { kind: ExtremumKind::LocalMinimum, pitch: 53 })
        );
        assert_eq!(
            tracker.previous(),
            Some(Extremum { kind: ExtremumKind::LocalMaximum, pitch: 57 })
        );
    }

    #[test]
    fn descending_opening_is_recorded_but_not_reported() {
        let m = melody(&[(57, 2), (55, 2)]);
        let mut tracker = ExtremumTracker::new();
        tracker.update(&m, 0).unwrap();
        assert!(!tracker.update(&m, 1).unwrap());
        assert_eq!(
            tracker.current(),
            Some(Extremum { kind: ExtremumKind::LocalMaximum, pitch: 57 })
        );
    }

    #[test]
    fn extremum_tracker_rejects_non_increasing_indices() {
        let m = melody(&[(53, 2), (55, 2), (57, 2)]);
        let mut tracker = ExtremumTracker::new();
        tracker.update(&m, 0).unwrap();
        tracker.update(&m, 2).unwrap();
        let err = tracker.update(&m, 2).unwrap_err();
        assert!(matches!(err, Error::ExtremaOutOfOrder { previous: 2, index: 2 }));
        assert!(tracker.update(&m, 1).is_err());
    }

    #[test]
    fn pitch_names() {
        assert_eq!(pitch_name(60), "C4");
        assert_eq!(pitch_name(53), "F3");
        assert_eq!(pitch_name(58), "Bb3");
    }
}
