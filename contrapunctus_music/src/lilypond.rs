// LilyPond sheet music output for a finished two-voice setting.
//
// Converts the cantus and the counterpoint into a LilyPond (.ly) text file
// that can be engraved into PDF/SVG sheet music. The counterpoint sits on
// an upper staff in the octave-transposing treble clef, the cantus on a
// bass staff below it, both in F major and 4/4.
//
// The complexity here is duration decomposition: LilyPond requires
// durations expressed as power-of-two note values (with optional dots), and
// notes crossing barlines must be split into tied segments.
//
// Uses absolute pitches (not \relative) for simplicity and correctness.

use crate::error::Result;
use crate::harmony::MEASURE_TICKS;
use crate::melody::{Melody, Tick};
use std::fmt::Write;
use std::path::Path;

/// Pitch class names in LilyPond notation (indexed by pitch class 0-11).
/// Flats are used for enharmonic spellings, which suits the F-major context.
const LY_PITCH_NAMES: [&str; 12] = [
    "c", "cis", "d", "ees", "e", "f", "fis", "g", "aes", "a", "bes", "b",
];

/// Convert a MIDI pitch number to a LilyPond absolute pitch string.
///
/// LilyPond's `c` with no octave marks = MIDI 48 (C3).
/// Each `'` raises one octave, each `,` lowers one octave.
pub fn midi_to_ly_note(midi_pitch: u8) -> String {
    let pc = (midi_pitch % 12) as usize;
    let octave = (midi_pitch / 12) as i8 - 4; // 0 at octave 4 (MIDI 48-59)
    let mut result = LY_PITCH_NAMES[pc].to_string();
    let mark = if octave > 0 { '\'' } else { ',' };
    for _ in 0..octave.unsigned_abs() {
        result.push(mark);
    }
    result
}

/// A valid LilyPond duration: note value (in ticks) and its text
/// representation.
const DURATION_TABLE: [(Tick, &str); 6] = [
    (8, "1"),  // whole note = 8 eighth-note ticks
    (6, "2."), // dotted half
    (4, "2"),  // half note
    (3, "4."), // dotted quarter
    (2, "4"),  // quarter note
    (1, "8"),  // eighth note
];

/// Decompose a duration (in ticks) into a sequence of LilyPond duration
/// strings, largest first. Multiple parts are connected with ties.
///
/// For example: 5 ticks = "2" + "8" (half note tied to eighth note).
pub fn decompose_duration(mut ticks: Tick) -> Vec<&'static str> {
    let mut parts = Vec::new();
    for &(value, name) in &DURATION_TABLE {
        while ticks >= value {
            parts.push(name);
            ticks -= value;
        }
    }
    parts
}

/// Split a duration at barlines.
///
/// A note starting at `start` with total `duration` ticks that crosses a
/// barline is split into pieces that each fit within a single bar.
pub fn split_at_barlines(start: Tick, duration: Tick) -> Vec<Tick> {
    let mut fragments = Vec::new();
    let mut remaining = duration;
    let mut pos = start;

    while remaining > 0 {
        let bar_end = (pos / MEASURE_TICKS + 1) * MEASURE_TICKS;
        let frag = remaining.min(bar_end - pos);
        fragments.push(frag);
        remaining -= frag;
        pos += frag;
    }
    fragments
}

/// Render one melody as a LilyPond music expression.
pub fn render_melody(melody: &Melody) -> String {
    let mut out = String::new();
    for (onset, note) in melody.onsets() {
        let name = midi_to_ly_note(note.pitch);
        let fragments = split_at_barlines(onset, note.duration);
        for (i, frag) in fragments.iter().enumerate() {
            let parts = decompose_duration(*frag);
            for (j, dur_str) in parts.iter().enumerate() {
                if !out.is_empty() {
                    out.push(' ');
                }
                let _ = write!(out, "{name}{dur_str}");
                // Tie if there are more parts in this fragment or more fragments
                if j + 1 < parts.len() || i + 1 < fragments.len() {
                    out.push('~');
                }
            }
        }
    }
    out
}

/// Generate a complete LilyPond file for the two voices.
pub fn setting_to_lilypond(
    cantus: &Melody,
    counterpoint: &Melody,
    title: Option<&str>,
    tempo_bpm: u32,
) -> String {
    let mut ly = String::new();

    ly.push_str("\\version \"2.24.0\"\n\n");

    let title_text = title.unwrap_or("Counterpoint");
    let _ = write!(
        ly,
        "\\header {{\n  title = \"{}\"\n  subtitle = \"Counterpoint over a cantus firmus\"\n}}\n\n",
        title_text.replace('"', "\\\"")
    );

    let _ = write!(
        ly,
        "global = {{\n  \\key f \\major \\time 4/4 \\tempo 4 = {tempo_bpm}\n}}\n\n"
    );

    let staves = [
        ("counterpoint", "Counterpoint", "\"treble_8\"", counterpoint),
        ("cantus", "Cantus", "bass", cantus),
    ];
    for (variable, _, _, melody) in &staves {
        let _ = write!(
            ly,
            "{variable} = \\absolute {{\n  \\global\n  {}\n}}\n\n",
            render_melody(melody)
        );
    }

    ly.push_str("\\score {\n  \\new StaffGroup <<\n");
    for (variable, display, clef, _) in &staves {
        let _ = writeln!(
            ly,
            "    \\new Staff \\with {{ instrumentName = \"{display}\" }} {{\n      \\clef {clef}\n      \\{variable}\n    }}"
        );
    }
    ly.push_str("  >>\n");
    ly.push_str("  \\layout { }\n");
    ly.push_str("  \\midi { }\n");
    ly.push_str("}\n");

    ly
}

/// Write a LilyPond file for the two voices.
pub fn write_lilypond(
    cantus: &Melody,
    counterpoint: &Melody,
    title: Option<&str>,
    tempo_bpm: u32,
    path: &Path,
) -> Result<()> {
    let ly = setting_to_lilypond(cantus, counterpoint, title, tempo_bpm);
    std::fs::write(path, ly)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_to_ly_note_middle_c() {
        // MIDI 60 = C4 = c' in LilyPond (one octave above reference)
        assert_eq!(midi_to_ly_note(60), "c'");
    }

    #[test]
    fn test_midi_to_ly_note_reference_octave() {
        // MIDI 48 = C3 = c (no marks, reference octave)
        assert_eq!(midi_to_ly_note(48), "c");
        assert_eq!(midi_to_ly_note(53), "f");
        assert_eq!(midi_to_ly_note(58), "bes");
    }

    #[test]
    fn test_midi_to_ly_note_other_octaves() {
        assert_eq!(midi_to_ly_note(36), "c,");
        assert_eq!(midi_to_ly_note(65), "f'");
        assert_eq!(midi_to_ly_note(72), "c''");
    }

    #[test]
    fn test_decompose_duration_single_values() {
        assert_eq!(decompose_duration(8), vec!["1"]);
        assert_eq!(decompose_duration(6), vec!["2."]);
        assert_eq!(decompose_duration(4), vec!["2"]);
        assert_eq!(decompose_duration(3), vec!["4."]);
        assert_eq!(decompose_duration(2), vec!["4"]);
        assert_eq!(decompose_duration(1), vec!["8"]);
    }

    #[test]
    fn test_decompose_duration_compound() {
        // 5 = 4 + 1 = half + eighth
        assert_eq!(decompose_duration(5), vec!["2", "8"]);
        assert_eq!(decompose_duration(0), Vec::<&str>::new());
    }

    #[test]
    fn test_split_at_barlines() {
        assert_eq!(split_at_barlines(0, 4), vec![4]);
        assert_eq!(split_at_barlines(0, 8), vec![8]);
        // Crosses the barline at 8.
        assert_eq!(split_at_barlines(6, 4), vec![2, 2]);
        assert_eq!(split_at_barlines(4, 20), vec![4, 8, 8]);
    }

    #[test]
    fn test_render_melody_ties_across_barline() {
        // Dotted half on tick 6 runs over the barline at 8.
        let melody = Melody::from_pairs(&[(53, 4), (55, 2), (57, 6), (53, 4)]).unwrap();
        assert_eq!(render_melody(&melody), "f2 g4 a4~ a2 f2");
    }

    #[test]
    fn test_setting_to_lilypond_structure() {
        let cantus = Melody::from_pairs(&[(53, 4), (52, 4)]).unwrap();
        let counterpoint = Melody::from_pairs(&[(65, 4), (64, 4)]).unwrap();
        let ly = setting_to_lilypond(&cantus, &counterpoint, Some("Test Piece"), 120);

        assert!(ly.contains("\\version"), "Missing version: {ly}");
        assert!(ly.contains("Test Piece"), "Missing title");
        assert!(ly.contains("\\key f \\major"), "Missing key");
        assert!(ly.contains("\\time 4/4"), "Missing time sig");
        assert!(ly.contains("\\tempo 4 = 120"), "Missing tempo");
        assert!(ly.contains("cantus = \\absolute"), "Missing cantus variable");
        assert!(ly.contains("f'2 e'2"), "Missing counterpoint notes: {ly}");
        assert!(ly.contains("\\clef bass"), "Missing bass clef");
        assert!(ly.contains("\\layout"), "Missing layout block");
    }

    #[test]
    fn test_write_lilypond_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setting.ly");
        let cantus = Melody::from_pairs(&[(53, 8)]).unwrap();
        let counterpoint = Melody::from_pairs(&[(65, 8)]).unwrap();
        write_lilypond(&cantus, &counterpoint, None, 120, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("f'1"));
    }
}
