// Exporters and playback fed with a real generated counterpoint.

use contrapunctus_music::config::CHORALE;
use contrapunctus_music::generator::{Generation, GeneratorConfig, generate};
use contrapunctus_music::harmony::IntervalRecord;
use contrapunctus_music::lilypond::write_lilypond;
use contrapunctus_music::melody::Melody;
use contrapunctus_music::midi::{SmfOptions, write_midi};
use contrapunctus_music::musescore::{MscxExporter, ScoreExporter, ScoreSettings};
use contrapunctus_music::playback::{
    EventKind, PlaybackSettings, Player, drivers_from_settings, note_events,
};
use midly::{MidiMessage, Smf, TrackEventKind};
use std::fs;

fn chorale_setting() -> (Melody, Generation) {
    let cantus = Melody::from_pairs(&CHORALE).unwrap();
    let generation = generate(
        &cantus,
        &contrapunctus_music::rules::RuleEngine::default(),
        GeneratorConfig::default(),
        99,
    )
    .unwrap();
    (cantus, generation)
}

#[test]
fn test_midi_file_holds_every_note() {
    let (cantus, generation) = chorale_setting();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chorale.mid");
    write_midi(&cantus, &generation.counterpoint, &SmfOptions::default(), &path).unwrap();

    let bytes = fs::read(&path).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    let note_ons: usize = smf
        .tracks
        .iter()
        .flatten()
        .filter(|e| {
            matches!(
                e.kind,
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { .. },
                    ..
                }
            )
        })
        .count();
    assert_eq!(note_ons, cantus.len() + generation.counterpoint.len());
}

#[test]
fn test_lilypond_file_has_both_staves() {
    let (cantus, generation) = chorale_setting();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chorale.ly");
    write_lilypond(&cantus, &generation.counterpoint, Some("Chorale"), 120, &path).unwrap();

    let ly = fs::read_to_string(&path).unwrap();
    assert!(ly.contains("\\clef bass"));
    assert!(ly.contains("\\clef \"treble_8\""));
    // Both voices end on a downbeat whole-note F, the counterpoint an
    // octave up.
    assert_eq!(cantus.length() % 8, 0);
    assert!(ly.contains(" f1\n"), "{ly}");
    assert!(ly.contains(" f'1\n"), "{ly}");
}

#[test]
fn test_mscx_export_writes_one_chord_per_note() {
    let (_, generation) = chorale_setting();
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("chorale.mscx");
    fs::write(&template, "<museScore><Staff id=\"2\"><Measure>\n</Measure></Staff></museScore>")
        .unwrap();
    let settings = ScoreSettings {
        template,
        head_bytes: "<museScore><Staff id=\"2\"><Measure>\n".len(),
        tail_bytes: "</Measure></Staff></museScore>".len(),
        out_dir: dir.path().join("counterpoints"),
        ..ScoreSettings::default()
    };
    let path = MscxExporter::new(settings, "seed99")
        .export_melody(&generation.counterpoint)
        .unwrap();

    assert_eq!(
        path.file_name().unwrap(),
        "chorale_with_counterpoint_seed99.mscx"
    );
    let written = fs::read_to_string(&path).unwrap();
    assert_eq!(written.matches("<Chord>").count(), generation.counterpoint.len());
    assert!(written.ends_with("</Measure></Staff></museScore>"));
}

#[test]
fn test_history_json_roundtrip() {
    let (_, generation) = chorale_setting();
    let json = serde_json::to_string(&generation.history).unwrap();
    let back: Vec<IntervalRecord> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, generation.history);
}

#[test]
fn test_note_events_are_tick_ordered_with_offs_first() {
    let (cantus, generation) = chorale_setting();
    let events = note_events(&cantus, &generation.counterpoint);
    assert_eq!(events.len(), 2 * (cantus.len() + generation.counterpoint.len()));
    for pair in events.windows(2) {
        assert!(pair[0].tick <= pair[1].tick);
        if pair[0].tick == pair[1].tick {
            assert!(!(pair[0].kind == EventKind::On && pair[1].kind == EventKind::Off));
        }
    }
}

#[test]
fn test_playback_falls_back_to_a_working_driver() {
    let (cantus, generation) = chorale_setting();
    let dir = tempfile::tempdir().unwrap();
    let settings = PlaybackSettings {
        tick_seconds: 0.0,
        fadeout_seconds: 0.0,
        drivers: vec!["no-such-driver".into(), "smf".into(), "log".into()],
        smf_path: dir.path().join("played.mid"),
        ..PlaybackSettings::default()
    };
    let events = note_events(&cantus, &generation.counterpoint);
    let player = Player::new(settings.clone());
    let used = player.play(&events, drivers_from_settings(&settings)).unwrap();
    assert_eq!(used, "smf");
    assert!(settings.smf_path.exists());
}
