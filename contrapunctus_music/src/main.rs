// Contrapunctus: CLI entry point.
//
// Generates a counterpoint against the configured cantus firmus and writes
// the requested exports. The pipeline: load config → generate → summary →
// exports (MIDI, LilyPond, MuseScore, interval history) → optional playback.
//
// Usage:
//   cargo run -p contrapunctus_music --bin generate -- [--config FILE]
//     [--seed N] [--midi FILE] [--lilypond FILE] [--mscx] [--history FILE]
//     [--play] [-v|-vv]
//
// Without --seed a seed is drawn from the clock; it is always printed so a
// run can be reproduced.

use clap::{ArgAction, Parser};
use contrapunctus_music::config::AppConfig;
use contrapunctus_music::error::Result;
use contrapunctus_music::generator::generate;
use contrapunctus_music::harmony::IntervalName;
use contrapunctus_music::lilypond::write_lilypond;
use contrapunctus_music::melody::pitch_name;
use contrapunctus_music::midi::{SmfOptions, write_midi};
use contrapunctus_music::musescore::{MscxExporter, ScoreExporter};
use contrapunctus_music::playback::{Player, drivers_from_settings, note_events};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "generate", version, about = "Compose a counterpoint over a cantus firmus")]
struct Args {
    /// JSON config file; omitted sections use the built-in defaults.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write both voices as a Standard MIDI File.
    #[arg(long, value_name = "FILE")]
    midi: Option<PathBuf>,

    /// Write both voices as a LilyPond score.
    #[arg(long, value_name = "FILE")]
    lilypond: Option<PathBuf>,

    /// Export the counterpoint into the configured MuseScore template.
    #[arg(long)]
    mscx: bool,

    /// Write the interval history as JSON.
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Play the result through the configured playback drivers.
    #[arg(long)]
    play: bool,

    /// Log more (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let seed = args.seed.unwrap_or_else(clock_seed);

    println!("=== Contrapunctus ===");
    println!("Seed: {seed}");
    println!();

    println!("[1/4] Loading configuration...");
    let config = match &args.config {
        Some(path) => {
            println!("  Reading {}", path.display());
            AppConfig::load(path)?
        }
        None => {
            println!("  Using built-in defaults.");
            AppConfig::default()
        }
    };
    let cantus = config.cantus()?;
    let engine = config.rule_engine()?;
    println!(
        "  Cantus: {} notes, {} ticks ({:.1} bars of 4/4)",
        cantus.len(),
        cantus.length(),
        f64::from(cantus.length()) / 8.0
    );

    println!("[2/4] Generating counterpoint...");
    let generation = generate(&cantus, &engine, config.generator, seed)?;
    let counterpoint = &generation.counterpoint;
    println!(
        "  {} notes, {} ticks, {} backtracks",
        counterpoint.len(),
        counterpoint.length(),
        generation.backtracks
    );
    let names: Vec<String> = counterpoint
        .notes()
        .iter()
        .map(|n| format!("{}/{}", pitch_name(n.pitch), n.duration))
        .collect();
    println!("  {}", names.join(" "));
    println!("  Intervals:");
    for (interval, count) in generation.interval_histogram() {
        println!("    {:<20} {count}", IntervalName::of(interval).to_string());
    }

    println!("[3/4] Writing exports...");
    let mut wrote_any = false;
    if let Some(path) = &args.midi {
        let options = SmfOptions {
            tick_seconds: config.playback.tick_seconds,
            program: config.playback.presets.first().map_or(0, |p| p.program),
            velocity: config.playback.velocity,
        };
        write_midi(&cantus, counterpoint, &options, path)?;
        println!("  MIDI: {}", path.display());
        wrote_any = true;
    }
    if let Some(path) = &args.lilypond {
        let title = format!("Counterpoint (seed {seed})");
        write_lilypond(&cantus, counterpoint, Some(&title), tempo_bpm(config.playback.tick_seconds), path)?;
        println!("  LilyPond: {}", path.display());
        wrote_any = true;
    }
    if args.mscx {
        let exporter = MscxExporter::new(config.score.clone(), format!("seed{seed}"));
        let path = exporter.export_melody(counterpoint)?;
        println!("  MuseScore: {}", path.display());
        wrote_any = true;
    }
    if let Some(path) = &args.history {
        std::fs::write(path, serde_json::to_string_pretty(&generation.history)?)?;
        println!("  History: {} records -> {}", generation.history.len(), path.display());
        wrote_any = true;
    }
    if !wrote_any {
        println!("  Nothing requested.");
    }

    println!("[4/4] Playback...");
    if args.play {
        let events = note_events(&cantus, counterpoint);
        let player = Player::new(config.playback.clone());
        let driver = player.play(&events, drivers_from_settings(&config.playback))?;
        println!("  Played {} events via {driver}.", events.len());
    } else {
        println!("  Skipped (use --play).");
    }

    Ok(())
}

/// Quarter-note tempo for a tick (eighth note) of `tick_seconds`.
fn tempo_bpm(tick_seconds: f64) -> u32 {
    if tick_seconds > 0.0 {
        (30.0 / tick_seconds).round() as u32
    } else {
        120
    }
}

fn clock_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);
    nanos ^ u64::from(std::process::id()).rotate_left(32)
}
