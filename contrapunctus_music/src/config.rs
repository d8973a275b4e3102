// Application configuration loaded from JSON.
//
// Every section falls back to the built-in defaults, so a config file only
// has to name what it overrides, e.g. `{"generator": {"max_backtracks": 500}}`.
// The default cantus is the chorale "Wenn wir in höchsten Nöten sein" in
// F major, 112 eighth-note ticks long, ending in a tenor clausula.

use crate::error::Result;
use crate::generator::GeneratorConfig;
use crate::melody::{Melody, Tick};
use crate::musescore::ScoreSettings;
use crate::playback::PlaybackSettings;
use crate::rules::{RuleEngine, RuleTables};
use crate::scale::ScaleTables;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// The built-in cantus firmus as `(pitch, duration)` pairs.
pub const CHORALE: [(u8, Tick); 33] = [
    (53, 4),
    (53, 2),
    (55, 2),
    (57, 4),
    (55, 2),
    (58, 4),
    (57, 2),
    (55, 4),
    (53, 4),
    (57, 4),
    (58, 2),
    (57, 2),
    (55, 2),
    (53, 2),
    (52, 4),
    (53, 4),
    (55, 8),
    (60, 4),
    (58, 2),
    (57, 2),
    (55, 4),
    (57, 4),
    (53, 4),
    (50, 4),
    (48, 4),
    (57, 4),
    (58, 2),
    (57, 2),
    (55, 2),
    (53, 2),
    (57, 4),
    (55, 4),
    (53, 8),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cantus: Vec<(u8, Tick)>,
    pub scales: ScaleTables,
    pub generator: GeneratorConfig,
    pub score: ScoreSettings,
    pub playback: PlaybackSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            cantus: CHORALE.to_vec(),
            scales: ScaleTables::default(),
            generator: GeneratorConfig::default(),
            score: ScoreSettings::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        debug!(path = %path.display(), notes = config.cantus.len(), "config loaded");
        Ok(config)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The cantus as a validated melody.
    pub fn cantus(&self) -> Result<Melody> {
        Melody::from_pairs(&self.cantus)
    }

    /// A rule engine whose tritone table is derived from the configured
    /// scales.
    pub fn rule_engine(&self) -> Result<RuleEngine> {
        Ok(RuleEngine::new(RuleTables::from_scales(&self.scales)?))
    }
}
