// Generation run: drives a tick cursor across the cantus and builds the
// counterpoint one decision at a time.
//
// All run state (counterpoint, interval history, extremum tracker, retry
// counters, PRNG) lives in one `Generator` constructed per run, so runs
// with different seeds are fully independent. The cantus and the rule
// engine are borrowed read-only.
//
// Per tick:
//   1. a cantus note starting here is observed once (extremum tracking);
//   2. if the counterpoint is due (its length equals the cursor), one
//      decision is made: the opening octave at tick 0, otherwise a rule
//      engine proposal. An exhausted proposal rolls back and moves the
//      cursor to the retry tick, where the decision is taken again with
//      fresh randomness;
//   3. if either voice begins a note, an `IntervalRecord` is appended.
//
// Rollback pops the last counterpoint note and drops every interval record
// at or after the new counterpoint end. Repeated failures at the same tick
// pop progressively more notes (every `escalate_after` failures reach one
// note further back). Both a per-tick and a per-run retry cap bound the
// search; exceeding either is `GenerationFailed`.

use crate::error::{Error, Result};
use crate::harmony::{IntervalQuality, IntervalRecord, sustain_state_at};
use crate::melody::{ExtremumTracker, Melody, Note, Tick, pitch_name};
use crate::rules::{Cadence, Proposal, RuleEngine, SearchContext};
use contrapunctus_prng::SeededRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Rollbacks allowed from one decision tick before giving up.
    pub max_retries_per_position: u32,
    /// Rollbacks allowed over the whole run.
    pub max_backtracks: u32,
    /// Failures at one tick before each rollback pops one more note.
    pub escalate_after: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            max_retries_per_position: 256,
            max_backtracks: 50_000,
            escalate_after: 32,
        }
    }
}

/// Outcome of one counterpoint decision as seen by the driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContraDecision {
    Accepted { note: Note },
    /// The decision failed; state was rolled back and the cursor must move
    /// to `retry_position`.
    Retry { retry_position: Tick },
}

/// A finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub seed: u64,
    pub counterpoint: Melody,
    pub history: Vec<IntervalRecord>,
    pub backtracks: u32,
}

impl Generation {
    /// How often each (octave-reduced) interval was recorded.
    pub fn interval_histogram(&self) -> BTreeMap<u8, usize> {
        let mut histogram = BTreeMap::new();
        for record in &self.history {
            *histogram.entry(record.interval).or_insert(0) += 1;
        }
        histogram
    }
}

pub struct Generator<'a> {
    cantus: &'a Melody,
    engine: &'a RuleEngine,
    config: GeneratorConfig,
    cadence: Cadence,
    seed: u64,
    rng: SeededRng,
    counterpoint: Melody,
    history: Vec<IntervalRecord>,
    cantus_extrema: ExtremumTracker,
    cantus_seen: Option<usize>,
    failures: HashMap<Tick, u32>,
    backtracks: u32,
}

impl<'a> Generator<'a> {
    /// Prepare a run. The cantus's cadence is validated here, before any
    /// tick is generated.
    pub fn new(
        cantus: &'a Melody,
        engine: &'a RuleEngine,
        config: GeneratorConfig,
        seed: u64,
    ) -> Result<Self> {
        let cadence = Cadence::from_cantus(cantus)?;
        Ok(Generator {
            cantus,
            engine,
            config,
            cadence,
            seed,
            rng: SeededRng::new(seed),
            counterpoint: Melody::empty(),
            history: Vec::new(),
            cantus_extrema: ExtremumTracker::new(),
            cantus_seen: None,
            failures: HashMap::new(),
            backtracks: 0,
        })
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    pub fn run(mut self) -> Result<Generation> {
        let length = self.cantus.length();
        let mut cursor: Tick = 0;
        while cursor < length {
            if self.cantus.starts_now(cursor) {
                self.observe_cantus(cursor)?;
            }

            if cursor == self.counterpoint.length() {
                match self.decide(cursor)? {
                    ContraDecision::Accepted { note } => {
                        debug!(
                            position = cursor,
                            pitch = %pitch_name(note.pitch),
                            duration = note.duration,
                            "counterpoint note accepted"
                        );
                        self.counterpoint.push(note);
                    }
                    ContraDecision::Retry { retry_position } => {
                        cursor = retry_position;
                        continue;
                    }
                }
            }

            if self.cantus.starts_now(cursor) || self.counterpoint.starts_now(cursor) {
                self.record_interval(cursor)?;
            }
            cursor += 1;
        }

        debug!(
            notes = self.counterpoint.len(),
            backtracks = self.backtracks,
            "generation finished"
        );
        Ok(Generation {
            seed: self.seed,
            counterpoint: self.counterpoint,
            history: self.history,
            backtracks: self.backtracks,
        })
    }

    fn decide(&mut self, position: Tick) -> Result<ContraDecision> {
        let ctx = SearchContext {
            position,
            cantus: self.cantus,
            counterpoint: &self.counterpoint,
            history: &self.history,
            cadence: &self.cadence,
        };
        if position == 0 {
            let note = self.engine.opening_note(&ctx, &mut self.rng)?;
            return Ok(ContraDecision::Accepted { note });
        }
        let proposal = self.engine.propose_counterpoint_note(&ctx, &mut self.rng)?;
        match proposal {
            Proposal::Accepted(note) => Ok(ContraDecision::Accepted { note }),
            Proposal::Exhausted => Ok(ContraDecision::Retry {
                retry_position: self.roll_back(position)?,
            }),
        }
    }

    /// Undo the most recent decisions after a failure at `position` and
    /// return the tick to resume from.
    fn roll_back(&mut self, position: Tick) -> Result<Tick> {
        let failures = self.failures.entry(position).or_insert(0);
        *failures += 1;
        let failures = *failures;
        self.backtracks += 1;
        if failures > self.config.max_retries_per_position
            || self.backtracks > self.config.max_backtracks
        {
            return Err(Error::GenerationFailed {
                position,
                attempts: self.backtracks,
            });
        }

        let depth = 1 + (failures - 1) / self.config.escalate_after.max(1);
        for _ in 0..depth {
            if self.counterpoint.pop().is_none() {
                break;
            }
        }
        let retry = self.counterpoint.length();
        self.history.retain(|r| r.position < retry);
        debug!(position, retry, depth, failures, "search exhausted, rolling back");
        Ok(retry)
    }

    fn observe_cantus(&mut self, position: Tick) -> Result<()> {
        let index = self.cantus.note_index_at(position);
        if self.cantus_seen.is_some_and(|seen| index <= seen) {
            return Ok(());
        }
        self.cantus_seen = Some(index);
        if !self.cantus_extrema.update(self.cantus, index)? {
            return Ok(());
        }
        if self.engine.melodic_tritone(&self.cantus_extrema) {
            trace!(position, "cantus extrema form a melodic tritone");
        }
        if let (Some(extremum), Some(previous)) = (
            self.cantus_extrema.current(),
            index.checked_sub(1).and_then(|i| self.cantus.notes().get(i)),
        ) {
            if let Some(fa) = self.engine.fa_above_la(extremum, previous.pitch) {
                trace!(position, substitute = %pitch_name(fa), "cantus peak on mi");
            }
        }
        Ok(())
    }

    fn record_interval(&mut self, position: Tick) -> Result<()> {
        let length = self.cantus.length();
        let out_of_range = || Error::PositionOutOfRange { position, length };
        let cantus = self.cantus.pitch_at(position).ok_or_else(out_of_range)?;
        let counterpoint = self.counterpoint.pitch_at(position).ok_or_else(out_of_range)?;
        let record = IntervalRecord::between(position, cantus, counterpoint)?;

        if record.quality == IntervalQuality::Dissonance {
            let last = self
                .history
                .last()
                .map_or(IntervalQuality::PerfectConsonance, |r| r.quality);
            let sustain = sustain_state_at(position, self.cantus, &self.counterpoint);
            let mover = self.engine.voice_allowed_to_dissonate(last, sustain);
            trace!(position, interval = record.interval, mover = ?mover, "dissonance");
        }
        trace!(position, interval = record.interval, quality = ?record.quality, "interval recorded");
        self.history.push(record);
        Ok(())
    }
}

/// Generate a counterpoint against `cantus` with a fresh run.
pub fn generate(
    cantus: &Melody,
    engine: &RuleEngine,
    config: GeneratorConfig,
    seed: u64,
) -> Result<Generation> {
    Generator::new(cantus, engine, config, seed)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CHORALE;
    use crate::rules::RuleTables;

    fn chorale() -> Melody {
        Melody::from_pairs(&CHORALE).unwrap()
    }

    #[test]
    fn chorale_counterpoint_fills_the_cantus() {
        let cantus = chorale();
        let engine = RuleEngine::default();
        let generation = generate(&cantus, &engine, GeneratorConfig::default(), 42).unwrap();
        assert_eq!(generation.counterpoint.length(), cantus.length());
        assert_eq!(generation.counterpoint.first().map(|n| n.pitch), Some(65));
        assert_eq!(generation.counterpoint.last(), Some(&Note::new(65, 8)));
    }

    #[test]
    fn same_seed_same_counterpoint() {
        let cantus = chorale();
        let engine = RuleEngine::default();
        let a = generate(&cantus, &engine, GeneratorConfig::default(), 7).unwrap();
        let b = generate(&cantus, &engine, GeneratorConfig::default(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn history_starts_at_zero_and_is_ordered() {
        let cantus = chorale();
        let engine = RuleEngine::default();
        let generation = generate(&cantus, &engine, GeneratorConfig::default(), 3).unwrap();
        assert_eq!(generation.history.first().map(|r| r.position), Some(0));
        assert!(generation.history.windows(2).all(|w| w[0].position < w[1].position));
        // One record per tick where either voice begins a note.
        let expected = (0..cantus.length())
            .filter(|&t| cantus.starts_now(t) || generation.counterpoint.starts_now(t))
            .count();
        assert_eq!(generation.history.len(), expected);
        assert_eq!(generation.interval_histogram().values().sum::<usize>(), expected);
    }

    #[test]
    fn malformed_cadence_is_reported_before_generation() {
        let cantus = Melody::from_pairs(&[(53, 4), (57, 4), (60, 4), (53, 4)]).unwrap();
        let engine = RuleEngine::default();
        let err = Generator::new(&cantus, &engine, GeneratorConfig::default(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, Error::MalformedCadence { .. }));
    }

    #[test]
    fn overconstrained_tables_hit_the_retry_cap() {
        let cantus = chorale();
        // A fourth against every cantus F: nothing is ever consonant.
        let engine = RuleEngine::new(RuleTables {
            candidates: vec![58],
            ..RuleTables::default()
        });
        let config = GeneratorConfig {
            max_retries_per_position: 5,
            max_backtracks: 1_000,
            escalate_after: 2,
        };
        let err = generate(&cantus, &engine, config, 1).unwrap_err();
        assert!(matches!(err, Error::GenerationFailed { attempts, .. } if attempts <= 1_000));
    }

    #[test]
    fn rollback_truncates_history_and_pops_notes() {
        let cantus = chorale();
        let engine = RuleEngine::default();
        let mut generator = Generator::new(&cantus, &engine, GeneratorConfig::default(), 0).unwrap();
        generator.counterpoint = Melody::from_pairs(&[(65, 4), (60, 2)]).unwrap();
        generator.history = vec![
            IntervalRecord::between(0, 53, 65).unwrap(),
            IntervalRecord::between(4, 53, 60).unwrap(),
        ];
        let retry = generator.roll_back(6).unwrap();
        assert_eq!(retry, 4);
        assert_eq!(generator.counterpoint.len(), 1);
        assert_eq!(generator.history.len(), 1);
        assert_eq!(generator.backtracks, 1);
    }

    #[test]
    fn repeated_failures_reach_further_back() {
        let cantus = chorale();
        let engine = RuleEngine::default();
        let config = GeneratorConfig {
            escalate_after: 1,
            ..GeneratorConfig::default()
        };
        let mut generator = Generator::new(&cantus, &engine, config, 0).unwrap();
        generator.counterpoint = Melody::from_pairs(&[(65, 2), (64, 2), (60, 2)]).unwrap();
        // Second failure at the same tick pops two notes.
        generator.failures.insert(6, 1);
        let retry = generator.roll_back(6).unwrap();
        assert_eq!(retry, 2);
        assert_eq!(generator.counterpoint.len(), 1);
    }
}
