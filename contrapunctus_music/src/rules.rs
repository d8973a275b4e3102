// Voice-leading rules and the per-decision counterpoint search.
//
// `RuleTables` holds every table the rules consult: the candidate pitch
// universe, the forbidden tritone ("mi contra fa") pairs, the allowed
// melodic leaps, and the resolution steps. Tables are derived from the two
// scale variants (scale.rs) and injected into `RuleEngine`, so runs with
// different tables can coexist.
//
// `RuleEngine::propose_counterpoint_note` is the heart of the generator.
// For one decision point it:
//   1. returns the cadence override if the position is in the cadence
//      window (see `Cadence`);
//   2. otherwise draws candidate pitches in random order without
//      replacement, keeping the first that is not a tritone pair with the
//      cantus, is reachable by an allowed leap, forms a consonance, leaves a
//      preceding dissonance by a downward step, and does not repeat the last
//      recorded perfect interval;
//   3. pairs it with a duration admitted by the metrical position that does
//      not cross the final cantus onset and whose span stays clean: cantus
//      onsets inside the note and the forced cadence interval it leads into
//      must not produce a tritone pair or parallel perfects either.
// If no pitch/duration pair survives, the proposal is `Exhausted` and the
// generator rolls back (generator.rs). The engine never mutates run state.
//
// The remaining operations (dissonance admissibility, resolution by step,
// melodic tritone between extrema, "una nota supra la") are rule-engine
// capabilities the default search does not invoke for pitch choice.

use crate::error::{Error, Result};
use crate::harmony::{
    IntervalQuality, IntervalRecord, PERFECT_INTERVALS, SustainState, interval,
    interval_quality, metrical_class, reduce_interval,
};
use crate::melody::{Extremum, ExtremumKind, ExtremumTracker, Melody, Note, Tick, Voice};
use crate::scale::{Scale, ScaleTables};
use contrapunctus_prng::SeededRng;
use serde::{Deserialize, Serialize};

/// Absolute melodic leaps a voice may make.
const ALLOWED_LEAPS: [u8; 9] = [0, 1, 2, 3, 4, 5, 7, 12, 8];
/// Leaps from `ALLOWED_LEAPS` that are permitted upward only.
const ASCENDING_ONLY_LEAPS: [u8; 1] = [8];
/// Downward steps that leave a dissonance.
const RESOLUTION_STEPS: [u8; 2] = [1, 2];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTables {
    /// Pitches the counterpoint may use.
    pub candidates: Vec<u8>,
    /// Unordered pitch pairs that may never sound together.
    pub tritone_pairs: Vec<(u8, u8)>,
    pub allowed_leaps: Vec<u8>,
    pub ascending_only_leaps: Vec<u8>,
    pub resolution_steps: Vec<u8>,
    pub scales: ScaleTables,
}

impl RuleTables {
    /// Derive the rule tables from a pair of scale variants.
    ///
    /// The tritone pairs are the fourth/seventh relations of both variants
    /// at two octave placements, plus the natural seventh against the
    /// lowered one.
    pub fn from_scales(scales: &ScaleTables) -> Result<Self> {
        let nat = |degree| degree_pitch(&scales.natural, degree);
        let low = |degree| degree_pitch(&scales.lowered_seventh, degree);
        let tritone_pairs = vec![
            (low(3)?, low(7)?),
            (nat(4)?, nat(7)?),
            (low(10)?, low(7)?),
            (nat(11)?, nat(7)?),
            (nat(7)?, low(7)?),
        ];
        Ok(RuleTables {
            candidates: scales.lowered_seventh.pitches().to_vec(),
            tritone_pairs,
            allowed_leaps: ALLOWED_LEAPS.to_vec(),
            ascending_only_leaps: ASCENDING_ONLY_LEAPS.to_vec(),
            resolution_steps: RESOLUTION_STEPS.to_vec(),
            scales: scales.clone(),
        })
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        let scales = ScaleTables::default();
        RuleTables {
            candidates: scales.lowered_seventh.pitches().to_vec(),
            tritone_pairs: vec![(52, 58), (53, 59), (64, 58), (65, 59), (59, 58)],
            allowed_leaps: ALLOWED_LEAPS.to_vec(),
            ascending_only_leaps: ASCENDING_ONLY_LEAPS.to_vec(),
            resolution_steps: RESOLUTION_STEPS.to_vec(),
            scales,
        }
    }
}

fn degree_pitch(scale: &Scale, degree: usize) -> Result<u8> {
    scale.degree(degree).ok_or_else(|| Error::InvalidScale {
        expected: crate::scale::SCALE_LEN,
        actual: scale.pitches().to_vec(),
    })
}

/// The melodic shape by which the cantus reaches its final note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clausula {
    /// Step of 2 down into the final note.
    Tenor,
    /// Penultimate note a step of 1 above the cantus's second note.
    Soprano,
}

impl Clausula {
    /// Distance of the forced penultimate counterpoint pitch above the
    /// cantus's final pitch.
    pub fn offset(self) -> u8 {
        match self {
            Clausula::Tenor => 11,
            Clausula::Soprano => 14,
        }
    }
}

/// The forced ending of the counterpoint, derived once from the cantus.
///
/// From `penultimate_start` up to `final_start` the counterpoint sings the
/// penultimate pitch, held until the final cantus note begins; at
/// `final_start` it sings the octave above the final cantus pitch for the
/// final note's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    pub clausula: Clausula,
    pub penultimate_start: Tick,
    pub final_start: Tick,
    pub final_pitch: u8,
    pub final_duration: Tick,
}

impl Cadence {
    pub fn from_cantus(cantus: &Melody) -> Result<Self> {
        let notes = cantus.notes();
        let [.., penultimate, last] = notes else {
            return Err(Error::CantusTooShort { notes: notes.len() });
        };
        let clausula = if i16::from(penultimate.pitch) - i16::from(last.pitch) == 2 {
            Clausula::Tenor
        } else if i16::from(penultimate.pitch) - i16::from(notes[1].pitch) == -1 {
            // The soprano shape is tested against the cantus's second note.
            Clausula::Soprano
        } else {
            return Err(Error::MalformedCadence {
                penultimate: penultimate.pitch,
                last: last.pitch,
            });
        };
        let final_start = cantus.length() - last.duration;
        Ok(Cadence {
            clausula,
            penultimate_start: final_start - penultimate.duration,
            final_start,
            final_pitch: last.pitch,
            final_duration: last.duration,
        })
    }

    pub fn penultimate_pitch(&self) -> u8 {
        self.final_pitch + self.clausula.offset()
    }

    pub fn final_note(&self) -> Note {
        Note::new(self.final_pitch + 12, self.final_duration)
    }

    /// The forced counterpoint note for a decision at `position`, if any.
    pub fn override_at(&self, position: Tick) -> Option<Note> {
        if position == self.final_start {
            Some(self.final_note())
        } else if (self.penultimate_start..self.final_start).contains(&position) {
            Some(Note::new(
                self.penultimate_pitch(),
                self.final_start - position,
            ))
        } else {
            None
        }
    }
}

/// Outcome of one counterpoint decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proposal {
    Accepted(Note),
    /// No legal pitch/duration pair exists here; the caller must roll back.
    Exhausted,
}

/// Read-only view of the run state a decision is made against.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub position: Tick,
    pub cantus: &'a Melody,
    pub counterpoint: &'a Melody,
    pub history: &'a [IntervalRecord],
    pub cadence: &'a Cadence,
}

impl SearchContext<'_> {
    fn cantus_pitch(&self) -> Result<u8> {
        self.cantus
            .pitch_at(self.position)
            .ok_or(Error::PositionOutOfRange {
                position: self.position,
                length: self.cantus.length(),
            })
    }

    fn last_record(&self) -> Option<&IntervalRecord> {
        self.history.last()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    tables: RuleTables,
}

impl RuleEngine {
    pub fn new(tables: RuleTables) -> Self {
        RuleEngine { tables }
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }

    /// True if the unordered pair is a forbidden tritone relation.
    pub fn is_tritone_pair(&self, pitch_a: u8, pitch_b: u8) -> bool {
        self.tables
            .tritone_pairs
            .iter()
            .any(|&(x, y)| (x, y) == (pitch_a, pitch_b) || (y, x) == (pitch_a, pitch_b))
    }

    /// Whether a melodic move of `signed_interval` (target minus source) is
    /// allowed. Some leaps are allowed upward only.
    pub fn melodic_leap_allowed(&self, signed_interval: i16) -> bool {
        let Ok(leap) = u8::try_from(signed_interval.unsigned_abs()) else {
            return false;
        };
        if !self.tables.allowed_leaps.contains(&leap) {
            return false;
        }
        signed_interval >= 0 || !self.tables.ascending_only_leaps.contains(&leap)
    }

    /// A dissonance may sound only against a held note, and only after a
    /// consonance.
    pub fn dissonance_admissible(
        &self,
        last_quality: IntervalQuality,
        sustain: SustainState,
    ) -> bool {
        matches!(sustain, SustainState::Sustaining(_)) && last_quality.is_consonant()
    }

    /// The voice permitted to form an admissible dissonance: the one that
    /// moves while the other holds.
    pub fn voice_allowed_to_dissonate(
        &self,
        last_quality: IntervalQuality,
        sustain: SustainState,
    ) -> Option<Voice> {
        if self.dissonance_admissible(last_quality, sustain) {
            sustain.moving_voice()
        } else {
            None
        }
    }

    /// Resolve by moving one randomly chosen voice one scale step down.
    ///
    /// Returns the `(cantus, counterpoint)` pitches after resolution.
    pub fn resolve_by_step(
        &self,
        cantus: u8,
        counterpoint: u8,
        rng: &mut SeededRng,
    ) -> Result<(u8, u8)> {
        let scale = &self.tables.scales.lowered_seventh;
        let step_down = |pitch: u8| scale.step_below(pitch).ok_or(Error::NoStepBelow { pitch });
        match rng.choose(&Voice::BOTH) {
            Some(Voice::Cantus) => Ok((step_down(cantus)?, counterpoint)),
            _ => Ok((cantus, step_down(counterpoint)?)),
        }
    }

    /// Prepare, dissonate, resolve: after a dissonance one voice steps down;
    /// after a consonance nothing moves.
    pub fn resolve_dissonance(
        &self,
        last_quality: IntervalQuality,
        cantus: u8,
        counterpoint: u8,
        rng: &mut SeededRng,
    ) -> Result<(u8, u8)> {
        if last_quality == IntervalQuality::Dissonance {
            self.resolve_by_step(cantus, counterpoint, rng)
        } else {
            Ok((cantus, counterpoint))
        }
    }

    /// True if the two most recent extrema of a melody form a tritone pair
    /// (a melodic "mi contra fa").
    pub fn melodic_tritone(&self, tracker: &ExtremumTracker) -> bool {
        match (tracker.previous(), tracker.current()) {
            (Some(a), Some(b)) => self.is_tritone_pair(a.pitch, b.pitch),
            _ => false,
        }
    }

    /// "Una nota supra la, semper est canenda fa": a peak on the natural
    /// seventh degree is sung as the lowered seventh. Returns the
    /// substituted pitch when the rule applies.
    pub fn fa_above_la(&self, extremum: Extremum, last_pitch: u8) -> Option<u8> {
        let scales = &self.tables.scales;
        let mi = scales.natural.degree(7)?;
        let is_peak_on_mi = extremum.kind == ExtremumKind::LocalMaximum
            && extremum.pitch == last_pitch
            && last_pitch == mi;
        if is_peak_on_mi {
            scales.lowered_seventh.degree(7)
        } else {
            None
        }
    }

    /// The opening counterpoint note: the octave above the cantus's first
    /// pitch, with a random duration the metrical position admits and whose
    /// span is clean. `OpeningBlocked` if no such duration exists.
    pub fn opening_note(&self, ctx: &SearchContext<'_>, rng: &mut SeededRng) -> Result<Note> {
        let cantus_pitch = ctx.cantus_pitch()?;
        let pitch = cantus_pitch + 12;
        let opening = IntervalRecord::between(ctx.position, cantus_pitch, pitch)?;
        let mut durations = self.candidate_durations(ctx)?;
        rng.shuffle(&mut durations);
        durations
            .into_iter()
            .find(|&d| self.span_is_clean(ctx, pitch, d, opening.interval))
            .map(|d| Note::new(pitch, d))
            .ok_or(Error::OpeningBlocked {
                position: ctx.position,
                pitch,
            })
    }

    /// One counterpoint decision at `ctx.position`.
    pub fn propose_counterpoint_note(
        &self,
        ctx: &SearchContext<'_>,
        rng: &mut SeededRng,
    ) -> Result<Proposal> {
        if let Some(forced) = ctx.cadence.override_at(ctx.position) {
            return Ok(Proposal::Accepted(forced));
        }

        let cantus_pitch = ctx.cantus_pitch()?;
        let previous = ctx.counterpoint.last().map(|n| n.pitch);
        let last = ctx.last_record().copied();
        let last_consonant = last.is_none_or(|r| r.quality.is_consonant());

        let mut candidates = self.tables.candidates.clone();
        rng.shuffle(&mut candidates);

        for pitch in candidates {
            if self.is_tritone_pair(cantus_pitch, pitch) {
                continue;
            }
            if let Some(prev) = previous {
                if !self.melodic_leap_allowed(i16::from(pitch) - i16::from(prev)) {
                    continue;
                }
            }
            let harmonic = interval(cantus_pitch, pitch);
            if !interval_quality(harmonic)?.is_consonant() {
                continue;
            }
            if !last_consonant && !self.leaves_by_step_down(previous, pitch) {
                continue;
            }
            let reduced = reduce_interval(harmonic);
            if last.is_some_and(|r| r.is_perfect() && r.interval == reduced) {
                continue;
            }

            let mut durations = self.candidate_durations(ctx)?;
            rng.shuffle(&mut durations);
            if let Some(&duration) = durations
                .iter()
                .find(|&&d| self.span_is_clean(ctx, pitch, d, reduced))
            {
                return Ok(Proposal::Accepted(Note::new(pitch, duration)));
            }
        }
        Ok(Proposal::Exhausted)
    }

    fn leaves_by_step_down(&self, previous: Option<u8>, pitch: u8) -> bool {
        let Some(prev) = previous else {
            return true;
        };
        prev.checked_sub(pitch)
            .is_some_and(|step| self.tables.resolution_steps.contains(&step))
    }

    /// Durations admitted at the decision point that end no later than the
    /// final cantus onset.
    fn candidate_durations(&self, ctx: &SearchContext<'_>) -> Result<Vec<Tick>> {
        let class = metrical_class(ctx.position)?;
        Ok(class
            .allowed_durations()
            .iter()
            .copied()
            .filter(|&d| ctx.position + d <= ctx.cadence.final_start)
            .collect())
    }

    /// Checks the intervals a note at `ctx.position` would form after its
    /// own onset: against every cantus note starting inside it, then against
    /// the forced cadence note it may lead into.
    fn span_is_clean(
        &self,
        ctx: &SearchContext<'_>,
        pitch: u8,
        duration: Tick,
        onset_interval: u8,
    ) -> bool {
        let start = ctx.position;
        let end = start + duration;
        let mut chain = onset_interval;
        for (_, note) in ctx
            .cantus
            .onsets()
            .filter(|&(onset, _)| onset > start && onset < end)
        {
            if self.is_tritone_pair(note.pitch, pitch) {
                return false;
            }
            let next = reduce_interval(interval(note.pitch, pitch));
            if next == chain && PERFECT_INTERVALS.contains(&next) {
                return false;
            }
            chain = next;
        }
        if let (Some(forced), Some(cantus)) =
            (ctx.cadence.override_at(end), ctx.cantus.pitch_at(end))
        {
            let next = reduce_interval(interval(cantus, forced.pitch));
            if next == chain && PERFECT_INTERVALS.contains(&next) {
                return false;
            }
        }
        true
    }
}
