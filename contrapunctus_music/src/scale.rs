// Scale tables for the counterpoint voice.
//
// A scale here is a fixed, ascending table of 13 sounding pitches covering
// the small and one-line octaves (C3 to A4, the compass of a wide tenor).
// Two variants exist: the natural table, whose seventh degree is B, and the
// lowered-seventh table, whose seventh degree is Bb (the F-major context
// the cantus is set in).
//
// Degrees are numbered from 1, so `degree(7)` is the seventh degree in both
// tables. The rule tables in rules.rs name their forbidden pairs by degree.
//
// The lowered-seventh table is the candidate universe of the search; both
// tables together define the tritone relation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of pitches in a scale table.
pub const SCALE_LEN: usize = 13;

const NATURAL: [u8; SCALE_LEN] = [48, 50, 52, 53, 55, 57, 59, 60, 62, 64, 65, 67, 69];
const LOWERED_SEVENTH: [u8; SCALE_LEN] = [48, 50, 52, 53, 55, 57, 58, 60, 62, 64, 65, 67, 69];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Scale {
    pitches: [u8; SCALE_LEN],
}

impl Scale {
    /// Build a scale from exactly `SCALE_LEN` strictly ascending pitches.
    pub fn new(pitches: Vec<u8>) -> Result<Self> {
        let ascending = pitches.windows(2).all(|w| w[0] < w[1]);
        match <[u8; SCALE_LEN]>::try_from(pitches.as_slice()) {
            Ok(table) if ascending => Ok(Scale { pitches: table }),
            _ => Err(Error::InvalidScale {
                expected: SCALE_LEN,
                actual: pitches,
            }),
        }
    }

    /// The table with a natural seventh degree (B).
    pub fn natural() -> Self {
        Scale { pitches: NATURAL }
    }

    /// The table with a lowered seventh degree (Bb).
    pub fn lowered_seventh() -> Self {
        Scale {
            pitches: LOWERED_SEVENTH,
        }
    }

    pub fn pitches(&self) -> &[u8] {
        &self.pitches
    }

    /// Pitch of a 1-based scale degree.
    pub fn degree(&self, degree: usize) -> Option<u8> {
        degree
            .checked_sub(1)
            .and_then(|i| self.pitches.get(i))
            .copied()
    }

    /// 1-based degree of a pitch, or `None` if the pitch is not in the table.
    pub fn degree_of(&self, pitch: u8) -> Option<usize> {
        self.pitches.iter().position(|&p| p == pitch).map(|i| i + 1)
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.pitches.contains(&pitch)
    }

    /// The next lower pitch of the table, one scale step down.
    pub fn step_below(&self, pitch: u8) -> Option<u8> {
        let degree = self.degree_of(pitch)?;
        self.degree(degree - 1)
    }
}

impl TryFrom<Vec<u8>> for Scale {
    type Error = Error;

    fn try_from(pitches: Vec<u8>) -> Result<Self> {
        Scale::new(pitches)
    }
}

impl From<Scale> for Vec<u8> {
    fn from(scale: Scale) -> Self {
        scale.pitches.to_vec()
    }
}

/// Both scale variants, injected into the rule engine as configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleTables {
    pub natural: Scale,
    pub lowered_seventh: Scale,
}

impl Default for ScaleTables {
    fn default() -> Self {
        ScaleTables {
            natural: Scale::natural(),
            lowered_seventh: Scale::lowered_seventh(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seventh_degree_differs_between_variants() {
        assert_eq!(Scale::natural().degree(7), Some(59)); // B3
        assert_eq!(Scale::lowered_seventh().degree(7), Some(58)); // Bb3
        for degree in (1..=SCALE_LEN).filter(|&d| d != 7) {
            assert_eq!(
                Scale::natural().degree(degree),
                Scale::lowered_seventh().degree(degree)
            );
        }
    }

    #[test]
    fn degrees_are_one_based() {
        let scale = Scale::lowered_seventh();
        assert_eq!(scale.degree(0), None);
        assert_eq!(scale.degree(1), Some(48));
        assert_eq!(scale.degree(13), Some(69));
        assert_eq!(scale.degree(14), None);
        assert_eq!(scale.degree_of(53), Some(4));
        assert_eq!(scale.degree_of(59), None);
    }

    #[test]
    fn step_below_walks_down_the_table() {
        let scale = Scale::lowered_seventh();
        assert_eq!(scale.step_below(60), Some(58));
        assert_eq!(scale.step_below(53), Some(52));
        assert_eq!(scale.step_below(48), None);
        assert_eq!(scale.step_below(61), None);
    }

    #[test]
    fn new_validates_length_and_order() {
        assert!(Scale::new(NATURAL.to_vec()).is_ok());
        assert!(matches!(
            Scale::new(vec![48, 50, 52]),
            Err(Error::InvalidScale { expected: SCALE_LEN, .. })
        ));
        let mut unordered = NATURAL.to_vec();
        unordered.swap(0, 1);
        assert!(Scale::new(unordered).is_err());
    }

    #[test]
    fn scale_deserializes_from_a_pitch_list() {
        let scale: Scale = serde_json::from_str("[48,50,52,53,55,57,58,60,62,64,65,67,69]").unwrap();
        assert_eq!(scale, Scale::lowered_seventh());
        assert!(serde_json::from_str::<Scale>("[48,50]").is_err());
        assert_eq!(serde_json::to_string(&Scale::natural()).unwrap().matches(',').count(), 12);
    }
}
