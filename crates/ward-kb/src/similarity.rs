//! Versioned comparison between a live signature and a stored case.
//!
//! Version 1 combines three scores, each in `0..=1`:
//!
//! | part      | weight | meaning                                                        |
//! |-----------|--------|----------------------------------------------------------------|
//! | shape     | 0.60   | 1 for the same shape, an affinity for related shapes, else 0    |
//! | threshold | 0.25   | fraction of the case's peak/rise criteria the trajectory meets |
//! | context   | 0.15   | fraction of the case's context keys present with a match       |
//!
//! A case that declares no thresholds (or no context) scores 0.5 on that part.
//! A case whose shape is unrelated (affinity 0) totals 0 whatever its other
//! parts score, so it never matches or ranks as similar at any floor.

use crate::case::{Case, TrajectoryShape};
use crate::signature::{PressureSignature, SignatureFeatures};
use serde::{Deserialize, Serialize};

pub const SIMILARITY_VERSION: u32 = 1;

const SHAPE_WEIGHT: f64 = 0.6;
const THRESHOLD_WEIGHT: f64 = 0.25;
const CONTEXT_WEIGHT: f64 = 0.15;
const UNDECLARED_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Similarity {
    pub shape: f64,
    pub threshold: f64,
    pub context: f64,
    pub total: f64,
}

/// How closely `observed` resembles a case pattern with shape `expected`.
pub fn shape_affinity(observed: TrajectoryShape, expected: TrajectoryShape) -> f64 {
    use TrajectoryShape::*;

    if observed == expected {
        return if observed == Unknown { 0.0 } else { 1.0 };
    }
    match (observed, expected) {
        (RapidIncrease, Spike) | (Spike, RapidIncrease) => 0.7,
        (RapidIncrease, SteadyIncrease) | (SteadyIncrease, RapidIncrease) => 0.6,
        (RapidIncrease, GradualIncrease) | (GradualIncrease, RapidIncrease) => 0.5,
        (SteadyIncrease, GradualIncrease) | (GradualIncrease, SteadyIncrease) => 0.8,
        (SteadyIncrease, PlateauHigh) | (PlateauHigh, SteadyIncrease) => 0.4,
        (Spike, Fluctuation) | (Fluctuation, Spike) => 0.5,
        (PlateauHigh, ImmediateHigh) | (ImmediateHigh, PlateauHigh) => 0.6,
        (Fragmentation, GradualIncrease) => 0.3,
        _ => 0.0,
    }
}

fn threshold_score(case: &Case, features: Option<&SignatureFeatures>) -> f64 {
    let pattern = &case.pattern;
    let declared = usize::from(pattern.peak_at_least.is_some())
        + usize::from(pattern.rise_at_least.is_some());
    if declared == 0 {
        return UNDECLARED_SCORE;
    }
    let Some(features) = features else {
        return 0.0;
    };

    let mut met = 0usize;
    if pattern.peak_at_least.is_some_and(|peak| features.max >= peak) {
        met += 1;
    }
    if pattern.rise_at_least.is_some_and(|rise| features.range >= rise) {
        met += 1;
    }
    met as f64 / declared as f64
}

fn context_score(case: &Case, signature: &PressureSignature) -> f64 {
    let expected = &case.pattern.context;
    if expected.is_empty() {
        return UNDECLARED_SCORE;
    }
    let matched = expected
        .iter()
        .filter(|(key, wanted)| {
            signature
                .context
                .get(*key)
                .is_some_and(|live| context_value_matches(live, wanted))
        })
        .count();
    matched as f64 / expected.len() as f64
}

fn context_value_matches(live: &str, wanted: &str) -> bool {
    let live = live.trim().to_lowercase();
    let wanted = wanted.trim().to_lowercase();
    live == wanted || (!wanted.is_empty() && live.contains(&wanted))
}

/// Score `case` against `signature` (whose shape is `observed`).
pub fn score(
    case: &Case,
    signature: &PressureSignature,
    observed: TrajectoryShape,
    features: Option<&SignatureFeatures>,
) -> Similarity {
    let shape = shape_affinity(observed, case.pattern.shape);
    let threshold = threshold_score(case, features);
    let context = context_score(case, signature);
    let total = if shape > 0.0 {
        SHAPE_WEIGHT * shape + THRESHOLD_WEIGHT * threshold + CONTEXT_WEIGHT * context
    } else {
        0.0
    };
    Similarity {
        shape,
        threshold,
        context,
        total,
    }
}
