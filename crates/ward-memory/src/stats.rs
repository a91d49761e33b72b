use crate::pressure::{PressureLevel, Trend};
use serde::{Deserialize, Serialize};

/// Summary of the sample history, intended for logs and operator tooling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureStats {
    /// Latest `percent_used`, or `0.0` when nothing was sampled yet.
    pub current: f64,
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub samples: usize,
    pub trend: Trend,
    pub level: PressureLevel,
}

impl PressureStats {
    pub fn empty() -> Self {
        Self {
            current: 0.0,
            average: 0.0,
            max: 0.0,
            min: 0.0,
            samples: 0,
            trend: Trend::Stable,
            level: PressureLevel::Normal,
        }
    }
}
