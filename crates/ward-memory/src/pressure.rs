use serde::{Deserialize, Serialize};
use std::fmt;

/// Discretized memory pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Normal,
    Warning,
    Critical,
    /// Critical usage that is still climbing.
    Emergency,
}

impl PressureLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PressureLevel::Normal => "normal",
            PressureLevel::Warning => "warning",
            PressureLevel::Critical => "critical",
            PressureLevel::Emergency => "emergency",
        }
    }

    pub fn all() -> [PressureLevel; 4] {
        [
            PressureLevel::Normal,
            PressureLevel::Warning,
            PressureLevel::Critical,
            PressureLevel::Emergency,
        ]
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the recent usage trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::Falling => "falling",
            Trend::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds (in percent of system memory) used by [`PressureThresholds::level_for_percent`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureThresholds {
    /// Enter `Warning` when `percent >= warning_pct`.
    pub warning_pct: f64,
    /// Enter `Critical` when `percent >= critical_pct`.
    pub critical_pct: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            warning_pct: 85.0,
            critical_pct: 95.0,
        }
    }
}

impl PressureThresholds {
    pub fn level_for_percent(self, percent: f64) -> PressureLevel {
        if percent >= self.critical_pct {
            PressureLevel::Critical
        } else if percent >= self.warning_pct {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive_on_the_high_side() {
        let thresholds = PressureThresholds {
            warning_pct: 80.0,
            critical_pct: 90.0,
        };
        assert_eq!(thresholds.level_for_percent(79.9), PressureLevel::Normal);
        assert_eq!(thresholds.level_for_percent(80.0), PressureLevel::Warning);
        assert_eq!(thresholds.level_for_percent(89.99), PressureLevel::Warning);
        assert_eq!(thresholds.level_for_percent(90.0), PressureLevel::Critical);
        assert_eq!(thresholds.level_for_percent(100.0), PressureLevel::Critical);
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(PressureLevel::Normal < PressureLevel::Warning);
        assert!(PressureLevel::Warning < PressureLevel::Critical);
        assert!(PressureLevel::Critical < PressureLevel::Emergency);
    }
}
