use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity `{other}`")),
        }
    }
}

/// Shape of a usage trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryShape {
    RapidIncrease,
    SteadyIncrease,
    Spike,
    Fluctuation,
    PlateauHigh,
    ImmediateHigh,
    Fragmentation,
    SpecificTrigger,
    GradualIncrease,
    GradualDecrease,
    Stable,
    Unknown,
}

impl TrajectoryShape {
    pub const ALL: [TrajectoryShape; 12] = [
        TrajectoryShape::RapidIncrease,
        TrajectoryShape::SteadyIncrease,
        TrajectoryShape::Spike,
        TrajectoryShape::Fluctuation,
        TrajectoryShape::PlateauHigh,
        TrajectoryShape::ImmediateHigh,
        TrajectoryShape::Fragmentation,
        TrajectoryShape::SpecificTrigger,
        TrajectoryShape::GradualIncrease,
        TrajectoryShape::GradualDecrease,
        TrajectoryShape::Stable,
        TrajectoryShape::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrajectoryShape::RapidIncrease => "rapid_increase",
            TrajectoryShape::SteadyIncrease => "steady_increase",
            TrajectoryShape::Spike => "spike",
            TrajectoryShape::Fluctuation => "fluctuation",
            TrajectoryShape::PlateauHigh => "plateau_high",
            TrajectoryShape::ImmediateHigh => "immediate_high",
            TrajectoryShape::Fragmentation => "fragmentation",
            TrajectoryShape::SpecificTrigger => "specific_trigger",
            TrajectoryShape::GradualIncrease => "gradual_increase",
            TrajectoryShape::GradualDecrease => "gradual_decrease",
            TrajectoryShape::Stable => "stable",
            TrajectoryShape::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrajectoryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrajectoryShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TrajectoryShape::ALL
            .into_iter()
            .find(|shape| shape.as_str() == wanted)
            .ok_or_else(|| format!("unknown trajectory shape `{s}`"))
    }
}

/// What a case expects the live signature to look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PatternRepr")]
pub struct SymptomPattern {
    pub shape: TrajectoryShape,
    /// The trajectory peaks at or above this percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_at_least: Option<f64>,
    /// The trajectory spans (max - min) at least this many points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rise_at_least: Option<f64>,
    /// Context keys and the values (or substrings) they are expected to carry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl SymptomPattern {
    pub fn shape(shape: TrajectoryShape) -> Self {
        Self {
            shape,
            peak_at_least: None,
            rise_at_least: None,
            context: BTreeMap::new(),
        }
    }

    pub fn peak(mut self, percent: f64) -> Self {
        self.peak_at_least = Some(percent);
        self
    }

    pub fn rise(mut self, points: f64) -> Self {
        self.rise_at_least = Some(points);
        self
    }

    pub fn context(mut self, key: &str, value: &str) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

/// Accepts either a bare shape name or the full object form.
#[derive(Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Shape(TrajectoryShape),
    Full {
        shape: TrajectoryShape,
        #[serde(default)]
        peak_at_least: Option<f64>,
        #[serde(default)]
        rise_at_least: Option<f64>,
        #[serde(default)]
        context: BTreeMap<String, String>,
    },
}

impl From<PatternRepr> for SymptomPattern {
    fn from(repr: PatternRepr) -> Self {
        match repr {
            PatternRepr::Shape(shape) => SymptomPattern::shape(shape),
            PatternRepr::Full {
                shape,
                peak_at_least,
                rise_at_least,
                context,
            } => SymptomPattern {
                shape,
                peak_at_least,
                rise_at_least,
                context,
            },
        }
    }
}

/// A stored symptom, cause and remedy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: String,
    #[serde(default)]
    pub symptoms: String,
    pub pattern: SymptomPattern,
    pub root_cause: String,
    pub solution: String,
    pub severity: Severity,
    #[serde(default)]
    pub impact: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,
}

impl Case {
    /// Category prefix of the id (`OOM` for `OOM_001`).
    pub fn case_type(&self) -> &str {
        case_type_of(&self.case_id)
    }
}

pub(crate) fn case_type_of(case_id: &str) -> &str {
    case_id.split('_').next().unwrap_or(case_id)
}

/// An incident submitted for learning. Every field is optional so that
/// validation, not deserialization, reports what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseDraft {
    #[serde(default)]
    pub case_type: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub pattern: Option<SymptomPattern>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub impact: Vec<String>,
    #[serde(default)]
    pub detection: Option<String>,
}
