use crate::case::TrajectoryShape;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Context key that marks a trajectory as caused by heap fragmentation.
pub const FRAGMENTATION_HINT: &str = "fragmentation_hint";
/// Context key that marks a trajectory as caused by a specific input or workload.
pub const TRIGGER_HINT: &str = "trigger";

const MIN_POINTS: usize = 3;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported signature format: {0}")]
    Format(String),
}

/// A usage trajectory plus free-form context, as submitted for diagnosis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureSignature {
    /// Usage percentages, oldest first.
    pub readings: Vec<f64>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// Summary statistics of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignatureFeatures {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub current: f64,
    /// `(last - first) / len`
    pub growth_rate: f64,
    /// Average change per sample over the last three points.
    pub recent_growth: f64,
    /// Coefficient of variation (`std / mean`, zero when the mean is not positive).
    pub volatility: f64,
    /// Least-squares slope per sample.
    pub trend: f64,
}

impl PressureSignature {
    pub fn new(readings: Vec<f64>) -> Self {
        Self {
            readings,
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Parse one of the accepted JSON layouts:
    ///
    /// - `[30, 35, 42]`
    /// - `[{"value": 30}, {"value": 35}]`
    /// - `{"readings": [[t, 30], [t, 35]], "context": {...}}` (dashboard export)
    /// - `{"readings": [30, 35], "context": {...}}`
    pub fn from_json(text: &str) -> Result<Self, SignatureError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, SignatureError> {
        match value {
            Value::Array(items) => Ok(Self::new(readings_from_items(items)?)),
            Value::Object(map) => {
                let items = map
                    .get("readings")
                    .and_then(Value::as_array)
                    .ok_or_else(|| SignatureError::Format("object without a `readings` array".into()))?;
                let mut signature = Self::new(readings_from_items(items)?);
                if let Some(context) = map.get("context").and_then(Value::as_object) {
                    for (key, value) in context {
                        let value = match value {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        };
                        signature.context.insert(key.clone(), value);
                    }
                }
                Ok(signature)
            }
            other => Err(SignatureError::Format(format!(
                "expected an array or object, found {}",
                json_kind(other)
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// `None` for trajectories shorter than three points.
    pub fn features(&self) -> Option<SignatureFeatures> {
        let data = &self.readings;
        let n = data.len();
        if n < MIN_POINTS {
            return None;
        }

        let len = n as f64;
        let mean = data.iter().sum::<f64>() / len;
        let variance = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len;
        let std = variance.sqrt();
        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let current = data[n - 1];

        Some(SignatureFeatures {
            mean,
            std,
            min,
            max,
            range: max - min,
            current,
            growth_rate: (current - data[0]) / len,
            recent_growth: (current - data[n - 3]) / 2.0,
            volatility: if mean > 0.0 { std / mean } else { 0.0 },
            trend: index_slope(data),
        })
    }

    /// Classify the trajectory. Context hints take precedence over the numbers.
    pub fn shape(&self) -> TrajectoryShape {
        if self.context.contains_key(FRAGMENTATION_HINT) {
            return TrajectoryShape::Fragmentation;
        }
        if self.context.contains_key(TRIGGER_HINT) {
            return TrajectoryShape::SpecificTrigger;
        }
        match self.features() {
            Some(features) => classify(&features, self.readings.len()),
            None => TrajectoryShape::Unknown,
        }
    }
}

fn classify(f: &SignatureFeatures, len: usize) -> TrajectoryShape {
    if f.trend > 5.0 && f.range > 30.0 {
        TrajectoryShape::RapidIncrease
    } else if f.trend > 0.5 && f.trend < 5.0 && f.volatility < 0.2 {
        TrajectoryShape::SteadyIncrease
    } else if f.range > 40.0 && f.volatility > 0.3 {
        TrajectoryShape::Spike
    } else if f.volatility > 0.25 && f.trend.abs() < 1.0 {
        TrajectoryShape::Fluctuation
    } else if f.mean > 75.0 && f.volatility < 0.15 {
        TrajectoryShape::PlateauHigh
    } else if f.min > 60.0 && len > 5 {
        TrajectoryShape::ImmediateHigh
    } else if f.trend > 0.0 {
        TrajectoryShape::GradualIncrease
    } else if f.trend < 0.0 {
        TrajectoryShape::GradualDecrease
    } else {
        TrajectoryShape::Stable
    }
}

fn index_slope(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = data.iter().sum::<f64>() / n;
    let mut numer = 0.0;
    let mut denom = 0.0;
    for (idx, y) in data.iter().enumerate() {
        let dx = idx as f64 - mean_x;
        numer += dx * (y - mean_y);
        denom += dx * dx;
    }
    if denom == 0.0 {
        0.0
    } else {
        numer / denom
    }
}

fn readings_from_items(items: &[Value]) -> Result<Vec<f64>, SignatureError> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let number = match item {
                Value::Number(_) => item.as_f64(),
                // Dashboard rows are `[timestamp, value]`.
                Value::Array(pair) => pair.get(1).and_then(Value::as_f64),
                Value::Object(map) => map.get("value").and_then(Value::as_f64),
                _ => None,
            };
            number.ok_or_else(|| {
                SignatureError::Format(format!("reading #{idx} is not a number: {item}"))
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
