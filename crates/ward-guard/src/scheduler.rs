use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Pressure (in percent) at or above which the heaviest actions run first.
pub const DEFAULT_ESCALATION_PCT: f64 = 90.0;

const BUILTIN_ACTIONS: &[(&str, f64)] = &[
    ("clear_temp_files", 0.3),
    ("reduce_log_verbosity", 0.3),
    ("pause_background_tasks", 0.4),
    ("reduce_cache_size", 0.4),
    ("unload_noncritical_shards", 0.6),
    ("degrade_quality", 0.6),
    ("flush_memory_cache", 0.7),
    ("switch_to_lightweight_models", 0.7),
    ("disable_features", 0.7),
    ("force_gc", 0.8),
    ("kill_largest_process", 0.9),
    ("activate_survival_mode", 1.0),
];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("action id must not be empty")]
    EmptyId,
    #[error("weight {weight} for action `{id}` is outside 0..=1")]
    WeightOutOfRange { id: String, weight: f64 },
}

/// Conventional grouping of action weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionBand {
    /// `weight <= 0.4`
    Light,
    /// `0.4 < weight <= 0.7`
    Medium,
    /// `weight > 0.7`
    Heavy,
}

impl ActionBand {
    pub fn for_weight(weight: f64) -> Self {
        if weight <= 0.4 {
            ActionBand::Light
        } else if weight <= 0.7 {
            ActionBand::Medium
        } else {
            ActionBand::Heavy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionBand::Light => "light",
            ActionBand::Medium => "medium",
            ActionBand::Heavy => "heavy",
        }
    }
}

impl fmt::Display for ActionBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mitigation actions and their impact weights, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCatalog {
    weights: IndexMap<String, f64>,
}

impl ActionCatalog {
    pub fn empty() -> Self {
        Self {
            weights: IndexMap::new(),
        }
    }

    /// The default catalog spanning light, medium and heavy actions.
    pub fn builtin() -> Self {
        let weights = BUILTIN_ACTIONS
            .iter()
            .map(|(id, weight)| (id.to_string(), *weight))
            .collect();
        Self { weights }
    }

    /// Declare an action, or override the weight of an existing one. An
    /// override keeps the action's original position.
    pub fn insert(&mut self, id: impl Into<String>, weight: f64) -> Result<Option<f64>, CatalogError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CatalogError::EmptyId);
        }
        if !(0.0..=1.0).contains(&weight) {
            return Err(CatalogError::WeightOutOfRange { id, weight });
        }
        Ok(self.weights.insert(id, weight))
    }

    pub fn with_overrides<I, S>(mut self, overrides: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        for (id, weight) in overrides {
            self.insert(id, weight)?;
        }
        Ok(self)
    }

    pub fn weight(&self, id: &str) -> Option<f64> {
        self.weights.get(id).copied()
    }

    pub fn band(&self, id: &str) -> Option<ActionBand> {
        self.weight(id).map(ActionBand::for_weight)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.weights.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(id, weight)| (id.as_str(), *weight))
    }

    pub fn ids(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Orders mitigation actions by impact weight for a given pressure.
///
/// Below the escalation threshold the lightest action comes first; at or above
/// it the heaviest one does. Equal weights keep catalog order. The scheduler
/// only orders; executing the plan is up to the caller.
#[derive(Debug, Clone)]
pub struct ActionScheduler {
    catalog: ActionCatalog,
    escalation_pct: f64,
}

impl ActionScheduler {
    pub fn new(catalog: ActionCatalog) -> Self {
        Self {
            catalog,
            escalation_pct: DEFAULT_ESCALATION_PCT,
        }
    }

    pub fn with_escalation_pct(mut self, escalation_pct: f64) -> Self {
        self.escalation_pct = escalation_pct;
        self
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn escalation_pct(&self) -> f64 {
        self.escalation_pct
    }

    pub fn escalates_at(&self, pressure_pct: f64) -> bool {
        pressure_pct >= self.escalation_pct
    }

    /// Known `available` ids ordered for `pressure_pct`. Unknown ids are
    /// dropped and duplicates collapse to their first occurrence.
    pub fn schedule<S: AsRef<str>>(&self, available: &[S], pressure_pct: f64) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut candidates: Vec<(usize, &str, f64)> = available
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|id| seen.insert(*id))
            .filter_map(|id| {
                self.catalog
                    .weights
                    .get_full(id)
                    .map(|(position, key, weight)| (position, key.as_str(), *weight))
            })
            .collect();

        let descending = self.escalates_at(pressure_pct);
        candidates.sort_by(|a, b| {
            let by_weight = if descending {
                b.2.total_cmp(&a.2)
            } else {
                a.2.total_cmp(&b.2)
            };
            by_weight.then(a.0.cmp(&b.0))
        });

        tracing::debug!(
            target = "ward.guard",
            pressure_pct,
            descending,
            planned = candidates.len(),
            "mitigation plan scheduled"
        );
        candidates.into_iter().map(|(_, id, _)| id.to_string()).collect()
    }

    /// Every catalog action ordered for `pressure_pct`.
    pub fn schedule_all(&self, pressure_pct: f64) -> Vec<String> {
        self.schedule(&self.catalog.ids(), pressure_pct)
    }
}

impl Default for ActionScheduler {
    fn default() -> Self {
        Self::new(ActionCatalog::builtin())
    }
}
