//! Configuration for Ward.
//!
//! A `ward.toml` file has one table per component:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [monitor]
//! warning_pct = 85
//! critical_pct = 95
//!
//! [scheduler.weights]
//! rebuild_thumbnails = 0.5
//!
//! [watch.actions]
//! warning = ["clear_temp_files", "reduce_log_verbosity"]
//!
//! [knowledge]
//! store_path = "ward_knowledge.json"
//! ```
//!
//! Every key is optional. The `*_config` methods map each table onto the
//! runtime configuration of the matching crate.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use ward_guard::{ActionCatalog, ActionScheduler, BreakerConfig, CatalogError, WatchConfig};
use ward_kb::EngineConfig;
use ward_memory::{MonitorConfig, PressureLevel, PressureThresholds};

mod diagnostics;
mod logging;
mod validation;

pub use diagnostics::{
    ConfigDiagnostics, ConfigValidationError, ConfigWarning, ValidationDiagnostics,
};
pub use logging::{init_tracing, LoggingConfig};

/// Environment variable naming the config file to load.
pub const WARD_CONFIG_ENV_VAR: &str = "WARD_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "ward.toml";
pub const DEFAULT_STORE_FILE: &str = "ward_knowledge.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WardConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub breaker: BreakerSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub knowledge: KnowledgeSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Samples requested within this interval reuse the cached one.
    pub check_interval_ms: u64,
    pub history_capacity: usize,
    pub warning_pct: f64,
    pub critical_pct: f64,
    /// Percentage points per sample above which usage counts as rising.
    pub trend_sensitivity: f64,
    pub trend_window: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            check_interval_ms: 500,
            history_capacity: defaults.history_capacity,
            warning_pct: defaults.thresholds.warning_pct,
            critical_pct: defaults.thresholds.critical_pct,
            trend_sensitivity: defaults.trend_sensitivity,
            trend_window: defaults.trend_window,
        }
    }
}

/// Breaker thresholds default to the monitor's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_pct: Option<f64>,
    pub trip_history: usize,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            warning_pct: None,
            critical_pct: None,
            trip_history: BreakerConfig::default().trip_history,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// At or above this usage the heaviest action is scheduled first.
    pub escalation_pct: f64,
    /// Extra actions, or new weights for builtin ones.
    pub weights: IndexMap<String, f64>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            escalation_pct: ward_guard::DEFAULT_ESCALATION_PCT,
            weights: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub interval_ms: u64,
    pub recovery_pct: f64,
    pub stabilize_ms: u64,
    pub recovery_delay_ms: u64,
    /// Action ids per level (`warning`, `critical`, `emergency`). Levels that
    /// are not listed keep their default actions.
    pub actions: BTreeMap<String, Vec<String>>,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            recovery_pct: 70.0,
            stabilize_ms: 30_000,
            recovery_delay_ms: 60_000,
            actions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    /// Where learned cases and diagnosis history are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    pub confidence_floor: f64,
    pub recent_capacity: usize,
    pub similar_cases: usize,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            store_path: None,
            confidence_floor: defaults.confidence_floor,
            recent_capacity: defaults.recent_capacity,
            similar_cases: defaults.similar_cases,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.message().to_owned())
    }
}

impl From<CatalogError> for ConfigError {
    fn from(err: CatalogError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

impl WardConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        Ok(toml::from_str(&text)?)
    }

    /// Load a config file and report unknown keys and validation problems.
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<WardConfig>(text)?;
        let mut diagnostics = ConfigDiagnostics {
            unknown_keys,
            ..ConfigDiagnostics::default()
        };
        diagnostics.extend_validation(config.validate());
        Ok((config, diagnostics))
    }

    pub fn thresholds(&self) -> PressureThresholds {
        PressureThresholds {
            warning_pct: self.monitor.warning_pct,
            critical_pct: self.monitor.critical_pct,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            check_interval: Duration::from_millis(self.monitor.check_interval_ms),
            history_capacity: self.monitor.history_capacity,
            thresholds: self.thresholds(),
            trend_sensitivity: self.monitor.trend_sensitivity,
            trend_window: self.monitor.trend_window,
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            warning_pct: self.breaker.warning_pct,
            critical_pct: self.breaker.critical_pct,
            trip_history: self.breaker.trip_history,
        }
    }

    /// The builtin catalog with `[scheduler.weights]` applied in file order.
    pub fn action_catalog(&self) -> Result<ActionCatalog, CatalogError> {
        ActionCatalog::builtin().with_overrides(
            self.scheduler
                .weights
                .iter()
                .map(|(id, weight)| (id.clone(), *weight)),
        )
    }

    pub fn action_scheduler(&self) -> Result<ActionScheduler, CatalogError> {
        Ok(ActionScheduler::new(self.action_catalog()?)
            .with_escalation_pct(self.scheduler.escalation_pct))
    }

    pub fn watch_config(&self) -> WatchConfig {
        let mut actions = WatchConfig::default().actions;
        for (key, ids) in &self.watch.actions {
            match parse_alert_level(key) {
                Some(level) => {
                    actions.insert(level, ids.clone());
                }
                None => tracing::warn!(
                    target = "ward.config",
                    key = %key,
                    "ignoring watch actions for unknown level"
                ),
            }
        }
        WatchConfig {
            interval: Duration::from_millis(self.watch.interval_ms),
            recovery_pct: self.watch.recovery_pct,
            stabilize: Duration::from_millis(self.watch.stabilize_ms),
            recovery_delay: Duration::from_millis(self.watch.recovery_delay_ms),
            actions,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            confidence_floor: self.knowledge.confidence_floor,
            recent_capacity: self.knowledge.recent_capacity,
            similar_cases: self.knowledge.similar_cases,
        }
    }

    /// `knowledge.store_path`, or [`DEFAULT_STORE_FILE`] in the working directory.
    pub fn store_path(&self) -> PathBuf {
        self.knowledge
            .store_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE))
    }
}

/// Levels that can carry watch actions. `normal` never fires.
pub(crate) fn parse_alert_level(key: &str) -> Option<PressureLevel> {
    let key = key.trim().to_ascii_lowercase();
    PressureLevel::all()
        .into_iter()
        .filter(|level| *level != PressureLevel::Normal)
        .find(|level| level.as_str() == key)
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Locate the config file for a working directory.
///
/// Search order:
/// 1) `WARD_CONFIG` (absolute or relative to `dir`)
/// 2) `ward.toml` in `dir`
pub fn discover_config_path(dir: &Path) -> Option<PathBuf> {
    if let Some(value) = std::env::var_os(WARD_CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        let candidate = PathBuf::from(value);
        return Some(if candidate.is_absolute() {
            candidate
        } else {
            dir.join(candidate)
        });
    }

    Some(dir.join(DEFAULT_CONFIG_FILE)).filter(|path| path.is_file())
}

/// Load the config for `dir`, or the defaults when there is no config file.
pub fn load_for_dir(dir: &Path) -> Result<(WardConfig, Option<PathBuf>), ConfigError> {
    match discover_config_path(dir) {
        Some(path) => {
            let config = WardConfig::load_from_path(&path)?;
            Ok((config, Some(path)))
        }
        None => Ok((WardConfig::default(), None)),
    }
}
