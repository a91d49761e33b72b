use crate::diagnostics::{ConfigValidationError, ConfigWarning, ValidationDiagnostics};
use crate::{parse_alert_level, WardConfig};
use ward_guard::ActionCatalog;

const MIN_TREND_WINDOW: usize = 3;

impl WardConfig {
    /// Check semantic invariants, reporting as many problems as possible in one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        validate_logging(self, &mut out);
        validate_monitor(self, &mut out);
        validate_breaker(self, &mut out);
        validate_scheduler(self, &mut out);
        validate_watch(self, &mut out);
        validate_knowledge(self, &mut out);

        out
    }
}

fn invalid(out: &mut ValidationDiagnostics, toml_path: &str, message: impl Into<String>) {
    out.errors.push(ConfigValidationError::InvalidValue {
        toml_path: toml_path.to_string(),
        message: message.into(),
    });
}

fn check_percent(out: &mut ValidationDiagnostics, toml_path: &str, value: f64) {
    if !(0.0..=100.0).contains(&value) {
        invalid(out, toml_path, format!("must be within 0..=100, got {value}"));
    }
}

fn validate_logging(config: &WardConfig, out: &mut ValidationDiagnostics) {
    let normalized = config.logging.level_directives();
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }
}

fn validate_monitor(config: &WardConfig, out: &mut ValidationDiagnostics) {
    let monitor = &config.monitor;
    check_percent(out, "monitor.warning_pct", monitor.warning_pct);
    check_percent(out, "monitor.critical_pct", monitor.critical_pct);
    if monitor.warning_pct >= monitor.critical_pct {
        out.errors.push(ConfigValidationError::ThresholdsOutOfOrder {
            section: "monitor",
            warning_pct: monitor.warning_pct,
            critical_pct: monitor.critical_pct,
        });
    }
    if monitor.history_capacity == 0 {
        invalid(out, "monitor.history_capacity", "must be >= 1");
    }
    if monitor.trend_sensitivity < 0.0 {
        invalid(out, "monitor.trend_sensitivity", "must be >= 0");
    }
    if monitor.trend_window < MIN_TREND_WINDOW {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "monitor.trend_window".to_string(),
            message: format!("trends need at least {MIN_TREND_WINDOW} samples; {MIN_TREND_WINDOW} is used"),
        });
    }
    if monitor.trend_window > monitor.history_capacity {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "monitor.trend_window".to_string(),
            message: "larger than monitor.history_capacity; the whole history is used".to_string(),
        });
    }
}

fn validate_breaker(config: &WardConfig, out: &mut ValidationDiagnostics) {
    let breaker = &config.breaker;
    if let Some(pct) = breaker.warning_pct {
        check_percent(out, "breaker.warning_pct", pct);
    }
    if let Some(pct) = breaker.critical_pct {
        check_percent(out, "breaker.critical_pct", pct);
    }
    let warning_pct = breaker.warning_pct.unwrap_or(config.monitor.warning_pct);
    let critical_pct = breaker.critical_pct.unwrap_or(config.monitor.critical_pct);
    if (breaker.warning_pct.is_some() || breaker.critical_pct.is_some())
        && warning_pct >= critical_pct
    {
        out.errors.push(ConfigValidationError::ThresholdsOutOfOrder {
            section: "breaker",
            warning_pct,
            critical_pct,
        });
    }
    if breaker.trip_history == 0 {
        invalid(out, "breaker.trip_history", "must be >= 1");
    }
}

fn validate_scheduler(config: &WardConfig, out: &mut ValidationDiagnostics) {
    check_percent(out, "scheduler.escalation_pct", config.scheduler.escalation_pct);
    for (id, weight) in &config.scheduler.weights {
        if id.trim().is_empty() {
            invalid(out, "scheduler.weights", "action ids must not be empty");
        } else if !(0.0..=1.0).contains(weight) {
            invalid(
                out,
                &format!("scheduler.weights.{id}"),
                format!("must be within 0..=1, got {weight}"),
            );
        }
    }
}

fn validate_watch(config: &WardConfig, out: &mut ValidationDiagnostics) {
    let watch = &config.watch;
    if watch.interval_ms == 0 {
        invalid(out, "watch.interval_ms", "must be >= 1");
    }
    check_percent(out, "watch.recovery_pct", watch.recovery_pct);
    if watch.recovery_pct >= config.monitor.warning_pct {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "watch.recovery_pct".to_string(),
            message: "at or above monitor.warning_pct; the watch may recover while still under pressure"
                .to_string(),
        });
    }

    // Only ids the scheduler knows are ever executed.
    let catalog = config
        .action_catalog()
        .unwrap_or_else(|_| ActionCatalog::builtin());
    for (key, ids) in &watch.actions {
        if parse_alert_level(key).is_none() {
            invalid(
                out,
                &format!("watch.actions.{key}"),
                "expected one of `warning`, `critical`, `emergency`",
            );
            continue;
        }
        for action in ids.iter().filter(|id| !catalog.contains(id)) {
            out.warnings.push(ConfigWarning::UnknownAction {
                toml_path: format!("watch.actions.{key}"),
                action: action.clone(),
            });
        }
    }
}

fn validate_knowledge(config: &WardConfig, out: &mut ValidationDiagnostics) {
    let knowledge = &config.knowledge;
    if !(0.0..=1.0).contains(&knowledge.confidence_floor) {
        invalid(
            out,
            "knowledge.confidence_floor",
            format!("must be within 0..=1, got {}", knowledge.confidence_floor),
        );
    }
    if knowledge.recent_capacity == 0 {
        invalid(out, "knowledge.recent_capacity", "must be >= 1");
    }
}
