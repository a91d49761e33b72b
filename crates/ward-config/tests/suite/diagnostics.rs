use pretty_assertions::assert_eq;
use ward_config::{ConfigValidationError, ConfigWarning, WardConfig};

#[test]
fn reports_unknown_keys_with_full_paths() {
    let text = r#"
typo = 1

[monitor]
warn_pct = 80

[knowledge]
store = "kb.json"
"#;

    let (_config, diagnostics) =
        WardConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert_eq!(
        diagnostics.unknown_keys,
        vec!["knowledge.store", "monitor.warn_pct", "typo"]
    );
    assert!(diagnostics.is_ok());
}

#[test]
fn empty_config_is_clean() {
    let (config, diagnostics) = WardConfig::load_from_str_with_diagnostics("").unwrap();
    assert_eq!(config, WardConfig::default());
    assert!(diagnostics.is_empty());
}

#[test]
fn thresholds_must_be_ordered_and_in_range() {
    let text = r#"
[monitor]
warning_pct = 96
critical_pct = 120
"#;

    let (_config, diagnostics) = WardConfig::load_from_str_with_diagnostics(text).unwrap();
    assert!(!diagnostics.is_ok());
    assert!(diagnostics.errors.contains(&ConfigValidationError::InvalidValue {
        toml_path: "monitor.critical_pct".to_string(),
        message: "must be within 0..=100, got 120".to_string(),
    }));

    let text = r#"
[breaker]
warning_pct = 90
critical_pct = 80
"#;
    let (_config, diagnostics) = WardConfig::load_from_str_with_diagnostics(text).unwrap();
    assert_eq!(
        diagnostics.errors,
        vec![ConfigValidationError::ThresholdsOutOfOrder {
            section: "breaker",
            warning_pct: 90.0,
            critical_pct: 80.0,
        }]
    );
}

#[test]
fn rejects_out_of_range_weights_and_zero_capacities() {
    let text = r#"
[scheduler.weights]
rebuild_index = 1.5

[knowledge]
recent_capacity = 0
confidence_floor = 0.5
"#;

    let (_config, diagnostics) = WardConfig::load_from_str_with_diagnostics(text).unwrap();
    let paths: Vec<&str> = diagnostics
        .errors
        .iter()
        .filter_map(|error| match error {
            ConfigValidationError::InvalidValue { toml_path, .. } => Some(toml_path.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        paths,
        vec!["scheduler.weights.rebuild_index", "knowledge.recent_capacity"]
    );
}

#[test]
fn watch_actions_are_checked_against_the_catalog() {
    let text = r#"
[scheduler.weights]
drop_previews = 0.2

[watch.actions]
warning = ["drop_previews", "defragment"]
panic = ["force_gc"]
"#;

    let (_config, diagnostics) = WardConfig::load_from_str_with_diagnostics(text).unwrap();
    assert_eq!(
        diagnostics.warnings,
        vec![ConfigWarning::UnknownAction {
            toml_path: "watch.actions.warning".to_string(),
            action: "defragment".to_string(),
        }]
    );
    assert_eq!(diagnostics.errors.len(), 1);
}

#[test]
fn invalid_logging_level_is_a_warning() {
    let text = r#"
[logging]
level = "ward.guard=loud"
"#;

    let (_config, diagnostics) = WardConfig::load_from_str_with_diagnostics(text).unwrap();
    assert!(diagnostics.is_ok());
    assert!(matches!(
        diagnostics.warnings.as_slice(),
        [ConfigWarning::LoggingLevelInvalid { .. }]
    ));
}

#[test]
fn malformed_toml_is_an_error() {
    let err = WardConfig::load_from_str_with_diagnostics("[monitor\nwarning_pct = 1").unwrap_err();
    assert!(matches!(err, ward_config::ConfigError::Toml(_)));
}
