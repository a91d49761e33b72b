use std::fs;
use ward_config::{discover_config_path, load_for_dir, WardConfig, WARD_CONFIG_ENV_VAR};

// Environment variables are process-wide, so every discovery case lives in one test.
#[test]
fn discovery_prefers_the_env_var_then_ward_toml() {
    let dir = tempfile::tempdir().unwrap();
    std::env::remove_var(WARD_CONFIG_ENV_VAR);

    assert_eq!(discover_config_path(dir.path()), None);
    let (config, path) = load_for_dir(dir.path()).unwrap();
    assert_eq!(config, WardConfig::default());
    assert_eq!(path, None);

    fs::write(dir.path().join("ward.toml"), "[monitor]\nwarning_pct = 70\n").unwrap();
    let (config, path) = load_for_dir(dir.path()).unwrap();
    assert_eq!(config.monitor.warning_pct, 70.0);
    assert_eq!(path, Some(dir.path().join("ward.toml")));

    fs::write(dir.path().join("custom.toml"), "[monitor]\nwarning_pct = 60\n").unwrap();
    std::env::set_var(WARD_CONFIG_ENV_VAR, "custom.toml");
    let (config, path) = load_for_dir(dir.path()).unwrap();
    std::env::remove_var(WARD_CONFIG_ENV_VAR);
    assert_eq!(config.monitor.warning_pct, 60.0);
    assert_eq!(path, Some(dir.path().join("custom.toml")));
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = WardConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ward_config::ConfigError::Io { .. }));
}
