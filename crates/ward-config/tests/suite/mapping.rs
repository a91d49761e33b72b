use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;
use ward_config::WardConfig;
use ward_memory::PressureLevel;

const FULL: &str = r#"
[monitor]
check_interval_ms = 250
history_capacity = 20
warning_pct = 80
critical_pct = 92
trend_sensitivity = 1.0
trend_window = 5

[breaker]
critical_pct = 90
trip_history = 5

[scheduler]
escalation_pct = 85

[scheduler.weights]
drop_previews = 0.2
force_gc = 0.5

[watch]
interval_ms = 1000
recovery_pct = 60
stabilize_ms = 2000
recovery_delay_ms = 0

[watch.actions]
warning = ["drop_previews"]

[knowledge]
store_path = "state/kb.json"
confidence_floor = 0.6
recent_capacity = 10
similar_cases = 3
"#;

fn full() -> WardConfig {
    let (config, diagnostics) = WardConfig::load_from_str_with_diagnostics(FULL).unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    config
}

#[test]
fn monitor_and_breaker_sections_map_onto_runtime_configs() {
    let config = full();
    let monitor = config.monitor_config();
    assert_eq!(monitor.check_interval, Duration::from_millis(250));
    assert_eq!(monitor.history_capacity, 20);
    assert_eq!(monitor.thresholds.warning_pct, 80.0);
    assert_eq!(monitor.thresholds.critical_pct, 92.0);
    assert_eq!(monitor.trend_window, 5);

    let breaker = config.breaker_config();
    assert_eq!(breaker.warning_pct, None);
    assert_eq!(breaker.critical_pct, Some(90.0));
    assert_eq!(breaker.trip_history, 5);
}

#[test]
fn scheduler_weights_extend_and_override_the_builtin_catalog() {
    let scheduler = full().action_scheduler().unwrap();
    assert_eq!(scheduler.escalation_pct(), 85.0);
    assert_eq!(scheduler.catalog().weight("drop_previews"), Some(0.2));
    assert_eq!(scheduler.catalog().weight("force_gc"), Some(0.5));
    assert_eq!(scheduler.catalog().weight("activate_survival_mode"), Some(1.0));

    let plan = scheduler.schedule(&["force_gc", "drop_previews", "degrade_quality"], 50.0);
    assert_eq!(plan, vec!["drop_previews", "force_gc", "degrade_quality"]);
}

#[test]
fn watch_actions_replace_only_the_listed_levels() {
    let watch = full().watch_config();
    assert_eq!(watch.interval, Duration::from_secs(1));
    assert_eq!(watch.recovery_delay, Duration::ZERO);
    assert_eq!(
        watch.actions.get(&PressureLevel::Warning),
        Some(&vec!["drop_previews".to_string()])
    );
    assert_eq!(
        watch.actions.get(&PressureLevel::Emergency),
        Some(&vec!["kill_largest_process".to_string(), "force_gc".to_string()])
    );
}

#[test]
fn knowledge_section_maps_onto_the_engine() {
    let config = full();
    let engine = config.engine_config();
    assert_eq!(engine.confidence_floor, 0.6);
    assert_eq!(engine.recent_capacity, 10);
    assert_eq!(engine.similar_cases, 3);
    assert_eq!(config.store_path(), PathBuf::from("state/kb.json"));
}
