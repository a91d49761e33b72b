use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ward_guard::{
    ActionCatalog, ActionScheduler, CleanupError, Mitigator, PressureWatch, ResourceRegistry,
    WatchConfig, WatchEvent,
};
use ward_memory::{MemoryReading, MonitorConfig, PressureLevel, PressureMonitor, SampleError};

#[derive(Clone)]
struct Dial(Arc<Mutex<f64>>);

impl Dial {
    fn new(percent: f64) -> Self {
        Dial(Arc::new(Mutex::new(percent)))
    }

    fn set(&self, percent: f64) {
        *self.0.lock().unwrap() = percent;
    }

    fn get(&self) -> f64 {
        *self.0.lock().unwrap()
    }
}

impl ward_memory::MemorySource for Dial {
    fn read(&self) -> Result<MemoryReading, SampleError> {
        Ok(MemoryReading {
            percent_used: self.get(),
            absolute_mb: 0.0,
        })
    }
}

fn monitor(dial: &Dial) -> Arc<PressureMonitor> {
    Arc::new(PressureMonitor::new(
        MonitorConfig {
            check_interval: Duration::ZERO,
            ..MonitorConfig::default()
        },
        Arc::new(dial.clone()),
    ))
}

/// Handler that lowers the dial by `relief` points and logs its id.
fn relieving(
    dial: &Dial,
    log: &Arc<Mutex<Vec<String>>>,
    id: &'static str,
    relief: f64,
) -> impl Fn(PressureLevel) -> Result<(), CleanupError> + Send + Sync + 'static {
    let dial = dial.clone();
    let log = Arc::clone(log);
    move |_level| {
        log.lock().unwrap().push(id.to_string());
        dial.set(dial.get() - relief);
        Ok(())
    }
}

#[test]
fn plan_stops_once_pressure_falls_below_warning() {
    let dial = Dial::new(92.0);
    let monitor = monitor(&dial);
    let log = Arc::new(Mutex::new(Vec::new()));
    let mitigator = Mitigator::new();
    mitigator.register("clear_temp_files", relieving(&dial, &log, "clear_temp_files", 4.0));
    mitigator.register("reduce_cache_size", relieving(&dial, &log, "reduce_cache_size", 5.0));
    mitigator.register("force_gc", relieving(&dial, &log, "force_gc", 10.0));

    let plan: Vec<String> = ["clear_temp_files", "reduce_cache_size", "force_gc"]
        .into_iter()
        .map(String::from)
        .collect();
    let report = mitigator.execute(&plan, PressureLevel::Critical, &monitor);

    assert_eq!(*log.lock().unwrap(), vec!["clear_temp_files", "reduce_cache_size"]);
    assert_eq!(report.skipped, vec!["force_gc"]);
    assert!(report.stopped_early());
    assert_eq!(report.final_sample.map(|s| s.percent_used), Some(83.0));
    assert_eq!(report.steps[0].percent_after, Some(88.0));
}

#[test]
fn missing_and_failing_handlers_are_recorded() {
    let dial = Dial::new(99.0);
    let monitor = monitor(&dial);
    let mitigator = Mitigator::new();
    mitigator.register("explode", |_| -> Result<(), CleanupError> { panic!("kaboom") });
    mitigator.register("refuse", |_| Err(CleanupError::failed("not now")));

    let plan = vec!["explode".to_string(), "unknown".to_string(), "refuse".to_string()];
    let report = mitigator.execute(&plan, PressureLevel::Emergency, &monitor);

    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.succeeded(), 0);
    assert_eq!(
        report.steps[0].error.as_deref(),
        Some("cleanup handler panicked: kaboom")
    );
    assert!(report.steps[1].error.as_deref().unwrap().contains("no handler"));
    assert_eq!(report.steps[2].error.as_deref(), Some("not now"));
    assert_eq!(mitigator.history(10).len(), 3);
}

#[test]
fn action_history_is_bounded() {
    let dial = Dial::new(99.0);
    let monitor = monitor(&dial);
    let mitigator = Mitigator::with_history_capacity(3);
    mitigator.register("noop", |_| Ok(()));
    let plan = vec!["noop".to_string(); 5];

    mitigator.execute(&plan, PressureLevel::Critical, &monitor);

    assert_eq!(mitigator.history(100).len(), 3);
    assert_eq!(mitigator.history(1).len(), 1);
}

#[test]
fn survival_mode_releases_every_resource() {
    let registry = Arc::new(ResourceRegistry::with_reclaim_hint(|| {}));
    registry.register("a", (), || Ok(()), &[]);
    registry.register("b", (), || Ok(()), &["a"]);
    let mitigator = Mitigator::new().with_builtin_handlers(Arc::clone(&registry));

    assert!(mitigator
        .run_action("activate_survival_mode", PressureLevel::Warning)
        .is_err());
    assert_eq!(registry.len(), 2);

    mitigator
        .run_action("activate_survival_mode", PressureLevel::Emergency)
        .unwrap();
    assert!(registry.is_empty());
    assert!(mitigator.run_action("force_gc", PressureLevel::Critical).is_ok());
}

fn watch_fixture(dial: &Dial, log: &Arc<Mutex<Vec<String>>>) -> PressureWatch {
    let mitigator = Arc::new(Mitigator::new());
    for id in ["clear_temp_files", "reduce_log_verbosity", "degrade_quality"] {
        mitigator.register(id, relieving(dial, log, id, 0.0));
    }
    let mut actions = BTreeMap::new();
    actions.insert(
        PressureLevel::Warning,
        vec!["reduce_log_verbosity".to_string(), "clear_temp_files".to_string()],
    );
    actions.insert(PressureLevel::Critical, vec!["degrade_quality".to_string()]);

    PressureWatch::new(
        WatchConfig {
            interval: Duration::from_millis(10),
            recovery_pct: 70.0,
            stabilize: Duration::ZERO,
            recovery_delay: Duration::ZERO,
            actions,
        },
        monitor(dial),
        Arc::new(ActionScheduler::new(ActionCatalog::builtin())),
        mitigator,
    )
}

#[test]
fn watch_escalates_and_recovers_step_by_step() {
    let dial = Dial::new(50.0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let watch = watch_fixture(&dial, &log);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    watch.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    assert_eq!(watch.tick(), None);

    dial.set(86.0);
    match watch.tick() {
        Some(WatchEvent::Triggered {
            previous, level, ..
        }) => {
            assert_eq!(previous, PressureLevel::Normal);
            assert_eq!(level, PressureLevel::Warning);
        }
        other => panic!("expected a trigger, got {other:?}"),
    }
    // Equal weights keep catalog order, where `clear_temp_files` comes first.
    assert_eq!(*log.lock().unwrap(), vec!["clear_temp_files", "reduce_log_verbosity"]);

    // Same level again: nothing new to do.
    assert_eq!(watch.tick(), None);

    // Critical and still climbing escalates straight to emergency.
    dial.set(96.0);
    assert!(matches!(
        watch.tick(),
        Some(WatchEvent::Triggered { level: PressureLevel::Emergency, .. })
    ));
    assert_eq!(watch.current_level(), PressureLevel::Emergency);

    dial.set(60.0);
    for expected in [PressureLevel::Critical, PressureLevel::Warning, PressureLevel::Normal] {
        match watch.tick() {
            Some(WatchEvent::Recovered { level, .. }) => assert_eq!(level, expected),
            other => panic!("expected a recovery, got {other:?}"),
        }
    }
    assert_eq!(watch.tick(), None);
    assert_eq!(events.lock().unwrap().len(), 5);
}

#[test]
fn actions_do_not_repeat_until_full_recovery() {
    let dial = Dial::new(86.0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let watch = watch_fixture(&dial, &log);

    watch.tick();
    watch.force_trigger(PressureLevel::Warning);
    assert_eq!(log.lock().unwrap().len(), 2);

    dial.set(50.0);
    watch.tick();
    assert_eq!(watch.current_level(), PressureLevel::Normal);

    dial.set(86.0);
    watch.tick();
    assert_eq!(log.lock().unwrap().len(), 4);
}

#[test]
fn background_thread_starts_and_stops() {
    let dial = Dial::new(86.0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let watch = watch_fixture(&dial, &log);

    assert!(watch.start().unwrap());
    assert!(!watch.start().unwrap());

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while watch.current_level() != PressureLevel::Warning {
        assert!(std::time::Instant::now() < deadline, "watch never escalated");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(watch.stop());
    assert!(!watch.stop());
    assert!(!watch.is_running());
}
