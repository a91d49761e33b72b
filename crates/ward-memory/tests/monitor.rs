use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ward_memory::{
    MemoryReading, MemorySample, MonitorConfig, PressureLevel, PressureMonitor, SampleError, Trend,
};

/// Replays a fixed list of percentages and counts how often it was read.
struct ScriptedSource {
    values: Mutex<Vec<f64>>,
    reads: AtomicUsize,
}

impl ScriptedSource {
    fn new(values: &[f64]) -> Arc<Self> {
        let mut values = values.to_vec();
        values.reverse();
        Arc::new(Self {
            values: Mutex::new(values),
            reads: AtomicUsize::new(0),
        })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ward_memory::MemorySource for ScriptedSource {
    fn read(&self) -> Result<MemoryReading, SampleError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let percent_used = self
            .values
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| SampleError::Unavailable("script exhausted".into()))?;
        Ok(MemoryReading {
            percent_used,
            absolute_mb: percent_used * 10.0,
        })
    }
}

fn monitor_with(values: &[f64], check_interval: Duration) -> (PressureMonitor, Arc<ScriptedSource>) {
    let source = ScriptedSource::new(values);
    let config = MonitorConfig {
        check_interval,
        ..MonitorConfig::default()
    };
    (PressureMonitor::new(config, source.clone()), source)
}

fn record_all(monitor: &PressureMonitor, values: &[f64]) {
    for (idx, value) in values.iter().enumerate() {
        monitor.record(MemorySample::new(1_000 * idx as u64, *value, 0.0));
    }
}

#[test]
fn repeated_samples_within_interval_reuse_cached_reading() {
    let (monitor, source) = monitor_with(&[40.0, 50.0], Duration::from_secs(3600));

    let first = monitor.sample().unwrap();
    let second = monitor.sample().unwrap();

    assert_eq!(first, second);
    assert_eq!(source.reads(), 1);
    assert_eq!(monitor.history().len(), 1);
}

#[test]
fn sample_fresh_bypasses_rate_limit() {
    let (monitor, source) = monitor_with(&[40.0, 50.0], Duration::from_secs(3600));

    monitor.sample().unwrap();
    let fresh = monitor.sample_fresh().unwrap();

    assert_eq!(fresh.percent_used, 50.0);
    assert_eq!(source.reads(), 2);
}

#[test]
fn zero_interval_always_reads() {
    let (monitor, source) = monitor_with(&[10.0, 20.0, 30.0], Duration::ZERO);
    for _ in 0..3 {
        monitor.sample().unwrap();
    }
    assert_eq!(source.reads(), 3);
    assert_eq!(monitor.latest().map(|s| s.percent_used), Some(30.0));
}

#[test]
fn source_errors_propagate_without_touching_history() {
    let (monitor, _source) = monitor_with(&[], Duration::ZERO);
    let err = monitor.sample().unwrap_err();
    assert!(matches!(err, SampleError::Unavailable(_)));
    assert!(monitor.history().is_empty());
}

#[test]
fn history_is_a_bounded_ring() {
    let monitor = PressureMonitor::new(
        MonitorConfig {
            history_capacity: 4,
            ..MonitorConfig::default()
        },
        ScriptedSource::new(&[]),
    );
    record_all(&monitor, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    let values: Vec<f64> = monitor.history().iter().map(|s| s.percent_used).collect();
    assert_eq!(values, vec![3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn classify_uses_configured_thresholds() {
    let (monitor, _) = monitor_with(&[], Duration::ZERO);
    let at = |pct| monitor.classify(&MemorySample::new(0, pct, 0.0));
    assert_eq!(at(84.9), PressureLevel::Normal);
    assert_eq!(at(85.0), PressureLevel::Warning);
    assert_eq!(at(95.0), PressureLevel::Critical);
}

#[test]
fn trend_needs_three_samples() {
    let (monitor, _) = monitor_with(&[], Duration::ZERO);
    record_all(&monitor, &[10.0, 40.0]);
    assert_eq!(monitor.trend(), Trend::Stable);
    assert!(!monitor.is_rising());

    monitor.record(MemorySample::new(2_000, 70.0, 0.0));
    assert!(monitor.is_rising());
}

#[test]
fn transient_spike_is_not_a_rising_trend() {
    let (monitor, _) = monitor_with(&[], Duration::ZERO);
    record_all(&monitor, &[60.0, 88.0, 60.0]);
    assert_eq!(monitor.trend(), Trend::Stable);
}

#[test]
fn falling_trajectory_is_reported() {
    let (monitor, _) = monitor_with(&[], Duration::ZERO);
    record_all(&monitor, &[80.0, 75.0, 70.0]);
    assert_eq!(monitor.trend(), Trend::Falling);
}

#[test]
fn should_trip_hard_and_early() {
    let (monitor, _) = monitor_with(&[], Duration::ZERO);
    assert!(!monitor.should_trip(95.0, 85.0), "no samples never trips");

    record_all(&monitor, &[86.0, 86.2, 86.1]);
    assert!(!monitor.should_trip(95.0, 85.0), "above warning but flat");

    monitor.clear();
    record_all(&monitor, &[80.0, 83.0, 86.0]);
    assert!(monitor.should_trip(95.0, 85.0), "above warning and rising");

    monitor.clear();
    record_all(&monitor, &[97.0, 96.0, 95.0]);
    assert!(monitor.should_trip(95.0, 85.0), "hard ceiling ignores the trend");
}

#[test]
fn trip_sample_is_the_reading_that_was_judged() {
    let (monitor, _) = monitor_with(&[], Duration::ZERO);
    assert_eq!(monitor.trip_sample(95.0, 85.0), None);

    record_all(&monitor, &[80.0, 83.0, 86.5]);
    let judged = monitor.trip_sample(95.0, 85.0).expect("rising above warning trips");
    assert_eq!(judged.percent_used, 86.5);
    assert_eq!(Some(judged), monitor.latest());

    monitor.clear();
    record_all(&monitor, &[86.0, 86.2, 86.1]);
    assert_eq!(monitor.trip_sample(95.0, 85.0), None, "flat below critical");

    monitor.clear();
    record_all(&monitor, &[97.0, 96.0, 95.0]);
    assert_eq!(monitor.trip_sample(95.0, 85.0).map(|s| s.percent_used), Some(95.0));
}

#[test]
fn level_escalates_to_emergency_when_critical_and_rising() {
    let (monitor, _) = monitor_with(&[], Duration::ZERO);
    record_all(&monitor, &[90.0, 93.0, 96.0]);
    assert_eq!(monitor.level(), PressureLevel::Emergency);

    monitor.clear();
    record_all(&monitor, &[96.0, 96.0, 96.0]);
    assert_eq!(monitor.level(), PressureLevel::Critical);
}

#[test]
fn stats_summarize_history() {
    let (monitor, _) = monitor_with(&[], Duration::ZERO);
    assert_eq!(monitor.stats().samples, 0);

    record_all(&monitor, &[50.0, 60.0, 70.0]);
    let stats = monitor.stats();
    assert_eq!(stats.current, 70.0);
    assert_eq!(stats.average, 60.0);
    assert_eq!(stats.max, 70.0);
    assert_eq!(stats.min, 50.0);
    assert_eq!(stats.samples, 3);
    assert_eq!(stats.trend, Trend::Rising);
    assert_eq!(stats.level, PressureLevel::Normal);

    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["trend"], "rising");
    assert_eq!(json["level"], "normal");
}

#[test]
fn closures_are_memory_sources() {
    let monitor = PressureMonitor::new(
        MonitorConfig::default(),
        Arc::new(|| -> Result<MemoryReading, SampleError> {
            Ok(MemoryReading {
                percent_used: 12.5,
                absolute_mb: 64.0,
            })
        }),
    );
    let sample = monitor.sample().unwrap();
    assert_eq!(sample.percent_used, 12.5);
    assert_eq!(sample.absolute_mb, 64.0);
}
