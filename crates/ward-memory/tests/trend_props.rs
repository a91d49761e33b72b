use proptest::prelude::*;
use std::sync::Arc;
use ward_memory::{MemoryReading, MemorySample, MonitorConfig, PressureMonitor, SampleError};

const PROPTEST_CASES: u32 = 256;

fn monitor(capacity: usize) -> PressureMonitor {
    PressureMonitor::new(
        MonitorConfig {
            history_capacity: capacity,
            ..MonitorConfig::default()
        },
        Arc::new(|| -> Result<MemoryReading, SampleError> {
            Err(SampleError::Unavailable("replay only".into()))
        }),
    )
}

fn replay(monitor: &PressureMonitor, values: &[f64], interval_ms: u64) {
    for (idx, value) in values.iter().enumerate() {
        monitor.record(MemorySample::new(interval_ms * idx as u64, *value, 0.0));
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: PROPTEST_CASES, .. ProptestConfig::default() })]

    #[test]
    fn flat_band_never_rises(
        base in 0.0f64..99.0,
        offsets in prop::collection::vec(0.0f64..=1.0, 3..12),
        interval_ms in 1u64..10_000,
    ) {
        let monitor = monitor(10);
        let values: Vec<f64> = offsets.iter().map(|offset| base + offset).collect();
        replay(&monitor, &values, interval_ms);
        prop_assert!(!monitor.is_rising(), "values {values:?}");
    }

    #[test]
    fn steady_climb_always_rises(
        start in 0.0f64..50.0,
        step in 2.0f64..8.0,
        len in 3usize..10,
        interval_ms in 1u64..10_000,
    ) {
        let monitor = monitor(10);
        let values: Vec<f64> = (0..len).map(|idx| start + step * idx as f64).collect();
        replay(&monitor, &values, interval_ms);
        prop_assert!(monitor.is_rising(), "values {values:?}");
    }

    #[test]
    fn increasing_sequence_trips_by_the_critical_sample(
        start in 0.0f64..80.0,
        steps in prop::collection::vec(0.1f64..10.0, 1..40),
        critical in 85.0f64..100.0,
    ) {
        let warning = critical - 10.0;
        let monitor = monitor(10);
        let mut value = start;
        let mut tripped = false;
        for (idx, step) in steps.iter().enumerate() {
            value += step;
            monitor.record(MemorySample::new(1_000 * idx as u64, value, 0.0));
            tripped |= monitor.should_trip(critical, warning);
            if value >= critical {
                prop_assert!(tripped);
                break;
            }
        }
    }
}
