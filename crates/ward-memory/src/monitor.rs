use crate::pressure::{PressureLevel, PressureThresholds, Trend};
use crate::source::{MemorySource, SampleError};
use crate::stats::PressureStats;
use crate::types::{now_ms, MemorySample};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Float noise from the least-squares fit must not flip a borderline slope.
const SLOPE_EPSILON: f64 = 1e-9;
const MIN_TREND_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Calls to [`PressureMonitor::sample`] within this interval reuse the cached sample.
    pub check_interval: Duration,
    /// Maximum number of samples kept; the oldest sample is dropped first.
    pub history_capacity: usize,
    pub thresholds: PressureThresholds,
    /// Minimum average increase (percentage points per sample) that counts as rising.
    pub trend_sensitivity: f64,
    /// Number of most recent samples the trend is fitted over.
    pub trend_window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(500),
            history_capacity: 10,
            thresholds: PressureThresholds::default(),
            trend_sensitivity: 0.5,
            trend_window: 3,
        }
    }
}

struct MonitorState {
    history: VecDeque<MemorySample>,
    last_fresh: Option<Instant>,
}

/// Samples memory usage, keeps a bounded history and classifies pressure.
pub struct PressureMonitor {
    config: MonitorConfig,
    source: Arc<dyn MemorySource>,
    state: Mutex<MonitorState>,
}

impl PressureMonitor {
    pub fn new(config: MonitorConfig, source: Arc<dyn MemorySource>) -> Self {
        let capacity = config.history_capacity.max(1);
        Self {
            config: MonitorConfig {
                history_capacity: capacity,
                ..config
            },
            source,
            state: Mutex::new(MonitorState {
                history: VecDeque::with_capacity(capacity),
                last_fresh: None,
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn thresholds(&self) -> PressureThresholds {
        self.config.thresholds
    }

    /// Take a sample, reusing the cached one when the last fresh reading is
    /// younger than `check_interval`.
    pub fn sample(&self) -> Result<MemorySample, SampleError> {
        let mut state = self.state.lock();
        if let (Some(taken_at), Some(last)) = (state.last_fresh, state.history.back()) {
            if taken_at.elapsed() < self.config.check_interval {
                return Ok(*last);
            }
        }
        self.take_locked(&mut state)
    }

    /// Take a sample regardless of the rate limit.
    pub fn sample_fresh(&self) -> Result<MemorySample, SampleError> {
        let mut state = self.state.lock();
        self.take_locked(&mut state)
    }

    fn take_locked(&self, state: &mut MonitorState) -> Result<MemorySample, SampleError> {
        let reading = self.source.read().map_err(|err| {
            tracing::debug!(target = "ward.memory", error = %err, "memory sample failed");
            err
        })?;
        let sample = MemorySample::from_reading(now_ms(), reading);
        push_bounded(&mut state.history, sample, self.config.history_capacity);
        state.last_fresh = Some(Instant::now());
        tracing::trace!(
            target = "ward.memory",
            percent = sample.percent_used,
            absolute_mb = sample.absolute_mb,
            "memory sampled"
        );
        Ok(sample)
    }

    /// Append an externally taken sample (replayed trajectories, tests).
    ///
    /// Recorded samples do not reset the rate limit of [`Self::sample`].
    pub fn record(&self, sample: MemorySample) {
        let mut state = self.state.lock();
        push_bounded(&mut state.history, sample, self.config.history_capacity);
    }

    pub fn classify(&self, sample: &MemorySample) -> PressureLevel {
        self.config.thresholds.level_for_percent(sample.percent_used)
    }

    /// Current level: the latest sample's classification, escalated to
    /// [`PressureLevel::Emergency`] when it is critical and still rising.
    pub fn level(&self) -> PressureLevel {
        let state = self.state.lock();
        self.level_locked(&state.history)
    }

    fn level_locked(&self, history: &VecDeque<MemorySample>) -> PressureLevel {
        let Some(latest) = history.back() else {
            return PressureLevel::Normal;
        };
        match self.classify(latest) {
            PressureLevel::Critical if self.trend_locked(history) == Trend::Rising => {
                PressureLevel::Emergency
            }
            level => level,
        }
    }

    pub fn latest(&self) -> Option<MemorySample> {
        self.state.lock().history.back().copied()
    }

    pub fn history(&self) -> Vec<MemorySample> {
        self.state.lock().history.iter().copied().collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.last_fresh = None;
    }

    pub fn trend(&self) -> Trend {
        let state = self.state.lock();
        self.trend_locked(&state.history)
    }

    pub fn is_rising(&self) -> bool {
        self.trend() == Trend::Rising
    }

    fn trend_locked(&self, history: &VecDeque<MemorySample>) -> Trend {
        if history.len() < MIN_TREND_SAMPLES {
            return Trend::Stable;
        }
        let window = self.config.trend_window.max(MIN_TREND_SAMPLES).min(history.len());
        let recent: Vec<MemorySample> = history.iter().skip(history.len() - window).copied().collect();
        let Some(slope) = slope_per_sample(&recent) else {
            return Trend::Stable;
        };

        let sensitivity = self.config.trend_sensitivity;
        if slope > sensitivity + SLOPE_EPSILON {
            Trend::Rising
        } else if slope < -(sensitivity + SLOPE_EPSILON) {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }

    /// Combined trip decision: a hard trip at `critical_pct`, or an early trip
    /// at `warning_pct` when the trajectory is rising.
    pub fn should_trip(&self, critical_pct: f64, warning_pct: f64) -> bool {
        self.trip_sample(critical_pct, warning_pct).is_some()
    }

    /// Like [`PressureMonitor::should_trip`], but returns the sample the
    /// decision was made on. Level and trend are read under one lock, so the
    /// returned sample always agrees with the decision.
    pub fn trip_sample(&self, critical_pct: f64, warning_pct: f64) -> Option<MemorySample> {
        let state = self.state.lock();
        let latest = *state.history.back()?;
        if latest.percent_used >= critical_pct {
            return Some(latest);
        }
        let rising = self.trend_locked(&state.history) == Trend::Rising;
        (latest.percent_used >= warning_pct && rising).then_some(latest)
    }

    pub fn stats(&self) -> PressureStats {
        let state = self.state.lock();
        let history = &state.history;
        let Some(latest) = history.back() else {
            return PressureStats::empty();
        };

        let count = history.len();
        let sum: f64 = history.iter().map(|sample| sample.percent_used).sum();
        let max = history
            .iter()
            .map(|sample| sample.percent_used)
            .fold(f64::MIN, f64::max);
        let min = history
            .iter()
            .map(|sample| sample.percent_used)
            .fold(f64::MAX, f64::min);

        PressureStats {
            current: latest.percent_used,
            average: sum / count as f64,
            max,
            min,
            samples: count,
            trend: self.trend_locked(history),
            level: self.level_locked(history),
        }
    }
}

impl std::fmt::Debug for PressureMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PressureMonitor")
            .field("config", &self.config)
            .field("samples", &self.state.lock().history.len())
            .finish()
    }
}

fn push_bounded(history: &mut VecDeque<MemorySample>, sample: MemorySample, capacity: usize) {
    while history.len() >= capacity {
        history.pop_front();
    }
    history.push_back(sample);
}

/// Least-squares slope of `percent_used`, expressed in percentage points per sample.
///
/// The fit runs against elapsed time and is normalized by the mean sampling
/// interval, so irregular spacing is accounted for. When every timestamp is
/// identical the sample index is used instead.
fn slope_per_sample(samples: &[MemorySample]) -> Option<f64> {
    let n = samples.len();
    if n < 2 {
        return None;
    }

    let first_ts = samples[0].timestamp_ms;
    let elapsed: Vec<f64> = samples
        .iter()
        .map(|sample| sample.timestamp_ms.saturating_sub(first_ts) as f64 / 1000.0)
        .collect();
    let span = elapsed[n - 1] - elapsed[0];

    let (xs, scale) = if span > 0.0 {
        (elapsed, span / (n - 1) as f64)
    } else {
        ((0..n).map(|idx| idx as f64).collect(), 1.0)
    };
    let ys: Vec<f64> = samples.iter().map(|sample| sample.percent_used).collect();

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let mut numer = 0.0;
    let mut denom = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        numer += (x - mean_x) * (y - mean_y);
        denom += (x - mean_x) * (x - mean_x);
    }
    if denom == 0.0 {
        return None;
    }
    Some(numer / denom * scale)
}
