use crate::registry::ResourceRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use ward_memory::{now_ms, MemorySample, PressureMonitor, PressureStats};

/// Errors the breaker treats as memory exhaustion.
///
/// An operation failing with such an error trips the breaker; any other
/// error is handed back to the caller untouched.
pub trait OutOfMemoryClass {
    fn is_out_of_memory(&self) -> bool;
}

impl OutOfMemoryClass for std::io::Error {
    fn is_out_of_memory(&self) -> bool {
        self.kind() == std::io::ErrorKind::OutOfMemory
    }
}

impl OutOfMemoryClass for std::collections::TryReserveError {
    fn is_out_of_memory(&self) -> bool {
        true
    }
}

impl OutOfMemoryClass for std::convert::Infallible {
    fn is_out_of_memory(&self) -> bool {
        match *self {}
    }
}

impl OutOfMemoryClass for anyhow::Error {
    fn is_out_of_memory(&self) -> bool {
        self.chain().any(|cause| {
            cause.is::<std::collections::TryReserveError>()
                || cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(OutOfMemoryClass::is_out_of_memory)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The pressure check tripped before the operation ran.
    Tripped,
    /// The operation failed with an out-of-memory class error.
    OutOfMemory,
    /// The breaker was already open; nothing ran and nothing was released.
    Open,
}

/// Structured explanation of why a protected call produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerDiagnostic {
    pub kind: DiagnosticKind,
    pub reason: String,
    pub sample: Option<MemorySample>,
    pub timestamp_ms: u64,
    /// Release outcome per resource id (empty for [`DiagnosticKind::Open`]).
    pub released: BTreeMap<String, bool>,
}

/// Outcome of [`CircuitBreaker::execute_safely`].
#[derive(Debug, Clone, PartialEq)]
pub enum Protected<T> {
    Completed(T),
    Blocked(BreakerDiagnostic),
}

impl<T> Protected<T> {
    /// The `(result, diagnostic)` pair; exactly one side is `Some`.
    pub fn into_parts(self) -> (Option<T>, Option<BreakerDiagnostic>) {
        match self {
            Protected::Completed(value) => (Some(value), None),
            Protected::Blocked(diagnostic) => (None, Some(diagnostic)),
        }
    }

    pub fn completed(self) -> Option<T> {
        self.into_parts().0
    }

    pub fn diagnostic(&self) -> Option<&BreakerDiagnostic> {
        match self {
            Protected::Completed(_) => None,
            Protected::Blocked(diagnostic) => Some(diagnostic),
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Protected::Blocked(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Early-trip threshold; defaults to the monitor's warning threshold.
    pub warning_pct: Option<f64>,
    /// Hard-trip threshold; defaults to the monitor's critical threshold.
    pub critical_pct: Option<f64>,
    /// Number of trip events kept for inspection.
    pub trip_history: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            warning_pct: None,
            critical_pct: None,
            trip_history: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub trips: u64,
    pub short_circuits: u64,
    pub last_trip: Option<BreakerDiagnostic>,
}

struct BreakerState {
    state: CircuitState,
    trips: u64,
    short_circuits: u64,
    events: VecDeque<BreakerDiagnostic>,
}

/// Guards expensive operations against memory exhaustion.
///
/// `Closed -> Open` when the monitor says the pressure is dangerous or when an
/// operation fails with an out-of-memory class error; both paths release every
/// registered resource. `Open -> Closed` only through [`CircuitBreaker::reset`].
///
/// State transitions are serialized through the registry's reentrant lock, the
/// same lock a direct [`ResourceRegistry::release`] holds while handlers run.
pub struct CircuitBreaker {
    config: BreakerConfig,
    monitor: Arc<PressureMonitor>,
    registry: Arc<ResourceRegistry>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(
        config: BreakerConfig,
        monitor: Arc<PressureMonitor>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        Self {
            config,
            monitor,
            registry,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                trips: 0,
                short_circuits: 0,
                events: VecDeque::new(),
            }),
        }
    }

    pub fn monitor(&self) -> &Arc<PressureMonitor> {
        &self.monitor
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// `(critical_pct, warning_pct)` after applying the monitor defaults.
    pub fn trip_thresholds(&self) -> (f64, f64) {
        let defaults = self.monitor.thresholds();
        (
            self.config.critical_pct.unwrap_or(defaults.critical_pct),
            self.config.warning_pct.unwrap_or(defaults.warning_pct),
        )
    }

    /// Run `operation` unless memory pressure says otherwise.
    ///
    /// The pressure check and any resulting release happen under the registry
    /// lock; the operation itself runs without it.
    pub fn execute_safely<T, E, F>(&self, operation: F) -> Result<Protected<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: OutOfMemoryClass + fmt::Display,
    {
        if let Some(diagnostic) = self.registry.exclusive(|| self.check_before_call()) {
            return Ok(Protected::Blocked(diagnostic));
        }

        match operation() {
            Ok(value) => Ok(Protected::Completed(value)),
            Err(err) if err.is_out_of_memory() => {
                let reason = format!("operation ran out of memory: {err}");
                let sample = self.monitor.latest();
                let diagnostic = self
                    .registry
                    .exclusive(|| self.trip(DiagnosticKind::OutOfMemory, reason, sample));
                Ok(Protected::Blocked(diagnostic))
            }
            Err(err) => Err(err),
        }
    }

    /// Caller holds the registry lock.
    fn check_before_call(&self) -> Option<BreakerDiagnostic> {
        {
            let mut state = self.state.lock();
            if state.state == CircuitState::Open {
                state.short_circuits += 1;
                drop(state);
                tracing::debug!(target = "ward.guard", "circuit open; call short-circuited");
                return Some(BreakerDiagnostic {
                    kind: DiagnosticKind::Open,
                    reason: "circuit is open; reset required".to_string(),
                    sample: self.monitor.latest(),
                    timestamp_ms: now_ms(),
                    released: BTreeMap::new(),
                });
            }
        }

        if let Err(err) = self.monitor.sample() {
            // Without a reading there is nothing to act on; let the call through.
            tracing::debug!(target = "ward.guard", error = %err, "pressure check skipped");
            return None;
        }

        let (critical_pct, warning_pct) = self.trip_thresholds();
        let judged = self.monitor.trip_sample(critical_pct, warning_pct)?;

        let reason = if judged.percent_used >= critical_pct {
            format!(
                "memory usage {:.1}% reached the critical threshold {critical_pct:.1}%",
                judged.percent_used
            )
        } else {
            format!(
                "memory usage {:.1}% is above {warning_pct:.1}% and rising",
                judged.percent_used
            )
        };
        Some(self.trip(DiagnosticKind::Tripped, reason, Some(judged)))
    }

    /// Caller holds the registry lock. The state mutex is only taken after
    /// the release, so cleanup handlers may read the breaker.
    fn trip(
        &self,
        kind: DiagnosticKind,
        reason: String,
        sample: Option<MemorySample>,
    ) -> BreakerDiagnostic {
        tracing::warn!(
            target = "ward.guard",
            kind = ?kind,
            percent = sample.map(|sample| sample.percent_used),
            reason = %reason,
            "circuit breaker tripped"
        );

        let released = self.registry.release_all();

        let diagnostic = BreakerDiagnostic {
            kind,
            reason,
            sample,
            timestamp_ms: now_ms(),
            released,
        };

        let mut state = self.state.lock();
        state.state = CircuitState::Open;
        state.trips += 1;
        while state.events.len() >= self.config.trip_history.max(1) {
            state.events.pop_front();
        }
        state.events.push_back(diagnostic.clone());
        diagnostic
    }

    /// Close the circuit. Registered resources are left alone.
    pub fn reset(&self) {
        let previous = self
            .registry
            .exclusive(|| std::mem::replace(&mut self.state.lock().state, CircuitState::Closed));
        if previous == CircuitState::Open {
            tracing::info!(target = "ward.guard", "circuit breaker reset");
        }
    }

    pub fn state(&self) -> CircuitState {
        self.registry.exclusive(|| self.state.lock().state)
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn trip_events(&self) -> Vec<BreakerDiagnostic> {
        self.registry
            .exclusive(|| self.state.lock().events.iter().cloned().collect())
    }

    pub fn status(&self) -> BreakerStatus {
        self.registry.exclusive(|| {
            let state = self.state.lock();
            BreakerStatus {
                state: state.state,
                trips: state.trips,
                short_circuits: state.short_circuits,
                last_trip: state.events.back().cloned(),
            }
        })
    }

    pub fn get_pressure_stats(&self) -> PressureStats {
        self.monitor.stats()
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
