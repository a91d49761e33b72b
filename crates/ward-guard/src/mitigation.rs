use crate::reclaim::reclaim_memory;
use crate::registry::{CleanupError, ResourceRegistry};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use ward_memory::{now_ms, MemorySample, PressureLevel, PressureMonitor};

pub const DEFAULT_ACTION_HISTORY: usize = 100;

pub type ActionHandler = Arc<dyn Fn(PressureLevel) -> Result<(), CleanupError> + Send + Sync>;

/// One executed (or attempted) mitigation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: String,
    pub level: PressureLevel,
    pub timestamp_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    /// Usage sampled right after the step, when a reading was available.
    pub percent_after: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MitigationReport {
    pub steps: Vec<ActionRecord>,
    /// Plan entries that were not attempted because pressure had already eased.
    pub skipped: Vec<String>,
    pub final_sample: Option<MemorySample>,
}

impl MitigationReport {
    pub fn stopped_early(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|step| step.success).count()
    }
}

/// Executes scheduled plans one action at a time.
///
/// After every step the monitor is re-sampled; once usage is below the warning
/// threshold the remaining steps are skipped.
pub struct Mitigator {
    handlers: RwLock<HashMap<String, ActionHandler>>,
    history: Mutex<VecDeque<ActionRecord>>,
    history_capacity: usize,
}

impl Mitigator {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_ACTION_HISTORY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_capacity: history_capacity.max(1),
        }
    }

    /// Register `force_gc` (allocator reclaim) and `activate_survival_mode`
    /// (release every registered resource).
    pub fn with_builtin_handlers(self, registry: Arc<ResourceRegistry>) -> Self {
        self.register("force_gc", |_level| {
            reclaim_memory();
            Ok(())
        });
        self.register("activate_survival_mode", move |level| {
            if level < PressureLevel::Critical {
                return Err(CleanupError::failed(format!(
                    "survival mode requires critical pressure, got {level}"
                )));
            }
            let outcomes = registry.release_all();
            let failed: Vec<&String> = outcomes
                .iter()
                .filter(|(_, ok)| !**ok)
                .map(|(id, _)| id)
                .collect();
            if failed.is_empty() {
                Ok(())
            } else {
                Err(CleanupError::failed(format!("failed to release {failed:?}")))
            }
        });
        self
    }

    pub fn register<F>(&self, action_id: impl Into<String>, handler: F)
    where
        F: Fn(PressureLevel) -> Result<(), CleanupError> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert(action_id.into(), Arc::new(handler));
    }

    pub fn unregister(&self, action_id: &str) -> bool {
        self.handlers.write().remove(action_id).is_some()
    }

    pub fn has_handler(&self, action_id: &str) -> bool {
        self.handlers.read().contains_key(action_id)
    }

    /// Run a single action and record it. Ids without a handler fail.
    pub fn run_action(&self, action_id: &str, level: PressureLevel) -> Result<(), CleanupError> {
        let handler = self.handlers.read().get(action_id).cloned();
        let outcome = match handler {
            Some(handler) => catch_unwind(AssertUnwindSafe(|| handler(level)))
                .unwrap_or_else(|payload| Err(CleanupError::from_panic(payload))),
            None => Err(CleanupError::failed(format!(
                "no handler registered for action `{action_id}`"
            ))),
        };

        match &outcome {
            Ok(()) => tracing::info!(
                target = "ward.guard",
                action = action_id,
                level = %level,
                "mitigation action executed"
            ),
            Err(err) => tracing::warn!(
                target = "ward.guard",
                action = action_id,
                level = %level,
                error = %err,
                "mitigation action failed"
            ),
        }
        outcome
    }

    /// Execute `plan` in order at `level`, re-sampling `monitor` after each step.
    pub fn execute(
        &self,
        plan: &[String],
        level: PressureLevel,
        monitor: &PressureMonitor,
    ) -> MitigationReport {
        let warning_pct = monitor.thresholds().warning_pct;
        let mut report = MitigationReport::default();

        for (idx, action_id) in plan.iter().enumerate() {
            let outcome = self.run_action(action_id, level);

            let sample = match monitor.sample_fresh() {
                Ok(sample) => Some(sample),
                Err(err) => {
                    tracing::debug!(target = "ward.guard", error = %err, "re-sample after action failed");
                    None
                }
            };

            let record = ActionRecord {
                action_id: action_id.clone(),
                level,
                timestamp_ms: now_ms(),
                success: outcome.is_ok(),
                error: outcome.err().map(|err| err.to_string()),
                percent_after: sample.map(|sample| sample.percent_used),
            };
            self.push_history(record.clone());
            report.steps.push(record);
            if sample.is_some() {
                report.final_sample = sample;
            }

            if sample.is_some_and(|sample| sample.percent_used < warning_pct) {
                report.skipped = plan[idx + 1..].to_vec();
                if !report.skipped.is_empty() {
                    tracing::info!(
                        target = "ward.guard",
                        skipped = report.skipped.len(),
                        "pressure eased; remaining mitigation steps skipped"
                    );
                }
                break;
            }
        }
        report
    }

    fn push_history(&self, record: ActionRecord) {
        let mut history = self.history.lock();
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Most recent `count` records, oldest first.
    pub fn history(&self, count: usize) -> Vec<ActionRecord> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(count);
        history.iter().skip(skip).cloned().collect()
    }
}

impl Default for Mitigator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mitigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut actions: Vec<String> = self.handlers.read().keys().cloned().collect();
        actions.sort();
        f.debug_struct("Mitigator")
            .field("actions", &actions)
            .field("history_capacity", &self.history_capacity)
            .finish()
    }
}
