use crate::mitigation::{MitigationReport, Mitigator};
use crate::scheduler::ActionScheduler;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use ward_memory::{PressureLevel, PressureMonitor};

type WatchListener = Arc<dyn Fn(&WatchEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub interval: Duration,
    /// Usage at or below which the watch steps its level back down.
    pub recovery_pct: f64,
    /// A level does not fire again within this window.
    pub stabilize: Duration,
    /// Minimum time since the last trigger before recovery starts.
    pub recovery_delay: Duration,
    /// Action ids to schedule when a level fires.
    pub actions: BTreeMap<PressureLevel, Vec<String>>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        let actions = [
            (
                PressureLevel::Warning,
                vec!["clear_temp_files", "reduce_log_verbosity"],
            ),
            (
                PressureLevel::Critical,
                vec!["unload_noncritical_shards", "degrade_quality"],
            ),
            (
                PressureLevel::Emergency,
                vec!["kill_largest_process", "force_gc"],
            ),
        ]
        .into_iter()
        .map(|(level, ids)| (level, ids.into_iter().map(str::to_string).collect()))
        .collect();

        Self {
            interval: Duration::from_secs(5),
            recovery_pct: 70.0,
            stabilize: Duration::from_secs(30),
            recovery_delay: Duration::from_secs(60),
            actions,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Triggered {
        previous: PressureLevel,
        level: PressureLevel,
        percent: f64,
        report: MitigationReport,
    },
    Recovered {
        previous: PressureLevel,
        level: PressureLevel,
        percent: f64,
    },
}

struct WatchState {
    level: PressureLevel,
    last_trigger: HashMap<PressureLevel, Instant>,
    // Actions already run per level since the last full recovery.
    triggered: HashMap<PressureLevel, BTreeSet<String>>,
}

struct WatchInner {
    config: WatchConfig,
    monitor: Arc<PressureMonitor>,
    scheduler: Arc<ActionScheduler>,
    mitigator: Arc<Mitigator>,
    state: Mutex<WatchState>,
    listeners: Mutex<Vec<WatchListener>>,
}

struct Worker {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Background sampling loop that escalates mitigation as pressure rises.
///
/// Each tick takes a fresh sample. When the monitor's level is above the
/// watch's current level, that level's actions are scheduled and executed.
/// Usage at or below `recovery_pct` steps the level down one notch per tick.
pub struct PressureWatch {
    inner: Arc<WatchInner>,
    worker: Mutex<Option<Worker>>,
}

impl PressureWatch {
    pub fn new(
        config: WatchConfig,
        monitor: Arc<PressureMonitor>,
        scheduler: Arc<ActionScheduler>,
        mitigator: Arc<Mitigator>,
    ) -> Self {
        Self {
            inner: Arc::new(WatchInner {
                config,
                monitor,
                scheduler,
                mitigator,
                state: Mutex::new(WatchState {
                    level: PressureLevel::Normal,
                    last_trigger: HashMap::new(),
                    triggered: HashMap::new(),
                }),
                listeners: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Construct and immediately start the background thread.
    pub fn spawn(
        config: WatchConfig,
        monitor: Arc<PressureMonitor>,
        scheduler: Arc<ActionScheduler>,
        mitigator: Arc<Mitigator>,
    ) -> std::io::Result<Self> {
        let watch = Self::new(config, monitor, scheduler, mitigator);
        watch.start()?;
        Ok(watch)
    }

    /// Start the sampling thread. Returns `false` when it is already running.
    pub fn start(&self) -> std::io::Result<bool> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(false);
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let interval = inner.config.interval;
        let thread = std::thread::Builder::new()
            .name("ward-watch".to_string())
            .spawn(move || {
                tracing::info!(target = "ward.guard", ?interval, "pressure watch started");
                loop {
                    inner.tick();
                    match stopped.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::info!(target = "ward.guard", "pressure watch stopped");
            })?;

        *worker = Some(Worker { stop, thread });
        Ok(true)
    }

    /// Stop and join the sampling thread. Returns `false` when it was not running.
    pub fn stop(&self) -> bool {
        let Some(worker) = self.worker.lock().take() else {
            return false;
        };
        let _ = worker.stop.send(());
        if worker.thread.join().is_err() {
            tracing::error!(target = "ward.guard", "pressure watch thread panicked");
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Run one iteration of the loop on the calling thread.
    pub fn tick(&self) -> Option<WatchEvent> {
        self.inner.tick()
    }

    pub fn current_level(&self) -> PressureLevel {
        self.inner.state.lock().level
    }

    /// Fire `level` immediately, bypassing thresholds and the stabilize window.
    pub fn force_trigger(&self, level: PressureLevel) -> Option<WatchEvent> {
        let percent = self
            .inner
            .monitor
            .latest()
            .map(|sample| sample.percent_used)
            .unwrap_or(100.0);
        tracing::warn!(target = "ward.guard", level = %level, "forced mitigation trigger");
        self.inner.trigger(level, percent)
    }

    pub fn subscribe(&self, listener: impl Fn(&WatchEvent) + Send + Sync + 'static) {
        self.inner.listeners.lock().push(Arc::new(listener));
    }

    pub fn config(&self) -> &WatchConfig {
        &self.inner.config
    }
}

impl Drop for PressureWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PressureWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PressureWatch")
            .field("config", &self.inner.config)
            .field("level", &self.current_level())
            .field("running", &self.is_running())
            .finish()
    }
}

impl WatchInner {
    fn tick(&self) -> Option<WatchEvent> {
        let sample = match self.monitor.sample_fresh() {
            Ok(sample) => sample,
            Err(err) => {
                tracing::warn!(target = "ward.guard", error = %err, "pressure watch sample failed");
                return None;
            }
        };
        let observed = self.monitor.level();
        let percent = sample.percent_used;

        if let Some(level) = self.level_to_fire(observed) {
            return self.trigger(level, percent);
        }
        self.maybe_recover(percent)
    }

    /// Highest level at or below `observed` that is above the current level and
    /// outside its stabilize window.
    fn level_to_fire(&self, observed: PressureLevel) -> Option<PressureLevel> {
        let state = self.state.lock();
        PressureLevel::all()
            .into_iter()
            .rev()
            .filter(|level| *level > PressureLevel::Normal && *level <= observed)
            .find(|level| {
                state
                    .last_trigger
                    .get(level)
                    .map_or(true, |at| at.elapsed() >= self.config.stabilize)
            })
            .filter(|level| *level > state.level)
    }

    fn trigger(&self, level: PressureLevel, percent: f64) -> Option<WatchEvent> {
        let (previous, pending) = {
            let mut state = self.state.lock();
            let previous = state.level;
            state.level = level;
            state.last_trigger.insert(level, Instant::now());

            let already = state.triggered.entry(level).or_default();
            let pending: Vec<String> = self
                .config
                .actions
                .get(&level)
                .into_iter()
                .flatten()
                .filter(|id| !already.contains(*id))
                .cloned()
                .collect();
            already.extend(pending.iter().cloned());
            (previous, pending)
        };

        tracing::warn!(
            target = "ward.guard",
            previous = %previous,
            level = %level,
            percent,
            "memory pressure escalated"
        );

        let plan = self.scheduler.schedule(&pending, percent);
        let report = self.mitigator.execute(&plan, level, &self.monitor);
        let event = WatchEvent::Triggered {
            previous,
            level,
            percent,
            report,
        };
        self.emit(&event);
        Some(event)
    }

    fn maybe_recover(&self, percent: f64) -> Option<WatchEvent> {
        let (previous, level) = {
            let mut state = self.state.lock();
            if state.level == PressureLevel::Normal || percent > self.config.recovery_pct {
                return None;
            }
            let last = state.last_trigger.values().max().copied();
            if last.is_some_and(|at| at.elapsed() < self.config.recovery_delay) {
                return None;
            }

            let previous = state.level;
            let level = step_down(previous);
            state.level = level;
            if level == PressureLevel::Normal {
                state.triggered.clear();
            }
            (previous, level)
        };

        tracing::info!(
            target = "ward.guard",
            previous = %previous,
            level = %level,
            percent,
            "memory pressure recovered"
        );
        let event = WatchEvent::Recovered {
            previous,
            level,
            percent,
        };
        self.emit(&event);
        Some(event)
    }

    fn emit(&self, event: &WatchEvent) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

fn step_down(level: PressureLevel) -> PressureLevel {
    match level {
        PressureLevel::Emergency => PressureLevel::Critical,
        PressureLevel::Critical => PressureLevel::Warning,
        PressureLevel::Warning | PressureLevel::Normal => PressureLevel::Normal,
    }
}
