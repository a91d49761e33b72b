//! Runtime guard against memory exhaustion.
//!
//! - [`ResourceRegistry`] owns registered resources and releases them in
//!   dependency-safe order (consumers before the resources they consume).
//! - [`CircuitBreaker`] wraps expensive operations, consults the
//!   [`ward_memory::PressureMonitor`] and trips (releasing every resource) when
//!   pressure is dangerous or an operation runs out of memory.
//! - [`ActionScheduler`] orders mitigation actions by impact weight, and
//!   [`Mitigator`] executes such a plan step by step.
//! - [`PressureWatch`] is the background loop tying monitor, scheduler and
//!   mitigator together.

mod breaker;
mod mitigation;
mod reclaim;
mod registry;
mod scheduler;
mod watch;

pub use breaker::{
    BreakerConfig, BreakerDiagnostic, BreakerStatus, CircuitBreaker, CircuitState, DiagnosticKind,
    OutOfMemoryClass, Protected,
};
pub use mitigation::{ActionHandler, ActionRecord, MitigationReport, Mitigator, DEFAULT_ACTION_HISTORY};
pub use reclaim::{reclaim_memory, MallocTrim, ReclaimHint};
pub use registry::{CleanupError, CleanupFn, ResourceHandle, ResourceRegistry};
pub use scheduler::{ActionBand, ActionCatalog, ActionScheduler, CatalogError, DEFAULT_ESCALATION_PCT};
pub use watch::{PressureWatch, WatchConfig, WatchEvent};
