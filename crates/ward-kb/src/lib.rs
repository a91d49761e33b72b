//! Case-based diagnosis of memory pressure for Ward.
//!
//! A [`DiagnosisEngine`] holds a catalog of known incidents ([`Case`]s). A
//! live usage trajectory ([`PressureSignature`]) is classified into a
//! [`TrajectoryShape`] and scored against every case; the best case above the
//! confidence floor becomes a [`Diagnosis`]. Otherwise the caller gets a
//! [`DiagnosisMiss`] with generic advice for the observed shape.
//!
//! New incidents are added with [`DiagnosisEngine::learn`] and persisted
//! through a [`KnowledgeStore`].

mod case;
mod catalog;
mod engine;
mod signature;
mod similarity;
mod store;

pub use case::{Case, CaseDraft, Severity, SymptomPattern, TrajectoryShape};
pub use catalog::builtin_cases;
pub use engine::{
    Candidate, Diagnosis, DiagnosisEngine, DiagnosisMiss, EngineConfig, ExportError,
    GenericAdvice, KnowledgeStats, LearnError, LearnReceipt, MatchCount, TrajectorySource,
    DEFAULT_CASE_TYPE,
};
pub use signature::{
    PressureSignature, SignatureError, SignatureFeatures, FRAGMENTATION_HINT, TRIGGER_HINT,
};
pub use similarity::{score, shape_affinity, Similarity, SIMILARITY_VERSION};
pub use store::{JsonFileStore, KnowledgeSnapshot, KnowledgeStore, StoreError, SNAPSHOT_VERSION};
