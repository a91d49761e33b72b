use crate::case::{case_type_of, Case, CaseDraft, Severity, TrajectoryShape};
use crate::catalog::builtin_cases;
use crate::signature::PressureSignature;
use crate::similarity::{self, SIMILARITY_VERSION};
use crate::store::{write_snapshot, KnowledgeSnapshot, KnowledgeStore, StoreError, SNAPSHOT_VERSION};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use ward_memory::PressureMonitor;

pub const DEFAULT_CASE_TYPE: &str = "OOM";
const TOP_MATCHED: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Minimum similarity a case needs to be reported as a diagnosis.
    pub confidence_floor: f64,
    pub recent_capacity: usize,
    /// How many runner-up case ids a diagnosis lists.
    pub similar_cases: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.45,
            recent_capacity: 50,
            similar_cases: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub diagnosis_id: String,
    pub timestamp: String,
    pub matched_case_id: String,
    pub confidence: f64,
    pub root_cause: String,
    pub solution: String,
    pub severity: Severity,
    #[serde(default)]
    pub similar_case_ids: Vec<String>,
    #[serde(default)]
    pub impact: Vec<String>,
    pub shape: TrajectoryShape,
    pub similarity_version: u32,
}

/// Fallback guidance for a trajectory no stored case explains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericAdvice {
    pub root_cause: String,
    pub solution: String,
    /// `None` when the shape gives no hint about severity.
    pub severity: Option<Severity>,
    pub impact: Vec<String>,
    pub confidence: f64,
}

impl GenericAdvice {
    pub fn for_shape(shape: TrajectoryShape) -> Self {
        let (confidence, severity, root_cause, solution, impact): (f64, _, _, _, &[&str]) =
            match shape {
                TrajectoryShape::RapidIncrease => (
                    0.4,
                    Some(Severity::High),
                    "Resources are allocated faster than they are released, likely a leak",
                    "Review recent code changes, enable detailed memory monitoring and add explicit release points",
                    &[
                        "Memory may run out soon",
                        "Large inputs may fail to process",
                    ],
                ),
                TrajectoryShape::SteadyIncrease => (
                    0.4,
                    Some(Severity::Medium),
                    "A slow cumulative leak",
                    "Add periodic cleanup, review resource handling inside loops and schedule periodic restarts",
                    &[
                        "Performance degrades after long uptime",
                        "A restart may become necessary",
                    ],
                ),
                TrajectoryShape::Fluctuation => (
                    0.3,
                    Some(Severity::Low),
                    "Resource contention or poorly timed allocation",
                    "Tune concurrent scheduling and check when memory is allocated and freed",
                    &[
                        "Performance is unstable",
                        "Problems appear under high load",
                    ],
                ),
                _ => (
                    0.2,
                    None,
                    "Memory pressure of unknown origin",
                    "Keep monitoring, collect more diagnostics and reduce concurrency",
                    &["System stability may suffer"],
                ),
            };
        Self {
            root_cause: root_cause.to_string(),
            solution: solution.to_string(),
            severity,
            impact: impact.iter().map(|line| line.to_string()).collect(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub case_id: String,
    pub confidence: f64,
}

/// No stored case cleared the confidence floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisMiss {
    pub shape: TrajectoryShape,
    pub floor: f64,
    pub best_candidate: Option<Candidate>,
    pub advice: GenericAdvice,
}

impl fmt::Display for DiagnosisMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no case matches the {} trajectory with confidence >= {:.2}",
            self.shape, self.floor
        )?;
        if let Some(best) = &self.best_candidate {
            write!(f, " (closest: {} at {:.2})", best.case_id, best.confidence)?;
        }
        Ok(())
    }
}

impl std::error::Error for DiagnosisMiss {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearnError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),
    #[error("invalid case type `{0}`: use letters and digits only")]
    InvalidCaseType(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnReceipt {
    pub case_id: String,
    /// Whether the store accepted the updated catalog. Always `false` without a store.
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

#[derive(Debug, Error)]
#[error("failed to export knowledge base to {}", .path.display())]
pub struct ExportError {
    pub path: PathBuf,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCount {
    pub case_id: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_cases: usize,
    /// Case counts keyed by id prefix (`OOM`, `LEAK`, ...).
    pub case_types: BTreeMap<String, usize>,
    pub diagnosis_count: u64,
    pub top_matched: Vec<MatchCount>,
    pub last_update: Option<String>,
}

/// Anything that can report the live usage trajectory.
pub trait TrajectorySource {
    fn trajectory(&self) -> PressureSignature;
}

impl TrajectorySource for PressureMonitor {
    fn trajectory(&self) -> PressureSignature {
        if let Err(err) = self.sample() {
            tracing::debug!(target = "ward.kb", error = %err, "could not refresh memory sample");
        }
        let readings = self
            .history()
            .iter()
            .map(|sample| sample.percent_used)
            .collect();
        PressureSignature::new(readings)
            .with_context("trend", self.trend().as_str())
            .with_context("pressure_level", self.level().as_str())
    }
}

struct EngineState {
    cases: IndexMap<String, Case>,
    recent: VecDeque<Diagnosis>,
    match_counts: BTreeMap<String, u64>,
    diagnosis_count: u64,
    last_update: Option<String>,
}

/// Matches pressure signatures against a catalog of known incidents.
pub struct DiagnosisEngine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    store: Option<Arc<dyn KnowledgeStore>>,
}

impl DiagnosisEngine {
    /// An engine seeded with the builtin catalog and no store.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_cases(config, builtin_cases())
    }

    pub fn with_cases(config: EngineConfig, cases: Vec<Case>) -> Self {
        let cases = cases
            .into_iter()
            .map(|case| (case.case_id.clone(), case))
            .collect();
        Self {
            config,
            state: Mutex::new(EngineState {
                cases,
                recent: VecDeque::new(),
                match_counts: BTreeMap::new(),
                diagnosis_count: 0,
                last_update: None,
            }),
            store: None,
        }
    }

    /// Seed the builtin catalog, then merge whatever `store` holds.
    ///
    /// Stored cases replace builtin cases with the same id.
    pub fn open(config: EngineConfig, store: Arc<dyn KnowledgeStore>) -> Result<Self, StoreError> {
        let mut engine = Self::new(config);
        if let Some(snapshot) = store.load()? {
            engine.merge(snapshot);
        }
        engine.store = Some(store);
        Ok(engine)
    }

    fn merge(&mut self, snapshot: KnowledgeSnapshot) {
        let capacity = self.config.recent_capacity.max(1);
        let state = self.state.get_mut();
        let loaded = snapshot.cases.len();
        for case in snapshot.cases {
            state.cases.insert(case.case_id.clone(), case);
        }
        let skip = snapshot.recent_diagnoses.len().saturating_sub(capacity);
        state.recent = snapshot.recent_diagnoses.into_iter().skip(skip).collect();
        state.match_counts = snapshot.match_counts;
        state.diagnosis_count = snapshot.diagnosis_count;
        state.last_update = snapshot.last_update;
        tracing::debug!(
            target = "ward.kb",
            loaded,
            total = state.cases.len(),
            "merged stored knowledge base"
        );
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Find the stored case that best explains `signature`.
    ///
    /// Every call counts towards the diagnosis total; only a successful match
    /// is recorded in the recent history and the case's match counter.
    pub fn diagnose(&self, signature: &PressureSignature) -> Result<Diagnosis, DiagnosisMiss> {
        let shape = signature.shape();
        let features = signature.features();
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.lock();
        state.diagnosis_count += 1;

        // Only cases with some resemblance are candidates, for the match and
        // for the similar-case list alike.
        let mut ranked: Vec<(&Case, f64)> = state
            .cases
            .values()
            .map(|case| {
                let similarity = similarity::score(case, signature, shape, features.as_ref());
                (case, similarity.total.clamp(0.0, 1.0))
            })
            .filter(|(_, confidence)| *confidence > 0.0)
            .collect();
        // Stable: equal scores keep catalog order.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let best = ranked.first().map(|(case, confidence)| Candidate {
            case_id: case.case_id.clone(),
            confidence: *confidence,
        });
        let Some((case, confidence)) = ranked
            .first()
            .copied()
            .filter(|(_, confidence)| *confidence >= self.config.confidence_floor)
        else {
            tracing::info!(
                target = "ward.kb",
                shape = %shape,
                best = ?best,
                "no confident diagnosis"
            );
            return Err(DiagnosisMiss {
                shape,
                floor: self.config.confidence_floor,
                best_candidate: best,
                advice: GenericAdvice::for_shape(shape),
            });
        };

        let diagnosis = Diagnosis {
            diagnosis_id: format!("DIAG_{}_{}", now.unix_timestamp(), state.diagnosis_count),
            timestamp: format_timestamp(now),
            matched_case_id: case.case_id.clone(),
            confidence,
            root_cause: case.root_cause.clone(),
            solution: case.solution.clone(),
            severity: case.severity,
            similar_case_ids: ranked
                .iter()
                .skip(1)
                .take(self.config.similar_cases)
                .map(|(case, _)| case.case_id.clone())
                .collect(),
            impact: case.impact.clone(),
            shape,
            similarity_version: SIMILARITY_VERSION,
        };

        *state
            .match_counts
            .entry(diagnosis.matched_case_id.clone())
            .or_insert(0) += 1;
        while state.recent.len() >= self.config.recent_capacity.max(1) {
            state.recent.pop_front();
        }
        state.recent.push_back(diagnosis.clone());
        state.last_update = Some(diagnosis.timestamp.clone());

        tracing::info!(
            target = "ward.kb",
            id = %diagnosis.diagnosis_id,
            case = %diagnosis.matched_case_id,
            confidence = diagnosis.confidence,
            shape = %shape,
            "diagnosis matched"
        );
        Ok(diagnosis)
    }

    /// Diagnose the trajectory currently reported by `source`.
    pub fn diagnose_current_state(
        &self,
        source: &dyn TrajectorySource,
    ) -> Result<Diagnosis, DiagnosisMiss> {
        self.diagnose(&source.trajectory())
    }

    /// Validate `draft`, add it to the catalog and persist the catalog.
    pub fn learn(&self, draft: CaseDraft) -> Result<LearnReceipt, LearnError> {
        let pattern = draft.pattern.ok_or(LearnError::MissingField("pattern"))?;
        let root_cause = required_text(draft.root_cause, "root_cause")?;
        let solution = required_text(draft.solution, "solution")?;
        let severity = draft.severity.ok_or(LearnError::MissingField("severity"))?;
        let case_type = match draft.case_type.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_CASE_TYPE.to_string(),
            Some(kind) if kind.chars().all(|c| c.is_ascii_alphanumeric()) => kind.to_string(),
            Some(kind) => return Err(LearnError::InvalidCaseType(kind.to_string())),
        };

        let (case_id, snapshot) = {
            let mut state = self.state.lock();
            let case_id = next_case_id(state.cases.keys(), &case_type);
            let added_at = format_timestamp(OffsetDateTime::now_utc());
            let case = Case {
                case_id: case_id.clone(),
                symptoms: draft.symptoms.unwrap_or_default(),
                pattern,
                root_cause,
                solution,
                severity,
                impact: draft.impact,
                detection: draft.detection,
                source: Some("learned".to_string()),
                added_at: Some(added_at.clone()),
            };
            state.cases.insert(case_id.clone(), case);
            state.last_update = Some(added_at);
            tracing::info!(target = "ward.kb", id = %case_id, "learned new case");
            (case_id, self.snapshot_locked(&state))
        };

        let (persisted, persist_error) = match self.save_snapshot(&snapshot) {
            Ok(saved) => (saved, None),
            Err(err) => (false, Some(err.to_string())),
        };
        Ok(LearnReceipt {
            case_id,
            persisted,
            persist_error,
        })
    }

    /// Save the current state to the store. Returns `Ok(false)` without a store.
    pub fn persist(&self) -> Result<bool, StoreError> {
        let snapshot = self.snapshot();
        self.save_snapshot(&snapshot)
    }

    fn save_snapshot(&self, snapshot: &KnowledgeSnapshot) -> Result<bool, StoreError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.save(snapshot) {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(target = "ward.kb", error = %err, "failed to persist knowledge base");
                Err(err)
            }
        }
    }

    pub fn stats(&self) -> KnowledgeStats {
        let state = self.state.lock();
        let mut case_types = BTreeMap::new();
        for id in state.cases.keys() {
            *case_types.entry(case_type_of(id).to_string()).or_insert(0) += 1;
        }

        let mut top_matched: Vec<MatchCount> = state
            .match_counts
            .iter()
            .map(|(case_id, count)| MatchCount {
                case_id: case_id.clone(),
                count: *count,
            })
            .collect();
        top_matched.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.case_id.cmp(&b.case_id)));
        top_matched.truncate(TOP_MATCHED);

        KnowledgeStats {
            total_cases: state.cases.len(),
            case_types,
            diagnosis_count: state.diagnosis_count,
            top_matched,
            last_update: state.last_update.clone(),
        }
    }

    pub fn case(&self, case_id: &str) -> Option<Case> {
        self.state.lock().cases.get(case_id).cloned()
    }

    /// All cases in catalog order, optionally limited to one id prefix
    /// (compared case-insensitively).
    pub fn cases(&self, case_type: Option<&str>) -> Vec<Case> {
        self.state
            .lock()
            .cases
            .values()
            .filter(|case| case_type.map_or(true, |kind| case.case_type().eq_ignore_ascii_case(kind)))
            .cloned()
            .collect()
    }

    /// The most recent `count` diagnoses, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Diagnosis> {
        let state = self.state.lock();
        let skip = state.recent.len().saturating_sub(count);
        state.recent.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> KnowledgeSnapshot {
        let state = self.state.lock();
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &EngineState) -> KnowledgeSnapshot {
        KnowledgeSnapshot {
            version: SNAPSHOT_VERSION,
            cases: state.cases.values().cloned().collect(),
            recent_diagnoses: state.recent.iter().cloned().collect(),
            match_counts: state.match_counts.clone(),
            diagnosis_count: state.diagnosis_count,
            last_update: state.last_update.clone(),
        }
    }

    /// Write the catalog and recent history to `path` as pretty JSON.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = self.snapshot();
        match write_snapshot(&path, &snapshot) {
            Ok(()) => {
                tracing::info!(
                    target = "ward.kb",
                    path = %path.display(),
                    cases = snapshot.cases.len(),
                    "exported knowledge base"
                );
                Ok(path)
            }
            Err(source) => {
                tracing::warn!(target = "ward.kb", path = %path.display(), error = %source, "export failed");
                Err(ExportError { path, source })
            }
        }
    }
}

impl fmt::Debug for DiagnosisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DiagnosisEngine")
            .field("config", &self.config)
            .field("cases", &state.cases.len())
            .field("diagnosis_count", &state.diagnosis_count)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, LearnError> {
    let value = value.ok_or(LearnError::MissingField(field))?;
    if value.trim().is_empty() {
        return Err(LearnError::EmptyField(field));
    }
    Ok(value)
}

fn next_case_id<'a>(ids: impl Iterator<Item = &'a String>, case_type: &str) -> String {
    let next = ids
        .filter_map(|id| {
            let (prefix, number) = id.split_once('_')?;
            (prefix == case_type).then(|| number.parse::<u32>().ok())?
        })
        .max()
        .map_or(1, |max| max + 1);
    format!("{case_type}_{next:03}")
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| "<unknown>".to_owned())
}
