use crate::case::Case;
use crate::engine::Diagnosis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid knowledge base json in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported knowledge base version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Everything the engine persists: the catalog, recent history and counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    pub version: u32,
    pub cases: Vec<Case>,
    #[serde(default)]
    pub recent_diagnoses: Vec<Diagnosis>,
    #[serde(default)]
    pub match_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub diagnosis_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

impl Default for KnowledgeSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            cases: Vec::new(),
            recent_diagnoses: Vec::new(),
            match_counts: BTreeMap::new(),
            diagnosis_count: 0,
            last_update: None,
        }
    }
}

/// Load/save hooks for the knowledge base.
pub trait KnowledgeStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<KnowledgeSnapshot>, StoreError>;
    fn save(&self, snapshot: &KnowledgeSnapshot) -> Result<(), StoreError>;
}

/// Stores the snapshot as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KnowledgeStore for JsonFileStore {
    fn load(&self) -> Result<Option<KnowledgeSnapshot>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let snapshot: KnowledgeSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &KnowledgeSnapshot) -> Result<(), StoreError> {
        write_snapshot(&self.path, snapshot)
    }
}

pub(crate) fn write_snapshot(path: &Path, snapshot: &KnowledgeSnapshot) -> Result<(), StoreError> {
    let mut bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    atomic_write(path, &bytes).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to a unique temp file next to `path`, then rename it into place.
fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = open_unique_tmp_file(path, parent)?;
    let write_result = file.write_all(bytes).and_then(|()| file.sync_all());
    drop(file);

    let result = write_result.and_then(|()| fs::rename(&tmp_path, path));
    if let Err(err) = result {
        if let Err(remove_err) = fs::remove_file(&tmp_path) {
            if remove_err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "ward.kb",
                    path = %tmp_path.display(),
                    error = %remove_err,
                    "failed to remove temporary file after write failure"
                );
            }
        }
        return Err(err);
    }
    Ok(())
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("kb.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_creates_parent_dirs_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kb.json");
        let store = JsonFileStore::new(&path);
        store.save(&KnowledgeSnapshot::default()).unwrap();

        assert!(path.is_file());
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn rejects_unknown_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        fs::write(&path, r#"{"version": 99, "cases": []}"#).unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Version { found: 99, .. }));
    }
}
