//! Cross-session persistence of the build state.
//!
//! The state is snapshotted as a flat list of `(path, metadata)` pairs,
//! serialized with bincode behind a format version and a BLAKE3 payload
//! checksum. Loading is all-or-nothing: any corruption discards the snapshot
//! entirely and forces a full rebuild - a partial load could silently
//! under-approximate the rebuild set, and a full rebuild is always a safe
//! superset.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::{BuildState, UnitMetadata};

/// Snapshot format version; bumped when the encoding changes. Incompatible
/// versions are rejected, not migrated.
const FORMAT_VERSION: u32 = 1;

/// Error types for state persistence.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("snapshot checksum mismatch")]
    ChecksumMismatch,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    format_version: u32,
    /// BLAKE3 hash of `payload`.
    checksum: [u8; 32],
    /// bincode-encoded `Vec<(String, UnitMetadata)>`.
    payload: Vec<u8>,
}

/// Save a state snapshot to `path`.
///
/// The write is atomic: the snapshot is written to a sibling temp file and
/// renamed into place, so a crash mid-save never leaves a half-written
/// snapshot behind.
pub fn save_state(state: &BuildState, path: &Path) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let entries = state.to_entries();
    let payload =
        bincode::serialize(&entries).map_err(|e| PersistError::Serialization(e.to_string()))?;

    let snapshot = Snapshot {
        format_version: FORMAT_VERSION,
        checksum: *blake3::hash(&payload).as_bytes(),
        payload,
    };
    let bytes =
        bincode::serialize(&snapshot).map_err(|e| PersistError::Serialization(e.to_string()))?;

    let temp = path.with_extension("tmp");
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)?;
    Ok(())
}

/// Load a state snapshot from `path`, strictly.
///
/// Returns `Ok(None)` if no snapshot exists (cold start). Any other failure
/// is an error; use [`load_or_rebuild`] for the recovery behavior.
pub fn load_state(path: &Path) -> Result<Option<BuildState>, PersistError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;

    let snapshot: Snapshot =
        bincode::deserialize(&bytes).map_err(|e| PersistError::Deserialization(e.to_string()))?;

    if snapshot.format_version != FORMAT_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: FORMAT_VERSION,
            found: snapshot.format_version,
        });
    }
    if *blake3::hash(&snapshot.payload).as_bytes() != snapshot.checksum {
        return Err(PersistError::ChecksumMismatch);
    }

    let entries: Vec<(String, UnitMetadata)> = bincode::deserialize(&snapshot.payload)
        .map_err(|e| PersistError::Deserialization(e.to_string()))?;

    Ok(Some(BuildState::from_entries(entries)))
}

/// How a prior state came to be.
#[derive(Debug)]
pub enum StateLoad {
    /// Snapshot loaded intact.
    Loaded(BuildState),
    /// No snapshot on disk; first build.
    ColdStart(BuildState),
    /// Snapshot present but unreadable; it was discarded and every unit must
    /// be treated as dirty.
    FullRebuild(BuildState),
}

impl StateLoad {
    /// The state to build with, however it was obtained.
    pub fn into_state(self) -> BuildState {
        match self {
            StateLoad::Loaded(state) | StateLoad::ColdStart(state) | StateLoad::FullRebuild(state) => {
                state
            }
        }
    }

    /// Whether every unit must be recompiled regardless of the change set.
    pub fn is_full_rebuild(&self) -> bool {
        matches!(self, StateLoad::FullRebuild(_))
    }
}

/// Load a snapshot with the designed recovery path: corruption of any kind
/// discards the persisted state wholesale and forces a full rebuild. Never
/// loads partially.
pub fn load_or_rebuild(path: &Path) -> StateLoad {
    match load_state(path) {
        Ok(Some(state)) => StateLoad::Loaded(state),
        Ok(None) => StateLoad::ColdStart(BuildState::new()),
        Err(error) => {
            warn!(%error, path = %path.display(), "discarding corrupt state snapshot; full rebuild");
            StateLoad::FullRebuild(BuildState::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UnitId;
    use mason_graph::{ConstantValue, DeclId, FieldInfo, NameId};
    use tempfile::TempDir;

    fn sample_state() -> BuildState {
        let mut state = BuildState::new();
        let mut meta = UnitMetadata::new(DeclId(1));
        meta.fields.push(
            FieldInfo::new(DeclId(2), NameId(1), NameId(2))
                .with_constant(ConstantValue::Str("answer".into())),
        );
        meta.artifacts.push("out/A.class".into());
        state.insert(&UnitId::new("src/A"), meta);
        state.insert(&UnitId::new("src/util/B"), UnitMetadata::new(DeclId(3)));
        state
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.bin");

        let state = sample_state();
        save_state(&state, &path).unwrap();

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        let meta = loaded.get(&UnitId::new("src/A")).unwrap();
        assert_eq!(meta.fields[0].constant, ConstantValue::Str("answer".into()));
        assert_eq!(meta.artifacts, vec!["out/A.class".to_string()]);
    }

    #[test]
    fn missing_snapshot_is_a_cold_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.bin");
        assert!(load_state(&path).unwrap().is_none());

        let load = load_or_rebuild(&path);
        assert!(matches!(load, StateLoad::ColdStart(_)));
        assert!(!load.is_full_rebuild());
        assert!(load.into_state().is_empty());
    }

    #[test]
    fn garbage_snapshot_forces_full_rebuild() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.bin");
        fs::write(&path, b"not a snapshot").unwrap();

        assert!(load_state(&path).is_err());
        let load = load_or_rebuild(&path);
        assert!(load.is_full_rebuild());
        assert!(load.into_state().is_empty());
    }

    #[test]
    fn flipped_payload_byte_fails_the_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.bin");
        save_state(&sample_state(), &path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        match load_state(&path) {
            Err(PersistError::ChecksumMismatch) | Err(PersistError::Deserialization(_)) => {}
            other => panic!("expected corruption error, got {other:?}"),
        }
        assert!(load_or_rebuild(&path).is_full_rebuild());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.bin");

        save_state(&sample_state(), &path).unwrap();
        let mut smaller = BuildState::new();
        smaller.insert(&UnitId::new("src/Only"), UnitMetadata::new(DeclId(9)));
        save_state(&smaller, &path).unwrap();

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.get(&UnitId::new("src/Only")).is_some());
    }
}
