//! Snapshots: durable copies of the full ledger state
//!
//! - bincode encoding of [`LedgerState`] (ordered maps, so encoding is deterministic)
//! - SHA-256 checksum over the encoded state
//! - optional zstd compression on disk
//! - atomic write: temp file, fsync, rename
//! - retention: keep the newest N snapshots

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::errors::{ConfigError, LedgerError};
use crate::state::LedgerState;
use ledger_types::time::Timestamp;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("No snapshots found")]
    NoSnapshots,

    #[error("Snapshot does not match configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Full ledger state at a given event sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    /// Sequence number of the last event emitted before the snapshot.
    pub sequence: u64,
    pub taken_at: Timestamp,
    pub state: LedgerState,
    /// Hex SHA-256 of the bincode-encoded state.
    pub checksum: String,
}

/// Deterministic SHA-256 of the encoded state.
pub fn state_hash(state: &LedgerState) -> Result<String, SnapshotError> {
    let bytes = bincode::serialize(state).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

impl LedgerSnapshot {
    pub fn new(state: LedgerState, taken_at: Timestamp) -> Result<Self, SnapshotError> {
        let checksum = state_hash(&state)?;
        Ok(Self {
            version: SNAPSHOT_VERSION,
            sequence: state.counters().sequence,
            taken_at,
            state,
            checksum,
        })
    }

    /// Check format version and checksum.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        let actual = state_hash(&self.state)?;
        if actual != self.checksum {
            return Err(SnapshotError::IntegrityFailure {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Directory of snapshot files named `snapshot-<sequence>.snap[.zst]`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    compress: bool,
}

impl SnapshotStore {
    /// `compress` enables zstd for new snapshots; loading handles both.
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            compress,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a snapshot atomically and return its path.
    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let data = bincode::serialize(snapshot)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        let (final_data, ext) = if self.compress {
            let compressed = zstd::encode_all(data.as_slice(), 3)
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
            (compressed, "snap.zst")
        } else {
            (data, "snap")
        };

        let filename = format!("snapshot-{:012}.{}", snapshot.sequence, ext);
        let path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!("{}.tmp", filename));

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&final_data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        info!(
            sequence = snapshot.sequence,
            bytes = final_data.len(),
            path = %path.display(),
            "snapshot written"
        );
        Ok(path)
    }

    /// Load and verify one snapshot file.
    pub fn load(&self, path: &Path) -> Result<LedgerSnapshot, SnapshotError> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let is_compressed = path.extension().map_or(false, |e| e == "zst");
        let decoded = if is_compressed {
            zstd::decode_all(data.as_slice())
                .map_err(|e| SnapshotError::Compression(e.to_string()))?
        } else {
            data
        };

        let snapshot: LedgerSnapshot = bincode::deserialize(&decoded)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        snapshot.verify()?;

        debug!(sequence = snapshot.sequence, path = %path.display(), "snapshot loaded");
        Ok(snapshot)
    }

    /// Load the snapshot with the highest sequence number.
    pub fn load_latest(&self) -> Result<LedgerSnapshot, SnapshotError> {
        let (_, path) = self
            .list()?
            .pop()
            .ok_or(SnapshotError::NoSnapshots)?;
        self.load(&path)
    }

    /// Every snapshot as `(sequence, path)`, oldest first.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(seq) = parse_sequence(&name) {
                results.push((seq, entry.path()));
            }
        }
        results.sort_by_key(|(seq, _)| *seq);
        Ok(results)
    }

    /// Delete all but the newest `keep` snapshots. Returns the removed paths.
    pub fn prune(&self, keep: usize) -> Result<Vec<PathBuf>, SnapshotError> {
        let snapshots = self.list()?;
        let excess = snapshots.len().saturating_sub(keep);

        let mut removed = Vec::with_capacity(excess);
        for (_, path) in snapshots.into_iter().take(excess) {
            fs::remove_file(&path)?;
            removed.push(path);
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), kept = keep, "old snapshots pruned");
        }
        Ok(removed)
    }
}

fn parse_sequence(filename: &str) -> Option<u64> {
    let rest = filename.strip_prefix("snapshot-")?;
    let digits = rest
        .strip_suffix(".snap.zst")
        .or_else(|| rest.strip_suffix(".snap"))?;
    digits.parse::<u64>().ok()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use ledger_types::ids::{AssetId, UserId};
    use tempfile::TempDir;

    fn sample_state() -> LedgerState {
        let mut state = LedgerState::new(&LedgerConfig::default()).unwrap();
        let alice = UserId::new("0xa11ce");
        state.accounts.create_account(&alice, 10).unwrap();
        state.accounts.credit(&alice, &AssetId::Native, 5, 20).unwrap();
        state
            .registry
            .register(AssetId::token("0xusdc"), 6, false, None)
            .unwrap();
        state
    }

    fn state_at(sequence: u64) -> LedgerState {
        let mut state = sample_state();
        state.counters.sequence = sequence;
        state
    }

    #[test]
    fn test_snapshot_write_and_load_uncompressed() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), false);
        let snapshot = LedgerSnapshot::new(state_at(42), 1_700_000_000).unwrap();

        let path = store.save(&snapshot).unwrap();
        assert!(path.to_string_lossy().ends_with("snapshot-000000000042.snap"));

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_snapshot_write_and_load_compressed() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), true);
        let snapshot = LedgerSnapshot::new(sample_state(), 1).unwrap();

        let path = store.save(&snapshot).unwrap();
        assert!(path.to_string_lossy().ends_with(".snap.zst"));
        assert_eq!(store.load(&path).unwrap().state, snapshot.state);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = state_hash(&sample_state()).unwrap();
        let b = state_hash(&sample_state()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_tampered_state_detected() {
        let mut snapshot = LedgerSnapshot::new(sample_state(), 1).unwrap();
        snapshot
            .state
            .accounts
            .credit(&UserId::new("0xa11ce"), &AssetId::Native, 1_000_000, 30)
            .unwrap();
        assert!(matches!(
            snapshot.verify(),
            Err(SnapshotError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn test_tampered_file_detected() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), false);
        let mut snapshot = LedgerSnapshot::new(sample_state(), 1).unwrap();
        snapshot.checksum = "00".repeat(32);
        let path = store.save(&snapshot).unwrap();
        assert!(matches!(
            store.load(&path),
            Err(SnapshotError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut snapshot = LedgerSnapshot::new(sample_state(), 1).unwrap();
        snapshot.version = SNAPSHOT_VERSION + 1;
        assert!(matches!(
            snapshot.verify(),
            Err(SnapshotError::UnsupportedVersion(v)) if v == SNAPSHOT_VERSION + 1
        ));
    }

    #[test]
    fn test_load_latest_and_prune() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path(), false);
        for seq in [100u64, 500, 300, 200, 400] {
            let snapshot = LedgerSnapshot::new(state_at(seq), seq as i64).unwrap();
            store.save(&snapshot).unwrap();
        }

        assert_eq!(store.load_latest().unwrap().sequence, 500);

        let removed = store.prune(2).unwrap();
        assert_eq!(removed.len(), 3);
        let remaining: Vec<u64> = store.list().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(remaining, vec![400, 500]);
    }

    #[test]
    fn test_no_snapshots_returns_error() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join("missing"), false);
        assert!(matches!(store.load_latest(), Err(SnapshotError::NoSnapshots)));
    }

    #[test]
    fn test_unrelated_files_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), b"hello").unwrap();
        fs::write(tmp.path().join("snapshot-abc.snap"), b"junk").unwrap();
        let store = SnapshotStore::new(tmp.path(), false);
        assert!(store.list().unwrap().is_empty());
    }
}
