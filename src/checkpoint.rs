//! On-disk checkpoint records used for crash recovery.
//!
//! Laid out like the teacher's `SessionStore`: a framed payload written
//! atomically under a per-session directory, one file per sequence number
//! so recovery can discover the latest intact record even if the newest
//! write was interrupted.

use crate::document::Document;
use crate::error::{FolioError, Result};
use crate::persistence::atomic_write;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 4-byte magic prefix identifying a checkpoint file, followed by a single
/// schema-version byte before the JSON-encoded record body.
const CHECKPOINT_MAGIC: &[u8; 4] = b"FCHK";
const CHECKPOINT_FILE_VERSION: u8 = 1;
const CHECKPOINT_FILE_EXT: &str = "chk";

/// A single recorded document state, keyed by session id and sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointRecord {
    session_id: String,
    sequence: u64,
    revision: u64,
    path: Option<PathBuf>,
    header: crate::frontmatter::Header,
    body: String,
    schema: Option<String>,
}

/// Frame `record` as `MAGIC || version_byte || json`.
fn frame(record: &CheckpointRecord) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(record)
        .map_err(|e| FolioError::internal(format!("failed to serialize checkpoint: {e}")))?;
    let mut framed = Vec::with_capacity(CHECKPOINT_MAGIC.len() + 1 + json.len());
    framed.extend_from_slice(CHECKPOINT_MAGIC);
    framed.push(CHECKPOINT_FILE_VERSION);
    framed.extend_from_slice(&json);
    Ok(framed)
}

/// Parse a `MAGIC || version_byte || json` frame back into a record.
fn unframe(path: &Path, raw: &[u8]) -> Result<CheckpointRecord> {
    let header_len = CHECKPOINT_MAGIC.len() + 1;
    if raw.len() < header_len || &raw[..CHECKPOINT_MAGIC.len()] != CHECKPOINT_MAGIC {
        return Err(FolioError::parse_failed(
            0,
            format!("not a checkpoint file: {}", path.display()),
        ));
    }
    let version = raw[CHECKPOINT_MAGIC.len()];
    if version != CHECKPOINT_FILE_VERSION {
        return Err(FolioError::parse_failed(
            0,
            format!("unsupported checkpoint version {version} in {}", path.display()),
        ));
    }
    serde_json::from_slice(&raw[header_len..])
        .map_err(|e| FolioError::parse_failed(0, format!("corrupt checkpoint {}: {e}", path.display())))
}

/// Filesystem-backed checkpoint store rooted under one directory shared by
/// every session.
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn record_path(&self, session_id: &str, sequence: u64) -> PathBuf {
        self.session_dir(session_id)
            .join(format!("{sequence:020}.{CHECKPOINT_FILE_EXT}"))
    }

    /// Write a checkpoint for `doc` at `sequence`, atomically.
    pub fn write(&self, session_id: &str, sequence: u64, doc: &Document) -> Result<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)?;
        let record = CheckpointRecord {
            session_id: session_id.to_string(),
            sequence,
            revision: doc.revision,
            path: doc.path.clone(),
            header: doc.header.clone(),
            body: doc.body.clone(),
            schema: doc.schema.clone(),
        };
        let framed = frame(&record)?;
        atomic_write(&self.record_path(session_id, sequence), &framed, None)
    }

    /// List sequence numbers with an intact, readable checkpoint record for
    /// `session_id`, ascending. Corrupt or unreadable files are skipped
    /// rather than failing the whole listing — a tolerant discovery pass,
    /// since one bad record shouldn't hide the rest.
    pub fn list_sequences(&self, session_id: &str) -> Vec<u64> {
        let dir = self.session_dir(session_id);
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut sequences: Vec<u64> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let stem = name.strip_suffix(&format!(".{CHECKPOINT_FILE_EXT}"))?;
                stem.parse::<u64>().ok()
            })
            .collect();
        sequences.sort_unstable();
        sequences
    }

    /// Load the checkpoint record at `sequence`, reconstructing its document.
    fn load(&self, session_id: &str, sequence: u64) -> Result<Document> {
        let path = self.record_path(session_id, sequence);
        let raw = fs::read(&path)?;
        let record = unframe(&path, &raw)?;
        Ok(Document {
            path: record.path,
            header: record.header,
            body: record.body,
            revision: record.revision,
            dirty: false,
            schema: record.schema,
            header_syntax: None,
        })
    }

    /// Resolve the most recent usable checkpoint for recovery, skipping
    /// records that fail to parse (tolerating a torn write at the tail).
    pub fn latest_recoverable(&self, session_id: &str) -> Option<Document> {
        for sequence in self.list_sequences(session_id).into_iter().rev() {
            if let Ok(doc) = self.load(session_id, sequence) {
                return Some(doc);
            }
        }
        None
    }

    /// Remove all checkpoints at or before `sequence`, keeping newer ones.
    /// Used once a document has been durably saved so recovery state doesn't
    /// grow without bound.
    pub fn prune_through(&self, session_id: &str, sequence: u64) {
        for seq in self.list_sequences(session_id) {
            if seq <= sequence {
                let _ = fs::remove_file(self.record_path(session_id, seq));
            }
        }
    }

    /// Discard the newest recovery candidate for `session_id`, if any.
    /// Returns `true` when a candidate was found and removed.
    pub fn discard_latest(&self, session_id: &str) -> bool {
        match self.list_sequences(session_id).into_iter().next_back() {
            Some(sequence) => fs::remove_file(self.record_path(session_id, sequence)).is_ok(),
            None => false,
        }
    }

    /// Every session id with at least one intact checkpoint, for operator
    /// tooling that needs to sweep recovery candidates across sessions
    /// rather than within one already-open session.
    pub fn list_candidate_sessions(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|session_id| !self.list_sequences(session_id).is_empty())
            .collect()
    }
}
