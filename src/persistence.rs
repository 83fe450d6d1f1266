//! Durable write safety: atomic writes, baseline snapshots, divergence checks.
//!
//! The write-to-temp-then-rename trick is lifted straight from the teacher's
//! `SessionStore::save` — a sibling `.tmp` file absorbs a partial write so a
//! crash mid-save never corrupts the last known-good content.

use crate::error::{FolioError, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// A content fingerprint taken at load time, used to detect concurrent
/// out-of-band modification before a later write is allowed to land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub path: PathBuf,
    pub content_hash: String,
    pub len: u64,
    pub mtime_millis: Option<i64>,
}

/// Outcome of comparing a stored [`Baseline`] against the file's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// The file on disk still matches the baseline exactly.
    Unchanged,
    /// The file on disk has different content than the baseline.
    Diverged,
    /// The file existed at baseline time but is gone now.
    AbsentNow,
}

fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Snapshot the current on-disk state of `path` as a [`Baseline`].
pub fn snapshot(path: &Path) -> Result<Baseline> {
    let data = fs::read(path)?;
    let metadata = fs::metadata(path)?;
    let mtime_millis = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64);
    Ok(Baseline {
        path: path.to_path_buf(),
        content_hash: hash_bytes(&data),
        len: data.len() as u64,
        mtime_millis,
    })
}

/// Compare `baseline` against the file's current on-disk state.
pub fn detect_divergence(baseline: &Baseline) -> Result<Divergence> {
    match fs::read(&baseline.path) {
        Ok(data) => {
            if hash_bytes(&data) == baseline.content_hash {
                Ok(Divergence::Unchanged)
            } else {
                Ok(Divergence::Diverged)
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Divergence::AbsentNow),
        Err(e) => Err(e.into()),
    }
}

/// Test/failure-injection seam: when set, [`atomic_write`] returns this error
/// instead of performing the rename, letting tests exercise the "write
/// landed in tmp but rename failed" crash window without real disk faults.
#[derive(Default)]
pub struct FailureInjector {
    pub fail_before_rename: bool,
}

/// Write `contents` to `path` atomically: ensure the parent directory
/// exists, write to a sibling `.tmp` file and flush it to disk, rename into
/// place, then flush the parent directory entry itself so the rename
/// survives a crash immediately after. Existing file permissions are
/// preserved across the rename when the target already exists.
pub fn atomic_write(path: &Path, contents: &[u8], injector: Option<&FailureInjector>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            FolioError::filesystem_error(
                "io",
                format!("failed to create directory {}: {e}", parent.display()),
            )
        })?;
    }

    let tmp_path = sibling_tmp_path(path);
    let existing_mode = fs::metadata(path).ok().map(|m| m.permissions());

    let mut tmp_file = File::create(&tmp_path).map_err(|e| {
        FolioError::filesystem_error(
            "io",
            format!("failed to create temporary file {}: {e}", tmp_path.display()),
        )
    })?;
    tmp_file.write_all(contents).map_err(|e| {
        FolioError::filesystem_error(
            "io",
            format!("failed to write temporary file {}: {e}", tmp_path.display()),
        )
    })?;
    tmp_file.sync_all().map_err(|e| {
        FolioError::filesystem_error(
            "io",
            format!("failed to flush temporary file {}: {e}", tmp_path.display()),
        )
    })?;
    drop(tmp_file);

    if let Some(mode) = &existing_mode {
        let _ = fs::set_permissions(&tmp_path, mode.clone());
    }

    if injector.map(|i| i.fail_before_rename).unwrap_or(false) {
        let _ = fs::remove_file(&tmp_path);
        return Err(FolioError::filesystem_error(
            "io",
            "injected failure before rename",
        ));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        FolioError::filesystem_error(
            "io",
            format!("failed to move {} into place: {e}", path.display()),
        )
    })?;

    sync_parent_dir(path);
    Ok(())
}

/// Flush the directory entry for a rename, best-effort: not all platforms
/// support opening a directory for syncing, and a missing durability
/// guarantee here is not worth failing the save over.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!("{file_name}.tmp"))
}

/// Return the current file mode bits, where supported, for later restoration.
#[cfg(unix)]
pub fn mode_bits(path: &Path) -> Option<u32> {
    fs::metadata(path).ok().map(|m| m.permissions().mode())
}

#[cfg(not(unix))]
pub fn mode_bits(_path: &Path) -> Option<u32> {
    None
}
