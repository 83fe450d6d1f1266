//! Workspace-boundary path resolution.
//!
//! Every path a caller hands the runtime gets resolved through here before
//! it touches the filesystem. `dunce` gives us cross-platform canonicalization
//! without Windows' `\\?\` UNC prefix leaking into error messages or audit
//! records, the way the teacher's session store canonicalizes working-directory
//! paths before trusting them.

use crate::error::{FolioError, Result};
use std::path::{Path, PathBuf};

/// Resolve `path` (absolute or workspace-relative) to a canonical path that is
/// provably inside `workspace_root`. Fails with `filesystem_error { reason:
/// "workspace_boundary" }` for any path that escapes the root, including via
/// `..` segments or symlinks.
pub fn resolve(path: &Path, workspace_root: &Path) -> Result<PathBuf> {
    let root = dunce::canonicalize(workspace_root).map_err(|e| {
        FolioError::filesystem_error("workspace_root", format!("cannot canonicalize workspace root: {e}"))
    })?;

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let resolved = canonicalize_best_effort(&joined)?;

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(FolioError::filesystem_error(
            "workspace_boundary",
            format!("path escapes workspace root: {}", path.display()),
        ))
    }
}

/// Canonicalize `path` for identity purposes only (no workspace-boundary
/// check), falling back to `path` itself when no ancestor exists to
/// canonicalize against (e.g. a bare relative name with no cwd match).
/// Used by [`crate::registry::session_id_for_path`] so that two spellings
/// of the same file — relative vs. absolute, `..`-laden vs. not — hash to
/// the same session id.
pub fn canonical_for_identity(path: &Path) -> PathBuf {
    canonicalize_best_effort(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Canonicalize a path that may not exist yet (e.g. a file about to be
/// created) by canonicalizing the deepest existing ancestor and rejoining
/// the remaining components lexically.
fn canonicalize_best_effort(path: &Path) -> Result<PathBuf> {
    if let Ok(canon) = dunce::canonicalize(path) {
        return Ok(canon);
    }

    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if existing.as_os_str().is_empty() {
            return Err(FolioError::filesystem_error(
                "workspace_boundary",
                format!("no existing ancestor for path: {}", path.display()),
            ));
        }
        if let Ok(canon) = dunce::canonicalize(&existing) {
            let mut result = canon;
            for component in tail.into_iter().rev() {
                result.push(component);
            }
            return Ok(result);
        }
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing = existing
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
            }
            None => {
                return Err(FolioError::filesystem_error(
                    "workspace_boundary",
                    format!("no existing ancestor for path: {}", path.display()),
                ));
            }
        }
    }
}
