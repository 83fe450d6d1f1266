//! Crate-level configuration loading.
//!
//! Precedence (highest wins), mirroring the teacher's layered config design:
//! 1. Environment variables (`FOLIO_*`)
//! 2. TOML file path passed to [`load_config`]
//! 3. `./folio.toml` in the current directory
//! 4. Built-in defaults

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HISTORY_DEPTH: usize = 50;
const DEFAULT_MAX_QUEUE_LEN: usize = 200;
const DEFAULT_SIGNAL_PAYLOAD_CAP_BYTES: usize = 16 * 1024;
const DEFAULT_RENDER_CIRCUIT_THRESHOLD: u32 = 3;
const DEFAULT_RENDER_CIRCUIT_COOLDOWN_MS: u64 = 30_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 250;
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 8_000;
const DEFAULT_IDLE_RECLAIM_INTERVAL_MS: u64 = 60_000;

/// Runtime-wide configuration resolved from file + environment + defaults.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root directory every caller-supplied path is resolved against.
    pub workspace_root: PathBuf,
    /// Directory under which session checkpoints are written.
    pub checkpoint_dir: PathBuf,
    /// Bounded undo/redo ring depth per session.
    pub history_depth: usize,
    /// Max per-subscriber inbox depth before the bus drops a signal.
    pub max_queue_len: usize,
    /// Byte cap above which a signal payload value is replaced by a truncation marker.
    pub signal_payload_cap_bytes: usize,
    /// Consecutive render failures before the circuit opens.
    pub render_circuit_threshold: u32,
    /// Cooldown the render circuit stays open for once tripped.
    pub render_circuit_cooldown: Duration,
    /// Retry policy bounds for `transient_io` / `renderer_transient` errors.
    pub retry: RetryConfig,
    /// Interval on which the registry's background idle-reclaim sweep runs.
    pub idle_reclaim_interval: Duration,
    /// Whether checkpoints are written after every accepted edit.
    pub checkpoint_on_edit: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_RETRY_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_RETRY_MAX_BACKOFF_MS),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            checkpoint_dir: PathBuf::from(".folio/checkpoints"),
            history_depth: DEFAULT_HISTORY_DEPTH,
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
            signal_payload_cap_bytes: DEFAULT_SIGNAL_PAYLOAD_CAP_BYTES,
            render_circuit_threshold: DEFAULT_RENDER_CIRCUIT_THRESHOLD,
            render_circuit_cooldown: Duration::from_millis(DEFAULT_RENDER_CIRCUIT_COOLDOWN_MS),
            retry: RetryConfig::default(),
            idle_reclaim_interval: Duration::from_millis(DEFAULT_IDLE_RECLAIM_INTERVAL_MS),
            checkpoint_on_edit: false,
        }
    }
}

/// On-disk TOML shape; every field optional so partial files are legal.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    workspace_root: Option<PathBuf>,
    checkpoint_dir: Option<PathBuf>,
    history_depth: Option<usize>,
    max_queue_len: Option<usize>,
    signal_payload_cap_bytes: Option<usize>,
    render_circuit_threshold: Option<u32>,
    render_circuit_cooldown_ms: Option<u64>,
    checkpoint_on_edit: Option<bool>,
}

/// `~/.config/folio/config.toml` (or the platform config dir equivalent),
/// used when no file path is given and no `./folio.toml` exists.
fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .or_else(dirs::config_dir)
        .map(|dir| dir.join("folio").join("config.toml"))
}

/// Load configuration from an optional TOML file plus `FOLIO_*` env overrides.
///
/// File lookup order: `path_override`, then `./folio.toml`, then the
/// platform config directory. The first one that exists wins; none existing
/// is not an error, it just leaves every field at its built-in default.
pub fn load_config(path_override: Option<&std::path::Path>) -> crate::error::Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    let candidate = path_override
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("folio.toml")).filter(|p| p.exists()))
        .or_else(default_config_path);
    if let Some(candidate) = candidate {
        if candidate.exists() {
            let raw = std::fs::read_to_string(&candidate)?;
            let parsed: FileConfig = toml::from_str(&raw).map_err(|e| {
                crate::error::FolioError::parse_failed(0, format!("invalid config toml: {e}"))
            })?;
            apply_file_config(&mut config, parsed);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_file_config(config: &mut RuntimeConfig, file: FileConfig) {
    if let Some(v) = file.workspace_root {
        config.workspace_root = v;
    }
    if let Some(v) = file.checkpoint_dir {
        config.checkpoint_dir = v;
    }
    if let Some(v) = file.history_depth {
        config.history_depth = v;
    }
    if let Some(v) = file.max_queue_len {
        config.max_queue_len = v;
    }
    if let Some(v) = file.signal_payload_cap_bytes {
        config.signal_payload_cap_bytes = v;
    }
    if let Some(v) = file.render_circuit_threshold {
        config.render_circuit_threshold = v;
    }
    if let Some(v) = file.render_circuit_cooldown_ms {
        config.render_circuit_cooldown = Duration::from_millis(v);
    }
    if let Some(v) = file.checkpoint_on_edit {
        config.checkpoint_on_edit = v;
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("FOLIO_WORKSPACE_ROOT") {
        config.workspace_root = PathBuf::from(v);
    }
    if let Some(v) = lookup("FOLIO_CHECKPOINT_DIR") {
        config.checkpoint_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("FOLIO_HISTORY_DEPTH").and_then(|s| s.parse().ok()) {
        config.history_depth = v;
    }
    if let Some(v) = lookup("FOLIO_MAX_QUEUE_LEN").and_then(|s| s.parse().ok()) {
        config.max_queue_len = v;
    }
    if let Some(v) = lookup("FOLIO_CHECKPOINT_ON_EDIT") {
        config.checkpoint_on_edit = v == "1" || v.eq_ignore_ascii_case("true");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_ring_depth() {
        let config = RuntimeConfig::default();
        assert_eq!(config.history_depth, 50);
        assert_eq!(config.max_queue_len, 200);
    }

    #[test]
    fn env_overrides_take_precedence_over_defaults() {
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            "FOLIO_HISTORY_DEPTH" => Some("12".to_string()),
            "FOLIO_CHECKPOINT_ON_EDIT" => Some("true".to_string()),
            _ => None,
        });
        assert_eq!(config.history_depth, 12);
        assert!(config.checkpoint_on_edit);
    }

    #[test]
    fn file_config_overrides_defaults_but_not_env() {
        let mut config = RuntimeConfig::default();
        apply_file_config(
            &mut config,
            FileConfig {
                history_depth: Some(5),
                max_queue_len: Some(10),
                ..Default::default()
            },
        );
        assert_eq!(config.history_depth, 5);
        apply_env_overrides(&mut config, |key| {
            (key == "FOLIO_HISTORY_DEPTH").then(|| "99".to_string())
        });
        assert_eq!(config.history_depth, 99);
        assert_eq!(config.max_queue_len, 10);
    }

    #[test]
    fn load_config_reads_an_explicit_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "history_depth = 7\nmax_queue_len = 40\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.history_depth, 7);
        assert_eq!(config.max_queue_len, 40);
    }

    #[test]
    fn load_config_with_no_file_anywhere_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does_not_exist.toml");
        let config = load_config(Some(&missing)).unwrap();
        assert_eq!(config.history_depth, RuntimeConfig::default().history_depth);
    }
}
