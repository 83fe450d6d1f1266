//! The command pipeline: a session's single point of entry for every edit.
//!
//! Modeled on the teacher's runtime actor (`spawn_runtime_with_shared_agent`):
//! one `tokio::select!` loop owns the mutable state, every caller talks to it
//! over a channel, and each accepted command moves through the same named
//! stages so audit output is uniform regardless of which action ran.

pub mod actions;
pub mod pipeline;

use crate::authz::{Action, Role};
use crate::document::{BodyPatch, HeaderUpdateMode};
use crate::frontmatter::Header;
use serde::{Deserialize, Serialize};

/// One caller-issued operation against a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Command {
    Load,
    /// `force: true` bypasses baseline-divergence detection (the "overwrite"
    /// remediation option offered alongside a `conflict` error).
    Save { #[serde(default)] force: bool },
    UpdateHeader { changes: Header, mode: HeaderModeWire },
    UpdateBody { patch: BodyPatchWire },
    Render,
    Undo,
    Redo,
    AcquireLock,
    ReleaseLock { token: String },
    /// `reason` is recorded in the resulting `lock_state` signal's detail
    /// for audit purposes; it does not gate whether the takeover succeeds.
    ForceTakeover { reason: String },
    /// Report the pending recovery candidate, if any, without applying it.
    RecoveryStatus,
    /// Adopt the pending recovery candidate's document and baseline.
    Recover,
    /// Delete the pending recovery candidate without applying it.
    DiscardRecovery,
}

/// Wire-friendly mirror of [`HeaderUpdateMode`] (kept separate so the core
/// document module has no serde dependency on the command surface).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderModeWire {
    Merge,
    Replace,
}

impl From<HeaderModeWire> for HeaderUpdateMode {
    fn from(mode: HeaderModeWire) -> Self {
        match mode {
            HeaderModeWire::Merge => HeaderUpdateMode::Merge,
            HeaderModeWire::Replace => HeaderUpdateMode::Replace,
        }
    }
}

/// Wire-friendly mirror of [`BodyPatch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyPatchWire {
    Replace { text: String },
    SearchReplace { search: String, replace: String, global: bool },
}

impl From<BodyPatchWire> for BodyPatch {
    fn from(patch: BodyPatchWire) -> Self {
        match patch {
            BodyPatchWire::Replace { text } => BodyPatch::Replace(text),
            BodyPatchWire::SearchReplace { search, replace, global } => {
                BodyPatch::SearchReplace { search, replace, global }
            }
        }
    }
}

impl Command {
    /// The [`Action`] an authorization check should evaluate for this command.
    pub fn action(&self) -> Action {
        match self {
            Command::Load => Action::Load,
            Command::Save { .. } => Action::Save,
            Command::UpdateHeader { .. } => Action::UpdateHeader,
            Command::UpdateBody { .. } => Action::UpdateBody,
            Command::Render => Action::Render,
            Command::Undo => Action::Undo,
            Command::Redo => Action::Redo,
            Command::AcquireLock | Command::ReleaseLock { .. } => Action::Save,
            Command::ForceTakeover { .. } => Action::ForceTakeover,
            Command::RecoveryStatus => Action::Load,
            Command::Recover => Action::Recover,
            Command::DiscardRecovery => Action::Save,
        }
    }
}

/// A caller-issued request: the command plus the identity/lock context the
/// pipeline's guard stage checks before authorization.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: Command,
    pub role: Role,
    pub holder: String,
    /// Lock token the caller last observed; required for write commands.
    pub token: Option<String>,
    /// Document revision the caller last observed; required for write
    /// commands, checked against the live document by the guard stage.
    pub observed_revision: Option<u64>,
}

/// Result of running one command through the pipeline.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub revision: u64,
    pub detail: serde_json::Value,
    pub degraded: bool,
}
