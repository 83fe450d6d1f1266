//! Authorization: role matrix plus an optional caller-supplied hook.
//!
//! Mirrors the shape of the teacher's approval flow in
//! `runtime::approvals` — a fast built-in decision path, with room for a
//! pluggable hook to veto or add remediation for stricter tenants.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A role a caller authenticates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
    Admin,
}

/// An action requiring authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Load,
    Save,
    UpdateHeader,
    UpdateBody,
    Render,
    Undo,
    Redo,
    Subscribe,
    ForceTakeover,
    Recover,
}

/// Built-in role/action matrix. `Admin` can do everything, including
/// `ForceTakeover`; `Viewer` can only `Load`, `Render`, `Subscribe`.
pub fn role_allows(role: Role, action: Action) -> bool {
    match role {
        Role::Admin => true,
        Role::Owner => action != Action::ForceTakeover,
        Role::Editor => matches!(
            action,
            Action::Load | Action::Save | Action::UpdateHeader | Action::UpdateBody
                | Action::Render | Action::Undo | Action::Redo | Action::Subscribe | Action::Recover
        ),
        Role::Viewer => matches!(action, Action::Load | Action::Render | Action::Subscribe),
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

/// Optional caller-supplied veto/augmentation on top of the role matrix.
/// The matrix is evaluated first; a hook can only narrow an `Allow` down to
/// `Deny`, never widen a `Deny` into an `Allow`.
#[async_trait]
pub trait AuthorizationHook: Send + Sync {
    async fn check(&self, role: Role, action: Action) -> Decision;
}

/// Evaluate the role matrix, then consult `hook` if the matrix allowed it.
pub async fn authorize(role: Role, action: Action, hook: Option<&dyn AuthorizationHook>) -> Decision {
    if !role_allows(role, action) {
        return Decision::Deny {
            reason: format!("role {role:?} is not permitted to perform {action:?}"),
        };
    }
    match hook {
        Some(hook) => hook.check(role, action).await,
        None => Decision::Allow,
    }
}
