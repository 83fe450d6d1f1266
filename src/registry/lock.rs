//! Exclusive-write lock state machine for one session.
//!
//! A write carries the token it last observed; it's accepted only if that
//! token is still current. `force_takeover` lets an admin break a stuck lock
//! without needing the original holder's token, rotating the token so any
//! write still in flight under the old one is rejected. Staleness against
//! the document's own revision counter is checked separately by the command
//! pipeline's guard stage, against [`crate::document::Document::revision`].

use crate::error::FolioError;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct LockState {
    holder: Option<String>,
    token: Option<String>,
    revision: u64,
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        self.holder.is_some()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn holder(&self) -> Option<&str> {
        self.holder.as_deref()
    }

    /// Acquire the lock for `holder`. When nothing holds the lock, `holder`
    /// takes it outright and `expected_token` is ignored. When `holder`
    /// already holds it, this is a reacquire: `expected_token` must match the
    /// current token (rejecting a caller reacquiring against a token it no
    /// longer holds, e.g. after a `force_takeover` it missed), and a fresh
    /// token is issued with revision bumped, same as `force_takeover`, so a
    /// write already in flight under the old token is invalidated.
    pub fn acquire(&mut self, holder: &str, expected_token: Option<&str>) -> Result<String, FolioError> {
        match &self.holder {
            None => {
                let token = Uuid::new_v4().to_string();
                self.holder = Some(holder.to_string());
                self.token = Some(token.clone());
                self.revision += 1;
                Ok(token)
            }
            Some(existing) if existing == holder => {
                if self.token.as_deref() != expected_token {
                    return Err(FolioError::conflict(
                        "lock token is stale or belongs to another holder",
                        &["reload", "force_takeover"],
                    ));
                }
                let token = Uuid::new_v4().to_string();
                self.token = Some(token.clone());
                self.revision += 1;
                Ok(token)
            }
            Some(existing) => Err(FolioError::conflict(
                format!("session is locked by {existing}"),
                &["wait", "force_takeover"],
            )),
        }
    }

    /// Release the lock; fails unless both `holder` and `token` match the
    /// current state.
    pub fn release(&mut self, holder: &str, token: &str) -> Result<(), FolioError> {
        self.check(holder, token)?;
        self.holder = None;
        self.token = None;
        Ok(())
    }

    /// Forcibly reassign the lock to `new_holder`, ignoring any current
    /// holder. Bumps revision so outstanding tokens are invalidated. Returns
    /// the new token and the prior holder, if any, so the caller can surface
    /// who got displaced.
    pub fn force_takeover(&mut self, new_holder: &str) -> (String, Option<String>) {
        let previous_owner = self.holder.take();
        let token = Uuid::new_v4().to_string();
        self.holder = Some(new_holder.to_string());
        self.token = Some(token.clone());
        self.revision += 1;
        (token, previous_owner)
    }

    /// Validate that `token` is current and belongs to `holder`.
    pub fn check(&self, holder: &str, token: &str) -> Result<(), FolioError> {
        match (&self.holder, &self.token) {
            (Some(h), Some(t)) if h == holder && t == token => Ok(()),
            (Some(_), _) => Err(FolioError::conflict(
                "lock token is stale or belongs to another holder",
                &["reload", "force_takeover"],
            )),
            (None, _) => Err(FolioError::conflict(
                "session is not locked",
                &["acquire_lock"],
            )),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_round_trips() {
        let mut lock = LockState::default();
        let token = lock.acquire("alice", None).unwrap();
        assert!(lock.is_locked());
        lock.release("alice", &token).unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn second_holder_cannot_acquire_while_locked() {
        let mut lock = LockState::default();
        lock.acquire("alice", None).unwrap();
        let err = lock.acquire("bob", None).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Conflict);
    }

    #[test]
    fn same_holder_reacquire_with_current_token_rotates_token_and_bumps_revision() {
        let mut lock = LockState::default();
        let token1 = lock.acquire("alice", None).unwrap();
        let revision1 = lock.revision();
        let token2 = lock.acquire("alice", Some(&token1)).unwrap();
        assert_ne!(token1, token2);
        assert!(lock.revision() > revision1);
        assert!(lock.check("alice", &token1).is_err());
        assert!(lock.check("alice", &token2).is_ok());
    }

    #[test]
    fn same_holder_reacquire_with_mismatched_token_is_rejected() {
        let mut lock = LockState::default();
        let token1 = lock.acquire("alice", None).unwrap();
        let err = lock.acquire("alice", Some("not-the-real-token")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Conflict);
        assert!(lock.check("alice", &token1).is_ok());
    }

    #[test]
    fn force_takeover_invalidates_old_token() {
        let mut lock = LockState::default();
        let old_token = lock.acquire("alice", None).unwrap();
        let old_revision = lock.revision();
        let (_, previous_owner) = lock.force_takeover("admin");
        assert_eq!(previous_owner, Some("alice".to_string()));
        assert_eq!(lock.holder(), Some("admin"));
        assert!(lock.revision() > old_revision);
        assert!(lock.check("alice", &old_token).is_err());
    }

    #[test]
    fn force_takeover_with_no_prior_holder_reports_none() {
        let mut lock = LockState::default();
        let (_, previous_owner) = lock.force_takeover("admin");
        assert_eq!(previous_owner, None);
    }

    #[test]
    fn stale_token_after_release_and_reacquire_is_rejected() {
        let mut lock = LockState::default();
        let token = lock.acquire("alice", None).unwrap();
        lock.release("alice", &token).unwrap();
        lock.acquire("alice", None).unwrap();
        let err = lock.check("alice", &token).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Conflict);
    }
}
