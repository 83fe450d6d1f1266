//! The command pipeline proper: ingest -> normalize -> guard -> authorize ->
//! execute -> apply -> audit -> signal.
//!
//! One [`CommandPipeline`] owns one [`SessionHandle`], the way one
//! `Agent` instance is owned by the teacher's runtime actor loop. External
//! effects (file I/O, the render call) run and are confirmed successful
//! *before* the in-memory document is mutated, so a failed apply needs no
//! explicit rollback step: nothing was committed yet.

use crate::audit::{AuditEvent, AuditTrail, CorrelationId, Outcome, Stage};
use crate::authz::{self, AuthorizationHook, Decision};
use crate::command::actions;
use crate::command::{Command, CommandOutcome, CommandRequest};
use crate::document::{self, BodyUpdateOpts, SerializeOpts};
use crate::error::{FolioError, Result};
use crate::frontmatter::FrontmatterRegistry;
use crate::persistence::{self, Divergence};
use crate::reliability::RetryPolicy;
use crate::render::RenderOrchestrator;
use crate::checkpoint::CheckpointStore;
use crate::registry::SessionHandle;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything one pipeline instance needs beyond the session itself.
pub struct PipelineContext {
    pub workspace_root: PathBuf,
    pub frontmatter: Arc<FrontmatterRegistry>,
    pub retry_policy: RetryPolicy,
    pub checkpoints: Option<Arc<CheckpointStore>>,
    pub checkpoint_on_edit: bool,
    pub renderer: Option<Arc<RenderOrchestrator>>,
    pub authorization_hook: Option<Arc<dyn AuthorizationHook>>,
}

/// Runs one [`CommandRequest`] through every pipeline stage for `session`.
pub struct CommandPipeline {
    session: Arc<SessionHandle>,
    context: Arc<PipelineContext>,
}

impl CommandPipeline {
    pub fn new(session: Arc<SessionHandle>, context: Arc<PipelineContext>) -> Self {
        Self { session, context }
    }

    pub async fn handle(&self, request: CommandRequest) -> Result<CommandOutcome> {
        let correlation_id = CorrelationId::new();
        let mut trail = AuditTrail::default();

        trail.record(AuditEvent::new(
            correlation_id,
            self.session.id.clone(),
            Stage::Ingest,
            Outcome::Ok,
            serde_json::json!({"command": command_name(&request.command)}),
        ));

        let guard_result = self.guard(&request).await;
        trail.record(AuditEvent::new(
            correlation_id,
            self.session.id.clone(),
            Stage::Guard,
            outcome_of(&guard_result),
            serde_json::json!({}),
        ));
        if let Err(err) = guard_result {
            self.publish_failure(&request, &err);
            return Err(err);
        }

        let decision = authz::authorize(
            request.role,
            request.command.action(),
            self.context.authorization_hook.as_deref(),
        )
        .await;
        trail.record(AuditEvent::new(
            correlation_id,
            self.session.id.clone(),
            Stage::Authorize,
            match &decision {
                Decision::Allow => Outcome::Ok,
                Decision::Deny { .. } => Outcome::Denied,
            },
            serde_json::json!({}),
        ));
        if let Decision::Deny { reason } = decision {
            let err = FolioError::forbidden(reason);
            self.publish_failure(&request, &err);
            return Err(err);
        }

        let result = self.execute(&request).await;
        trail.record(AuditEvent::new(
            correlation_id,
            self.session.id.clone(),
            Stage::Execute,
            outcome_of(&result),
            serde_json::json!({}),
        ));
        let (outcome, signal_kind) = match result {
            Ok(v) => v,
            Err(err) => {
                self.publish_failure(&request, &err);
                return Err(err);
            }
        };

        trail.record(AuditEvent::new(
            correlation_id,
            self.session.id.clone(),
            Stage::Apply,
            if outcome.degraded { Outcome::Degraded } else { Outcome::Ok },
            outcome.detail.clone(),
        ));

        if let Some(kind) = signal_kind {
            let report = self.session.signals.publish(kind, outcome.detail.clone());
            trail.record(AuditEvent::new(
                correlation_id,
                self.session.id.clone(),
                Stage::Signal,
                Outcome::Ok,
                serde_json::json!({"delivered": report.delivered, "dropped": report.dropped}),
            ));
        }

        self.session.touch();
        Ok(outcome)
    }

    /// Emit the closed-set `failed` signal required for every error that
    /// makes it past ingest normalization (§7: "no retry" codes still get a
    /// `failed` signal; a caller subscribed for liveness always hears about
    /// a rejected command, not just accepted ones).
    fn publish_failure(&self, request: &CommandRequest, err: &FolioError) {
        self.session.signals.publish(
            "failed",
            serde_json::json!({
                "action": command_name(&request.command),
                "error": {"code": err.code.as_str(), "message": err.message, "details": err.details},
                "rollback": false,
            }),
        );
    }

    /// Lock-state validation. Lock lifecycle commands are exempt (they *are*
    /// the lock operation); every other mutating command must carry a
    /// current lock token and a document revision that still matches the
    /// live document — an edit prepared against a now-stale revision is
    /// rejected the same way a concurrent out-of-band save is.
    async fn guard(&self, request: &CommandRequest) -> Result<()> {
        match &request.command {
            Command::Load | Command::Render | Command::AcquireLock
            | Command::ReleaseLock { .. } | Command::ForceTakeover { .. }
            | Command::RecoveryStatus | Command::Recover | Command::DiscardRecovery => Ok(()),
            _ => {
                let token = request
                    .token
                    .as_deref()
                    .ok_or_else(|| FolioError::invalid_params("write command requires a lock token"))?;
                let observed_revision = request
                    .observed_revision
                    .ok_or_else(|| FolioError::invalid_params("write command requires an observed revision"))?;
                self.session.lock.lock().unwrap().check(&request.holder, token)?;
                let current_revision = self.session.document.lock().await.revision;
                if observed_revision != current_revision {
                    return Err(FolioError::conflict(
                        "document revision has advanced since this write was prepared",
                        &["reload", "overwrite", "merge_hook"],
                    ));
                }
                Ok(())
            }
        }
    }

    async fn execute(&self, request: &CommandRequest) -> Result<(CommandOutcome, Option<&'static str>)> {
        match &request.command {
            Command::Load => self.execute_load().await,
            Command::Save { force } => self.execute_save(*force).await,
            Command::UpdateHeader { changes, mode } => {
                let mut doc = self.session.document.lock().await;
                let result = actions::update_header(&doc, changes.clone(), (*mode).into());
                self.commit(&mut doc, result).await
            }
            Command::UpdateBody { patch } => {
                let mut doc = self.session.document.lock().await;
                let result = actions::update_body(&doc, patch.clone().into(), &BodyUpdateOpts::default())?;
                self.commit(&mut doc, result).await
            }
            Command::Render => self.execute_render().await,
            Command::Undo => {
                let mut doc = self.session.document.lock().await;
                let mut history = self.session.history.lock().await;
                let result = actions::undo(doc.clone(), &mut history)?;
                *doc = result.document.clone();
                Ok((
                    CommandOutcome { revision: doc.revision, detail: result.detail, degraded: false },
                    Some(result.signal_kind),
                ))
            }
            Command::Redo => {
                let mut doc = self.session.document.lock().await;
                let mut history = self.session.history.lock().await;
                let result = actions::redo(doc.clone(), &mut history)?;
                *doc = result.document.clone();
                Ok((
                    CommandOutcome { revision: doc.revision, detail: result.detail, degraded: false },
                    Some(result.signal_kind),
                ))
            }
            Command::AcquireLock => {
                let token = self
                    .session
                    .lock
                    .lock()
                    .unwrap()
                    .acquire(&request.holder, request.token.as_deref())?;
                Ok((
                    CommandOutcome {
                        revision: self.session.lock.lock().unwrap().revision(),
                        detail: serde_json::json!({"action": "lock_state", "state": "acquired", "token": token}),
                        degraded: false,
                    },
                    Some("updated"),
                ))
            }
            Command::ReleaseLock { token } => {
                self.session.lock.lock().unwrap().release(&request.holder, token)?;
                Ok((
                    CommandOutcome {
                        revision: 0,
                        detail: serde_json::json!({"action": "lock_state", "state": "released"}),
                        degraded: false,
                    },
                    Some("updated"),
                ))
            }
            Command::ForceTakeover { reason } => {
                let (token, previous_owner) =
                    self.session.lock.lock().unwrap().force_takeover(&request.holder);
                Ok((
                    CommandOutcome {
                        revision: self.session.lock.lock().unwrap().revision(),
                        detail: serde_json::json!({
                            "action": "lock_state",
                            "state": "force_taken",
                            "token": token,
                            "previous_owner": previous_owner,
                            "reason": reason,
                        }),
                        degraded: false,
                    },
                    Some("updated"),
                ))
            }
            Command::RecoveryStatus => self.execute_recovery_status().await,
            Command::Recover => self.execute_recover().await,
            Command::DiscardRecovery => self.execute_discard_recovery().await,
        }
    }

    async fn commit(
        &self,
        doc: &mut tokio::sync::MutexGuard<'_, document::Document>,
        result: actions::ActionResult,
    ) -> Result<(CommandOutcome, Option<&'static str>)> {
        if let Some(previous) = result.record_for_undo {
            self.session.history.lock().await.record(previous);
        }
        **doc = result.document.clone();

        if self.context.checkpoint_on_edit {
            if let Some(store) = &self.context.checkpoints {
                store.write(&self.session.id, result.document.revision, &result.document)?;
            }
        }

        Ok((
            CommandOutcome {
                revision: result.document.revision,
                detail: result.detail,
                degraded: false,
            },
            Some(result.signal_kind),
        ))
    }

    fn checkpoint_store(&self) -> Result<&Arc<CheckpointStore>> {
        self.context
            .checkpoints
            .as_ref()
            .ok_or_else(|| FolioError::invalid_params("no checkpoint store configured for recovery"))
    }

    async fn execute_recovery_status(&self) -> Result<(CommandOutcome, Option<&'static str>)> {
        let store = self.checkpoint_store()?;
        let candidate = store.latest_recoverable(&self.session.id);
        let detail = match &candidate {
            Some(doc) => serde_json::json!({"candidate": true, "revision": doc.revision}),
            None => serde_json::json!({"candidate": false}),
        };
        let revision = candidate.map(|d| d.revision).unwrap_or(0);
        Ok((CommandOutcome { revision, detail, degraded: false }, None))
    }

    async fn execute_recover(&self) -> Result<(CommandOutcome, Option<&'static str>)> {
        let store = self.checkpoint_store()?;
        let candidate = store
            .latest_recoverable(&self.session.id)
            .ok_or_else(|| FolioError::not_found("no recovery candidate for this session"))?;

        let mut doc = self.session.document.lock().await;
        *doc = candidate;
        if let Some(path) = &doc.path {
            if let Ok(baseline) = persistence::snapshot(path) {
                *self.session.baseline.lock().unwrap() = Some(baseline);
            }
        }

        Ok((
            CommandOutcome {
                revision: doc.revision,
                detail: serde_json::json!({"action": "recovered", "revision": doc.revision}),
                degraded: false,
            },
            Some("updated"),
        ))
    }

    async fn execute_discard_recovery(&self) -> Result<(CommandOutcome, Option<&'static str>)> {
        let store = self.checkpoint_store()?;
        let discarded = store.discard_latest(&self.session.id);
        Ok((
            CommandOutcome { revision: 0, detail: serde_json::json!({"discarded": discarded}), degraded: false },
            None,
        ))
    }

    async fn execute_load(&self) -> Result<(CommandOutcome, Option<&'static str>)> {
        let resolved = crate::path_policy::resolve(&self.session.path, &self.context.workspace_root)?;
        let raw = crate::reliability::retry(&self.context.retry_policy, || {
            let resolved = resolved.clone();
            async move { std::fs::read_to_string(&resolved).map_err(FolioError::from) }
        })
        .await?;

        let parsed = document::parse(&raw, &self.context.frontmatter)?;
        let baseline = persistence::snapshot(&resolved)?;

        let mut doc = self.session.document.lock().await;
        *doc = parsed.with_path(resolved);
        *self.session.baseline.lock().unwrap() = Some(baseline);

        Ok((
            CommandOutcome { revision: doc.revision, detail: serde_json::json!({"loaded": true}), degraded: false },
            Some("loaded"),
        ))
    }

    async fn execute_save(&self, force: bool) -> Result<(CommandOutcome, Option<&'static str>)> {
        let doc = self.session.document.lock().await;
        let path = doc
            .path
            .clone()
            .ok_or_else(|| FolioError::invalid_params("document has no path to save to"))?;

        if !force {
            if let Some(baseline) = self.session.baseline.lock().unwrap().clone() {
                match persistence::detect_divergence(&baseline)? {
                    Divergence::Unchanged => {}
                    Divergence::Diverged | Divergence::AbsentNow => {
                        return Err(FolioError::conflict(
                            "file changed on disk since it was loaded",
                            &["reload", "overwrite", "merge_hook"],
                        ));
                    }
                }
            }
        }

        let text = document::serialize(&doc, &self.context.frontmatter, &SerializeOpts::default())?;
        let contents = text.into_bytes();
        let path_for_retry = path.clone();
        let contents_for_retry = contents.clone();
        crate::reliability::retry(&self.context.retry_policy, || {
            let path = path_for_retry.clone();
            let contents = contents_for_retry.clone();
            async move { persistence::atomic_write(&path, &contents, None) }
        })
        .await?;

        let baseline = persistence::snapshot(&path)?;
        *self.session.baseline.lock().unwrap() = Some(baseline);

        if let Some(store) = &self.context.checkpoints {
            store.prune_through(&self.session.id, doc.revision);
        }

        Ok((
            CommandOutcome { revision: doc.revision, detail: serde_json::json!({"saved": true}), degraded: false },
            Some("saved"),
        ))
    }

    async fn execute_render(&self) -> Result<(CommandOutcome, Option<&'static str>)> {
        let renderer = self
            .context
            .renderer
            .as_ref()
            .ok_or_else(|| FolioError::internal("no renderer configured"))?;
        let doc = self.session.document.lock().await;
        let output = renderer.render(&doc.body).await?;
        let signal_kind = if output.circuit_transition.is_some() { "updated" } else { "rendered" };
        let mut detail = serde_json::json!({"html": output.html, "degraded": output.degraded});
        if let Some(transition) = output.circuit_transition {
            detail["action"] = serde_json::json!(transition);
        }
        Ok((
            CommandOutcome {
                revision: doc.revision,
                detail,
                degraded: output.degraded,
            },
            Some(signal_kind),
        ))
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Load => "load",
        Command::Save { .. } => "save",
        Command::UpdateHeader { .. } => "update_header",
        Command::UpdateBody { .. } => "update_body",
        Command::Render => "render",
        Command::Undo => "undo",
        Command::Redo => "redo",
        Command::AcquireLock => "acquire_lock",
        Command::ReleaseLock { .. } => "release_lock",
        Command::ForceTakeover { .. } => "force_takeover",
        Command::RecoveryStatus => "recovery_status",
        Command::Recover => "recover",
        Command::DiscardRecovery => "discard_recovery",
    }
}

fn outcome_of<T>(result: &Result<T>) -> Outcome {
    if result.is_ok() {
        Outcome::Ok
    } else {
        Outcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Role;
    use crate::command::{BodyPatchWire, HeaderModeWire};
    use crate::registry::SessionRegistry;
    use std::time::Duration;
    use tempfile::tempdir;

    fn context(workspace_root: PathBuf) -> Arc<PipelineContext> {
        Arc::new(PipelineContext {
            workspace_root,
            frontmatter: Arc::new(FrontmatterRegistry::default()),
            retry_policy: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
            checkpoints: None,
            checkpoint_on_edit: false,
            renderer: None,
            authorization_hook: None,
        })
    }

    fn base_request(command: Command, holder: &str, token: Option<String>, revision: Option<u64>) -> CommandRequest {
        CommandRequest {
            command,
            role: Role::Owner,
            holder: holder.to_string(),
            token,
            observed_revision: revision,
        }
    }

    #[tokio::test]
    async fn load_then_save_round_trips_file_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "---\ntitle: Hi\n---\nbody\n").unwrap();

        let registry = SessionRegistry::new(10, 50, 4096, Duration::from_secs(60));
        let session = registry.ensure_session_by_path(&path, crate::document::Document::new(""));
        let pipeline = CommandPipeline::new(session.clone(), context(dir.path().to_path_buf()));

        pipeline
            .handle(base_request(Command::Load, "alice", None, None))
            .await
            .unwrap();

        let token = session.lock.lock().unwrap().acquire("alice", None).unwrap();
        let revision = session.document.lock().await.revision;

        pipeline
            .handle(base_request(
                Command::UpdateBody {
                    patch: BodyPatchWire::Replace { text: "new body\n".to_string() },
                },
                "alice",
                Some(token.clone()),
                Some(revision),
            ))
            .await
            .unwrap();

        let revision = session.document.lock().await.revision;
        pipeline
            .handle(base_request(Command::Save { force: false }, "alice", Some(token), Some(revision)))
            .await
            .unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("new body"));
    }

    #[tokio::test]
    async fn write_without_lock_token_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "body\n").unwrap();

        let registry = SessionRegistry::new(10, 50, 4096, Duration::from_secs(60));
        let session = registry.ensure_session_by_path(&path, crate::document::Document::new(""));
        let pipeline = CommandPipeline::new(session, context(dir.path().to_path_buf()));

        let err = pipeline
            .handle(base_request(
                Command::UpdateHeader {
                    changes: crate::frontmatter::Header::new(),
                    mode: HeaderModeWire::Merge,
                },
                "alice",
                None,
                None,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn stale_revision_write_is_a_conflict() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "body\n").unwrap();

        let registry = SessionRegistry::new(10, 50, 4096, Duration::from_secs(60));
        let session = registry.ensure_session_by_path(&path, crate::document::Document::new(""));
        let pipeline = CommandPipeline::new(session.clone(), context(dir.path().to_path_buf()));

        pipeline.handle(base_request(Command::Load, "alice", None, None)).await.unwrap();
        let token = session.lock.lock().unwrap().acquire("alice", None).unwrap();

        let err = pipeline
            .handle(base_request(
                Command::UpdateHeader {
                    changes: crate::frontmatter::Header::new(),
                    mode: HeaderModeWire::Merge,
                },
                "alice",
                Some(token),
                Some(999),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn save_detects_out_of_band_divergence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "body\n").unwrap();

        let registry = SessionRegistry::new(10, 50, 4096, Duration::from_secs(60));
        let session = registry.ensure_session_by_path(&path, crate::document::Document::new(""));
        let pipeline = CommandPipeline::new(session.clone(), context(dir.path().to_path_buf()));

        pipeline.handle(base_request(Command::Load, "alice", None, None)).await.unwrap();
        let token = session.lock.lock().unwrap().acquire("alice", None).unwrap();
        let revision = session.document.lock().await.revision;

        std::fs::write(&path, "changed out of band\n").unwrap();

        let err = pipeline
            .handle(base_request(Command::Save { force: false }, "alice", Some(token), Some(revision)))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Conflict);
    }
}
