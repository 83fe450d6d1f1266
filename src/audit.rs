//! Structured audit event emission.
//!
//! Every command pipeline step emits one [`AuditEvent`] through `tracing`,
//! threading the same correlation id the way the teacher threads `task_id`
//! through its `AgentUiEvent` variants so a caller can reconstruct one
//! command's whole path from logs alone.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier correlating every audit event produced by one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pipeline stage an [`AuditEvent`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Normalize,
    Guard,
    Authorize,
    Execute,
    Apply,
    Rollback,
    Signal,
}

/// Outcome of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Denied,
    Degraded,
    Failed,
}

/// One structured audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub correlation_id: CorrelationId,
    pub session_id: String,
    pub stage: Stage,
    pub outcome: Outcome,
    pub detail: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        correlation_id: CorrelationId,
        session_id: impl Into<String>,
        stage: Stage,
        outcome: Outcome,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            correlation_id,
            session_id: session_id.into(),
            stage,
            outcome,
            detail,
        }
    }

    /// Emit this event through `tracing` at a level matched to its outcome:
    /// failures are `warn`, everything else is `info`. Degraded mode is
    /// surfaced in the event fields so dashboards built on structured logs
    /// can alert on it without parsing message text.
    pub fn emit(&self) {
        match self.outcome {
            Outcome::Failed => tracing::warn!(
                correlation_id = %self.correlation_id,
                session_id = %self.session_id,
                stage = ?self.stage,
                outcome = ?self.outcome,
                detail = %self.detail,
                "command pipeline stage failed"
            ),
            Outcome::Denied => tracing::warn!(
                correlation_id = %self.correlation_id,
                session_id = %self.session_id,
                stage = ?self.stage,
                outcome = ?self.outcome,
                detail = %self.detail,
                "command pipeline stage denied"
            ),
            Outcome::Degraded | Outcome::Ok => tracing::info!(
                correlation_id = %self.correlation_id,
                session_id = %self.session_id,
                stage = ?self.stage,
                outcome = ?self.outcome,
                detail = %self.detail,
                "command pipeline stage"
            ),
        }
    }
}

/// Accumulates every audit event produced within one command's pipeline run,
/// so the command pipeline can return the full trail alongside its result
/// without every caller needing a `tracing` subscriber wired up.
#[derive(Debug, Default)]
pub struct AuditTrail {
    events: Vec<AuditEvent>,
}

impl AuditTrail {
    pub fn record(&mut self, event: AuditEvent) {
        event.emit();
        self.events.push(event);
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn has_failure(&self) -> bool {
        self.events.iter().any(|e| e.outcome == Outcome::Failed)
    }

    pub fn degraded(&self) -> bool {
        self.events.iter().any(|e| e.outcome == Outcome::Degraded)
    }
}
