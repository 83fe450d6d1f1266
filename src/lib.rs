//! Folio — a session runtime for editable markdown-plus-metadata documents.
//!
//! This crate provides the command pipeline, persistence safety layer,
//! session registry and signal bus behind a multi-writer document editor: a
//! caller loads a document, acquires its revisioned lock, edits header and
//! body, and saves through atomic-write-plus-divergence-detection so a
//! concurrent out-of-band change is never silently clobbered.
//!
//! # Quick start
//!
//! ```no_run
//! use folio::command::{Command, CommandRequest};
//! use folio::command::pipeline::{CommandPipeline, PipelineContext};
//! use folio::authz::Role;
//! use folio::registry::SessionRegistry;
//! use folio::frontmatter::FrontmatterRegistry;
//! use folio::reliability::RetryPolicy;
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> folio::error::Result<()> {
//! let registry = SessionRegistry::new(50, 200, 16 * 1024, Duration::from_secs(900));
//! let session = registry.ensure_session_by_path(Path::new("doc.md"), folio::document::Document::new(""));
//! let context = Arc::new(PipelineContext {
//!     workspace_root: std::env::current_dir().unwrap(),
//!     frontmatter: Arc::new(FrontmatterRegistry::default()),
//!     retry_policy: RetryPolicy::from(folio::config::RetryConfig::default()),
//!     checkpoints: None,
//!     checkpoint_on_edit: false,
//!     renderer: None,
//!     authorization_hook: None,
//! });
//! let pipeline = CommandPipeline::new(session, context);
//! pipeline
//!     .handle(CommandRequest {
//!         command: Command::Load,
//!         role: Role::Owner,
//!         holder: "alice".to_string(),
//!         token: None,
//!         observed_revision: None,
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Structured audit event emission and correlation ids.
pub mod audit;
/// Authorization: role matrix plus an optional pluggable hook.
pub mod authz;
/// On-disk checkpoint records used for crash recovery.
pub mod checkpoint;
/// The command pipeline: ingest, guard, authorize, execute, apply, signal.
pub mod command;
/// Crate-level configuration loading.
pub mod config;
/// The `Document` value type and its pure operations.
pub mod document;
/// Unified error taxonomy.
pub mod error;
/// Pluggable header (frontmatter) codecs.
pub mod frontmatter;
/// Bounded undo/redo ring.
pub mod history;
/// Workspace-boundary path resolution.
pub mod path_policy;
/// Durable write safety: atomic writes, baseline snapshots, divergence checks.
pub mod persistence;
/// Retry policy and circuit breaker.
pub mod reliability;
/// Render orchestration: change detection, circuit breaking, fallback.
pub mod render;
/// Session registry: deterministic ids, lazy creation, idle reclaim.
pub mod registry;
/// Declarative header validation.
pub mod schema;
/// Per-session signal fan-out bus.
pub mod signal;
