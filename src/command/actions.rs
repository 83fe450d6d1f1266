//! Per-action document mutations invoked by the pipeline's execute stage.
//!
//! Each function is a thin wrapper over [`crate::document`]'s pure
//! operations that also decides what (if anything) goes onto the undo ring
//! and what the resulting audit/signal detail payload looks like.

use crate::document::{self, BodyPatch, BodyUpdateOpts, Document, HeaderUpdateMode};
use crate::error::{FolioError, Result};
use crate::frontmatter::Header;
use crate::history::History;

/// Outcome of running one mutating action.
pub struct ActionResult {
    pub document: Document,
    /// The prior document state to push onto the undo ring, if this action
    /// actually changed anything.
    pub record_for_undo: Option<Document>,
    pub detail: serde_json::Value,
    pub signal_kind: &'static str,
}

fn unchanged(document: Document, signal_kind: &'static str) -> ActionResult {
    ActionResult {
        document,
        record_for_undo: None,
        detail: serde_json::json!({"changed": false}),
        signal_kind,
    }
}

pub fn update_header(doc: &Document, changes: Header, mode: HeaderUpdateMode) -> ActionResult {
    let next = document::update_header(doc, changes, mode);
    if next.revision == doc.revision {
        return unchanged(next, "updated");
    }
    ActionResult {
        document: next.clone(),
        record_for_undo: Some(doc.clone()),
        detail: serde_json::json!({"changed": true, "revision": next.revision, "action": "frontmatter"}),
        signal_kind: "updated",
    }
}

pub fn update_body(doc: &Document, patch: BodyPatch, opts: &BodyUpdateOpts) -> Result<ActionResult> {
    let next = document::apply_body_patch(doc, &patch, opts)?;
    if next.revision == doc.revision {
        return Ok(unchanged(next, "updated"));
    }
    Ok(ActionResult {
        document: next.clone(),
        record_for_undo: Some(doc.clone()),
        detail: serde_json::json!({"changed": true, "revision": next.revision, "action": "body"}),
        signal_kind: "updated",
    })
}

/// Revision is monotonic over command history, not over document content:
/// an undo/redo keeps the reverted content but still moves the revision
/// counter forward, since it's itself one more accepted mutation.
fn with_next_revision(current_revision: u64, mut reverted: Document) -> Document {
    reverted.revision = current_revision + 1;
    reverted
}

pub fn undo(current: Document, history: &mut History) -> Result<ActionResult> {
    let previous = history
        .undo(current.clone())
        .ok_or_else(|| FolioError::invalid_params("nothing to undo"))?;
    let document = with_next_revision(current.revision, previous);
    Ok(ActionResult {
        document: document.clone(),
        record_for_undo: None,
        detail: serde_json::json!({"revision": document.revision}),
        signal_kind: "undone",
    })
}

pub fn redo(current: Document, history: &mut History) -> Result<ActionResult> {
    let next = history
        .redo(current.clone())
        .ok_or_else(|| FolioError::invalid_params("nothing to redo"))?;
    let document = with_next_revision(current.revision, next);
    Ok(ActionResult {
        document: document.clone(),
        record_for_undo: None,
        detail: serde_json::json!({"revision": document.revision}),
        signal_kind: "redone",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_header_records_prior_state_when_changed() {
        let doc = Document::new("body");
        let mut changes = Header::new();
        changes.insert("title".to_string(), serde_json::json!("Hi"));
        let result = update_header(&doc, changes, HeaderUpdateMode::Merge);
        assert!(result.record_for_undo.is_some());
        assert_eq!(result.document.revision, 1);
    }

    #[test]
    fn update_header_noop_records_nothing() {
        let doc = Document::new("body");
        let result = update_header(&doc, Header::new(), HeaderUpdateMode::Merge);
        assert!(result.record_for_undo.is_none());
    }

    #[test]
    fn undo_with_empty_history_is_an_error() {
        let doc = Document::new("body");
        let mut history = History::new(10);
        assert!(undo(doc, &mut history).is_err());
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let doc = Document::new("v1");
        let mut history = History::new(10);
        history.record(doc.clone());
        let mut changed = Document::new("v2");
        changed.revision = 1;
        let undone = undo(changed.clone(), &mut history).unwrap();
        assert_eq!(undone.document.body, doc.body);
        let redone = redo(undone.document, &mut history).unwrap();
        assert_eq!(redone.document.body, changed.body);
    }

    #[test]
    fn undo_assigns_a_fresh_revision_rather_than_the_historical_one() {
        let doc = Document::new("v1");
        let mut history = History::new(10);
        history.record(doc.clone());
        let mut changed = Document::new("v2");
        changed.revision = 5;
        let undone = undo(changed, &mut history).unwrap();
        // Content reverts, but revision still moves forward from the
        // pre-undo value rather than reusing the historical one.
        assert_eq!(undone.document.body, "v1");
        assert_eq!(undone.document.revision, 6);
    }
}
