//! Property-based round-trip, monotonicity and lock-safety laws.
//!
//! Mirrors the round-trip and monotonicity properties a reader would expect
//! from any revisioned document value type; each proptest explores many
//! generated inputs per run rather than a handful of fixed examples.

use folio::document::{
    canonicalize, parse, serialize, update_body, update_header, BodyUpdateOpts, CanonicalizeOpts,
    Document, HeaderUpdateMode, SerializeOpts,
};
use folio::frontmatter::{FrontmatterRegistry, Header};
use folio::history::History;
use folio::registry::lock::LockState;
use proptest::prelude::*;

fn registry() -> FrontmatterRegistry {
    FrontmatterRegistry::default()
}

/// A short alphanumeric word, safe as both a YAML scalar and a header key.
fn word() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9]{0,7}"
}

/// A body line drawn from the same safe alphabet, never a bare frontmatter
/// delimiter so it can never be mistaken for one when embedded mid-body.
fn body_line() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,16}"
}

fn header_strategy() -> impl Strategy<Value = Header> {
    prop::collection::vec((word(), any::<i64>()), 0..6).prop_map(|pairs| {
        let mut header = Header::new();
        for (k, v) in pairs {
            header.insert(k, serde_json::json!(v));
        }
        header
    })
}

fn raw_document_strategy() -> impl Strategy<Value = String> {
    (header_strategy(), prop::collection::vec(body_line(), 0..6)).prop_map(|(header, lines)| {
        let registry = registry();
        let doc = Document {
            path: None,
            header,
            body: lines.join("\n") + if lines.is_empty() { "" } else { "\n" },
            revision: 0,
            dirty: false,
            schema: None,
            header_syntax: Some(folio::frontmatter::HeaderSyntax::Yaml),
        };
        serialize(&doc, &registry, &SerializeOpts { emit_empty_frontmatter: true, ..Default::default() }).unwrap()
    })
}

proptest! {
    #[test]
    fn parse_serialize_parse_round_trips(raw in raw_document_strategy()) {
        let registry = registry();
        let once = parse(&raw, &registry).unwrap();
        let text = serialize(&once, &registry, &SerializeOpts { emit_empty_frontmatter: true, ..Default::default() }).unwrap();
        let twice = parse(&text, &registry).unwrap();
        prop_assert_eq!(once.header, twice.header);
        prop_assert_eq!(once.body, twice.body);
    }

    #[test]
    fn canonicalize_is_idempotent(header in header_strategy(), lines in prop::collection::vec(body_line(), 0..6)) {
        let doc = Document {
            path: None,
            header,
            body: lines.join("\r\n"),
            revision: 3,
            dirty: true,
            schema: None,
            header_syntax: None,
        };
        let once = canonicalize(&doc, &CanonicalizeOpts::default());
        let twice = canonicalize(&once, &CanonicalizeOpts::default());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn undo_every_step_restores_the_original_document(edits in prop::collection::vec(body_line(), 1..8)) {
        let original = Document::new("start\n");
        let mut history = History::new(edits.len().max(1));
        let mut current = original.clone();
        for text in &edits {
            let next = update_body(&current, text, &BodyUpdateOpts::default());
            if next != current {
                history.record(current.clone());
            }
            current = next;
        }

        let mut restored = current;
        while history.can_undo() {
            restored = history.undo(restored).unwrap();
        }

        prop_assert_eq!(restored.header, original.header);
        prop_assert_eq!(restored.body, original.body);
    }

    #[test]
    fn revision_is_non_decreasing_and_strictly_increases_on_real_edits(
        texts in prop::collection::vec(body_line(), 0..10),
    ) {
        let mut doc = Document::new("seed\n");
        let mut last_revision = doc.revision;
        for text in texts {
            let before = doc.body.clone();
            let next = update_body(&doc, &text, &BodyUpdateOpts::default());
            prop_assert!(next.revision >= last_revision);
            if next.body != before {
                prop_assert!(next.revision > last_revision);
            } else {
                prop_assert_eq!(next.revision, last_revision);
            }
            last_revision = next.revision;
            doc = next;
        }
    }

    #[test]
    fn header_merge_then_replace_never_panics_and_tracks_revision(
        first in header_strategy(), second in header_strategy(),
    ) {
        let doc = Document::new("body\n");
        let merged = update_header(&doc, first, HeaderUpdateMode::Merge);
        let replaced = update_header(&merged, second, HeaderUpdateMode::Replace);
        prop_assert!(replaced.revision >= merged.revision);
    }

    #[test]
    fn lock_revision_strictly_increases_across_acquire_and_takeover_sequences(
        holders in prop::collection::vec(word(), 1..6),
    ) {
        let mut lock = LockState::default();
        let mut last_revision = lock.revision();
        for holder in holders {
            let was_locked = lock.is_locked();
            let current_holder = lock.holder().map(|h| h.to_string());
            if was_locked && current_holder.as_deref() != Some(holder.as_str()) {
                lock.force_takeover(&holder);
                prop_assert!(lock.revision() > last_revision);
            } else if !was_locked {
                lock.acquire(&holder, None).unwrap();
                prop_assert!(lock.revision() > last_revision);
            }
            prop_assert!(lock.revision() >= last_revision);
            last_revision = lock.revision();
        }
    }
}
