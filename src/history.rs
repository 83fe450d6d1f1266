//! Bounded undo/redo ring, anchored on document revisions.
//!
//! Modeled on the teacher's `agent::history` ring buffer: a fixed-depth
//! `VecDeque` that silently drops the oldest entry once full rather than
//! growing unbounded, the same trade the teacher makes for conversation
//! history.

use crate::document::Document;
use std::collections::VecDeque;

/// Undo/redo ring for one session's document.
///
/// `undo_stack` holds past states, oldest at the front, most recent at the
/// back; `redo_stack` holds states popped off by `undo`, most recently
/// undone at the back.
#[derive(Debug)]
pub struct History {
    depth: usize,
    undo_stack: VecDeque<Document>,
    redo_stack: VecDeque<Document>,
}

impl History {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
        }
    }

    /// Record `previous` as the state to return to on the next `undo`, made
    /// obsolete by an edit that produced a new document. Clears the redo
    /// stack, since recording a fresh edit invalidates any previously undone
    /// future.
    pub fn record(&mut self, previous: Document) {
        if self.undo_stack.len() == self.depth {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(previous);
        self.redo_stack.clear();
    }

    /// Pop the most recent recorded state. `current` is pushed onto the redo
    /// stack so a subsequent `redo` can restore it.
    pub fn undo(&mut self, current: Document) -> Option<Document> {
        let previous = self.undo_stack.pop_back()?;
        if self.redo_stack.len() == self.depth {
            self.redo_stack.pop_front();
        }
        self.redo_stack.push_back(current);
        Some(previous)
    }

    /// Pop the most recently undone state. `current` is pushed back onto the
    /// undo stack so a subsequent `undo` can return to it.
    pub fn redo(&mut self, current: Document) -> Option<Document> {
        let next = self.redo_stack.pop_back()?;
        if self.undo_stack.len() == self.depth {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_restores_previous_state() {
        let mut history = History::new(3);
        let v1 = Document::new("v1");
        let v2 = Document::new("v2");
        history.record(v1.clone());
        let restored = history.undo(v2.clone()).unwrap();
        assert_eq!(restored, v1);
    }

    #[test]
    fn redo_restores_undone_state() {
        let mut history = History::new(3);
        let v1 = Document::new("v1");
        let v2 = Document::new("v2");
        history.record(v1.clone());
        history.undo(v2.clone());
        let restored = history.redo(v1).unwrap();
        assert_eq!(restored, v2);
    }

    #[test]
    fn new_edit_clears_redo_stack() {
        let mut history = History::new(3);
        history.record(Document::new("v1"));
        history.undo(Document::new("v2"));
        assert!(history.can_redo());
        history.record(Document::new("v3"));
        assert!(!history.can_redo());
    }

    #[test]
    fn ring_drops_oldest_entry_once_full() {
        let mut history = History::new(2);
        history.record(Document::new("v1"));
        history.record(Document::new("v2"));
        history.record(Document::new("v3"));
        // Oldest (v1) should have been evicted; only v3 then v2 remain reachable.
        let mut current = Document::new("v4");
        current = history.undo(current).unwrap();
        assert_eq!(current, Document::new("v3"));
        current = history.undo(current).unwrap();
        assert_eq!(current, Document::new("v2"));
        assert!(!history.can_undo());
    }

    #[test]
    fn empty_history_returns_none() {
        let mut history = History::new(3);
        assert!(history.undo(Document::new("v1")).is_none());
        assert!(history.redo(Document::new("v1")).is_none());
    }
}
