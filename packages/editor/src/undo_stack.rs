//! Bounded undo/redo history.
//!
//! Each local change is recorded as a pair of patch groups: the patches
//! that made the change and the inverses that undo it, both computed at
//! edit time. Undo replays the inverses leniently, so entries invalidated
//! by interleaved remote edits degrade to partial (or empty) effect
//! instead of failing the session. Remote changes are never recorded here.

use crate::apply::apply_lenient;
use tandem_content::{Document, Patch};

const DEFAULT_MAX_ENTRIES: usize = 100;

/// One recorded local change.
#[derive(Debug, Clone)]
pub struct UndoEntry {
    /// Patches that produced the change, replayed on redo.
    pub patches: Vec<Patch>,
    /// Patches that reverse the change, replayed on undo.
    pub inverses: Vec<Patch>,
}

/// Result of replaying one history entry.
#[derive(Debug, Clone)]
pub struct HistoryStep {
    /// The document after the replay.
    pub document: Document,
    /// The patches that were applied, for broadcast to other replicas.
    pub patches: Vec<Patch>,
    /// How many of the entry's patches no longer resolved.
    pub dropped: usize,
}

/// Two bounded stacks of [`UndoEntry`] values.
#[derive(Debug, Default)]
pub struct UndoStack {
    undo: Vec<UndoEntry>,
    redo: Vec<UndoEntry>,
    max_entries: usize,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// History bounded to `max_entries` undo levels. Zero disables history.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_entries,
        }
    }

    /// Record a local change. Any redo branch is discarded and the oldest
    /// entry falls off once the bound is reached.
    pub fn record(&mut self, patches: Vec<Patch>, inverses: Vec<Patch>) {
        self.redo.clear();
        if self.max_entries == 0 {
            return;
        }
        if self.undo.len() == self.max_entries {
            self.undo.remove(0);
        }
        self.undo.push(UndoEntry { patches, inverses });
    }

    /// Undo the most recent local change against `doc`. `None` when the
    /// undo stack is empty.
    pub fn undo(&mut self, doc: &Document) -> Option<HistoryStep> {
        let entry = self.undo.pop()?;
        let (document, dropped) = apply_lenient(doc, &entry.inverses);
        let patches = entry.inverses.clone();
        self.redo.push(entry);
        Some(HistoryStep {
            document,
            patches,
            dropped,
        })
    }

    /// Reapply the most recently undone change against `doc`.
    pub fn redo(&mut self, doc: &Document) -> Option<HistoryStep> {
        let entry = self.redo.pop()?;
        let (document, dropped) = apply_lenient(doc, &entry.patches);
        let patches = entry.patches.clone();
        self.undo.push(entry);
        Some(HistoryStep {
            document,
            patches,
            dropped,
        })
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// `(undo depth, redo depth)`.
    pub fn depths(&self) -> (usize, usize) {
        (self.undo.len(), self.redo.len())
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_all;
    use crate::invert::invert;
    use tandem_content::{Block, InsertPosition, Path, Span};

    fn doc() -> Document {
        Document::from_blocks(vec![
            Block::new("b0", "block").with_children(vec![Span::new("s0", "Hello").into()]),
        ])
    }

    fn change(doc: &Document, patches: Vec<Patch>) -> (Document, Vec<Patch>) {
        let inverses: Vec<Patch> = patches
            .iter()
            .rev()
            .flat_map(|p| invert(doc, p))
            .collect();
        let next = apply_all(doc, &patches).unwrap();
        (next, inverses)
    }

    #[test]
    fn test_undo_then_redo_round_trips() {
        let mut stack = UndoStack::new();
        let initial = doc();
        let patches = vec![Patch::Set {
            path: Path::child("b0", "s0"),
            value: serde_json::json!({"_key": "s0", "_type": "span", "text": "Changed"}),
        }];
        let (changed, inverses) = change(&initial, patches.clone());
        stack.record(patches, inverses);

        let step = stack.undo(&changed).unwrap();
        assert_eq!(step.document, initial);
        assert_eq!(step.dropped, 0);
        assert!(stack.can_redo());

        let step = stack.redo(&step.document).unwrap();
        assert_eq!(step.document, changed);
        assert!(stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_new_change_discards_redo_branch() {
        let mut stack = UndoStack::new();
        stack.record(vec![], vec![]);
        stack.undo(&doc());
        assert!(stack.can_redo());

        stack.record(vec![], vec![]);
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut stack = UndoStack::with_max_entries(2);
        for _ in 0..5 {
            stack.record(vec![], vec![]);
        }
        assert_eq!(stack.depths(), (2, 0));

        let mut disabled = UndoStack::with_max_entries(0);
        disabled.record(vec![], vec![]);
        assert!(!disabled.can_undo());
    }

    #[test]
    fn test_undo_drops_entries_invalidated_by_remote_edits() {
        let mut stack = UndoStack::new();
        let initial = doc();
        let patches = vec![Patch::Insert {
            path: Path::block("b0"),
            position: InsertPosition::After,
            items: vec![serde_json::json!({
                "_key": "b1", "_type": "block",
                "children": [{"_key": "s1", "_type": "span", "text": "mine"}]
            })],
        }];
        let (changed, inverses) = change(&initial, patches.clone());
        stack.record(patches, inverses);

        // A remote edit removes the block the inverse would unset, plus the
        // original anchor, so the inverse no longer resolves.
        let (remote, _) = apply_lenient(
            &changed,
            &[
                Patch::Unset {
                    path: Path::block("b1"),
                },
                Patch::Set {
                    path: Path::child("b0", "s0"),
                    value: serde_json::json!({"_key": "s0", "_type": "span", "text": "theirs"}),
                },
            ],
        );

        let step = stack.undo(&remote).unwrap();
        // The unset of b1 is idempotent; nothing is dropped and the remote
        // edit survives untouched.
        assert_eq!(step.document, remote);
        assert_eq!(step.dropped, 0);
    }
}
