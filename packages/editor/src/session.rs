//! The editing session.
//!
//! One [`EditSession`] per replica. It owns the current document value, the
//! local selection, shadow selections for remote participants, and the undo
//! history, and it is the only place state changes happen. Everything is
//! driven through [`EditSession::handle`], a reducer from `(state, event)`
//! to `(state', emitted patches)`, which keeps the whole engine
//! single-threaded and deterministic.
//!
//! # Merge policy
//!
//! Concurrent writes to the same node resolve last-writer-wins by arrival
//! order at each replica. No transformation or CRDT machinery: the patch
//! shapes (key-addressed, idempotent) are chosen so that the common
//! concurrent cases commute and the rest converge on whichever write lands
//! last. Remote patches that no longer resolve are logged and dropped; a
//! remote edit never takes the session down.
//!
//! While a remote patch is being merged the session is in the `Merging`
//! state and incoming events queue up; they drain, in order, as soon as the
//! merge completes.

use crate::adjust::adjust_selection;
use crate::apply::apply;
use crate::encode::encode;
use crate::errors::EditorError;
use crate::invert::invert;
use crate::selection::Selection;
use crate::undo_stack::UndoStack;
use std::collections::{HashMap, VecDeque};
use tandem_content::{Document, KeyGenerator, Origin, Patch};

/// An input to the session reducer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The local user changed the document. The new value replaces the
    /// current one; the session computes and emits the difference.
    LocalChange { document: Document },
    /// The local user moved the cursor. `None` clears the selection.
    SetSelection { selection: Option<Selection> },
    /// A patch arrived from another replica.
    RemotePatch { patch: Patch, origin: Origin },
    /// Another participant's selection, for presence display.
    RemoteSelection {
        origin: Origin,
        selection: Option<Selection>,
    },
    Undo,
    Redo,
}

/// What one reducer step produced.
#[derive(Debug, Clone, Default)]
pub struct SessionOutput {
    /// Patches to broadcast to the other replicas.
    pub emitted: Vec<Patch>,
    /// Whether the document value changed.
    pub changed: bool,
}

impl SessionOutput {
    fn absorb(&mut self, other: SessionOutput) {
        self.emitted.extend(other.emitted);
        self.changed |= other.changed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SessionState {
    Idle,
    Merging,
}

pub struct EditSession {
    origin: Origin,
    document: Document,
    selection: Option<Selection>,
    remote_selections: HashMap<Origin, Selection>,
    undo: UndoStack,
    state: SessionState,
    queued: VecDeque<SessionEvent>,
    key_gen: KeyGenerator,
}

impl EditSession {
    pub fn new(origin: impl Into<Origin>, document: Document) -> Self {
        Self {
            origin: origin.into(),
            document,
            selection: None,
            remote_selections: HashMap::new(),
            undo: UndoStack::new(),
            state: SessionState::Idle,
            queued: VecDeque::new(),
            key_gen: KeyGenerator::default(),
        }
    }

    pub fn with_key_generator(mut self, key_gen: KeyGenerator) -> Self {
        self.key_gen = key_gen;
        self
    }

    pub fn with_undo_limit(mut self, max_entries: usize) -> Self {
        self.undo = UndoStack::with_max_entries(max_entries);
        self
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The current document value.
    pub fn value(&self) -> &Document {
        &self.document
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn remote_selection(&self, origin: &Origin) -> Option<&Selection> {
        self.remote_selections.get(origin)
    }

    pub fn key_generator(&self) -> &KeyGenerator {
        &self.key_gen
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Run one reducer step.
    pub fn handle(&mut self, event: SessionEvent) -> Result<SessionOutput, EditorError> {
        if self.state == SessionState::Merging {
            self.queued.push_back(event);
            return Ok(SessionOutput::default());
        }
        match event {
            SessionEvent::LocalChange { document } => self.on_local_change(document),
            SessionEvent::SetSelection { selection } => {
                self.selection = selection;
                Ok(SessionOutput::default())
            }
            SessionEvent::RemotePatch { patch, origin } => self.on_remote_patch(patch, origin),
            SessionEvent::RemoteSelection { origin, selection } => {
                if origin != self.origin {
                    match selection {
                        Some(selection) => {
                            self.remote_selections.insert(origin, selection);
                        }
                        None => {
                            self.remote_selections.remove(&origin);
                        }
                    }
                }
                Ok(SessionOutput::default())
            }
            SessionEvent::Undo => Ok(self.replay(UndoStack::undo)),
            SessionEvent::Redo => Ok(self.replay(UndoStack::redo)),
        }
    }

    fn on_local_change(&mut self, document: Document) -> Result<SessionOutput, EditorError> {
        if let Some(violation) = document.validate().into_iter().next() {
            return Err(EditorError::RejectedLocalChange(violation));
        }
        let patches = encode(&self.document, &document);
        if patches.is_empty() {
            return Ok(SessionOutput::default());
        }

        // Inverses are computed stepwise against the intermediate documents
        // and replayed in reverse, so multi-patch changes undo cleanly.
        let mut intermediate = self.document.clone();
        let mut groups = Vec::with_capacity(patches.len());
        for patch in &patches {
            groups.push(invert(&intermediate, patch));
            intermediate = apply(&intermediate, patch)?;
        }
        let inverses: Vec<Patch> = groups.into_iter().rev().flatten().collect();

        self.undo.record(patches.clone(), inverses);
        self.document = document;
        Ok(SessionOutput {
            emitted: patches,
            changed: true,
        })
    }

    fn on_remote_patch(&mut self, patch: Patch, origin: Origin) -> Result<SessionOutput, EditorError> {
        let mut output = SessionOutput::default();
        if origin == self.origin {
            // Our own patch echoed back from the transport.
            return Ok(output);
        }

        self.state = SessionState::Merging;
        match apply(&self.document, &patch) {
            Ok(next) => {
                // Selections adjust against the document the patch applied
                // to, never against its author's own edits.
                if let Some(selection) = &self.selection {
                    self.selection = adjust_selection(&self.document, selection, &patch);
                }
                let shadows = std::mem::take(&mut self.remote_selections);
                self.remote_selections = shadows
                    .into_iter()
                    .filter_map(|(owner, selection)| {
                        if owner == origin {
                            return Some((owner, selection));
                        }
                        adjust_selection(&self.document, &selection, &patch)
                            .map(|adjusted| (owner, adjusted))
                    })
                    .collect();
                output.changed = next != self.document;
                self.document = next;
            }
            Err(err) => {
                tracing::warn!(%err, %origin, "dropping remote patch that does not resolve");
            }
        }
        self.state = SessionState::Idle;

        while self.state == SessionState::Idle {
            let Some(queued) = self.queued.pop_front() else {
                break;
            };
            output.absorb(self.handle(queued)?);
        }
        Ok(output)
    }

    fn replay(
        &mut self,
        step: fn(&mut UndoStack, &Document) -> Option<crate::undo_stack::HistoryStep>,
    ) -> SessionOutput {
        let Some(step) = step(&mut self.undo, &self.document) else {
            return SessionOutput::default();
        };
        if step.dropped > 0 {
            tracing::debug!(dropped = step.dropped, "history entry partially replayed");
        }
        let changed = step.document != self.document;
        self.document = step.document;
        SessionOutput {
            emitted: step.patches,
            changed,
        }
    }

    // Convenience wrappers over `handle`.

    pub fn local_change(&mut self, document: Document) -> Result<SessionOutput, EditorError> {
        self.handle(SessionEvent::LocalChange { document })
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) -> Result<SessionOutput, EditorError> {
        self.handle(SessionEvent::SetSelection { selection })
    }

    pub fn receive_patch(
        &mut self,
        patch: Patch,
        origin: impl Into<Origin>,
    ) -> Result<SessionOutput, EditorError> {
        self.handle(SessionEvent::RemotePatch {
            patch,
            origin: origin.into(),
        })
    }

    pub fn update_remote_selection(
        &mut self,
        origin: impl Into<Origin>,
        selection: Option<Selection>,
    ) -> Result<SessionOutput, EditorError> {
        self.handle(SessionEvent::RemoteSelection {
            origin: origin.into(),
            selection,
        })
    }

    pub fn undo(&mut self) -> Result<SessionOutput, EditorError> {
        self.handle(SessionEvent::Undo)
    }

    pub fn redo(&mut self) -> Result<SessionOutput, EditorError> {
        self.handle(SessionEvent::Redo)
    }
}
