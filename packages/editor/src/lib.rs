//! # Tandem Editor
//!
//! Collaborative editing engine for Tandem documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ content: Document model + portable patches  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Session + merge machinery           │
//! │  - Encode local changes into patches        │
//! │  - Apply remote patches (pure functions)    │
//! │  - Adjust selections across merges          │
//! │  - Undo/redo with edit-time inverses        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Values, not mutations**: every step produces a new document value
//! 2. **Keys, not indices**: patches and selections address nodes by stable key
//! 3. **Last writer wins**: convergence by arrival order, no CRDT machinery
//! 4. **Remote errors never fatal**: unresolvable patches are logged and dropped
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tandem_editor::{Document, EditSession};
//!
//! let mut session = EditSession::new("client-1", Document::new());
//!
//! // Local edit: hand the session the new value, broadcast what it emits.
//! let output = session.local_change(edited)?;
//! transport.send(output.emitted);
//!
//! // Remote edit: feed received patches back in.
//! session.receive_patch(patch, origin)?;
//! ```

mod adjust;
mod apply;
mod encode;
mod errors;
mod invert;
mod selection;
mod session;
mod text_patch;
mod undo_stack;

pub use adjust::adjust_selection;
pub use apply::{apply, apply_all, apply_lenient};
pub use encode::encode;
pub use errors::{EditorError, StructuralError};
pub use invert::invert;
pub use selection::{Point, Selection};
pub use session::{EditSession, SessionEvent, SessionOutput};
pub use text_patch::{Hunk, TextPatch};
pub use undo_stack::{HistoryStep, UndoEntry, UndoStack};

// Re-export the content model for convenience
pub use tandem_content::{
    Block, Document, InlineNode, InlineObject, InsertPosition, KeyGenerator, MarkDefinition,
    Origin, Patch, PatchDecodeError, Path, PathSegment, Span, StableKey, Violation,
};
