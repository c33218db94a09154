//! Error types for the editor.

use tandem_content::{Path, PatchDecodeError, Violation};
use thiserror::Error;

/// Patch path unresolved against the current document, or a patch value
/// that does not fit its target. Dropped and logged, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    #[error("block not found: {0}")]
    BlockNotFound(Path),

    #[error("child not found: {0}")]
    ChildNotFound(Path),

    #[error("path {0} does not address a text span")]
    NotASpan(Path),

    #[error("index {index} out of range for list of length {len} at {path}")]
    IndexOutOfRange { path: Path, index: i64, len: usize },

    #[error("value at {path} does not decode: {reason}")]
    InvalidValue { path: Path, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("decode error: {0}")]
    Decode(#[from] PatchDecodeError),

    /// A local edit produced an invalid document and was rejected.
    #[error("local change rejected: {0}")]
    RejectedLocalChange(Violation),
}
