//! The selection model.
//!
//! A cursor or range is expressed as key-addressed paths plus character
//! offsets, never array indices, so it can be carried across concurrent
//! edits. Selections are transient values owned by the editing session and
//! are recomputed, never mutated in place, on every remote merge.

use serde::{Deserialize, Serialize};
use tandem_content::{Path, StableKey};

/// One end of a selection: a key path to a span plus a character offset
/// within it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }

    /// Point at `offset` within a span child.
    pub fn span(
        block_key: impl Into<StableKey>,
        span_key: impl Into<StableKey>,
        offset: usize,
    ) -> Self {
        Self {
            path: Path::child(block_key, span_key),
            offset,
        }
    }

    pub fn block_key(&self) -> Option<&StableKey> {
        self.path.key_at(0)
    }

    pub fn child_key(&self) -> Option<&StableKey> {
        self.path.key_at(1)
    }
}

/// A cursor (collapsed) or range between two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}
