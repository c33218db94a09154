//! Key-addressed paths.
//!
//! A [`Path`] routes from the document root to a node: the first segment
//! addresses a block, the second an inline child. Segments are stable-key
//! selectors wherever a patch or selection crosses a concurrent-edit
//! boundary; plain integer indices are reserved for single-writer positions
//! (`-1` means end-of-list on inserts).
//!
//! Wire form is an array mixing `{"_key": "..."}` objects and integers:
//! `[{"_key": "b0"}, {"_key": "s0"}]`.

use crate::key::StableKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(KeyedSegment),
    Index(i64),
}

/// Wire shape of a key selector: `{"_key": "..."}` and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyedSegment {
    #[serde(rename = "_key")]
    pub key: StableKey,
}

impl PathSegment {
    pub fn key(key: impl Into<StableKey>) -> Self {
        PathSegment::Key(KeyedSegment { key: key.into() })
    }

    pub fn as_key(&self) -> Option<&StableKey> {
        match self {
            PathSegment::Key(seg) => Some(&seg.key),
            PathSegment::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            PathSegment::Index(i) => Some(*i),
            PathSegment::Key(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(seg) => write!(f, "{{_key: {}}}", seg.key),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Ordered list of segments from document root to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// Empty path: addresses the document itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Depth-1 path addressing a block by key.
    pub fn block(key: impl Into<StableKey>) -> Self {
        Self(vec![PathSegment::key(key)])
    }

    /// Depth-2 path addressing an inline child by key.
    pub fn child(block_key: impl Into<StableKey>, child_key: impl Into<StableKey>) -> Self {
        Self(vec![PathSegment::key(block_key), PathSegment::key(child_key)])
    }

    /// Depth-1 path addressing a block list position (`-1` = end).
    pub fn block_index(index: i64) -> Self {
        Self(vec![PathSegment::Index(index)])
    }

    /// Depth-2 path addressing a child list position within a block.
    pub fn child_index(block_key: impl Into<StableKey>, index: i64) -> Self {
        Self(vec![PathSegment::key(block_key), PathSegment::Index(index)])
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, depth: usize) -> Option<&PathSegment> {
        self.0.get(depth)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Key selector at `depth`, if that segment is key-addressed.
    pub fn key_at(&self, depth: usize) -> Option<&StableKey> {
        self.0.get(depth).and_then(PathSegment::as_key)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{segment}")?;
        }
        write!(f, "]")
    }
}
