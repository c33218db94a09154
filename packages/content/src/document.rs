//! The document value.
//!
//! A [`Document`] is an ordered sequence of [`Block`]s and nothing else. It
//! is a pure value type: mutation happens by building a new document (the
//! patch applier lives in `tandem-editor`), equality is structural, and the
//! empty document is "no blocks", never an empty block.

use crate::key::StableKey;
use crate::node::{Block, InlineNode};
use crate::path::{Path, PathSegment};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Ordered sequence of content blocks. Serializes as a plain JSON array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub blocks: Vec<Block>,
}

/// Resolved target of a [`Path`] lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Block(&'a Block),
    Child(&'a Block, &'a InlineNode),
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_index(&self, key: &StableKey) -> Option<usize> {
        self.blocks.iter().position(|b| &b.key == key)
    }

    pub fn block(&self, key: &StableKey) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.key == key)
    }

    pub fn block_mut(&mut self, key: &StableKey) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| &b.key == key)
    }

    pub fn child(&self, block_key: &StableKey, child_key: &StableKey) -> Option<&InlineNode> {
        self.block(block_key).and_then(|b| b.child(child_key))
    }

    /// Resolve a path against this document.
    ///
    /// Key segments look nodes up by key; index segments resolve positionally
    /// (`-1` = last). Deeper-than-child paths do not resolve.
    pub fn get(&self, path: &Path) -> Option<NodeRef<'_>> {
        let block = match path.get(0)? {
            PathSegment::Key(seg) => self.block(&seg.key)?,
            PathSegment::Index(i) => self.blocks.get(normalize_index(*i, self.blocks.len())?)?,
        };
        match path.get(1) {
            None => Some(NodeRef::Block(block)),
            Some(segment) if path.len() == 2 => {
                let child = match segment {
                    PathSegment::Key(seg) => block.child(&seg.key)?,
                    PathSegment::Index(i) => {
                        block.children.get(normalize_index(*i, block.children.len())?)?
                    }
                };
                Some(NodeRef::Child(block, child))
            }
            Some(_) => None,
        }
    }

    /// Check structural invariants, returning every violation found.
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut block_keys = HashSet::new();
        for block in &self.blocks {
            if !block_keys.insert(&block.key) {
                violations.push(Violation::DuplicateBlockKey { key: block.key.clone() });
            }
            let mut child_keys = HashSet::new();
            for child in &block.children {
                if !child_keys.insert(child.key()) {
                    violations.push(Violation::DuplicateChildKey {
                        block: block.key.clone(),
                        key: child.key().clone(),
                    });
                }
                if let InlineNode::Span(span) = child {
                    for mark in &span.marks {
                        if block.mark_def(mark).is_none() {
                            violations.push(Violation::UnknownMarkReference {
                                block: block.key.clone(),
                                span: span.key.clone(),
                                mark: mark.clone(),
                            });
                        }
                    }
                }
            }
        }
        violations
    }
}

/// Structural invariant violation reported by [`Document::validate`].
///
/// Findings, not failures: a document carrying violations still works, but
/// local edits producing one are rejected at the session boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Violation {
    #[error("duplicate block key {key}")]
    DuplicateBlockKey { key: StableKey },

    #[error("duplicate child key {key} in block {block}")]
    DuplicateChildKey { block: StableKey, key: StableKey },

    #[error("span {span} in block {block} references unknown mark {mark}")]
    UnknownMarkReference {
        block: StableKey,
        span: StableKey,
        mark: StableKey,
    },
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    if index == -1 {
        len.checked_sub(1)
    } else if index >= 0 && (index as usize) < len {
        Some(index as usize)
    } else {
        None
    }
}
