//! The portable patch format.
//!
//! Patches are the only way document state crosses a session boundary. They
//! address nodes by stable-key [`Path`]s, serialize as tagged JSON objects,
//! and are validated on decode so that malformed wire data never reaches
//! the applier.
//!
//! ```json
//! {"type": "insert", "path": [{"_key": "b0"}], "position": "after", "items": [...]}
//! {"type": "diffMatchPatch", "path": [{"_key": "b0"}, {"_key": "s0"}], "value": "@@ ..."}
//! ```

use crate::node::{Block, InlineNode};
use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A portable description of a single document mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Patch {
    /// Replace the addressed node wholesale.
    Set { path: Path, value: serde_json::Value },

    /// Remove the addressed node. Empty path clears the whole document.
    Unset { path: Path },

    /// Insert items relative to the addressed sibling.
    Insert {
        path: Path,
        position: InsertPosition,
        items: Vec<serde_json::Value>,
    },

    /// Text-level patch against a single span, expressed as a reversible
    /// diff blob so concurrent sub-string edits merge instead of clobbering.
    DiffMatchPatch { path: Path, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Before,
    After,
    Replace,
}

impl Patch {
    pub fn path(&self) -> &Path {
        match self {
            Patch::Set { path, .. }
            | Patch::Unset { path }
            | Patch::Insert { path, .. }
            | Patch::DiffMatchPatch { path, .. } => path,
        }
    }

    /// Parse and validate a wire patch.
    pub fn decode(raw: &str) -> Result<Self, PatchDecodeError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|err| PatchDecodeError::InvalidJson(err.to_string()))?;
        Self::decode_value(value)
    }

    /// Validate an already-parsed wire patch.
    pub fn decode_value(value: serde_json::Value) -> Result<Self, PatchDecodeError> {
        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string);
        let patch: Patch = serde_json::from_value(value).map_err(|err| match tag {
            Some(tag) if !matches!(tag.as_str(), "set" | "unset" | "insert" | "diffMatchPatch") => {
                PatchDecodeError::UnknownType(tag)
            }
            _ => PatchDecodeError::InvalidShape(err.to_string()),
        })?;
        patch.validate()?;
        Ok(patch)
    }

    /// Structural checks a decoded patch must satisfy before application.
    pub fn validate(&self) -> Result<(), PatchDecodeError> {
        match self {
            Patch::Set { path, value } => {
                require_depth(path, 1..=2)?;
                check_item(path.len(), value)?;
            }
            Patch::Unset { path } => {
                require_depth(path, 0..=2)?;
            }
            Patch::Insert { path, items, .. } => {
                require_depth(path, 1..=2)?;
                if items.is_empty() {
                    return Err(PatchDecodeError::EmptyInsert);
                }
                for item in items {
                    check_item(path.len(), item)?;
                }
            }
            Patch::DiffMatchPatch { path, .. } => {
                require_depth(path, 2..=2)?;
            }
        }
        Ok(())
    }
}

fn require_depth(path: &Path, allowed: std::ops::RangeInclusive<usize>) -> Result<(), PatchDecodeError> {
    if allowed.contains(&path.len()) {
        Ok(())
    } else {
        Err(PatchDecodeError::InvalidDepth {
            path: path.clone(),
            depth: path.len(),
        })
    }
}

/// A depth-1 value must decode as a block, a depth-2 value as an inline node.
fn check_item(depth: usize, value: &serde_json::Value) -> Result<(), PatchDecodeError> {
    let result = match depth {
        1 => serde_json::from_value::<Block>(value.clone()).map(|_| ()),
        2 => serde_json::from_value::<InlineNode>(value.clone()).map(|_| ()),
        _ => return Ok(()),
    };
    result.map_err(|err| PatchDecodeError::InvalidValue(err.to_string()))
}

/// Malformed wire patch, rejected before reaching the applier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchDecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unknown patch type: {0}")]
    UnknownType(String),

    #[error("patch does not match any known shape: {0}")]
    InvalidShape(String),

    #[error("path {path} has unsupported depth {depth}")]
    InvalidDepth { path: Path, depth: usize },

    #[error("insert patch carries no items")]
    EmptyInsert,

    #[error("patch value does not decode as a node: {0}")]
    InvalidValue(String),

    #[error("malformed text patch: {0}")]
    InvalidTextPatch(String),
}

/// Identity of the participant that authored a patch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Origin {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
