//! The patch applier.
//!
//! `apply` is a pure function from `(document, patch)` to a new document.
//! Semantics:
//!
//! - `Insert{before|after}` places items relative to the addressed sibling;
//!   a trailing index of `-1` appends at the end of the list. Items whose
//!   key already exists at the target level are skipped, so at-least-once
//!   re-delivery never duplicates nodes.
//! - `Unset` on a now-absent path is an Ok no-op (idempotent). An empty
//!   path clears the whole document.
//! - `DiffMatchPatch` fails soft through [`TextPatch`] when the patch
//!   context no longer matches; a missing span is a structural error.
//! - Every other structural mismatch is a [`StructuralError`]; the caller
//!   drops the patch and the session continues.

use crate::errors::StructuralError;
use crate::text_patch::TextPatch;
use tandem_content::{
    Block, Document, InlineNode, InsertPosition, Patch, Path, PathSegment, StableKey,
};

/// Apply one patch, producing a new document value.
pub fn apply(doc: &Document, patch: &Patch) -> Result<Document, StructuralError> {
    let mut next = doc.clone();
    match patch {
        Patch::Set { path, value } => apply_set(&mut next, path, value)?,
        Patch::Unset { path } => apply_unset(&mut next, path),
        Patch::Insert {
            path,
            position,
            items,
        } => apply_insert(&mut next, path, *position, items)?,
        Patch::DiffMatchPatch { path, value } => apply_diff_match_patch(&mut next, path, value)?,
    }
    Ok(next)
}

/// Apply patches in order, failing on the first structural mismatch.
pub fn apply_all<'a>(
    doc: &Document,
    patches: impl IntoIterator<Item = &'a Patch>,
) -> Result<Document, StructuralError> {
    let mut next = doc.clone();
    for patch in patches {
        next = apply(&next, patch)?;
    }
    Ok(next)
}

/// Apply patches in order, dropping the ones that no longer resolve.
///
/// Used for undo/redo replay, where interleaved remote patches may have
/// invalidated individual entries. Returns the new document and how many
/// patches were dropped.
pub fn apply_lenient<'a>(
    doc: &Document,
    patches: impl IntoIterator<Item = &'a Patch>,
) -> (Document, usize) {
    let mut next = doc.clone();
    let mut dropped = 0;
    for patch in patches {
        match apply(&next, patch) {
            Ok(applied) => next = applied,
            Err(err) => {
                tracing::debug!(%err, "dropping patch that no longer resolves");
                dropped += 1;
            }
        }
    }
    (next, dropped)
}

fn apply_set(
    doc: &mut Document,
    path: &Path,
    value: &serde_json::Value,
) -> Result<(), StructuralError> {
    match path.len() {
        1 => {
            let index = resolve_block(doc, path)?;
            doc.blocks[index] = decode_value::<Block>(path, value)?;
            Ok(())
        }
        2 => {
            let (block_index, child_index) = resolve_child(doc, path)?;
            doc.blocks[block_index].children[child_index] =
                decode_value::<InlineNode>(path, value)?;
            Ok(())
        }
        _ => Err(StructuralError::BlockNotFound(path.clone())),
    }
}

fn apply_unset(doc: &mut Document, path: &Path) {
    match path.len() {
        0 => doc.blocks.clear(),
        1 => {
            if let Ok(index) = resolve_block(doc, path) {
                doc.blocks.remove(index);
            }
        }
        _ => {
            if let Ok((block_index, child_index)) = resolve_child(doc, path) {
                doc.blocks[block_index].children.remove(child_index);
            }
        }
    }
}

fn apply_insert(
    doc: &mut Document,
    path: &Path,
    position: InsertPosition,
    items: &[serde_json::Value],
) -> Result<(), StructuralError> {
    if path.len() == 1 {
        let blocks = items
            .iter()
            .map(|item| decode_value::<Block>(path, item))
            .collect::<Result<Vec<_>, _>>()?;
        let existing: Vec<StableKey> = doc.blocks.iter().map(|b| b.key.clone()).collect();
        let blocks: Vec<Block> = blocks
            .into_iter()
            .filter(|b| !existing.contains(&b.key))
            .collect();
        insert_into(
            &mut doc.blocks,
            path,
            path.get(0),
            position,
            blocks,
            |block| &block.key,
        )
    } else {
        let children = items
            .iter()
            .map(|item| decode_value::<InlineNode>(path, item))
            .collect::<Result<Vec<_>, _>>()?;
        let block_index = resolve_block(doc, path)?;
        let block = &mut doc.blocks[block_index];
        let existing: Vec<StableKey> = block.children.iter().map(|c| c.key().clone()).collect();
        let children: Vec<InlineNode> = children
            .into_iter()
            .filter(|c| !existing.contains(c.key()))
            .collect();
        insert_into(
            &mut block.children,
            path,
            path.get(1),
            position,
            children,
            |child| child.key(),
        )
    }
}

/// Insert `items` into `list` relative to the addressed sibling.
fn insert_into<T>(
    list: &mut Vec<T>,
    path: &Path,
    selector: Option<&PathSegment>,
    position: InsertPosition,
    items: Vec<T>,
    key_of: impl Fn(&T) -> &StableKey,
) -> Result<(), StructuralError> {
    let selector = selector.ok_or_else(|| StructuralError::BlockNotFound(path.clone()))?;
    match selector {
        PathSegment::Key(seg) => {
            let anchor = list
                .iter()
                .position(|item| key_of(item) == &seg.key)
                .ok_or_else(|| missing(path))?;
            match position {
                InsertPosition::Before => {
                    list.splice(anchor..anchor, items);
                }
                InsertPosition::After => {
                    list.splice(anchor + 1..anchor + 1, items);
                }
                InsertPosition::Replace => {
                    list.splice(anchor..anchor + 1, items);
                }
            }
            Ok(())
        }
        PathSegment::Index(index) => {
            // -1 appends regardless of position; other indices clamp for
            // before/after but must resolve exactly for replace.
            let at = if *index == -1 {
                list.len()
            } else if *index >= 0 {
                (*index as usize).min(list.len())
            } else {
                return Err(StructuralError::IndexOutOfRange {
                    path: path.clone(),
                    index: *index,
                    len: list.len(),
                });
            };
            match position {
                InsertPosition::Before => {
                    list.splice(at..at, items);
                }
                InsertPosition::After => {
                    let at = (at + 1).min(list.len());
                    list.splice(at..at, items);
                }
                InsertPosition::Replace => {
                    if at >= list.len() {
                        return Err(StructuralError::IndexOutOfRange {
                            path: path.clone(),
                            index: *index,
                            len: list.len(),
                        });
                    }
                    list.splice(at..at + 1, items);
                }
            }
            Ok(())
        }
    }
}

fn apply_diff_match_patch(
    doc: &mut Document,
    path: &Path,
    blob: &str,
) -> Result<(), StructuralError> {
    let (block_index, child_index) = resolve_child(doc, path)?;
    let span = doc.blocks[block_index].children[child_index]
        .as_span_mut()
        .ok_or_else(|| StructuralError::NotASpan(path.clone()))?;
    let text_patch = TextPatch::parse(blob).map_err(|err| StructuralError::InvalidValue {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    span.text = text_patch.apply(&span.text);
    Ok(())
}

fn resolve_block(doc: &Document, path: &Path) -> Result<usize, StructuralError> {
    match path.get(0) {
        Some(PathSegment::Key(seg)) => doc
            .block_index(&seg.key)
            .ok_or_else(|| StructuralError::BlockNotFound(path.clone())),
        Some(PathSegment::Index(i)) => index_in(*i, doc.blocks.len()).ok_or_else(|| {
            StructuralError::IndexOutOfRange {
                path: path.clone(),
                index: *i,
                len: doc.blocks.len(),
            }
        }),
        None => Err(StructuralError::BlockNotFound(path.clone())),
    }
}

fn resolve_child(doc: &Document, path: &Path) -> Result<(usize, usize), StructuralError> {
    let block_index = resolve_block(doc, path)?;
    let block = &doc.blocks[block_index];
    let child_index = match path.get(1) {
        Some(PathSegment::Key(seg)) => block
            .child_index(&seg.key)
            .ok_or_else(|| StructuralError::ChildNotFound(path.clone()))?,
        Some(PathSegment::Index(i)) => index_in(*i, block.children.len()).ok_or_else(|| {
            StructuralError::IndexOutOfRange {
                path: path.clone(),
                index: *i,
                len: block.children.len(),
            }
        })?,
        None => return Err(StructuralError::ChildNotFound(path.clone())),
    };
    Ok((block_index, child_index))
}

fn index_in(index: i64, len: usize) -> Option<usize> {
    if index == -1 {
        len.checked_sub(1)
    } else if index >= 0 && (index as usize) < len {
        Some(index as usize)
    } else {
        None
    }
}

fn missing(path: &Path) -> StructuralError {
    if path.len() == 1 {
        StructuralError::BlockNotFound(path.clone())
    } else {
        StructuralError::ChildNotFound(path.clone())
    }
}

fn decode_value<T: serde::de::DeserializeOwned>(
    path: &Path,
    value: &serde_json::Value,
) -> Result<T, StructuralError> {
    serde_json::from_value(value.clone()).map_err(|err| StructuralError::InvalidValue {
        path: path.clone(),
        reason: err.to_string(),
    })
}
