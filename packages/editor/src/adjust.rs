//! The selection adjuster.
//!
//! Given a selection and a patch that was *not* authored by the selection's
//! owner, compute the selection that preserves semantic intent: the same
//! character position relative to surviving content. Each call is a pure
//! function of `(document-before-patch, selection, patch)` and is applied
//! exactly once per patch, in merge order, so no drift accumulates.
//!
//! Rules, per point:
//!
//! - Inserts never move key-addressed points: keys survive inserts before
//!   and after them. An insert that *replaces* the addressed node re-targets
//!   the point to the start of the replacement.
//! - Removing the node a point refers to re-anchors it to the sibling at
//!   the same or nearest-lower index, else to the nearest surviving block,
//!   always at offset 0. An empty document clears the selection (`None`).
//! - A text patch against the exact span a point addresses translates the
//!   point's character offset through the diff.
//!
//! The ownership rule (never adjust a selection against its own author's
//! patches) is enforced by the session, which only routes foreign patches
//! here.

use crate::selection::{Point, Selection};
use crate::text_patch::TextPatch;
use tandem_content::{Block, Document, InlineNode, InsertPosition, NodeRef, Patch, Path};

/// Adjust a selection for a foreign patch. `before` is the document the
/// patch is about to be applied to. `None` means the selection did not
/// survive and must be cleared.
pub fn adjust_selection(
    before: &Document,
    selection: &Selection,
    patch: &Patch,
) -> Option<Selection> {
    let anchor = adjust_point(before, &selection.anchor, patch)?;
    let focus = adjust_point(before, &selection.focus, patch)?;
    Some(Selection { anchor, focus })
}

fn adjust_point(before: &Document, point: &Point, patch: &Patch) -> Option<Point> {
    match patch {
        Patch::Insert {
            path,
            position: InsertPosition::Replace,
            items,
        } => adjust_for_replace(before, point, path, items),
        // Keys are stable under inserts before/after them; key-addressed
        // points need no change.
        Patch::Insert { .. } => Some(point.clone()),
        Patch::Unset { path } => adjust_for_unset(before, point, path),
        Patch::Set { path, value } => adjust_for_set(before, point, path, value),
        Patch::DiffMatchPatch { path, value } => adjust_for_text_patch(point, path, value),
    }
}

fn adjust_for_unset(before: &Document, point: &Point, path: &Path) -> Option<Point> {
    if path.is_empty() {
        // Someone removed everything.
        return None;
    }
    let removed = before.get(path);
    match removed {
        Some(NodeRef::Block(block)) if Some(&block.key) == point.block_key() => {
            let index = before.block_index(&block.key)?;
            let target = if index > 0 {
                before.blocks.get(index - 1)
            } else {
                before.blocks.get(index + 1)
            }?;
            Some(block_start(target))
        }
        Some(NodeRef::Child(block, child))
            if Some(&block.key) == point.block_key()
                && Some(child.key()) == point.child_key() =>
        {
            let index = block.child_index(child.key())?;
            let sibling = if index > 0 {
                block.children.get(index - 1)
            } else {
                block.children.get(index + 1)
            };
            match sibling {
                Some(sibling) => Some(Point {
                    path: Path::child(block.key.clone(), sibling.key().clone()),
                    offset: 0,
                }),
                // Last child removed: fall back to the nearest surviving
                // block, else rest on the emptied block itself.
                None => {
                    let block_index = before.block_index(&block.key)?;
                    let neighbor = if block_index > 0 {
                        before.blocks.get(block_index - 1)
                    } else {
                        before.blocks.get(block_index + 1)
                    };
                    Some(match neighbor {
                        Some(neighbor) => block_start(neighbor),
                        None => Point {
                            path: Path::block(block.key.clone()),
                            offset: 0,
                        },
                    })
                }
            }
        }
        // Patch does not touch this point's path (or resolves nothing and
        // will be a no-op).
        _ => Some(point.clone()),
    }
}

fn adjust_for_set(
    before: &Document,
    point: &Point,
    path: &Path,
    value: &serde_json::Value,
) -> Option<Point> {
    match before.get(path) {
        Some(NodeRef::Child(block, child))
            if Some(&block.key) == point.block_key()
                && Some(child.key()) == point.child_key() =>
        {
            // The span under the cursor was replaced wholesale; keep the
            // offset where possible.
            match serde_json::from_value::<InlineNode>(value.clone()) {
                Ok(InlineNode::Span(span)) => Some(Point {
                    path: point.path.clone(),
                    offset: point.offset.min(span.len_chars()),
                }),
                Ok(InlineNode::Object(_)) => Some(Point {
                    path: point.path.clone(),
                    offset: 0,
                }),
                Err(_) => Some(point.clone()),
            }
        }
        Some(NodeRef::Block(block)) if Some(&block.key) == point.block_key() => {
            match serde_json::from_value::<Block>(value.clone()) {
                Ok(new_block) => {
                    let surviving = point
                        .child_key()
                        .and_then(|key| new_block.child(key))
                        .cloned();
                    match surviving {
                        Some(InlineNode::Span(span)) => Some(Point {
                            path: point.path.clone(),
                            offset: point.offset.min(span.len_chars()),
                        }),
                        Some(InlineNode::Object(_)) => Some(Point {
                            path: point.path.clone(),
                            offset: 0,
                        }),
                        None => Some(block_start(&new_block)),
                    }
                }
                Err(_) => Some(point.clone()),
            }
        }
        _ => Some(point.clone()),
    }
}

fn adjust_for_replace(
    before: &Document,
    point: &Point,
    path: &Path,
    items: &[serde_json::Value],
) -> Option<Point> {
    let addressed_here = match before.get(path) {
        Some(NodeRef::Block(block)) => Some(&block.key) == point.block_key(),
        Some(NodeRef::Child(block, child)) => {
            Some(&block.key) == point.block_key() && Some(child.key()) == point.child_key()
        }
        None => false,
    };
    if !addressed_here {
        return Some(point.clone());
    }
    match path.len() {
        1 => {
            let first = items.first()?;
            match serde_json::from_value::<Block>(first.clone()) {
                Ok(block) => Some(block_start(&block)),
                Err(_) => None,
            }
        }
        _ => {
            let block_key = path.key_at(0).or_else(|| point.block_key())?;
            let first = items.first()?;
            let key = first.get("_key").and_then(|k| k.as_str())?;
            Some(Point {
                path: Path::child(block_key.clone(), key),
                offset: 0,
            })
        }
    }
}

fn adjust_for_text_patch(point: &Point, path: &Path, blob: &str) -> Option<Point> {
    let same_span =
        point.block_key() == path.key_at(0) && point.child_key() == path.key_at(1);
    if !same_span {
        return Some(point.clone());
    }
    match TextPatch::parse(blob) {
        Ok(text_patch) => Some(Point {
            path: point.path.clone(),
            offset: text_patch.translate_offset(point.offset),
        }),
        // A malformed blob will be dropped by the applier too.
        Err(_) => Some(point.clone()),
    }
}

/// Start of a block: its first child if it has one, else the block itself.
fn block_start(block: &Block) -> Point {
    match block.children.first() {
        Some(child) => Point {
            path: Path::child(block.key.clone(), child.key().clone()),
            offset: 0,
        },
        None => Point {
            path: Path::block(block.key.clone()),
            offset: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_content::Span;

    fn doc() -> Document {
        Document::from_blocks(vec![
            Block::new("b0", "block").with_children(vec![
                Span::new("s0", "Hello").into(),
                Span::new("s1", " world").into(),
            ]),
            Block::new("b1", "block").with_children(vec![Span::new("s2", "!").into()]),
        ])
    }

    fn cursor(block: &str, span: &str, offset: usize) -> Selection {
        Selection::collapsed(Point::span(block, span, offset))
    }

    #[test]
    fn test_insert_does_not_move_key_addressed_points() {
        let selection = cursor("b1", "s2", 1);
        let patch = Patch::Insert {
            path: Path::block("b0"),
            position: InsertPosition::Before,
            items: vec![json!({"_key": "b9", "_type": "block", "children": []})],
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(selection)
        );
    }

    #[test]
    fn test_remote_insert_at_cursor_keeps_cursor_before_inserted_text() {
        // Document [{k0, [{k1, "Hello"}]}], cursor at k1 offset 5, remote
        // patch inserts " world" at offset 5. The cursor stays at 5,
        // anchored before the text someone else typed.
        let doc = Document::from_blocks(vec![
            Block::new("k0", "block").with_children(vec![Span::new("k1", "Hello").into()]),
        ]);
        let selection = cursor("k0", "k1", 5);
        let patch = Patch::DiffMatchPatch {
            path: Path::child("k0", "k1"),
            value: TextPatch::from_texts("Hello", "Hello world").encode(),
        };
        assert_eq!(adjust_selection(&doc, &selection, &patch), Some(selection));
    }

    #[test]
    fn test_text_patch_shifts_offsets_after_the_edit() {
        let selection = cursor("b0", "s0", 5);
        let patch = Patch::DiffMatchPatch {
            path: Path::child("b0", "s0"),
            value: TextPatch::from_texts("Hello", "XXHello").encode(),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(cursor("b0", "s0", 7))
        );
    }

    #[test]
    fn test_offset_inside_deleted_range_collapses_to_deletion_start() {
        let selection = cursor("b0", "s0", 4);
        let patch = Patch::DiffMatchPatch {
            path: Path::child("b0", "s0"),
            value: TextPatch::from_texts("Hello", "He").encode(),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(cursor("b0", "s0", 2))
        );
    }

    #[test]
    fn test_deleting_the_addressed_child_reanchors_to_previous_sibling() {
        let selection = cursor("b0", "s1", 3);
        let patch = Patch::Unset {
            path: Path::child("b0", "s1"),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(cursor("b0", "s0", 0))
        );
    }

    #[test]
    fn test_deleting_the_only_child_reanchors_to_neighbor_block() {
        let selection = cursor("b1", "s2", 1);
        let patch = Patch::Unset {
            path: Path::child("b1", "s2"),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(cursor("b0", "s0", 0))
        );
    }

    #[test]
    fn test_deleting_the_addressed_block_reanchors_to_nearest_block() {
        let selection = cursor("b1", "s2", 1);
        let patch = Patch::Unset {
            path: Path::block("b1"),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(cursor("b0", "s0", 0))
        );

        // Deleting the first block re-anchors forward.
        let selection = cursor("b0", "s0", 2);
        let patch = Patch::Unset {
            path: Path::block("b0"),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(cursor("b1", "s2", 0))
        );
    }

    #[test]
    fn test_deleting_everything_clears_the_selection() {
        let selection = cursor("b0", "s0", 2);
        assert_eq!(
            adjust_selection(&doc(), &selection, &Patch::Unset { path: Path::root() }),
            None
        );

        // Deleting the last remaining block clears too.
        let single = Document::from_blocks(vec![
            Block::new("b0", "block").with_children(vec![Span::new("s0", "x").into()]),
        ]);
        let patch = Patch::Unset {
            path: Path::block("b0"),
        };
        assert_eq!(adjust_selection(&single, &selection, &patch), None);
    }

    #[test]
    fn test_unset_elsewhere_leaves_selection_alone() {
        let selection = cursor("b0", "s0", 3);
        let patch = Patch::Unset {
            path: Path::block("b1"),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(selection)
        );
    }

    #[test]
    fn test_set_clamps_offset_to_new_text() {
        let selection = cursor("b0", "s0", 5);
        let patch = Patch::Set {
            path: Path::child("b0", "s0"),
            value: json!({"_key": "s0", "_type": "span", "text": "Hi"}),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(cursor("b0", "s0", 2))
        );
    }

    #[test]
    fn test_replace_retargets_to_replacement() {
        let selection = cursor("b1", "s2", 1);
        let patch = Patch::Insert {
            path: Path::block("b1"),
            position: InsertPosition::Replace,
            items: vec![json!({
                "_key": "b9", "_type": "block",
                "children": [{"_key": "s9", "_type": "span", "text": "new"}]
            })],
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(cursor("b9", "s9", 0))
        );
    }

    #[test]
    fn test_range_selection_adjusts_both_ends() {
        let selection = Selection::new(Point::span("b0", "s0", 1), Point::span("b0", "s0", 4));
        let patch = Patch::DiffMatchPatch {
            path: Path::child("b0", "s0"),
            value: TextPatch::from_texts("Hello", "XHello").encode(),
        };
        assert_eq!(
            adjust_selection(&doc(), &selection, &patch),
            Some(Selection::new(
                Point::span("b0", "s0", 2),
                Point::span("b0", "s0", 5)
            ))
        );
    }
}
