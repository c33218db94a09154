//! Patch inversion.
//!
//! `invert(before, patch)` yields the patches that undo `patch`, computed
//! against the document as it stood *before* the patch applied. The undo
//! stack records inverses at edit time, so undo never has to reconstruct
//! history later. An empty result means the patch was a no-op against
//! `before` and there is nothing to undo.

use crate::text_patch::TextPatch;
use tandem_content::{Document, InsertPosition, NodeRef, Patch, Path, StableKey};

pub fn invert(before: &Document, patch: &Patch) -> Vec<Patch> {
    match patch {
        Patch::Set { path, .. } => invert_set(before, path),
        Patch::Unset { path } => invert_unset(before, path),
        Patch::Insert {
            path,
            position,
            items,
        } => invert_insert(before, path, *position, items),
        Patch::DiffMatchPatch { path, value } => invert_diff_match_patch(path, value),
    }
}

fn invert_set(before: &Document, path: &Path) -> Vec<Patch> {
    match before.get(path) {
        Some(NodeRef::Block(block)) => vec![Patch::Set {
            path: path.clone(),
            value: to_value(block),
        }],
        Some(NodeRef::Child(_, child)) => vec![Patch::Set {
            path: path.clone(),
            value: to_value(child),
        }],
        // Setting a missing node fails structurally; undoing it removes
        // whatever the set might have left behind.
        None => vec![Patch::Unset { path: path.clone() }],
    }
}

fn invert_unset(before: &Document, path: &Path) -> Vec<Patch> {
    match path.len() {
        0 => {
            if before.is_empty() {
                return Vec::new();
            }
            vec![Patch::Insert {
                path: Path::block_index(-1),
                position: InsertPosition::After,
                items: before.blocks.iter().map(to_value).collect(),
            }]
        }
        1 => {
            let Some(NodeRef::Block(block)) = before.get(path) else {
                return Vec::new();
            };
            let index = before
                .block_index(&block.key)
                .unwrap_or_default();
            let (path, position) = if index > 0 {
                (
                    Path::block(before.blocks[index - 1].key.clone()),
                    InsertPosition::After,
                )
            } else if before.blocks.len() > 1 {
                (
                    Path::block(before.blocks[index + 1].key.clone()),
                    InsertPosition::Before,
                )
            } else {
                (Path::block_index(-1), InsertPosition::After)
            };
            vec![Patch::Insert {
                path,
                position,
                items: vec![to_value(block)],
            }]
        }
        _ => {
            let Some(NodeRef::Child(block, child)) = before.get(path) else {
                return Vec::new();
            };
            let index = block.child_index(child.key()).unwrap_or_default();
            let (path, position) = if index > 0 {
                (
                    Path::child(block.key.clone(), block.children[index - 1].key().clone()),
                    InsertPosition::After,
                )
            } else if block.children.len() > 1 {
                (
                    Path::child(block.key.clone(), block.children[index + 1].key().clone()),
                    InsertPosition::Before,
                )
            } else {
                (Path::child_index(block.key.clone(), -1), InsertPosition::After)
            };
            vec![Patch::Insert {
                path,
                position,
                items: vec![to_value(child)],
            }]
        }
    }
}

fn invert_insert(
    before: &Document,
    path: &Path,
    position: InsertPosition,
    items: &[serde_json::Value],
) -> Vec<Patch> {
    // The applier skips items whose key already exists, so only items that
    // were actually new get an unset in the inverse.
    let item_keys: Vec<StableKey> = items
        .iter()
        .filter_map(item_key)
        .filter(|key| match path.len() {
            1 => before.block(key).is_none(),
            _ => path
                .key_at(0)
                .and_then(|block_key| before.child(block_key, key))
                .is_none(),
        })
        .collect();
    let unset_path = |key: &StableKey| match path.len() {
        1 => Path::block(key.clone()),
        _ => path
            .key_at(0)
            .map(|block_key| Path::child(block_key.clone(), key.clone()))
            .unwrap_or_else(|| Path::block(key.clone())),
    };

    match position {
        InsertPosition::Before | InsertPosition::After => item_keys
            .iter()
            .map(|key| Patch::Unset {
                path: unset_path(key),
            })
            .collect(),
        InsertPosition::Replace => {
            // Put the replaced node back in place of the first inserted
            // item, then drop the rest.
            let Some(replaced) = before.get(path) else {
                return Vec::new();
            };
            let replaced_value = match replaced {
                NodeRef::Block(block) => to_value(block),
                NodeRef::Child(_, child) => to_value(child),
            };
            let mut patches = Vec::new();
            let mut keys = item_keys.iter();
            if let Some(first) = keys.next() {
                patches.push(Patch::Insert {
                    path: unset_path(first),
                    position: InsertPosition::Replace,
                    items: vec![replaced_value],
                });
            }
            for key in keys {
                patches.push(Patch::Unset {
                    path: unset_path(key),
                });
            }
            patches
        }
    }
}

fn invert_diff_match_patch(path: &Path, blob: &str) -> Vec<Patch> {
    match TextPatch::parse(blob) {
        Ok(text_patch) => vec![Patch::DiffMatchPatch {
            path: path.clone(),
            value: text_patch.invert().encode(),
        }],
        Err(err) => {
            tracing::debug!(%err, "cannot invert malformed text patch");
            Vec::new()
        }
    }
}

fn item_key(item: &serde_json::Value) -> Option<StableKey> {
    item.get("_key")
        .and_then(|k| k.as_str())
        .map(StableKey::new)
}

fn to_value<T: serde::Serialize>(node: &T) -> serde_json::Value {
    serde_json::to_value(node).expect("owned nodes always serialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{apply, apply_all};
    use tandem_content::{Block, Span};

    fn doc() -> Document {
        Document::from_blocks(vec![
            Block::new("b0", "block").with_children(vec![
                Span::new("s0", "Hello").into(),
                Span::new("s1", " world").into(),
            ]),
            Block::new("b1", "block").with_children(vec![Span::new("s2", "!").into()]),
        ])
    }

    fn assert_inverse_law(doc: &Document, patch: &Patch) {
        let applied = apply(doc, patch).unwrap();
        let inverses = invert(doc, patch);
        let restored = apply_all(&applied, &inverses).unwrap();
        assert_eq!(&restored, doc, "inverses: {inverses:#?}");
    }

    #[test]
    fn test_unset_block_inverse_restores_position() {
        assert_inverse_law(
            &doc(),
            &Patch::Unset {
                path: Path::block("b0"),
            },
        );
        assert_inverse_law(
            &doc(),
            &Patch::Unset {
                path: Path::block("b1"),
            },
        );
    }

    #[test]
    fn test_unset_child_inverse_restores_position() {
        for key in ["s0", "s1"] {
            assert_inverse_law(
                &doc(),
                &Patch::Unset {
                    path: Path::child("b0", key),
                },
            );
        }
    }

    #[test]
    fn test_unset_root_inverse_restores_all_blocks() {
        assert_inverse_law(&doc(), &Patch::Unset { path: Path::root() });
    }

    #[test]
    fn test_insert_inverse_unsets_items() {
        let patch = Patch::Insert {
            path: Path::block("b0"),
            position: InsertPosition::After,
            items: vec![serde_json::json!({
                "_key": "b2", "_type": "block",
                "children": [{"_key": "s9", "_type": "span", "text": "new"}]
            })],
        };
        assert_inverse_law(&doc(), &patch);
    }

    #[test]
    fn test_replace_inverse_restores_replaced_node() {
        let patch = Patch::Insert {
            path: Path::block("b1"),
            position: InsertPosition::Replace,
            items: vec![serde_json::json!({
                "_key": "b2", "_type": "block",
                "children": [{"_key": "s9", "_type": "span", "text": "swap"}]
            })],
        };
        assert_inverse_law(&doc(), &patch);
    }

    #[test]
    fn test_set_inverse_restores_previous_value() {
        let patch = Patch::Set {
            path: Path::child("b0", "s0"),
            value: serde_json::json!({"_key": "s0", "_type": "span", "text": "Changed"}),
        };
        assert_inverse_law(&doc(), &patch);
    }

    #[test]
    fn test_diff_match_patch_inverse_restores_text() {
        let patch = Patch::DiffMatchPatch {
            path: Path::child("b0", "s0"),
            value: TextPatch::from_texts("Hello", "Help me").encode(),
        };
        assert_inverse_law(&doc(), &patch);
    }

    #[test]
    fn test_unset_of_missing_node_has_empty_inverse() {
        let patch = Patch::Unset {
            path: Path::block("missing"),
        };
        assert!(invert(&doc(), &patch).is_empty());
    }
}
