//! Document node types.
//!
//! Wire shapes follow portable block-text conventions: every node carries
//! `_key` and `_type`, text spans use `"_type": "span"`, and any other
//! `_type` on an inline child is an opaque inline object.

use crate::key::StableKey;
use serde::{Deserialize, Serialize};

/// A top-level structural unit of the document (e.g. a paragraph).
///
/// Exclusively owned by the [`Document`](crate::Document); never aliased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "_key")]
    pub key: StableKey,

    /// Opaque block type tag. The engine never interprets it.
    #[serde(rename = "_type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    #[serde(default)]
    pub children: Vec<InlineNode>,

    /// Formatting definitions referenced from span marks by key.
    #[serde(rename = "markDefs", default, skip_serializing_if = "Vec::is_empty")]
    pub mark_defs: Vec<MarkDefinition>,
}

impl Block {
    pub fn new(key: impl Into<StableKey>, kind: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            style: None,
            children: Vec::new(),
            mark_defs: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<InlineNode>) -> Self {
        self.children = children;
        self
    }

    pub fn child_index(&self, key: &StableKey) -> Option<usize> {
        self.children.iter().position(|c| c.key() == key)
    }

    pub fn child(&self, key: &StableKey) -> Option<&InlineNode> {
        self.children.iter().find(|c| c.key() == key)
    }

    pub fn child_mut(&mut self, key: &StableKey) -> Option<&mut InlineNode> {
        self.children.iter_mut().find(|c| c.key() == key)
    }

    pub fn mark_def(&self, key: &StableKey) -> Option<&MarkDefinition> {
        self.mark_defs.iter().find(|d| &d.key == key)
    }
}

/// An inline child of a block: a text span or an opaque inline object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InlineNode {
    Span(Span),
    Object(InlineObject),
}

impl InlineNode {
    pub fn key(&self) -> &StableKey {
        match self {
            InlineNode::Span(span) => &span.key,
            InlineNode::Object(obj) => &obj.key,
        }
    }

    pub fn as_span(&self) -> Option<&Span> {
        match self {
            InlineNode::Span(span) => Some(span),
            InlineNode::Object(_) => None,
        }
    }

    pub fn as_span_mut(&mut self) -> Option<&mut Span> {
        match self {
            InlineNode::Span(span) => Some(span),
            InlineNode::Object(_) => None,
        }
    }

    pub fn is_span(&self) -> bool {
        matches!(self, InlineNode::Span(_))
    }
}

impl From<Span> for InlineNode {
    fn from(span: Span) -> Self {
        InlineNode::Span(span)
    }
}

impl From<InlineObject> for InlineNode {
    fn from(obj: InlineObject) -> Self {
        InlineNode::Object(obj)
    }
}

/// An inline run of text with attached mark references.
///
/// The leaf unit addressed by selections; offsets count characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "_key")]
    pub key: StableKey,

    #[serde(rename = "_type")]
    kind: SpanKind,

    pub text: String,

    /// Mark references are lookup keys into the block's `markDefs`, never
    /// owning pointers. A dangling reference is a validation finding.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<StableKey>,
}

impl Span {
    pub fn new(key: impl Into<StableKey>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: SpanKind::Span,
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn with_marks(mut self, marks: Vec<StableKey>) -> Self {
        self.marks = marks;
        self
    }

    /// Text length in characters, the unit selections count offsets in.
    pub fn len_chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Fixed `"span"` type tag. Deserializing any other tag falls through to
/// [`InlineObject`] via the untagged [`InlineNode`] enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum SpanKind {
    #[serde(rename = "span")]
    Span,
}

/// Opaque non-text inline child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineObject {
    #[serde(rename = "_key")]
    pub key: StableKey,

    #[serde(rename = "_type")]
    pub kind: String,

    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Formatting definition owned by a block, referenced from spans by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkDefinition {
    #[serde(rename = "_key")]
    pub key: StableKey,

    #[serde(rename = "_type")]
    pub kind: String,

    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_span_wire_shape() {
        let span = Span::new("s0", "Hello").with_marks(vec!["m0".into()]);
        let value = serde_json::to_value(InlineNode::Span(span)).unwrap();
        assert_eq!(
            value,
            json!({"_key": "s0", "_type": "span", "text": "Hello", "marks": ["m0"]})
        );
    }

    #[test]
    fn test_inline_node_deserializes_by_type_tag() {
        let span: InlineNode =
            serde_json::from_value(json!({"_key": "s0", "_type": "span", "text": "hi"})).unwrap();
        assert!(span.is_span());

        let object: InlineNode = serde_json::from_value(
            json!({"_key": "o0", "_type": "inlineImage", "url": "x.png"}),
        )
        .unwrap();
        assert!(!object.is_span());
        match object {
            InlineNode::Object(obj) => {
                assert_eq!(obj.kind, "inlineImage");
                assert_eq!(obj.payload["url"], json!("x.png"));
            }
            InlineNode::Span(_) => unreachable!(),
        }
    }

    #[test]
    fn test_block_wire_shape_uses_mark_defs_name() {
        let mut block = Block::new("b0", "block");
        block.style = Some("normal".to_string());
        block.mark_defs.push(MarkDefinition {
            key: "m0".into(),
            kind: "link".to_string(),
            attributes: serde_json::Map::new(),
        });
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["markDefs"][0]["_type"], json!("link"));
        assert_eq!(value["style"], json!("normal"));

        let back: Block = serde_json::from_value(value).unwrap();
        assert_eq!(back, block);
    }
}
