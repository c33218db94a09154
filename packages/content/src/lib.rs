//! # Tandem Content
//!
//! Value-level document model for the Tandem sync engine.
//!
//! A document is an ordered sequence of typed content blocks; each block owns
//! an ordered sequence of inline children (text spans or inline objects).
//! Blocks and children carry stable `_key` identifiers so that structural
//! identity survives concurrent edits. Everything in this crate is a plain
//! value: cloning a [`Document`] is how state is shared, and equality is
//! structural.
//!
//! This crate also defines the portable patch format ([`Patch`]) and the
//! key-addressed [`Path`] scheme used by patches and selections, including
//! the JSON wire representation and decode validation. Applying patches is
//! the `tandem-editor` crate's job.

pub mod document;
pub mod key;
pub mod node;
pub mod path;
pub mod patch;

pub use document::{Document, NodeRef, Violation};
pub use key::{KeyGenerator, StableKey};
pub use node::{Block, InlineNode, InlineObject, MarkDefinition, Span};
pub use path::{KeyedSegment, Path, PathSegment};
pub use patch::{InsertPosition, Origin, Patch, PatchDecodeError};
