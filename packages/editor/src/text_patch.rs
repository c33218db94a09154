//! Text-level diff patches.
//!
//! A [`TextPatch`] expresses localized insert/delete runs within a single
//! span's text, so two independent sub-string edits to one span can both be
//! applied without clobbering each other. All coordinates count characters
//! in the *before* text.
//!
//! The wire blob is a compact hunk format, prefixed with the before-text
//! length so insertions can stay anchored to whichever end of the text they
//! were made at:
//!
//! ```text
//! ~5
//! @@ -5,0 +5,6 @@
//! + world
//! ```
//!
//! Application fails soft: if a hunk's context no longer matches, the
//! deleted run is searched for near the expected offset, and when nothing
//! matches the inserted text is still placed at the nearest valid offset.
//! Remote collaborators are never blocked by a conflicting edit.

use similar::{ChangeTag, TextDiff};
use tandem_content::PatchDecodeError;

/// Ordered, non-overlapping edit runs against one span's text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextPatch {
    hunks: Vec<Hunk>,
    /// Character length of the text the patch was computed against.
    source_len: usize,
}

/// One edit run: at `start` (chars into the before-text), `deleted` is
/// replaced by `inserted`. Either side may be empty, not both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub start: usize,
    pub deleted: String,
    pub inserted: String,
}

impl Hunk {
    fn deleted_len(&self) -> usize {
        self.deleted.chars().count()
    }

    fn inserted_len(&self) -> usize {
        self.inserted.chars().count()
    }

    /// Net character length change.
    fn delta(&self) -> i64 {
        self.inserted_len() as i64 - self.deleted_len() as i64
    }
}

impl TextPatch {
    /// Compute the edit runs turning `before` into `after`.
    pub fn from_texts(before: &str, after: &str) -> Self {
        let diff = TextDiff::from_chars(before, after);
        let mut hunks: Vec<Hunk> = Vec::new();
        let mut old_pos = 0usize;
        for change in diff.iter_all_changes() {
            let run = change.value();
            let run_len = run.chars().count();
            match change.tag() {
                ChangeTag::Equal => {
                    old_pos += run_len;
                }
                ChangeTag::Delete => {
                    extend_hunk(&mut hunks, old_pos).deleted.push_str(run);
                    old_pos += run_len;
                }
                ChangeTag::Insert => {
                    extend_hunk(&mut hunks, old_pos).inserted.push_str(run);
                }
            }
        }
        Self {
            hunks,
            source_len: before.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// Apply to `text`, never failing. Exact context first, then a search
    /// for the deleted run nearest the expected offset, then plain insertion
    /// of the new text at the nearest valid offset.
    pub fn apply(&self, text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        let mut delta = 0i64;
        for hunk in &self.hunks {
            let expected = clamp_offset(hunk.start as i64 + delta, chars.len());
            let deleted: Vec<char> = hunk.deleted.chars().collect();
            let inserted: Vec<char> = hunk.inserted.chars().collect();

            let at = if deleted.is_empty() {
                // Pure insertion: anchor from whichever end of the source
                // text was nearer, so concurrent inserts at opposite ends
                // commute.
                let tail = self.source_len.saturating_sub(hunk.start);
                if tail < hunk.start {
                    Some(chars.len().saturating_sub(tail))
                } else {
                    Some(expected)
                }
            } else if matches_at(&chars, expected, &deleted) {
                Some(expected)
            } else {
                nearest_match(&chars, expected, &deleted)
            };

            match at {
                Some(pos) if !deleted.is_empty() => {
                    chars.splice(pos..pos + deleted.len(), inserted.iter().copied());
                    delta += hunk.delta();
                }
                Some(pos) => {
                    chars.splice(pos..pos, inserted.iter().copied());
                    delta += hunk.delta();
                }
                None => {
                    // Deleted run is gone from this replica. Keep the
                    // insertion anyway so no participant's text is lost.
                    let pos = clamp_offset(expected as i64, chars.len());
                    chars.splice(pos..pos, inserted.iter().copied());
                    delta += inserted.len() as i64;
                }
            }
        }
        chars.into_iter().collect()
    }

    /// The patch turning `after` back into `before`.
    pub fn invert(&self) -> Self {
        let mut hunks = Vec::with_capacity(self.hunks.len());
        let mut delta = 0i64;
        for hunk in &self.hunks {
            hunks.push(Hunk {
                start: clamp_offset(hunk.start as i64 + delta, usize::MAX),
                deleted: hunk.inserted.clone(),
                inserted: hunk.deleted.clone(),
            });
            delta += hunk.delta();
        }
        Self {
            hunks,
            source_len: clamp_offset(self.source_len as i64 + delta, usize::MAX),
        }
    }

    /// Translate a character offset in the before-text to the after-text.
    ///
    /// Offsets before an edit are unchanged; an offset exactly at an
    /// insertion point stays anchored before the inserted run (the cursor
    /// must not land inside someone else's newly-typed text); offsets inside
    /// a deleted range collapse to the start of the deletion; offsets after
    /// an edit shift by its net length delta.
    pub fn translate_offset(&self, offset: usize) -> usize {
        let mut delta = 0i64;
        for hunk in &self.hunks {
            if offset <= hunk.start {
                break;
            }
            let deleted_end = hunk.start + hunk.deleted_len();
            if offset <= deleted_end {
                return clamp_offset(hunk.start as i64 + delta, usize::MAX);
            }
            delta += hunk.delta();
        }
        clamp_offset(offset as i64 + delta, usize::MAX)
    }

    /// Encode as the wire blob carried by `diffMatchPatch` patches.
    pub fn encode(&self) -> String {
        let mut out = format!("~{}\n", self.source_len);
        let mut delta = 0i64;
        for hunk in &self.hunks {
            let after_start = clamp_offset(hunk.start as i64 + delta, usize::MAX);
            out.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                hunk.start,
                hunk.deleted_len(),
                after_start,
                hunk.inserted_len()
            ));
            if !hunk.deleted.is_empty() {
                out.push('-');
                out.push_str(&escape(&hunk.deleted));
                out.push('\n');
            }
            if !hunk.inserted.is_empty() {
                out.push('+');
                out.push_str(&escape(&hunk.inserted));
                out.push('\n');
            }
            delta += hunk.delta();
        }
        out
    }

    /// Parse a wire blob produced by [`TextPatch::encode`].
    pub fn parse(blob: &str) -> Result<Self, PatchDecodeError> {
        let mut hunks: Vec<Hunk> = Vec::new();
        let mut source_len = None;
        for line in blob.lines() {
            if let Some(len) = line.strip_prefix('~') {
                source_len = Some(
                    len.parse()
                        .map_err(|_| PatchDecodeError::InvalidTextPatch(line.to_string()))?,
                );
            } else if let Some(header) = line.strip_prefix("@@ ") {
                let start = parse_header(header)
                    .ok_or_else(|| PatchDecodeError::InvalidTextPatch(line.to_string()))?;
                if let Some(last) = hunks.last() {
                    if start < last.start + last.deleted_len() {
                        return Err(PatchDecodeError::InvalidTextPatch(
                            "hunks overlap or are out of order".to_string(),
                        ));
                    }
                }
                hunks.push(Hunk {
                    start,
                    deleted: String::new(),
                    inserted: String::new(),
                });
            } else if let Some(deleted) = line.strip_prefix('-') {
                let hunk = hunks
                    .last_mut()
                    .ok_or_else(|| PatchDecodeError::InvalidTextPatch(line.to_string()))?;
                hunk.deleted = unescape(deleted)?;
            } else if let Some(inserted) = line.strip_prefix('+') {
                let hunk = hunks
                    .last_mut()
                    .ok_or_else(|| PatchDecodeError::InvalidTextPatch(line.to_string()))?;
                hunk.inserted = unescape(inserted)?;
            } else if !line.is_empty() {
                return Err(PatchDecodeError::InvalidTextPatch(line.to_string()));
            }
        }
        if hunks.iter().any(|h| h.deleted.is_empty() && h.inserted.is_empty()) {
            return Err(PatchDecodeError::InvalidTextPatch("empty hunk".to_string()));
        }
        // A blob without a length line falls back to front anchoring.
        let source_len = source_len.unwrap_or_else(|| {
            hunks
                .iter()
                .map(|h| h.start + h.deleted_len())
                .max()
                .unwrap_or(0)
        });
        Ok(Self { hunks, source_len })
    }
}

fn extend_hunk(hunks: &mut Vec<Hunk>, old_pos: usize) -> &mut Hunk {
    let adjacent = hunks
        .last()
        .is_some_and(|h| h.start + h.deleted.chars().count() == old_pos);
    if !adjacent {
        hunks.push(Hunk {
            start: old_pos,
            deleted: String::new(),
            inserted: String::new(),
        });
    }
    hunks.last_mut().unwrap()
}

fn matches_at(chars: &[char], pos: usize, needle: &[char]) -> bool {
    pos + needle.len() <= chars.len() && &chars[pos..pos + needle.len()] == needle
}

/// Occurrence of `needle` closest to `expected`, if any.
fn nearest_match(chars: &[char], expected: usize, needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > chars.len() {
        return None;
    }
    (0..=chars.len() - needle.len())
        .filter(|&pos| matches_at(chars, pos, needle))
        .min_by_key(|&pos| pos.abs_diff(expected))
}

fn clamp_offset(value: i64, max: usize) -> usize {
    if value < 0 {
        0
    } else {
        (value as usize).min(max)
    }
}

fn parse_header(header: &str) -> Option<usize> {
    // "-{start},{dlen} +{astart},{ilen} @@"
    let rest = header.strip_prefix('-')?;
    let (old_range, rest) = rest.split_once(" +")?;
    let (start, _dlen) = old_range.split_once(',')?;
    let (new_range, tail) = rest.split_once(" @@")?;
    new_range.split_once(',')?;
    if !tail.is_empty() {
        return None;
    }
    start.parse().ok()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> Result<String, PatchDecodeError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            _ => {
                return Err(PatchDecodeError::InvalidTextPatch(
                    "dangling escape".to_string(),
                ))
            }
        }
    }
    Ok(out)
}
