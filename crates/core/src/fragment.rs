//! Text fragments — immutable `(content, offset)` slices of a source text.
//!
//! A [`TextFragment`] remembers where its content sat in the original string,
//! so text can be cut apart, filtered, and re-joined while later stages still
//! address positions in the original. All offsets in this codebase are **byte
//! offsets** into UTF-8 text; every split point is a `char` boundary.

use crate::error::{AssemblyError, Result};
use serde::{Deserialize, Serialize};

// ── Character classes ─────────────────────────────────────────────────────

/// True for characters that open or close quoted speech.
pub fn is_quote_char(ch: char) -> bool {
    matches!(ch, '"' | '\'' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}' | '`')
}

/// True for sentence-terminating punctuation.
pub fn is_terminal_char(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '\u{2026}' | '\u{203D}')
}

/// True for hyphens and dashes.
pub fn is_hyphen_char(ch: char) -> bool {
    matches!(ch, '-' | '\u{2010}' | '\u{2013}' | '\u{2014}')
}

/// True if `text` contains at least one character that is not whitespace,
/// a quote, sentence-terminating punctuation, or a hyphen.
///
/// This is the "does this fragment carry actual words" predicate the trimming
/// engine uses to decide when a streaming encoder may emit a result.
pub fn has_words(text: &str) -> bool {
    text.chars().any(|ch| {
        !ch.is_whitespace() && !is_quote_char(ch) && !is_terminal_char(ch) && !is_hyphen_char(ch)
    })
}

// ── TextFragment ──────────────────────────────────────────────────────────

/// An immutable slice of some original source text.
///
/// `offset` is the absolute byte position of `content[0]` in the source the
/// fragment was cut from. Fragments are value objects: operations that
/// "modify" a fragment return new instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextFragment {
    content: String,
    offset: usize,
}

impl TextFragment {
    /// Create a fragment from content and its absolute offset.
    pub fn new(content: impl Into<String>, offset: usize) -> Self {
        Self {
            content: content.into(),
            offset,
        }
    }

    /// An empty fragment positioned at `offset`.
    ///
    /// Empty fragments are only valid as assembly prefixes/suffixes, never as
    /// content.
    pub fn empty(offset: usize) -> Self {
        Self {
            content: String::new(),
            offset,
        }
    }

    /// The fragment's text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Absolute byte offset of the first byte of `content`.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the content in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// True if the fragment carries no text.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Absolute offset one past the last byte of the fragment.
    pub fn end_offset(&self) -> usize {
        self.offset + self.content.len()
    }

    /// True if the absolute offset lands inside the fragment, boundaries
    /// included.
    pub fn contains_offset(&self, offset: usize) -> bool {
        offset >= self.offset && offset <= self.end_offset()
    }

    /// True if this fragment contains any word characters. See [`has_words`].
    pub fn has_words(&self) -> bool {
        has_words(&self.content)
    }

    /// Split the fragment at an **absolute** offset, yielding the text before
    /// and after the cut. Both halves keep accurate offsets.
    ///
    /// Errors if the offset falls outside the fragment or off a character
    /// boundary.
    pub fn split(&self, at: usize) -> Result<(TextFragment, TextFragment)> {
        if !self.contains_offset(at) {
            return Err(AssemblyError::OffsetOutOfBounds {
                offset: at,
                start: self.offset,
                end: self.end_offset(),
            });
        }
        let local = at - self.offset;
        if !self.content.is_char_boundary(local) {
            return Err(AssemblyError::NotCharBoundary(at));
        }
        Ok((
            TextFragment::new(&self.content[..local], self.offset),
            TextFragment::new(&self.content[local..], at),
        ))
    }
}

/// Concatenate a run of fragments into one.
///
/// The fragments are **assumed** to be contiguous and in source order; this
/// is not verified. The merged fragment takes the first fragment's offset.
/// Returns `None` for an empty run.
pub fn merge_fragments<'a, I>(fragments: I) -> Option<TextFragment>
where
    I: IntoIterator<Item = &'a TextFragment>,
{
    let mut iter = fragments.into_iter();
    let first = iter.next()?;
    let mut content = first.content.clone();
    for frag in iter {
        content.push_str(&frag.content);
    }
    Some(TextFragment::new(content, first.offset))
}
