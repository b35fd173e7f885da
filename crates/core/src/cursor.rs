//! Cursors — stable addresses into assembly text.
//!
//! Two addressing domains exist:
//!
//! - **Fragment** cursors: a byte offset in the coordinate space of the
//!   original source text, valid against any assembly derived from the same
//!   source
//! - **FullText** cursors: a byte offset into the concatenation of one
//!   specific assembly's `prefix + content + suffix`
//!
//! Cursors of either kind carry the [`SourceId`] of the assembly family they
//! belong to; using a cursor against an unrelated assembly is a loud error,
//! never a silent coercion.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a family of related assemblies (a root source assembly and
/// everything derived from it).
///
/// The original design used object identity for this; an explicit interned
/// id keeps relatedness an equality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(u64);

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl SourceId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An address into either fragment-space or full-text-space of an assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cursor {
    /// Offset in the coordinate space of the origin's source text.
    Fragment { origin: SourceId, offset: usize },
    /// Offset into the concatenation of a specific assembly's
    /// `prefix + content + suffix`.
    FullText { origin: SourceId, offset: usize },
}

impl Cursor {
    /// Create a fragment-space cursor.
    pub fn fragment(origin: SourceId, offset: usize) -> Self {
        Cursor::Fragment { origin, offset }
    }

    /// Create a full-text cursor.
    pub fn full_text(origin: SourceId, offset: usize) -> Self {
        Cursor::FullText { origin, offset }
    }

    /// The assembly family this cursor addresses.
    pub fn origin(&self) -> SourceId {
        match *self {
            Cursor::Fragment { origin, .. } | Cursor::FullText { origin, .. } => origin,
        }
    }

    /// The raw offset, in whichever domain the cursor lives in.
    pub fn offset(&self) -> usize {
        match *self {
            Cursor::Fragment { offset, .. } | Cursor::FullText { offset, .. } => offset,
        }
    }

    /// Kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Cursor::Fragment { .. } => "fragment",
            Cursor::FullText { .. } => "full-text",
        }
    }
}

/// An ordered pair of fragment cursors marking a matched span, e.g. where a
/// keyword hit inside an entry's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    start: Cursor,
    end: Cursor,
}

impl Selection {
    /// Build a selection from two fragment cursors of the same origin,
    /// swapping them into offset order if needed.
    ///
    /// Returns `None` if either cursor is a full-text cursor or the origins
    /// differ.
    pub fn new(a: Cursor, b: Cursor) -> Option<Self> {
        match (a, b) {
            (Cursor::Fragment { origin: oa, .. }, Cursor::Fragment { origin: ob, .. })
                if oa == ob =>
            {
                let (start, end) = if a.offset() <= b.offset() { (a, b) } else { (b, a) };
                Some(Selection { start, end })
            }
            _ => None,
        }
    }

    /// Collapse a single cursor into a zero-width selection.
    pub fn collapsed(cursor: Cursor) -> Option<Self> {
        Self::new(cursor, cursor)
    }

    /// The earlier cursor.
    pub fn start(&self) -> Cursor {
        self.start
    }

    /// The later cursor.
    pub fn end(&self) -> Cursor {
        self.end
    }

    /// The assembly family both cursors address.
    pub fn origin(&self) -> SourceId {
        self.start.origin()
    }
}
