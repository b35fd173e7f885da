//! Error types for the contextloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions. These errors represent
//! **invariant violations** — programming mistakes such as comparing cursors
//! across unrelated assemblies or splitting a fragment outside its span.
//! Recoverable "no result" outcomes (an impossible split, an unsatisfiable
//! trim) are expressed as `Option` values by the operations themselves and
//! never pass through here.

use crate::cursor::SourceId;
use thiserror::Error;

/// The top-level error type for fragment and assembly operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// A cursor was used against an assembly it does not belong to.
    #[error("cursor origin {cursor:?} does not match assembly source {assembly:?}")]
    UnrelatedCursor {
        cursor: SourceId,
        assembly: SourceId,
    },

    /// A fragment cursor was expected but a full-text cursor was supplied,
    /// or vice versa.
    #[error("wrong cursor kind: expected {expected}, got {found}")]
    WrongCursorKind {
        expected: &'static str,
        found: &'static str,
    },

    /// A fragment cursor points at an offset no fragment of the assembly
    /// covers and the operation does not tolerate relocation.
    #[error("no fragment of the assembly contains offset {0}")]
    FragmentNotFound(usize),

    /// An absolute offset falls outside the fragment it was applied to.
    #[error("offset {offset} outside fragment spanning {start}..{end}")]
    OffsetOutOfBounds {
        offset: usize,
        start: usize,
        end: usize,
    },

    /// A split offset does not land on a UTF-8 character boundary.
    #[error("offset {0} is not a character boundary")]
    NotCharBoundary(usize),

    /// A full-text cursor offset exceeds the assembly's concatenated length.
    #[error("full-text offset {offset} exceeds assembly length {len}")]
    FullTextOutOfBounds { offset: usize, len: usize },
}

/// Result type alias using [`AssemblyError`].
pub type Result<T> = std::result::Result<T, AssemblyError>;
