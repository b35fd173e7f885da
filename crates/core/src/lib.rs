//! # contextloom core
//!
//! Domain types for budget-aware context assembly: immutable text fragments,
//! pure splitting functions, the two-domain cursor system, and fragment
//! assemblies with provenance tracking. This crate has **zero framework
//! dependencies** — tokenization, trimming, and insertion build on top of it
//! in the outer crates.
//!
//! ## Layering
//!
//! - [`fragment`] — `(content, offset)` value slices and character classes
//! - [`splitters`] — lazy line/sentence/word splits that reconstruct exactly
//! - [`cursor`] — fragment-space and full-text-space addressing
//! - [`assembly`] — `{prefix, content, suffix}` aggregates, derivation,
//!   splitting, and cursor resolution

pub mod assembly;
pub mod cursor;
pub mod error;
pub mod fragment;
pub mod splitters;

// Re-export key types at crate root for ergonomics
pub use assembly::{
    AffixOptions, AssemblyStats, CursorPosition, DeriveOptions, DeriveSource, FragmentAssembly,
    SourceRef,
};
pub use cursor::{Cursor, Selection, SourceId};
pub use error::{AssemblyError, Result};
pub use fragment::{TextFragment, has_words, merge_fragments};
pub use splitters::{by_line, by_line_from_end, by_sentence, by_word};
