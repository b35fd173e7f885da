//! Error types for the trimming and insertion engine.
//!
//! Wraps the core and codec errors and adds the engine's own invariant
//! violations. Expected recoverable outcomes — an unsatisfiable trim, a
//! rejected insertion — are *values*, not errors; see
//! [`crate::compound::InsertionReport`].

use contextloom_codec::CodecError;
use contextloom_core::AssemblyError;
use thiserror::Error;

/// The top-level error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A streaming encoder was seeded with the opposite direction's resume
    /// state. Continuing would produce silently wrong tokens.
    #[error("cannot resume a {expected} encoder from a {found} resume state")]
    ResumeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The insertion position logic and the shunt logic disagreed about a
    /// placement that should always be resolvable.
    #[error("insertion state diverged: {0}")]
    InsertionDiverged(String),
}

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;
