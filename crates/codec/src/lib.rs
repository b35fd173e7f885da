//! # contextloom codec
//!
//! The token codec — the one asynchronous external collaborator of the
//! assembly engine. Tokenization commonly runs off-thread (or off-process),
//! so every operation is async; callers treat results as point-in-time
//! snapshots and never mutate assembly state while a codec call is
//! outstanding.
//!
//! [`TokenCodec`] is the abstraction; the engine never assumes a specific
//! tokenizer's vocabulary. Two backends ship here:
//!
//! - [`WordCodec`] — deterministic, vocabulary-free, exact round-trip;
//!   suitable for tests and offline character-level work
//! - [`HfCodec`] — a `tokenizers`-backed BPE codec running encodes on the
//!   blocking pool

pub mod hf;
pub mod word;

pub use hf::HfCodec;
pub use word::WordCodec;

use async_trait::async_trait;
use thiserror::Error;

/// A single token id.
pub type Token = u32;

/// How many neighboring tokens a mend re-encodes around each seam.
pub const MEND_WINDOW: usize = 5;

/// Errors from a token codec backend.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("tokenizer backend error: {0}")]
    Backend(String),

    #[error("token id {0} not present in vocabulary")]
    UnknownToken(Token),

    #[error("offset {offset} exceeds decoded length {len}")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("codec task failed: {0}")]
    Task(String),
}

/// Result type alias using [`CodecError`].
pub type Result<T> = std::result::Result<T, CodecError>;

/// Where a byte offset into decoded text lands relative to a token array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOffset {
    /// Before the first token.
    Before,
    /// Past the last token.
    After,
    /// Strictly inside one token.
    Single {
        index: usize,
        token: Token,
        /// The token's decoded text.
        value: String,
        /// Byte offset of the cut within `value`.
        remainder: usize,
    },
    /// Exactly on the boundary between two adjacent tokens.
    Double { min: usize, max: usize },
}

/// A section handed to [`TokenCodec::mend_tokens`]: already-encoded tokens or
/// raw text that still needs encoding in context.
#[derive(Debug, Clone)]
pub enum MendSection {
    Tokens(Vec<Token>),
    Text(String),
}

impl From<Vec<Token>> for MendSection {
    fn from(tokens: Vec<Token>) -> Self {
        MendSection::Tokens(tokens)
    }
}

impl From<String> for MendSection {
    fn from(text: String) -> Self {
        MendSection::Text(text)
    }
}

/// The async token codec boundary.
///
/// `find_offset` and `mend_tokens` have default implementations expressed in
/// terms of `encode`/`decode`; backends with cheaper native equivalents may
/// override them.
#[async_trait]
pub trait TokenCodec: Send + Sync {
    /// A human-readable name for this codec.
    fn name(&self) -> &str;

    /// Encode text into tokens.
    async fn encode(&self, text: &str) -> Result<Vec<Token>>;

    /// Decode tokens back into text.
    async fn decode(&self, tokens: &[Token]) -> Result<String>;

    /// Locate which token(s) the byte offset `offset` (into the decoded
    /// text of `tokens`) falls on.
    async fn find_offset(&self, tokens: &[Token], offset: usize) -> Result<TokenOffset> {
        if tokens.is_empty() || offset == 0 {
            return Ok(TokenOffset::Before);
        }
        let mut consumed = 0usize;
        for (index, &token) in tokens.iter().enumerate() {
            let value = self.decode(&[token]).await?;
            let end = consumed + value.len();
            if offset < end {
                return Ok(TokenOffset::Single {
                    index,
                    token,
                    remainder: offset - consumed,
                    value,
                });
            }
            if offset == end {
                return if index + 1 == tokens.len() {
                    Ok(TokenOffset::After)
                } else {
                    Ok(TokenOffset::Double {
                        min: index,
                        max: index + 1,
                    })
                };
            }
            consumed = end;
        }
        Err(CodecError::OffsetOutOfRange {
            offset,
            len: consumed,
        })
    }

    /// Join several token/text sections into one token array, re-encoding a
    /// bounded window of `window` tokens around each seam so the decoded
    /// text stays exactly the concatenation of the sections.
    async fn mend_tokens(&self, sections: &[MendSection], window: usize) -> Result<Vec<Token>> {
        let mut out: Vec<Token> = Vec::new();
        let mut first = true;
        for section in sections {
            if first {
                match section {
                    MendSection::Tokens(tokens) => out.extend_from_slice(tokens),
                    MendSection::Text(text) => {
                        if !text.is_empty() {
                            out.extend(self.encode(text).await?);
                        }
                    }
                }
                first = false;
                continue;
            }
            // Empty sections contribute nothing to the seam.
            match section {
                MendSection::Text(text) if text.is_empty() => continue,
                MendSection::Tokens(tokens) if tokens.is_empty() => continue,
                _ => {}
            }
            let keep = out.len().saturating_sub(window);
            let seam_left = self.decode(&out[keep..]).await?;
            out.truncate(keep);
            match section {
                MendSection::Text(text) => {
                    let mended = self.encode(&format!("{seam_left}{text}")).await?;
                    out.extend(mended);
                }
                MendSection::Tokens(tokens) => {
                    let take = tokens.len().min(window);
                    let seam_right = self.decode(&tokens[..take]).await?;
                    let mended = self.encode(&format!("{seam_left}{seam_right}")).await?;
                    out.extend(mended);
                    out.extend_from_slice(&tokens[take..]);
                }
            }
        }
        Ok(out)
    }
}
