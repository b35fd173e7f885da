//! Tokenized assemblies — a fragment assembly plus a token array kept in
//! sync through splits and affix removal.
//!
//! The invariant: `tokens` decodes to exactly the assembly's concatenated
//! `prefix + content + suffix` under the associated codec. Re-derivation
//! re-tokenizes only the affected boundary (a bounded mend window), never
//! the whole text.

use crate::error::Result;
use contextloom_codec::{MEND_WINDOW, MendSection, Token, TokenCodec, TokenOffset};
use contextloom_core::{Cursor, FragmentAssembly};

/// A fragment assembly with its token encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedAssembly {
    assembly: FragmentAssembly,
    tokens: Vec<Token>,
}

impl TokenizedAssembly {
    /// Tokenize an assembly's full text.
    pub async fn from_assembly(
        assembly: FragmentAssembly,
        codec: &dyn TokenCodec,
    ) -> Result<Self> {
        let tokens = codec.encode(assembly.text()).await?;
        Ok(Self { assembly, tokens })
    }

    /// Pair an assembly with tokens the caller asserts decode to exactly the
    /// assembly's text (e.g. produced by a streaming encoder over the same
    /// fragments).
    pub fn from_parts(assembly: FragmentAssembly, tokens: Vec<Token>) -> Self {
        Self { assembly, tokens }
    }

    pub fn assembly(&self) -> &FragmentAssembly {
        &self.assembly
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn text(&self) -> &str {
        self.assembly.text()
    }

    pub fn is_empty(&self) -> bool {
        self.assembly.is_empty()
    }

    /// Split at a content cursor, keeping both token arrays consistent.
    ///
    /// The fragment-level split runs first; the token array is then split at
    /// the cut's **character** offset. A cut on a token boundary slices the
    /// array directly; a cut inside a token decodes that token, slices its
    /// text, and re-encodes each half mended with a bounded window of
    /// neighboring tokens. Returns `Ok(None)` when the cursor cannot be
    /// placed inside content.
    pub async fn split_at(
        &self,
        codec: &dyn TokenCodec,
        cursor: Cursor,
        loose: bool,
    ) -> Result<Option<(Self, Self)>> {
        let Some((left_assembly, right_assembly)) = self.assembly.split_at(cursor, loose)? else {
            return Ok(None);
        };
        // Character offset of the cut inside this assembly's full text.
        let cut = left_assembly.text().len();
        let (left_tokens, right_tokens) = match codec.find_offset(&self.tokens, cut).await? {
            TokenOffset::Before => (Vec::new(), self.tokens.clone()),
            TokenOffset::After => (self.tokens.clone(), Vec::new()),
            TokenOffset::Double { min, max } => {
                (self.tokens[..=min].to_vec(), self.tokens[max..].to_vec())
            }
            TokenOffset::Single {
                index,
                value,
                remainder,
                ..
            } => {
                let left = codec
                    .mend_tokens(
                        &[
                            MendSection::Tokens(self.tokens[..index].to_vec()),
                            MendSection::Text(value[..remainder].to_string()),
                        ],
                        MEND_WINDOW,
                    )
                    .await?;
                let right = codec
                    .mend_tokens(
                        &[
                            MendSection::Text(value[remainder..].to_string()),
                            MendSection::Tokens(self.tokens[index + 1..].to_vec()),
                        ],
                        MEND_WINDOW,
                    )
                    .await?;
                (left, right)
            }
        };
        Ok(Some((
            Self {
                assembly: left_assembly,
                tokens: left_tokens,
            },
            Self {
                assembly: right_assembly,
                tokens: right_tokens,
            },
        )))
    }

    /// Strip the prefix and suffix, keeping tokens for the content alone.
    ///
    /// Composes two splits — one isolating the prefix, one isolating the
    /// suffix — and keeps the middle. With empty content this short-circuits
    /// to an all-empty result without touching the codec.
    pub async fn remove_affix(&self, codec: &dyn TokenCodec) -> Result<Self> {
        let assembly = &self.assembly;
        if assembly.is_empty() {
            return Ok(Self {
                assembly: assembly.remove_affix(),
                tokens: Vec::new(),
            });
        }
        if assembly.prefix().is_empty() && assembly.suffix().is_empty() {
            return Ok(self.clone());
        }

        let mut current = self.clone();
        if !current.assembly.prefix().is_empty() {
            let start = current.assembly.stats().min_offset;
            let cursor = Cursor::fragment(current.assembly.source_id(), start);
            if let Some((_, rest)) = current.split_at(codec, cursor, false).await? {
                current = rest;
            }
        }
        if !current.assembly.suffix().is_empty() {
            let end = current.assembly.stats().max_offset;
            let cursor = Cursor::fragment(current.assembly.source_id(), end);
            if let Some((kept, _)) = current.split_at(codec, cursor, false).await? {
                current = kept;
            }
        }
        Ok(Self {
            assembly: current.assembly.remove_affix(),
            tokens: current.tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextloom_codec::WordCodec;
    use contextloom_core::{AffixOptions, Cursor, FragmentAssembly};

    async fn tokenized(text: &str, prefix: &str, suffix: &str) -> (WordCodec, TokenizedAssembly) {
        let codec = WordCodec::new();
        let assembly = FragmentAssembly::from_text(
            text,
            AffixOptions {
                prefix: prefix.into(),
                suffix: suffix.into(),
            },
        )
        .unwrap();
        let tokenized = TokenizedAssembly::from_assembly(assembly, &codec)
            .await
            .unwrap();
        (codec, tokenized)
    }

    #[tokio::test]
    async fn split_conserves_decoded_text() {
        let (codec, asm) = tokenized("alpha beta gamma", "", "").await;
        // Cut inside "beta": source offset 8 = "alpha be|ta gamma".
        let cursor = Cursor::fragment(asm.assembly().source_id(), 8);
        let (left, right) = asm.split_at(&codec, cursor, false).await.unwrap().unwrap();
        let left_text = codec.decode(left.tokens()).await.unwrap();
        let right_text = codec.decode(right.tokens()).await.unwrap();
        assert_eq!(left_text, "alpha be");
        assert_eq!(right_text, "ta gamma");
        assert_eq!(format!("{left_text}{right_text}"), asm.text());
    }

    #[tokio::test]
    async fn split_on_token_boundary_slices_directly() {
        let (codec, asm) = tokenized("alpha beta", "", "").await;
        // "alpha beta" encodes as ["alpha", " ", "beta"]; offset 6 is the
        // boundary between " " and "beta".
        let cursor = Cursor::fragment(asm.assembly().source_id(), 6);
        let (left, right) = asm.split_at(&codec, cursor, false).await.unwrap().unwrap();
        assert_eq!(codec.decode(left.tokens()).await.unwrap(), "alpha ");
        assert_eq!(codec.decode(right.tokens()).await.unwrap(), "beta");
        assert_eq!(left.token_count() + right.token_count(), asm.token_count());
    }

    #[tokio::test]
    async fn split_in_affix_yields_none() {
        let (codec, asm) = tokenized("x", "long prefix ", "").await;
        let cursor = Cursor::fragment(asm.assembly().source_id(), 3);
        assert!(asm.split_at(&codec, cursor, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_affix_keeps_content_tokens() {
        let (codec, asm) = tokenized("the body text", "PRE ", " POST").await;
        let bare = asm.remove_affix(&codec).await.unwrap();
        assert!(bare.assembly().prefix().is_empty());
        assert!(bare.assembly().suffix().is_empty());
        assert_eq!(codec.decode(bare.tokens()).await.unwrap(), "the body text");
    }

    #[tokio::test]
    async fn remove_affix_of_empty_content_skips_codec() {
        let codec = WordCodec::new();
        let assembly = FragmentAssembly::from_text(
            "",
            AffixOptions {
                prefix: "pre".into(),
                suffix: "post".into(),
            },
        )
        .unwrap();
        // Deliberately absurd tokens: the short-circuit must not decode them.
        let tokenized = TokenizedAssembly::from_parts(assembly, vec![12345]);
        let bare = tokenized.remove_affix(&codec).await.unwrap();
        assert!(bare.tokens().is_empty());
        assert!(bare.assembly().prefix().is_empty());
        assert!(bare.assembly().suffix().is_empty());
    }
}
