//! Resumable streaming encoders.
//!
//! A [`StreamEncoder`] is fed fragments one at a time and produces, on each
//! emission, the complete token array for everything fed so far, affixes
//! included. Tokens far from the growing edge are **safe** and never
//! re-encoded; a small **volatile** window at the edge is re-tokenized on
//! every emission, because the next fragment may merge with text already
//! seen (BPE tokenizers routinely fuse across what used to be a boundary).
//!
//! Every [`EncodeResult`] carries enough state to seed a fresh encoder that
//! continues exactly where the emission left off, which is what lets the
//! trim search descend to a finer granularity without re-encoding the text
//! it has already accepted.

use crate::error::{EngineError, Result};
use contextloom_codec::{Token, TokenCodec};
use contextloom_core::{AffixOptions, TextFragment};
use tracing::trace;

/// Which end of the text the encoder grows toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeDirection {
    /// Fragments arrive in reading order; text grows at the end.
    Append,
    /// Fragments arrive in reverse reading order; text grows at the front.
    Prepend,
}

impl EncodeDirection {
    fn label(self) -> &'static str {
        match self {
            EncodeDirection::Append => "append",
            EncodeDirection::Prepend => "prepend",
        }
    }
}

/// State needed to continue encoding past an emission.
#[derive(Debug, Clone)]
pub struct ResumeState {
    direction: EncodeDirection,
    safe_count: usize,
    volatile_tokens: Vec<Token>,
}

/// One emission of a streaming encoder.
#[derive(Debug, Clone)]
pub struct EncodeResult {
    /// Every fragment fed so far, in feed order.
    pub fragments: Vec<TextFragment>,
    /// Tokens for affixes plus all fed fragments.
    pub tokens: Vec<Token>,
    pub(crate) resume: ResumeState,
}

/// Incremental tokenizer over a fragment stream. See the module docs.
pub struct StreamEncoder<'a> {
    codec: &'a dyn TokenCodec,
    direction: EncodeDirection,
    prefix: String,
    suffix: String,
    buffer_size: usize,
    safe: Vec<Token>,
    volatile_tokens: Vec<Token>,
    volatile_text: String,
    pending: String,
    fragments: Vec<TextFragment>,
    /// Whether the leading-side affix (prefix for append, suffix for
    /// prepend) still needs folding into the first emission.
    fold_lead: bool,
}

impl<'a> StreamEncoder<'a> {
    pub fn new(
        codec: &'a dyn TokenCodec,
        direction: EncodeDirection,
        affix: &AffixOptions,
        buffer_size: usize,
    ) -> Self {
        Self {
            codec,
            direction,
            prefix: affix.prefix.clone(),
            suffix: affix.suffix.clone(),
            buffer_size,
            safe: Vec::new(),
            volatile_tokens: Vec::new(),
            volatile_text: String::new(),
            pending: String::new(),
            fragments: Vec::new(),
            fold_lead: true,
        }
    }

    /// Continue from a prior emission. Errors if `prior` came from an
    /// encoder of the opposite direction.
    pub async fn seed(
        codec: &'a dyn TokenCodec,
        direction: EncodeDirection,
        affix: &AffixOptions,
        buffer_size: usize,
        prior: &EncodeResult,
    ) -> Result<StreamEncoder<'a>> {
        if prior.resume.direction != direction {
            return Err(EngineError::ResumeMismatch {
                expected: direction.label(),
                found: prior.resume.direction.label(),
            });
        }
        let safe = match direction {
            EncodeDirection::Append => prior.tokens[..prior.resume.safe_count].to_vec(),
            EncodeDirection::Prepend => {
                prior.tokens[prior.tokens.len() - prior.resume.safe_count..].to_vec()
            }
        };
        let volatile_tokens = prior.resume.volatile_tokens.clone();
        let volatile_text = codec.decode(&volatile_tokens).await?;
        Ok(Self {
            codec,
            direction,
            prefix: affix.prefix.clone(),
            suffix: affix.suffix.clone(),
            buffer_size,
            safe,
            volatile_tokens,
            volatile_text,
            pending: String::new(),
            fragments: prior.fragments.clone(),
            fold_lead: false,
        })
    }

    /// Feed one fragment. Emits a result when the fragment carries words or
    /// when `last` forces a final flush; wordless fragments otherwise stay
    /// pending so a trim never ends on bare separators it did not pay for.
    pub async fn feed(
        &mut self,
        fragment: &TextFragment,
        last: bool,
    ) -> Result<Option<EncodeResult>> {
        self.fragments.push(fragment.clone());
        match self.direction {
            EncodeDirection::Append => self.pending.push_str(fragment.content()),
            EncodeDirection::Prepend => self.pending.insert_str(0, fragment.content()),
        }
        if !fragment.has_words() && !last {
            return Ok(None);
        }
        self.emit().await.map(Some)
    }

    async fn emit(&mut self) -> Result<EncodeResult> {
        let text = match self.direction {
            EncodeDirection::Append => {
                let lead = if std::mem::take(&mut self.fold_lead) {
                    self.prefix.as_str()
                } else {
                    ""
                };
                format!("{lead}{}{}", self.volatile_text, self.pending)
            }
            EncodeDirection::Prepend => {
                let lead = if std::mem::take(&mut self.fold_lead) {
                    self.suffix.as_str()
                } else {
                    ""
                };
                format!("{}{}{lead}", self.pending, self.volatile_text)
            }
        };
        self.pending.clear();
        let encoded = self.codec.encode(&text).await?;
        if encoded.len() > self.buffer_size {
            match self.direction {
                EncodeDirection::Append => {
                    let cut = encoded.len() - self.buffer_size;
                    self.safe.extend_from_slice(&encoded[..cut]);
                    self.volatile_tokens = encoded[cut..].to_vec();
                }
                EncodeDirection::Prepend => {
                    self.volatile_tokens = encoded[..self.buffer_size].to_vec();
                    let mut safe = encoded[self.buffer_size..].to_vec();
                    safe.extend_from_slice(&self.safe);
                    self.safe = safe;
                }
            }
            self.volatile_text = self.codec.decode(&self.volatile_tokens).await?;
        } else {
            self.volatile_tokens = encoded;
            self.volatile_text = text;
        }

        // The trailing-side affix is re-applied over the volatile zone on
        // every emission; it never enters the safe zone.
        let tokens = match self.direction {
            EncodeDirection::Append => {
                let mut out = self.safe.clone();
                if self.suffix.is_empty() {
                    out.extend_from_slice(&self.volatile_tokens);
                } else {
                    let tail = format!("{}{}", self.volatile_text, self.suffix);
                    out.extend(self.codec.encode(&tail).await?);
                }
                out
            }
            EncodeDirection::Prepend => {
                let mut out = if self.prefix.is_empty() {
                    self.volatile_tokens.clone()
                } else {
                    let head = format!("{}{}", self.prefix, self.volatile_text);
                    self.codec.encode(&head).await?
                };
                out.extend_from_slice(&self.safe);
                out
            }
        };

        trace!(
            direction = self.direction.label(),
            fragments = self.fragments.len(),
            safe = self.safe.len(),
            volatile = self.volatile_tokens.len(),
            total = tokens.len(),
            "emission"
        );
        Ok(EncodeResult {
            fragments: self.fragments.clone(),
            tokens,
            resume: ResumeState {
                direction: self.direction,
                safe_count: self.safe.len(),
                volatile_tokens: self.volatile_tokens.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextloom_codec::WordCodec;
    use contextloom_core::by_line;

    fn pieces(text: &str) -> Vec<TextFragment> {
        by_line(&TextFragment::new(text, 0)).collect()
    }

    async fn feed_all(
        encoder: &mut StreamEncoder<'_>,
        pieces: &[TextFragment],
    ) -> Vec<EncodeResult> {
        let mut results = Vec::new();
        for (i, piece) in pieces.iter().enumerate() {
            if let Some(result) = encoder.feed(piece, i + 1 == pieces.len()).await.unwrap() {
                results.push(result);
            }
        }
        results
    }

    #[tokio::test]
    async fn append_matches_whole_encode() {
        let codec = WordCodec::new();
        let text = "first line here\nsecond line there\nthird line everywhere";
        let affix = AffixOptions {
            prefix: "[pre] ".into(),
            suffix: " [post]".into(),
        };
        let mut encoder = StreamEncoder::new(&codec, EncodeDirection::Append, &affix, 3);
        let results = feed_all(&mut encoder, &pieces(text)).await;
        let last = results.last().unwrap();
        let expected = format!("[pre] {text} [post]");
        assert_eq!(codec.decode(&last.tokens).await.unwrap(), expected);
        assert_eq!(last.tokens, codec.encode(&expected).await.unwrap());
    }

    #[tokio::test]
    async fn prepend_matches_whole_encode() {
        let codec = WordCodec::new();
        let text = "first line here\nsecond line there\nthird line everywhere";
        let affix = AffixOptions {
            prefix: "[pre] ".into(),
            suffix: " [post]".into(),
        };
        let mut encoder = StreamEncoder::new(&codec, EncodeDirection::Prepend, &affix, 3);
        let mut reversed = pieces(text);
        reversed.reverse();
        let results = feed_all(&mut encoder, &reversed).await;
        let last = results.last().unwrap();
        let expected = format!("[pre] {text} [post]");
        assert_eq!(codec.decode(&last.tokens).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn wordless_fragments_stay_pending() {
        let codec = WordCodec::new();
        let affix = AffixOptions::default();
        let mut encoder = StreamEncoder::new(&codec, EncodeDirection::Append, &affix, 3);
        let newline = TextFragment::new("\n", 5);
        assert!(encoder.feed(&newline, false).await.unwrap().is_none());
        let word = TextFragment::new("word", 6);
        let result = encoder.feed(&word, false).await.unwrap().unwrap();
        assert_eq!(codec.decode(&result.tokens).await.unwrap(), "\nword");
        assert_eq!(result.fragments.len(), 2);
    }

    #[tokio::test]
    async fn seeded_encoder_continues_identically() {
        let codec = WordCodec::new();
        let text = "alpha one\nbeta two\ngamma three\ndelta four";
        let affix = AffixOptions {
            prefix: "P ".into(),
            suffix: " S".into(),
        };
        let all = pieces(text);

        let mut whole = StreamEncoder::new(&codec, EncodeDirection::Append, &affix, 3);
        let whole_results = feed_all(&mut whole, &all).await;

        // Stop after the second emission, then resume in a fresh encoder.
        let mut front = StreamEncoder::new(&codec, EncodeDirection::Append, &affix, 3);
        let mut checkpoint = None;
        let mut fed = 0;
        for piece in &all {
            fed += 1;
            if let Some(result) = front.feed(piece, false).await.unwrap() {
                checkpoint = Some(result);
                if checkpoint.as_ref().unwrap().fragments.len() >= 3 {
                    break;
                }
            }
        }
        let checkpoint = checkpoint.unwrap();
        let mut resumed = StreamEncoder::seed(
            &codec,
            EncodeDirection::Append,
            &affix,
            3,
            &checkpoint,
        )
        .await
        .unwrap();
        let rest = &all[fed..];
        let mut final_result = None;
        for (i, piece) in rest.iter().enumerate() {
            if let Some(result) = resumed.feed(piece, i + 1 == rest.len()).await.unwrap() {
                final_result = Some(result);
            }
        }
        let resumed_last = final_result.unwrap();
        let whole_last = whole_results.last().unwrap();
        assert_eq!(
            codec.decode(&resumed_last.tokens).await.unwrap(),
            codec.decode(&whole_last.tokens).await.unwrap()
        );
        assert_eq!(resumed_last.fragments.len(), whole_last.fragments.len());
    }

    #[tokio::test]
    async fn seed_rejects_direction_mismatch() {
        let codec = WordCodec::new();
        let affix = AffixOptions::default();
        let mut encoder = StreamEncoder::new(&codec, EncodeDirection::Append, &affix, 3);
        let result = encoder
            .feed(&TextFragment::new("word", 0), true)
            .await
            .unwrap()
            .unwrap();
        let seeded = StreamEncoder::seed(&codec, EncodeDirection::Prepend, &affix, 3, &result).await;
        assert!(matches!(
            seeded.err(),
            Some(EngineError::ResumeMismatch { .. })
        ));
    }
}
