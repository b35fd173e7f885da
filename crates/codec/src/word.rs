//! A deterministic, vocabulary-free codec.
//!
//! Tokens are maximal word runs and runs of non-word characters (as produced
//! by the core word splitter), interned into a process-local bidirectional
//! table on first sight. Decoding is an exact round-trip of encoding, which
//! makes this codec the reference backend for tests and for hosts that want
//! budget arithmetic without a real tokenizer model.

use crate::{CodecError, Result, Token, TokenCodec};
use async_trait::async_trait;
use contextloom_core::fragment::TextFragment;
use contextloom_core::splitters::by_word;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Vocabulary {
    by_text: HashMap<String, Token>,
    by_id: Vec<String>,
}

impl Vocabulary {
    fn intern(&mut self, piece: &str) -> Token {
        if let Some(&id) = self.by_text.get(piece) {
            return id;
        }
        let id = self.by_id.len() as Token;
        self.by_id.push(piece.to_string());
        self.by_text.insert(piece.to_string(), id);
        id
    }

    fn lookup(&self, id: Token) -> Option<&str> {
        self.by_id.get(id as usize).map(String::as_str)
    }
}

/// Word-run codec with an interned vocabulary. See the module docs.
#[derive(Debug, Default)]
pub struct WordCodec {
    vocabulary: Mutex<Vocabulary>,
}

impl WordCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct tokens seen so far.
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.lock().unwrap().by_id.len()
    }
}

#[async_trait]
impl TokenCodec for WordCodec {
    fn name(&self) -> &str {
        "word"
    }

    async fn encode(&self, text: &str) -> Result<Vec<Token>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let mut vocabulary = self.vocabulary.lock().unwrap();
        Ok(by_word(&TextFragment::new(text, 0))
            .map(|piece| vocabulary.intern(piece.content()))
            .collect())
    }

    async fn decode(&self, tokens: &[Token]) -> Result<String> {
        let vocabulary = self.vocabulary.lock().unwrap();
        let mut out = String::new();
        for &token in tokens {
            let piece = vocabulary
                .lookup(token)
                .ok_or(CodecError::UnknownToken(token))?;
            out.push_str(piece);
        }
        Ok(out)
    }
}
