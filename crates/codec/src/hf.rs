//! A `tokenizers`-backed codec.
//!
//! Wraps a HuggingFace `tokenizers::Tokenizer` loaded from a `tokenizer.json`
//! file. Encoding and decoding are CPU-bound, so both run on the tokio
//! blocking pool; the tokenizer itself is shared behind an `Arc`.

use crate::{CodecError, Result, Token, TokenCodec};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Codec over a HuggingFace tokenizer model.
#[derive(Clone)]
pub struct HfCodec {
    name: String,
    tokenizer: Arc<Tokenizer>,
}

impl HfCodec {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| CodecError::Backend(e.to_string()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tokenizer".into());
        tracing::debug!(name, path = %path.display(), "loaded tokenizer");
        Ok(Self {
            name,
            tokenizer: Arc::new(tokenizer),
        })
    }

    /// Wrap an already-constructed tokenizer.
    pub fn new(name: impl Into<String>, tokenizer: Tokenizer) -> Self {
        Self {
            name: name.into(),
            tokenizer: Arc::new(tokenizer),
        }
    }
}

#[async_trait]
impl TokenCodec for HfCodec {
    fn name(&self) -> &str {
        &self.name
    }

    async fn encode(&self, text: &str) -> Result<Vec<Token>> {
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            tokenizer
                .encode(text, false)
                .map(|encoding| encoding.get_ids().to_vec())
                .map_err(|e| CodecError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| CodecError::Task(e.to_string()))?
    }

    async fn decode(&self, tokens: &[Token]) -> Result<String> {
        let tokenizer = Arc::clone(&self.tokenizer);
        let tokens = tokens.to_vec();
        tokio::task::spawn_blocking(move || {
            tokenizer
                .decode(&tokens, false)
                .map_err(|e| CodecError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| CodecError::Task(e.to_string()))?
    }
}
