//! Context entries — the unit of text competing for budget.
//!
//! A [`ContextEntry`] owns its text and a [`ContextParams`] describing how it
//! wants to be trimmed and where it wants to land in the final context. The
//! compound assembly only ever talks to entries through this trait, so hosts
//! can back entries with whatever storage they like; [`StaticEntry`] is the
//! plain in-memory implementation.

use crate::error::Result;
use crate::tokenized::TokenizedAssembly;
use crate::trim::{TrimOptions, Trimmer};
use async_trait::async_trait;
use contextloom_codec::TokenCodec;
use contextloom_core::{AffixOptions, FragmentAssembly, Selection};
use serde::{Deserialize, Serialize};

/// Which end of an entry gives way when it exceeds its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimDirection {
    /// Remove text from the end, keeping the beginning.
    TrimBottom,
    /// Remove text from the beginning, keeping the end.
    TrimTop,
    /// All or nothing: the entry is included whole or not at all.
    DoNotTrim,
}

/// A text granularity, ordered from coarsest to finest.
///
/// Doubles as the unit for counting insertion positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimType {
    Newline,
    Sentence,
    Token,
}

/// Per-entry budget and placement parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParams {
    /// Most tokens this entry may occupy, before the shared budget caps it.
    pub token_budget: usize,
    /// Tokens held back from earlier insertions on this entry's behalf.
    pub reserved_tokens: usize,
    pub trim_direction: TrimDirection,
    /// Finest granularity trimming may escalate to.
    pub maximum_trim_type: TrimType,
    pub prefix: String,
    pub suffix: String,
    /// Insertion point in `insertion_type` units: `0` is the very top,
    /// negative counts from the bottom with `-1` the very bottom.
    pub insertion_position: i64,
    pub insertion_type: TrimType,
    /// Whether this entry may be placed inside another entry's text.
    pub allow_inner_insertion: bool,
    /// Whether later entries may be placed inside this entry's text.
    pub allow_insertion_inside: bool,
    /// Anchor the insertion point to an activation match instead of an
    /// absolute position.
    pub key_relative: bool,
    /// Drop `##`-prefixed lines before budgeting.
    pub strip_comments: bool,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            token_budget: 2048,
            reserved_tokens: 0,
            trim_direction: TrimDirection::TrimBottom,
            maximum_trim_type: TrimType::Sentence,
            prefix: String::new(),
            suffix: "\n".into(),
            insertion_position: -1,
            insertion_type: TrimType::Newline,
            allow_inner_insertion: true,
            allow_insertion_inside: false,
            key_relative: false,
            strip_comments: true,
        }
    }
}

/// A keyword (or other activation) match inside some already-inserted
/// entry's assembly family, used to anchor key-relative insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationHit {
    pub selection: Selection,
}

impl ActivationHit {
    pub fn new(selection: Selection) -> Self {
        Self { selection }
    }
}

/// Budget accounting snapshot of a compound assembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStats {
    pub token_budget: usize,
    pub tokens_used: usize,
    pub reserved_outstanding: usize,
}

impl BudgetStats {
    /// Tokens still open to entries holding no reservation.
    pub fn available(&self) -> usize {
        self.token_budget
            .saturating_sub(self.tokens_used)
            .saturating_sub(self.reserved_outstanding)
    }
}

/// A participant in context assembly.
#[async_trait]
pub trait ContextEntry: Send + Sync {
    /// The entry's raw text, before affixes and trimming.
    fn text(&self) -> &str;

    fn params(&self) -> &ContextParams;

    /// Activation matches against previously inserted entries. Only
    /// consulted when `params().key_relative` is set.
    fn activations(&self) -> &[ActivationHit] {
        &[]
    }

    /// The entry trimmed to fit `budget` tokens, affixes included, or `None`
    /// when nothing fits.
    async fn trimmed(
        &self,
        codec: &dyn TokenCodec,
        budget: usize,
    ) -> Result<Option<TokenizedAssembly>>;
}

/// An entry backed by an owned string.
#[derive(Debug, Clone)]
pub struct StaticEntry {
    text: String,
    params: ContextParams,
    activations: Vec<ActivationHit>,
}

impl StaticEntry {
    pub fn new(text: impl Into<String>, params: ContextParams) -> Self {
        Self {
            text: text.into(),
            params,
            activations: Vec::new(),
        }
    }

    pub fn with_activations(mut self, activations: Vec<ActivationHit>) -> Self {
        self.activations = activations;
        self
    }
}

#[async_trait]
impl ContextEntry for StaticEntry {
    fn text(&self) -> &str {
        &self.text
    }

    fn params(&self) -> &ContextParams {
        &self.params
    }

    fn activations(&self) -> &[ActivationHit] {
        &self.activations
    }

    async fn trimmed(
        &self,
        codec: &dyn TokenCodec,
        budget: usize,
    ) -> Result<Option<TokenizedAssembly>> {
        let assembly = FragmentAssembly::from_text(
            self.text.clone(),
            AffixOptions {
                prefix: self.params.prefix.clone(),
                suffix: self.params.suffix.clone(),
            },
        )?;
        let trimmer = Trimmer::new(
            assembly,
            TrimOptions {
                direction: self.params.trim_direction,
                maximum_trim_type: self.params.maximum_trim_type,
                preserve_ends: false,
                strip_comments: self.params.strip_comments,
            },
        );
        trimmer.trim(codec, budget).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_deserialize_with_defaults() {
        let params: ContextParams =
            serde_json::from_str(r#"{"token_budget": 512, "trim_direction": "trim_top"}"#)
                .unwrap();
        assert_eq!(params.token_budget, 512);
        assert_eq!(params.trim_direction, TrimDirection::TrimTop);
        assert_eq!(params.suffix, "\n");
        assert_eq!(params.insertion_position, -1);
    }

    #[test]
    fn trim_types_order_by_fineness() {
        assert!(TrimType::Newline < TrimType::Sentence);
        assert!(TrimType::Sentence < TrimType::Token);
    }

    #[test]
    fn budget_stats_available_saturates() {
        let stats = BudgetStats {
            token_budget: 100,
            tokens_used: 80,
            reserved_outstanding: 40,
        };
        assert_eq!(stats.available(), 0);
    }
}
