//! Budget-driven trimming.
//!
//! The search is coarse to fine: whole newline-separated pieces are fed to a
//! streaming encoder until the budget overflows, then only the overflowing
//! chunk is re-split at the next finer granularity and encoding resumes from
//! the last fitting emission. Text that already fit is never re-encoded.

use crate::entry::{TrimDirection, TrimType};
use crate::error::Result;
use crate::tokenized::TokenizedAssembly;
use crate::trim::encoder::{EncodeDirection, EncodeResult, StreamEncoder};
use crate::trim::provider::preprocess;
use crate::trim::sequencer::Sequencer;
use contextloom_codec::TokenCodec;
use contextloom_core::{AffixOptions, DeriveOptions, FragmentAssembly, TextFragment};
use tracing::debug;

/// How a [`Trimmer`] carves up its assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimOptions {
    pub direction: TrimDirection,
    /// Finest granularity the search may escalate to.
    pub maximum_trim_type: TrimType,
    /// Keep wordless fragments at the trimmed edges instead of dropping
    /// them.
    pub preserve_ends: bool,
    pub strip_comments: bool,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self {
            direction: TrimDirection::TrimBottom,
            maximum_trim_type: TrimType::Token,
            preserve_ends: false,
            strip_comments: false,
        }
    }
}

/// Everything one level of the search produced.
struct LevelRun {
    /// Emissions in order; at most the final one exceeds the budget.
    emissions: Vec<EncodeResult>,
}

/// Feed `pieces` through one encoder level, stopping after the first
/// over-budget emission. `seed` resumes from a previous emission.
async fn run_level(
    codec: &dyn TokenCodec,
    direction: EncodeDirection,
    affix: &AffixOptions,
    sequencer: &Sequencer,
    pieces: &[TextFragment],
    seed: Option<&EncodeResult>,
    budget: usize,
    preserve_ends: bool,
) -> Result<LevelRun> {
    let mut encoder = match seed {
        Some(prior) => {
            StreamEncoder::seed(codec, direction, affix, sequencer.buffer_size(), prior).await?
        }
        None => StreamEncoder::new(codec, direction, affix, sequencer.buffer_size()),
    };
    let mut emissions = Vec::new();
    for (i, piece) in pieces.iter().enumerate() {
        let last = i + 1 == pieces.len() && (preserve_ends || piece.has_words());
        if let Some(result) = encoder.feed(piece, last).await? {
            let over = result.tokens.len() > budget;
            emissions.push(result);
            if over {
                break;
            }
        }
    }
    Ok(LevelRun { emissions })
}

/// Descend through the finer levels of `chain` over `chunk` (the fragments
/// fed since the last fitting emission, in feed order), returning the best
/// fitting emission found.
async fn refine(
    codec: &dyn TokenCodec,
    direction: EncodeDirection,
    affix: &AffixOptions,
    chain: &[Sequencer],
    mut chunk: Vec<TextFragment>,
    mut last_good: Option<EncodeResult>,
    budget: usize,
    reversed: bool,
    preserve_ends: bool,
) -> Result<Option<EncodeResult>> {
    for sequencer in chain {
        let pieces: Vec<TextFragment> = chunk
            .iter()
            .flat_map(|frag| sequencer.split(frag, reversed))
            .collect();
        let run = run_level(
            codec,
            direction,
            affix,
            sequencer,
            &pieces,
            last_good.as_ref(),
            budget,
            preserve_ends,
        )
        .await?;
        let mut over = None;
        for emission in run.emissions {
            if emission.tokens.len() <= budget {
                last_good = Some(emission);
            } else {
                over = Some(emission);
                break;
            }
        }
        let Some(over) = over else {
            break;
        };
        let start = last_good.as_ref().map(|g| g.fragments.len()).unwrap_or(0);
        chunk = over.fragments[start..].to_vec();
    }
    Ok(last_good)
}

fn affix_of(assembly: &FragmentAssembly) -> AffixOptions {
    AffixOptions {
        prefix: assembly.prefix().content().to_string(),
        suffix: assembly.suffix().content().to_string(),
    }
}

fn finalize(
    origin: &FragmentAssembly,
    good: Option<EncodeResult>,
    reversed: bool,
) -> Result<Option<TokenizedAssembly>> {
    let Some(good) = good else {
        return Ok(None);
    };
    let mut kept = good.fragments;
    if reversed {
        kept.reverse();
    }
    if kept.is_empty() {
        return Ok(None);
    }
    let derived = FragmentAssembly::from_derived(kept, origin, DeriveOptions::default())?;
    Ok(Some(TokenizedAssembly::from_parts(derived, good.tokens)))
}

/// One-shot trimmer over a single assembly.
#[derive(Debug, Clone)]
pub struct Trimmer {
    assembly: FragmentAssembly,
    options: TrimOptions,
}

impl Trimmer {
    pub fn new(assembly: FragmentAssembly, options: TrimOptions) -> Self {
        Self { assembly, options }
    }

    pub fn assembly(&self) -> &FragmentAssembly {
        &self.assembly
    }

    /// Trim to at most `budget` tokens, affixes included. Returns `None`
    /// when not even the first piece fits.
    pub async fn trim(
        &self,
        codec: &dyn TokenCodec,
        budget: usize,
    ) -> Result<Option<TokenizedAssembly>> {
        if self.options.direction == TrimDirection::DoNotTrim {
            return self.trim_whole(codec, budget).await;
        }
        let content = preprocess(&self.assembly, self.options.strip_comments);
        if content.is_empty() {
            return Ok(None);
        }
        let reversed = self.options.direction == TrimDirection::TrimTop;
        let direction = if reversed {
            EncodeDirection::Prepend
        } else {
            EncodeDirection::Append
        };
        let affix = affix_of(&self.assembly);
        let chain = Sequencer::chain(self.options.maximum_trim_type);

        let pieces = initial_pieces(
            &chain[0],
            &content,
            reversed,
            self.options.preserve_ends,
        );
        let run = run_level(
            codec,
            direction,
            &affix,
            &chain[0],
            &pieces,
            None,
            budget,
            self.options.preserve_ends,
        )
        .await?;
        let mut last_good = None;
        let mut over = None;
        for emission in run.emissions {
            if emission.tokens.len() <= budget {
                last_good = Some(emission);
            } else {
                over = Some(emission);
                break;
            }
        }
        if let Some(over) = over {
            let start = last_good.as_ref().map(|g| g.fragments.len()).unwrap_or(0);
            let chunk = over.fragments[start..].to_vec();
            debug!(
                budget,
                kept = start,
                chunk = chunk.len(),
                "budget overflow, escalating granularity"
            );
            last_good = refine(
                codec,
                direction,
                &affix,
                &chain[1..],
                chunk,
                last_good,
                budget,
                reversed,
                self.options.preserve_ends,
            )
            .await?;
        }
        finalize(&self.assembly, last_good, reversed)
    }

    /// The all-or-nothing path: encode everything, compare once.
    async fn trim_whole(
        &self,
        codec: &dyn TokenCodec,
        budget: usize,
    ) -> Result<Option<TokenizedAssembly>> {
        let content = preprocess(&self.assembly, self.options.strip_comments);
        if content.is_empty() {
            return Ok(None);
        }
        let derived =
            FragmentAssembly::from_derived(content, &self.assembly, DeriveOptions::default())?;
        let tokens = codec.encode(derived.text()).await?;
        if tokens.len() > budget {
            debug!(budget, need = tokens.len(), "untrimmable entry over budget");
            return Ok(None);
        }
        Ok(Some(TokenizedAssembly::from_parts(derived, tokens)))
    }
}

/// Level-0 pieces in feed order, with leading wordless pieces skipped when
/// the edges are not preserved.
fn initial_pieces(
    sequencer: &Sequencer,
    content: &[TextFragment],
    reversed: bool,
    preserve_ends: bool,
) -> Vec<TextFragment> {
    let mut pieces: Vec<TextFragment> = if reversed {
        content
            .iter()
            .rev()
            .flat_map(|frag| sequencer.split(frag, true))
            .collect()
    } else {
        content
            .iter()
            .flat_map(|frag| sequencer.split(frag, false))
            .collect()
    };
    if !preserve_ends {
        let skip = pieces.iter().take_while(|p| !p.has_words()).count();
        pieces.drain(..skip);
    }
    pieces
}

// ── ReplayTrimmer ─────────────────────────────────────────────────────────

#[derive(Default)]
struct ReplayCache {
    /// Coarsest-level emissions, in feed order.
    emissions: Vec<EncodeResult>,
    /// Every coarse piece has been fed; nothing more will ever emit.
    exhausted: bool,
}

/// A trimmer that caches its coarse encoding pass across calls.
///
/// Context assembly trims the same large entry repeatedly at shrinking
/// budgets while other entries claim their share. The replay trimmer keeps
/// every coarse-level emission; a later call replays the cache against the
/// new budget and only encodes text past the last cached emission, or
/// descends into finer granularities, both seeded from cached state.
pub struct ReplayTrimmer {
    assembly: FragmentAssembly,
    options: TrimOptions,
    cache: tokio::sync::Mutex<ReplayCache>,
}

impl ReplayTrimmer {
    pub fn new(assembly: FragmentAssembly, options: TrimOptions) -> Self {
        Self {
            assembly,
            options,
            cache: tokio::sync::Mutex::new(ReplayCache::default()),
        }
    }

    pub fn assembly(&self) -> &FragmentAssembly {
        &self.assembly
    }

    /// Drop all cached encoder state, e.g. after the underlying codec
    /// changes.
    pub async fn release(&self) {
        let mut cache = self.cache.lock().await;
        cache.emissions.clear();
        cache.exhausted = false;
    }

    /// Same contract as [`Trimmer::trim`], reusing cached coarse emissions.
    pub async fn trim(
        &self,
        codec: &dyn TokenCodec,
        budget: usize,
    ) -> Result<Option<TokenizedAssembly>> {
        if self.options.direction == TrimDirection::DoNotTrim {
            return Trimmer::new(self.assembly.clone(), self.options)
                .trim(codec, budget)
                .await;
        }
        let content = preprocess(&self.assembly, self.options.strip_comments);
        if content.is_empty() {
            return Ok(None);
        }
        let reversed = self.options.direction == TrimDirection::TrimTop;
        let direction = if reversed {
            EncodeDirection::Prepend
        } else {
            EncodeDirection::Append
        };
        let affix = affix_of(&self.assembly);
        let chain = Sequencer::chain(self.options.maximum_trim_type);

        let mut cache = self.cache.lock().await;

        // Replay what we already know against the new budget.
        let mut last_good: Option<EncodeResult> = None;
        let mut over: Option<EncodeResult> = None;
        for emission in &cache.emissions {
            if emission.tokens.len() <= budget {
                last_good = Some(emission.clone());
            } else {
                over = Some(emission.clone());
                break;
            }
        }

        if over.is_none() && !cache.exhausted {
            let pieces = initial_pieces(
                &chain[0],
                &content,
                reversed,
                self.options.preserve_ends,
            );
            let fed = cache
                .emissions
                .last()
                .map(|e| e.fragments.len())
                .unwrap_or(0);
            debug!(cached = cache.emissions.len(), fed, "resuming coarse pass");
            let run = run_level(
                codec,
                direction,
                &affix,
                &chain[0],
                &pieces[fed..],
                cache.emissions.last(),
                budget,
                self.options.preserve_ends,
            )
            .await?;
            for emission in run.emissions {
                let fits = emission.tokens.len() <= budget;
                cache.emissions.push(emission.clone());
                if fits {
                    last_good = Some(emission);
                } else {
                    over = Some(emission);
                    break;
                }
            }
            if over.is_none() {
                cache.exhausted = true;
            }
        }
        drop(cache);

        if let Some(over) = over {
            let start = last_good.as_ref().map(|g| g.fragments.len()).unwrap_or(0);
            let chunk = over.fragments[start..].to_vec();
            last_good = refine(
                codec,
                direction,
                &affix,
                &chain[1..],
                chunk,
                last_good,
                budget,
                reversed,
                self.options.preserve_ends,
            )
            .await?;
        }
        finalize(&self.assembly, last_good, reversed)
    }
}

// ── Character-budget variant ──────────────────────────────────────────────

/// Trim by character count instead of tokens; no codec involved.
///
/// Same search shape as [`Trimmer::trim`] with exact lengths, so there is
/// no volatile window and no resumable state to manage.
pub fn trim_by_length(
    assembly: &FragmentAssembly,
    options: &TrimOptions,
    max_chars: usize,
) -> Result<Option<FragmentAssembly>> {
    let content = preprocess(assembly, options.strip_comments);
    if content.is_empty() {
        return Ok(None);
    }
    let affix_len = assembly.prefix().len() + assembly.suffix().len();
    if options.direction == TrimDirection::DoNotTrim {
        let total: usize = affix_len + content.iter().map(TextFragment::len).sum::<usize>();
        if total > max_chars {
            return Ok(None);
        }
        let derived = FragmentAssembly::from_derived(content, assembly, DeriveOptions::default())?;
        return Ok(Some(derived));
    }

    let reversed = options.direction == TrimDirection::TrimTop;
    let chain = Sequencer::chain(options.maximum_trim_type);

    let mut kept: Vec<TextFragment> = Vec::new();
    let mut kept_len = affix_len;
    let mut chunk = content;
    for (level, sequencer) in chain.iter().enumerate() {
        let pieces = if level == 0 {
            initial_pieces(sequencer, &chunk, reversed, options.preserve_ends)
        } else {
            chunk
                .iter()
                .flat_map(|frag| sequencer.split(frag, reversed))
                .collect()
        };
        let mut pending: Vec<TextFragment> = Vec::new();
        let mut pending_len = 0usize;
        let mut over: Option<Vec<TextFragment>> = None;
        for (i, piece) in pieces.iter().enumerate() {
            pending_len += piece.len();
            pending.push(piece.clone());
            let last = i + 1 == pieces.len() && (options.preserve_ends || piece.has_words());
            if !piece.has_words() && !last {
                continue;
            }
            if kept_len + pending_len <= max_chars {
                kept_len += pending_len;
                pending_len = 0;
                kept.append(&mut pending);
            } else {
                over = Some(std::mem::take(&mut pending));
                break;
            }
        }
        match over {
            None => break,
            Some(chunk_pieces) => chunk = chunk_pieces,
        }
    }
    if kept.is_empty() {
        return Ok(None);
    }
    if reversed {
        kept.reverse();
    }
    let derived = FragmentAssembly::from_derived(kept, assembly, DeriveOptions::default())?;
    Ok(Some(derived))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextloom_codec::WordCodec;

    fn assembly(text: &str) -> FragmentAssembly {
        FragmentAssembly::from_text(text, AffixOptions::default()).unwrap()
    }

    fn options(direction: TrimDirection) -> TrimOptions {
        TrimOptions {
            direction,
            ..TrimOptions::default()
        }
    }

    #[tokio::test]
    async fn trims_bottom_at_word_granularity() {
        let codec = WordCodec::new();
        let trimmer = Trimmer::new(
            assembly("alpha one\nbeta two\ngamma three"),
            options(TrimDirection::TrimBottom),
        );
        let trimmed = trimmer.trim(&codec, 5).await.unwrap().unwrap();
        assert_eq!(trimmed.text(), "alpha one\nbeta");
        assert_eq!(trimmed.token_count(), 5);
    }

    #[tokio::test]
    async fn trims_top_keeps_tail() {
        let codec = WordCodec::new();
        let trimmer = Trimmer::new(
            assembly("alpha one\nbeta two\ngamma three"),
            options(TrimDirection::TrimTop),
        );
        let trimmed = trimmer.trim(&codec, 3).await.unwrap().unwrap();
        assert_eq!(trimmed.text(), "gamma three");
    }

    #[tokio::test]
    async fn larger_budget_keeps_at_least_as_much() {
        let codec = WordCodec::new();
        let source = assembly("alpha one\nbeta two\ngamma three\ndelta four");
        let mut previous = 0;
        for budget in [2usize, 5, 8, 11, 15, 100] {
            let trimmer = Trimmer::new(source.clone(), options(TrimDirection::TrimBottom));
            let kept = match trimmer.trim(&codec, budget).await.unwrap() {
                Some(trimmed) => trimmed.text().len(),
                None => 0,
            };
            assert!(kept >= previous, "budget {budget} kept less than a smaller budget");
            previous = kept;
        }
    }

    #[tokio::test]
    async fn nothing_fits_is_none() {
        let codec = WordCodec::new();
        let trimmer = Trimmer::new(
            assembly("several words here"),
            options(TrimDirection::TrimBottom),
        );
        assert!(trimmer.trim(&codec, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn do_not_trim_is_all_or_nothing() {
        let codec = WordCodec::new();
        let trimmer = Trimmer::new(
            assembly("one two three"),
            options(TrimDirection::DoNotTrim),
        );
        // "one two three" is five word-codec tokens.
        assert!(trimmer.trim(&codec, 4).await.unwrap().is_none());
        let whole = trimmer.trim(&codec, 5).await.unwrap().unwrap();
        assert_eq!(whole.text(), "one two three");
    }

    #[tokio::test]
    async fn affixes_count_against_the_budget() {
        let codec = WordCodec::new();
        let asm = FragmentAssembly::from_text(
            "word",
            AffixOptions {
                prefix: "a very long prefix that costs plenty ".into(),
                suffix: String::new(),
            },
        )
        .unwrap();
        let trimmer = Trimmer::new(asm, options(TrimDirection::TrimBottom));
        assert!(trimmer.trim(&codec, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn trailing_separators_dropped_unless_preserved() {
        let codec = WordCodec::new();
        let trimmer = Trimmer::new(assembly("alpha\n\n"), options(TrimDirection::TrimBottom));
        let trimmed = trimmer.trim(&codec, 10).await.unwrap().unwrap();
        assert_eq!(trimmed.text(), "alpha");

        let preserving = Trimmer::new(
            assembly("alpha\n\n"),
            TrimOptions {
                preserve_ends: true,
                ..options(TrimDirection::TrimBottom)
            },
        );
        let trimmed = preserving.trim(&codec, 10).await.unwrap().unwrap();
        assert_eq!(trimmed.text(), "alpha\n\n");
    }

    #[tokio::test]
    async fn strips_comments_before_budgeting() {
        let codec = WordCodec::new();
        let trimmer = Trimmer::new(
            assembly("## a comment to skip\nLine A\nLine B"),
            TrimOptions {
                strip_comments: true,
                ..options(TrimDirection::TrimBottom)
            },
        );
        let trimmed = trimmer.trim(&codec, 100).await.unwrap().unwrap();
        assert_eq!(trimmed.text(), "Line A\nLine B");
    }

    #[tokio::test]
    async fn maximum_trim_type_caps_escalation() {
        let codec = WordCodec::new();
        let trimmer = Trimmer::new(
            assembly("alpha one\nbeta two"),
            TrimOptions {
                maximum_trim_type: TrimType::Newline,
                ..options(TrimDirection::TrimBottom)
            },
        );
        // Budget 5 would fit "alpha one\nbeta" at word granularity, but
        // newline granularity cannot cut inside the second line.
        let trimmed = trimmer.trim(&codec, 5).await.unwrap().unwrap();
        assert_eq!(trimmed.text(), "alpha one");
    }

    #[tokio::test]
    async fn replay_matches_one_shot_across_budgets() {
        let codec = WordCodec::new();
        let source = assembly("alpha one\nbeta two\ngamma three\ndelta four");
        let replay = ReplayTrimmer::new(source.clone(), options(TrimDirection::TrimBottom));
        for budget in [100usize, 11, 5, 2, 7] {
            let fresh = Trimmer::new(source.clone(), options(TrimDirection::TrimBottom));
            let expected = fresh
                .trim(&codec, budget)
                .await
                .unwrap()
                .map(|t| t.text().to_string());
            let cached = replay
                .trim(&codec, budget)
                .await
                .unwrap()
                .map(|t| t.text().to_string());
            assert_eq!(cached, expected, "budget {budget}");
        }
    }

    #[tokio::test]
    async fn replay_release_clears_state() {
        let codec = WordCodec::new();
        let replay = ReplayTrimmer::new(
            assembly("alpha one\nbeta two"),
            options(TrimDirection::TrimBottom),
        );
        let before = replay.trim(&codec, 3).await.unwrap().unwrap();
        replay.release().await;
        let after = replay.trim(&codec, 3).await.unwrap().unwrap();
        assert_eq!(before.text(), after.text());
    }

    #[test]
    fn trim_by_length_respects_char_budget() {
        let asm = assembly("aaaa bbbb\ncccc");
        let opts = options(TrimDirection::TrimBottom);
        let trimmed = trim_by_length(&asm, &opts, 9).unwrap().unwrap();
        assert_eq!(trimmed.text(), "aaaa bbbb");
        assert!(trim_by_length(&asm, &opts, 3).unwrap().is_none());
        let whole = trim_by_length(&asm, &opts, 100).unwrap().unwrap();
        assert_eq!(whole.text(), "aaaa bbbb\ncccc");
    }

    #[test]
    fn trim_by_length_from_top() {
        let asm = assembly("aaaa\nbbbb\ncccc");
        let opts = options(TrimDirection::TrimTop);
        let trimmed = trim_by_length(&asm, &opts, 4).unwrap().unwrap();
        assert_eq!(trimmed.text(), "cccc");
    }
}
