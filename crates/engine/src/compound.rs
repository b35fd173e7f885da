//! Compound assemblies — the shared context under construction.
//!
//! A compound assembly holds an ordered sequence of slots, one per inserted
//! (piece of an) entry, plus the token array for the whole context. Entries
//! are inserted one at a time; each insertion trims the entry to the budget
//! left over, places it by its insertion parameters, and re-mends the token
//! array at the new seams only. The report returned for every insertion says
//! exactly what happened, including rejections, which are outcomes rather
//! than errors.

use crate::entry::{BudgetStats, ContextEntry, ContextParams, TrimType};
use crate::error::{EngineError, Result};
use crate::tokenized::TokenizedAssembly;
use crate::trim::Sequencer;
use contextloom_codec::{MEND_WINDOW, MendSection, Token, TokenCodec};
use contextloom_core::{AffixOptions, Cursor, FragmentAssembly, SourceId, TextFragment};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Why an insertion produced no slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The shared budget left nothing for this entry.
    NoBudget,
    /// Trimming could not fit any part of the entry.
    NoFit,
    /// Key-relative insertion found no activation match among the slots.
    NoAnchor,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectionReason::NoBudget => "no budget",
            RejectionReason::NoFit => "nothing fit",
            RejectionReason::NoAnchor => "no anchor",
        })
    }
}

/// What an insertion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionOutcome {
    /// First slot of an empty compound.
    Initial,
    /// Placed inside the target slot, splitting it.
    Inside,
    /// Placed immediately before the target slot.
    Before,
    /// Placed immediately after the target slot.
    After,
    /// Wanted inside the target but was moved to its start.
    ShuntedTop,
    /// Wanted inside the target but was moved past its end.
    ShuntedBottom,
    Rejected(RejectionReason),
}

impl fmt::Display for InsertionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertionOutcome::Initial => f.write_str("initial"),
            InsertionOutcome::Inside => f.write_str("inside"),
            InsertionOutcome::Before => f.write_str("before"),
            InsertionOutcome::After => f.write_str("after"),
            InsertionOutcome::ShuntedTop => f.write_str("shunted to top"),
            InsertionOutcome::ShuntedBottom => f.write_str("shunted to bottom"),
            InsertionOutcome::Rejected(reason) => write!(f, "rejected ({reason})"),
        }
    }
}

/// The record of one insertion attempt.
#[derive(Debug, Clone, Serialize)]
pub struct InsertionReport {
    pub outcome: InsertionOutcome,
    /// The slot the placement was relative to.
    pub target: Option<SourceId>,
    /// Family id of the newly inserted slot, when one was created. Hosts use
    /// this to build activation hits for later key-relative entries.
    pub inserted: Option<SourceId>,
    /// Net growth of the context token array.
    pub tokens_used: usize,
    /// How far (in bytes) a disallowed inner insertion was moved.
    pub shunted_chars: usize,
}

impl InsertionReport {
    fn rejected(reason: RejectionReason) -> Self {
        Self {
            outcome: InsertionOutcome::Rejected(reason),
            target: None,
            inserted: None,
            tokens_used: 0,
            shunted_chars: 0,
        }
    }
}

struct Slot {
    assembly: TokenizedAssembly,
    source: SourceId,
    allow_insertion_inside: bool,
}

enum Placement {
    Before(usize),
    After(usize),
    Inside { slot: usize, offset: usize },
}

fn placement_at(slot: usize, offset: usize, len: usize) -> Placement {
    if offset == 0 {
        Placement::Before(slot)
    } else if offset >= len {
        Placement::After(slot)
    } else {
        Placement::Inside { slot, offset }
    }
}

/// The context under construction. See the module docs.
pub struct CompoundAssembly {
    codec: Arc<dyn TokenCodec>,
    token_budget: usize,
    tokens: Vec<Token>,
    slots: Vec<Slot>,
    reserved_outstanding: usize,
    reports: Vec<InsertionReport>,
}

impl CompoundAssembly {
    pub fn new(codec: Arc<dyn TokenCodec>, token_budget: usize) -> Self {
        Self {
            codec,
            token_budget,
            tokens: Vec::new(),
            slots: Vec::new(),
            reserved_outstanding: 0,
            reports: Vec::new(),
        }
    }

    /// Hold `tokens` back from the shared budget for an entry that inserts
    /// later. The reservation is released when that entry's insertion runs.
    pub fn reserve(&mut self, tokens: usize) {
        self.reserved_outstanding += tokens;
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The whole context text, slot texts in order.
    pub fn text(&self) -> String {
        self.slots.iter().map(|s| s.assembly.text()).collect()
    }

    /// Every insertion report so far, in insertion order.
    pub fn reports(&self) -> &[InsertionReport] {
        &self.reports
    }

    fn record(&mut self, report: InsertionReport) -> InsertionReport {
        self.reports.push(report.clone());
        report
    }

    pub fn budget_stats(&self) -> BudgetStats {
        BudgetStats {
            token_budget: self.token_budget,
            tokens_used: self.tokens.len(),
            reserved_outstanding: self.reserved_outstanding,
        }
    }

    /// Tokens this entry may claim: its own cap, limited by what is left
    /// once other entries' outstanding reservations are honored. An entry
    /// may always use its own reservation, as far as tokens remain at all.
    fn budget_for(&self, params: &ContextParams, own_reservation: usize) -> usize {
        let available = self.token_budget.saturating_sub(self.tokens.len());
        let unreserved = available.saturating_sub(self.reserved_outstanding);
        params
            .token_budget
            .min(unreserved.max(own_reservation.min(available)))
    }

    /// Trim `entry` to the remaining budget and place it.
    pub async fn insert(&mut self, entry: &dyn ContextEntry) -> Result<InsertionReport> {
        let params = entry.params().clone();
        let own_reservation = params.reserved_tokens.min(self.reserved_outstanding);
        self.reserved_outstanding -= own_reservation;

        let budget = self.budget_for(&params, own_reservation);
        if budget == 0 {
            debug!(outcome = "rejected", reason = "no budget", "insertion");
            return Ok(self.record(InsertionReport::rejected(RejectionReason::NoBudget)));
        }
        let Some(trimmed) = entry.trimmed(self.codec.as_ref(), budget).await? else {
            debug!(budget, outcome = "rejected", reason = "no fit", "insertion");
            return Ok(self.record(InsertionReport::rejected(RejectionReason::NoFit)));
        };
        if trimmed.text().is_empty() {
            return Ok(self.record(InsertionReport::rejected(RejectionReason::NoFit)));
        }

        let before_len = self.tokens.len();
        let source = trimmed.assembly().source_id();
        let slot = Slot {
            assembly: trimmed,
            source,
            allow_insertion_inside: params.allow_insertion_inside,
        };

        // The first entry always lands whole; anchors only matter once
        // there is something to anchor to.
        if self.slots.is_empty() {
            self.slots.push(slot);
            self.remend().await?;
            debug!(outcome = "initial", tokens = self.tokens.len(), "insertion");
            return Ok(self.record(InsertionReport {
                outcome: InsertionOutcome::Initial,
                target: None,
                inserted: Some(source),
                tokens_used: self.tokens.len().saturating_sub(before_len),
                shunted_chars: 0,
            }));
        }

        let placement = if params.key_relative {
            match self.locate_key_relative(entry, &params) {
                Some(placement) => placement,
                None => {
                    debug!(outcome = "rejected", reason = "no anchor", "insertion");
                    return Ok(self.record(InsertionReport::rejected(RejectionReason::NoAnchor)));
                }
            }
        } else if params.insertion_position >= 0 {
            self.locate_from_top(params.insertion_position as usize, params.insertion_type)
        } else {
            self.locate_from_bottom(
                (-params.insertion_position - 1) as usize,
                params.insertion_type,
            )
        };

        let (outcome, target, shunted_chars) = match placement {
            Placement::Before(i) => {
                let target = self.slots[i].source;
                self.slots.insert(i, slot);
                (InsertionOutcome::Before, target, 0)
            }
            Placement::After(i) => {
                let target = self.slots[i].source;
                self.slots.insert(i + 1, slot);
                (InsertionOutcome::After, target, 0)
            }
            Placement::Inside { slot: i, offset } => {
                let target = self.slots[i].source;
                let allowed = params.allow_inner_insertion && self.slots[i].allow_insertion_inside;
                let split = if allowed {
                    let host = self.slots[i].assembly.clone();
                    let inner = host.assembly();
                    let cursor =
                        inner.from_full_text(Cursor::full_text(inner.source_id(), offset))?;
                    host.split_at(self.codec.as_ref(), cursor, true).await?
                } else {
                    None
                };
                match split {
                    Some((left, right)) => {
                        let host_allows = self.slots[i].allow_insertion_inside;
                        self.slots.splice(
                            i..=i,
                            [
                                Slot {
                                    assembly: left,
                                    source: target,
                                    allow_insertion_inside: host_allows,
                                },
                                slot,
                                Slot {
                                    assembly: right,
                                    source: target,
                                    allow_insertion_inside: host_allows,
                                },
                            ],
                        );
                        (InsertionOutcome::Inside, target, 0)
                    }
                    None => self.shunt(i, offset, slot)?,
                }
            }
        };

        self.remend().await?;
        debug!(
            outcome = %outcome,
            tokens = self.tokens.len(),
            shunted_chars,
            "insertion"
        );
        Ok(self.record(InsertionReport {
            outcome,
            target: Some(target),
            inserted: Some(source),
            tokens_used: self.tokens.len().saturating_sub(before_len),
            shunted_chars,
        }))
    }

    /// The finished context as one root assembly plus its tokens.
    pub fn finish(&self) -> Result<TokenizedAssembly> {
        let assembly = FragmentAssembly::from_text(self.text(), AffixOptions::default())?;
        Ok(TokenizedAssembly::from_parts(assembly, self.tokens.clone()))
    }

    /// Move a disallowed (or unsplittable) inner insertion to the nearest
    /// edge of the target slot; ties go to the top.
    fn shunt(
        &mut self,
        i: usize,
        offset: usize,
        slot: Slot,
    ) -> Result<(InsertionOutcome, SourceId, usize)> {
        let len = self.slots[i].assembly.text().len();
        let target = self.slots[i].source;
        if offset > len {
            return Err(EngineError::InsertionDiverged(format!(
                "shunt offset {offset} beyond slot text length {len}"
            )));
        }
        let to_start = offset;
        let to_end = len - offset;
        if to_start <= to_end {
            self.slots.insert(i, slot);
            Ok((InsertionOutcome::ShuntedTop, target, to_start))
        } else {
            self.slots.insert(i + 1, slot);
            Ok((InsertionOutcome::ShuntedBottom, target, to_end))
        }
    }

    async fn remend(&mut self) -> Result<()> {
        let sections: Vec<MendSection> = self
            .slots
            .iter()
            .map(|s| MendSection::Tokens(s.assembly.tokens().to_vec()))
            .collect();
        self.tokens = self.codec.mend_tokens(&sections, MEND_WINDOW).await?;
        Ok(())
    }

    // ── Placement ─────────────────────────────────────────────────────

    /// Walk down from the very top, consuming `units` wordy pieces of the
    /// insertion granularity; the cut lands at the start of the next wordy
    /// piece so separators stay attached to the text above them.
    fn locate_from_top(&self, mut units: usize, granularity: TrimType) -> Placement {
        if units == 0 {
            return Placement::Before(0);
        }
        let sequencer = Sequencer::single(granularity);
        for (i, slot) in self.slots.iter().enumerate() {
            let frag = TextFragment::new(slot.assembly.text(), 0);
            let mut cut: Option<usize> = None;
            for piece in sequencer.split(&frag, false) {
                if cut.is_some() {
                    if piece.has_words() {
                        return Placement::Inside {
                            slot: i,
                            offset: piece.offset(),
                        };
                    }
                    continue;
                }
                if piece.has_words() {
                    units -= 1;
                    if units == 0 {
                        cut = Some(piece.end_offset());
                    }
                }
            }
            if cut.is_some() {
                return Placement::After(i);
            }
        }
        Placement::After(self.slots.len() - 1)
    }

    /// Walk up from the very bottom; `units == 0` is the bottom itself, and
    /// each consumed wordy piece moves the cut to that piece's start.
    fn locate_from_bottom(&self, mut units: usize, granularity: TrimType) -> Placement {
        let last = self.slots.len() - 1;
        if units == 0 {
            return Placement::After(last);
        }
        let sequencer = Sequencer::single(granularity);
        for (i, slot) in self.slots.iter().enumerate().rev() {
            let frag = TextFragment::new(slot.assembly.text(), 0);
            for piece in sequencer.split(&frag, false).iter().rev() {
                if piece.has_words() {
                    units -= 1;
                    if units == 0 {
                        return if piece.offset() == 0 {
                            Placement::Before(i)
                        } else {
                            Placement::Inside {
                                slot: i,
                                offset: piece.offset(),
                            }
                        };
                    }
                }
            }
        }
        Placement::Before(0)
    }

    /// Anchor on an activation match inside an already-inserted slot,
    /// searching slots from the end the insertion position counts toward.
    /// A hit whose matched span survived trimming anchors exactly; when no
    /// slot still contains a match, the nearest surviving content of a
    /// matching family is used instead.
    fn locate_key_relative(
        &self,
        entry: &dyn ContextEntry,
        params: &ContextParams,
    ) -> Option<Placement> {
        let order: Vec<usize> = if params.insertion_position < 0 {
            (0..self.slots.len()).rev().collect()
        } else {
            (0..self.slots.len()).collect()
        };
        for exact in [true, false] {
            for &i in &order {
                let inner = self.slots[i].assembly.assembly();
                for hit in entry.activations() {
                    if hit.selection.origin() != self.slots[i].source {
                        continue;
                    }
                    if exact && !inner.is_found_in(hit.selection.start()) {
                        continue;
                    }
                    let Ok(best) = inner.find_best(hit.selection.start(), true) else {
                        continue;
                    };
                    let Ok(full) = inner.to_full_text(best) else {
                        continue;
                    };
                    return Some(self.offset_within_slot(
                        i,
                        full.offset(),
                        params.insertion_position,
                        params.insertion_type,
                    ));
                }
            }
        }
        None
    }

    /// Consume `position` granularity units away from `anchor` (a full-text
    /// offset inside slot `i`), carrying any remaining units into the
    /// neighboring slots the same way the absolute walks do.
    fn offset_within_slot(
        &self,
        i: usize,
        anchor: usize,
        position: i64,
        granularity: TrimType,
    ) -> Placement {
        if position == 0 {
            return placement_at(i, anchor, self.slots[i].assembly.text().len());
        }
        let sequencer = Sequencer::single(granularity);
        if position > 0 {
            let mut units = position as usize;
            for (j, slot) in self.slots.iter().enumerate().skip(i) {
                let frag = TextFragment::new(slot.assembly.text(), 0);
                let mut cut = false;
                for piece in sequencer.split(&frag, false) {
                    if j == i && piece.end_offset() <= anchor {
                        continue;
                    }
                    if cut {
                        if piece.has_words() {
                            return placement_at(j, piece.offset(), frag.len());
                        }
                        continue;
                    }
                    if piece.has_words() {
                        units -= 1;
                        if units == 0 {
                            cut = true;
                        }
                    }
                }
                if cut {
                    return Placement::After(j);
                }
            }
            Placement::After(self.slots.len() - 1)
        } else {
            let mut units = (-position) as usize;
            for (j, slot) in self.slots.iter().enumerate().take(i + 1).rev() {
                let frag = TextFragment::new(slot.assembly.text(), 0);
                for piece in sequencer.split(&frag, false).iter().rev() {
                    if j == i && piece.offset() >= anchor {
                        continue;
                    }
                    if piece.has_words() {
                        units -= 1;
                        if units == 0 {
                            return placement_at(j, piece.offset(), frag.len());
                        }
                    }
                }
            }
            Placement::Before(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{ActivationHit, StaticEntry, TrimType};
    use contextloom_codec::WordCodec;
    use contextloom_core::Selection;

    fn compound(budget: usize) -> CompoundAssembly {
        CompoundAssembly::new(Arc::new(WordCodec::new()), budget)
    }

    fn params(suffix: &str) -> ContextParams {
        ContextParams {
            suffix: suffix.into(),
            maximum_trim_type: TrimType::Token,
            ..ContextParams::default()
        }
    }

    #[tokio::test]
    async fn zero_budget_rejects_without_tokenizing() {
        let mut ctx = compound(0);
        let entry = StaticEntry::new("hello world", params(""));
        let report = ctx.insert(&entry).await.unwrap();
        assert_eq!(
            report.outcome,
            InsertionOutcome::Rejected(RejectionReason::NoBudget)
        );
        assert_eq!(report.tokens_used, 0);
        assert_eq!(ctx.token_count(), 0);
    }

    #[tokio::test]
    async fn first_insertion_is_initial() {
        let mut ctx = compound(100);
        let entry = StaticEntry::new("First line", params(""));
        let report = ctx.insert(&entry).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::Initial);
        assert!(report.inserted.is_some());
        assert_eq!(ctx.text(), "First line");
        assert_eq!(report.tokens_used, ctx.token_count());
    }

    #[tokio::test]
    async fn every_attempt_is_logged_in_order() {
        let mut ctx = compound(3);
        ctx.insert(&StaticEntry::new("one two three", params("")))
            .await
            .unwrap();
        ctx.insert(&StaticEntry::new("four", params("")))
            .await
            .unwrap();
        let outcomes: Vec<_> = ctx.reports().iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                InsertionOutcome::Initial,
                InsertionOutcome::Rejected(RejectionReason::NoBudget),
            ]
        );
    }

    #[tokio::test]
    async fn absolute_positions_top_and_bottom() {
        let mut ctx = compound(100);
        ctx.insert(&StaticEntry::new("middle", params("\n")))
            .await
            .unwrap();
        let top = StaticEntry::new(
            "top",
            ContextParams {
                insertion_position: 0,
                ..params("\n")
            },
        );
        let report = ctx.insert(&top).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::Before);
        let bottom = StaticEntry::new(
            "bottom",
            ContextParams {
                insertion_position: -1,
                ..params("\n")
            },
        );
        let report = ctx.insert(&bottom).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::After);
        assert_eq!(ctx.text(), "top\nmiddle\nbottom\n");
    }

    #[tokio::test]
    async fn context_tokens_always_decode_to_context_text() {
        let codec: Arc<dyn TokenCodec> = Arc::new(WordCodec::new());
        let mut ctx = CompoundAssembly::new(Arc::clone(&codec), 100);
        for (text, position) in [("alpha one", -1), ("beta two", 0), ("gamma three", -2)] {
            let entry = StaticEntry::new(
                text,
                ContextParams {
                    insertion_position: position,
                    ..params("\n")
                },
            );
            ctx.insert(&entry).await.unwrap();
            let decoded = codec.decode(ctx.tokens()).await.unwrap();
            assert_eq!(decoded, ctx.text());
        }
    }

    #[tokio::test]
    async fn inner_insertion_splits_the_host() {
        let mut ctx = compound(100);
        let host = StaticEntry::new(
            "top part\nbottom part",
            ContextParams {
                allow_insertion_inside: true,
                ..params("")
            },
        );
        ctx.insert(&host).await.unwrap();
        let mid = StaticEntry::new(
            "mid",
            ContextParams {
                insertion_position: 1,
                ..params("\n")
            },
        );
        let report = ctx.insert(&mid).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::Inside);
        assert_eq!(ctx.text(), "top part\nmid\nbottom part");
        assert_eq!(ctx.slot_count(), 3);
    }

    #[tokio::test]
    async fn disallowed_inner_insertion_shunts_to_nearest_edge() {
        let mut ctx = compound(100);
        // Default params forbid insertion inside.
        ctx.insert(&StaticEntry::new("top part\nbottom part", params("")))
            .await
            .unwrap();
        let mid = StaticEntry::new(
            "mid",
            ContextParams {
                insertion_position: 1,
                ..params("\n")
            },
        );
        let report = ctx.insert(&mid).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::ShuntedTop);
        assert_eq!(report.shunted_chars, 9);
        assert_eq!(ctx.text(), "mid\ntop part\nbottom part");
    }

    #[tokio::test]
    async fn key_relative_without_anchor_rejects() {
        let mut ctx = compound(100);
        ctx.insert(&StaticEntry::new("some text", params("\n")))
            .await
            .unwrap();
        let entry = StaticEntry::new(
            "keyed",
            ContextParams {
                key_relative: true,
                ..params("\n")
            },
        );
        let report = ctx.insert(&entry).await.unwrap();
        assert_eq!(
            report.outcome,
            InsertionOutcome::Rejected(RejectionReason::NoAnchor)
        );
    }

    #[tokio::test]
    async fn key_relative_inserts_at_the_match() {
        let mut ctx = compound(100);
        let host = StaticEntry::new(
            "alpha beta gamma",
            ContextParams {
                allow_insertion_inside: true,
                ..params("")
            },
        );
        let host_report = ctx.insert(&host).await.unwrap();
        let family = host_report.inserted.unwrap();

        let hit = ActivationHit::new(
            Selection::collapsed(Cursor::fragment(family, 6)).unwrap(),
        );
        let keyed = StaticEntry::new(
            "B",
            ContextParams {
                key_relative: true,
                insertion_position: 0,
                ..params("\n")
            },
        )
        .with_activations(vec![hit]);
        let report = ctx.insert(&keyed).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::Inside);
        assert_eq!(report.target, Some(family));
        assert_eq!(ctx.text(), "alpha B\nbeta gamma");
    }

    #[tokio::test]
    async fn key_relative_first_entry_is_initial() {
        let mut ctx = compound(100);
        let entry = StaticEntry::new(
            "keyed text",
            ContextParams {
                key_relative: true,
                ..params("\n")
            },
        );
        let report = ctx.insert(&entry).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::Initial);
        assert_eq!(ctx.text(), "keyed text\n");
    }

    #[tokio::test]
    async fn key_relative_offset_walks_into_the_next_slot() {
        let mut ctx = compound(100);
        let first = ctx
            .insert(&StaticEntry::new("alpha\nbeta", params("\n")))
            .await
            .unwrap();
        let family = first.inserted.unwrap();
        ctx.insert(&StaticEntry::new(
            "gamma\ndelta",
            ContextParams {
                allow_insertion_inside: true,
                ..params("\n")
            },
        ))
        .await
        .unwrap();

        // Anchor at the top of the first slot, three newline units down:
        // two lines of the first slot, one of the second.
        let hit = ActivationHit::new(Selection::collapsed(Cursor::fragment(family, 0)).unwrap());
        let keyed = StaticEntry::new(
            "KEYED",
            ContextParams {
                key_relative: true,
                insertion_position: 3,
                ..params("\n")
            },
        )
        .with_activations(vec![hit]);
        let report = ctx.insert(&keyed).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::Inside);
        assert_eq!(ctx.text(), "alpha\nbeta\ngamma\nKEYED\ndelta\n");
    }

    #[tokio::test]
    async fn key_relative_anchors_in_the_surviving_half() {
        let mut ctx = compound(100);
        let host = StaticEntry::new(
            "alpha beta gamma",
            ContextParams {
                allow_insertion_inside: true,
                ..params("")
            },
        );
        let family = ctx.insert(&host).await.unwrap().inserted.unwrap();

        // Split the host so both halves carry the same family id.
        let hit = ActivationHit::new(Selection::collapsed(Cursor::fragment(family, 6)).unwrap());
        let first = StaticEntry::new(
            "B",
            ContextParams {
                key_relative: true,
                insertion_position: 0,
                ..params("\n")
            },
        )
        .with_activations(vec![hit]);
        ctx.insert(&first).await.unwrap();
        assert_eq!(ctx.text(), "alpha B\nbeta gamma");

        // The match at "gamma" lives in the right half; the anchor must
        // land there, not in the earlier half of the same family.
        let hit = ActivationHit::new(Selection::collapsed(Cursor::fragment(family, 11)).unwrap());
        let second = StaticEntry::new(
            "G",
            ContextParams {
                key_relative: true,
                insertion_position: 0,
                ..params("\n")
            },
        )
        .with_activations(vec![hit]);
        let report = ctx.insert(&second).await.unwrap();
        assert_eq!(report.outcome, InsertionOutcome::Inside);
        assert_eq!(ctx.text(), "alpha B\nbeta G\ngamma");
    }

    #[tokio::test]
    async fn budget_is_shared_across_insertions() {
        let mut ctx = compound(5);
        let report = ctx
            .insert(&StaticEntry::new(
                "alpha one\nbeta two\ngamma three",
                params(""),
            ))
            .await
            .unwrap();
        assert_eq!(report.outcome, InsertionOutcome::Initial);
        assert!(ctx.token_count() <= 5);
        let second = ctx
            .insert(&StaticEntry::new("more words arriving", params("")))
            .await
            .unwrap();
        assert!(matches!(second.outcome, InsertionOutcome::Rejected(_)));
        assert!(ctx.token_count() <= 5);
    }

    #[tokio::test]
    async fn reservations_are_honored_then_released() {
        let mut ctx = compound(10);
        ctx.reserve(4);
        // The first entry may only use the unreserved share.
        ctx.insert(&StaticEntry::new("alpha one beta two", params("")))
            .await
            .unwrap();
        assert!(ctx.token_count() <= 6);
        let reserved = StaticEntry::new(
            "one two three four five",
            ContextParams {
                reserved_tokens: 4,
                ..params("")
            },
        );
        let report = ctx.insert(&reserved).await.unwrap();
        assert!(!matches!(report.outcome, InsertionOutcome::Rejected(_)));
        assert_eq!(ctx.budget_stats().reserved_outstanding, 0);
        assert!(ctx.token_count() <= 10);
    }

    #[tokio::test]
    async fn finish_produces_a_consistent_assembly() {
        let codec: Arc<dyn TokenCodec> = Arc::new(WordCodec::new());
        let mut ctx = CompoundAssembly::new(Arc::clone(&codec), 100);
        ctx.insert(&StaticEntry::new("one two", params("\n")))
            .await
            .unwrap();
        ctx.insert(&StaticEntry::new("three four", params("\n")))
            .await
            .unwrap();
        let finished = ctx.finish().unwrap();
        assert_eq!(finished.text(), ctx.text());
        assert_eq!(
            codec.decode(finished.tokens()).await.unwrap(),
            finished.text()
        );
    }

    #[test]
    fn outcomes_render_for_logs() {
        assert_eq!(InsertionOutcome::Initial.to_string(), "initial");
        assert_eq!(
            InsertionOutcome::Rejected(RejectionReason::NoFit).to_string(),
            "rejected (nothing fit)"
        );
    }
}
