//! Fragment assemblies — `{prefix, content, suffix}` aggregates of fragments
//! with provenance tracking.
//!
//! An assembly is either a **root** (built directly from source text) or
//! **derived** from another assembly, in which case it shares the root's
//! [`SourceId`] and cursors remain safely comparable across the whole family.
//! Assemblies are immutable: every operation returns a fresh instance.
//! Expensive derived properties (`text()`, `stats()`) are computed once and
//! memoized behind `OnceLock` cells, keeping the public type immutable.

use crate::cursor::{Cursor, SourceId};
use crate::error::{AssemblyError, Result};
use crate::fragment::{TextFragment, merge_fragments};
use std::sync::Arc;
use std::sync::OnceLock;

// ── Provenance ────────────────────────────────────────────────────────────

/// Shared provenance record for a family of related assemblies.
///
/// Carries the family id plus the root assembly's own prefix/suffix, which
/// cursor relocation falls back to when a derived assembly has lost all of
/// its content.
#[derive(Debug)]
pub struct SourceRef {
    id: SourceId,
    prefix: TextFragment,
    suffix: TextFragment,
}

impl SourceRef {
    /// The family id.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// The root assembly's prefix fragment.
    pub fn prefix(&self) -> &TextFragment {
        &self.prefix
    }

    /// The root assembly's suffix fragment.
    pub fn suffix(&self) -> &TextFragment {
        &self.suffix
    }
}

// ── Supporting types ──────────────────────────────────────────────────────

/// Where a cursor lands inside an assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPosition {
    Prefix,
    Content,
    Suffix,
    /// Wrong origin, wrong cursor kind, or outside every span.
    Unrelated,
}

/// Aggregate offset statistics over an assembly's content fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyStats {
    /// Smallest fragment offset.
    pub min_offset: usize,
    /// Largest fragment end offset.
    pub max_offset: usize,
    /// Total content length in bytes (gaps excluded).
    pub concat_length: usize,
    /// True when every adjacent pair of fragments is contiguous.
    pub contiguous: bool,
}

/// Affix text for [`FragmentAssembly::from_fragments`].
#[derive(Debug, Clone, Default)]
pub struct AffixOptions {
    pub prefix: String,
    pub suffix: String,
}

/// Options for [`FragmentAssembly::from_derived`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeriveOptions {
    /// Trust the fragments to already be in order and properly coalesced;
    /// skips the contiguous-run merge pass.
    pub assume_continuity: bool,
}

/// Input to [`FragmentAssembly::from_derived`]: either an existing assembly
/// (enabling the identity fast path) or a plain run of fragments.
pub enum DeriveSource<'a> {
    Assembly(&'a FragmentAssembly),
    Fragments(Vec<TextFragment>),
}

impl<'a> From<&'a FragmentAssembly> for DeriveSource<'a> {
    fn from(assembly: &'a FragmentAssembly) -> Self {
        DeriveSource::Assembly(assembly)
    }
}

impl From<Vec<TextFragment>> for DeriveSource<'_> {
    fn from(fragments: Vec<TextFragment>) -> Self {
        DeriveSource::Fragments(fragments)
    }
}

// ── FragmentAssembly ──────────────────────────────────────────────────────

/// A `{prefix, content, suffix}` aggregate of fragments with provenance.
///
/// Invariants, enforced loudly at construction:
/// - a root assembly's prefix sits at offset 0
/// - content fragments are never empty (prefix/suffix may be)
#[derive(Debug)]
pub struct FragmentAssembly {
    prefix: TextFragment,
    content: Vec<TextFragment>,
    suffix: TextFragment,
    source: Arc<SourceRef>,
    root: bool,
    text: OnceLock<String>,
    stats: OnceLock<AssemblyStats>,
}

impl Clone for FragmentAssembly {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            content: self.content.clone(),
            suffix: self.suffix.clone(),
            source: Arc::clone(&self.source),
            root: self.root,
            text: self.text.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl PartialEq for FragmentAssembly {
    fn eq(&self, other: &Self) -> bool {
        self.source.id == other.source.id
            && self.prefix == other.prefix
            && self.content == other.content
            && self.suffix == other.suffix
    }
}

impl FragmentAssembly {
    // ── Construction ──────────────────────────────────────────────────

    /// Build a root assembly from source-text fragments.
    ///
    /// Empty fragments are filtered out of `content`. When affix text is
    /// supplied, every content fragment is shifted by the prefix length so
    /// offsets stay absolute in the combined coordinate space.
    pub fn from_fragments<I>(fragments: I, affix: AffixOptions) -> Result<Self>
    where
        I: IntoIterator<Item = TextFragment>,
    {
        let prefix = TextFragment::new(affix.prefix, 0);
        let shift = prefix.len();
        let mut content: Vec<TextFragment> = Vec::new();
        for frag in fragments {
            if frag.is_empty() {
                continue;
            }
            content.push(if shift > 0 {
                TextFragment::new(frag.content(), frag.offset() + shift)
            } else {
                frag
            });
        }
        let suffix_offset = content
            .last()
            .map(TextFragment::end_offset)
            .unwrap_or(shift);
        let suffix = TextFragment::new(affix.suffix, suffix_offset);
        let source = Arc::new(SourceRef {
            id: SourceId::next(),
            prefix: prefix.clone(),
            suffix: suffix.clone(),
        });
        Ok(Self {
            prefix,
            content,
            suffix,
            source,
            root: true,
            text: OnceLock::new(),
            stats: OnceLock::new(),
        })
    }

    /// Build a root assembly straight from a source string, treating the
    /// whole text as a single content fragment.
    pub fn from_text(text: impl Into<String>, affix: AffixOptions) -> Result<Self> {
        let text = text.into();
        let frags = if text.is_empty() {
            vec![]
        } else {
            vec![TextFragment::new(text, 0)]
        };
        Self::from_fragments(frags, affix)
    }

    /// Build an assembly derived from `origin`, sharing its source.
    ///
    /// Fast-paths to a clone when the input is already an assembly of the
    /// same family. Otherwise strips out fragments equal to the origin
    /// source's own prefix/suffix (a common artifact of iterating an
    /// assembly as a plain fragment sequence), drops empty fragments, and
    /// merges consecutive fragments that are actually contiguous.
    pub fn from_derived<'a>(
        fragments: impl Into<DeriveSource<'a>>,
        origin: &FragmentAssembly,
        options: DeriveOptions,
    ) -> Result<Self> {
        let raw: Vec<TextFragment> = match fragments.into() {
            DeriveSource::Assembly(assembly) => {
                if assembly.is_related(origin) {
                    return Ok(assembly.clone());
                }
                assembly.content.clone()
            }
            DeriveSource::Fragments(frags) => frags,
        };

        let src = origin.source();
        let mut content: Vec<TextFragment> = Vec::new();
        for frag in raw {
            if frag.is_empty() {
                continue;
            }
            if (!src.prefix.is_empty() && frag == src.prefix)
                || (!src.suffix.is_empty() && frag == src.suffix)
            {
                continue;
            }
            if !options.assume_continuity {
                if let Some(last) = content.last() {
                    if last.end_offset() == frag.offset() {
                        let merged = merge_fragments([last, &frag]).unwrap();
                        *content.last_mut().unwrap() = merged;
                        continue;
                    }
                }
            }
            content.push(frag);
        }

        Ok(Self {
            prefix: origin.prefix.clone(),
            content,
            suffix: origin.suffix.clone(),
            source: Arc::clone(&origin.source),
            root: false,
            text: OnceLock::new(),
            stats: OnceLock::new(),
        })
    }

    // ── Accessors ─────────────────────────────────────────────────────

    pub fn prefix(&self) -> &TextFragment {
        &self.prefix
    }

    pub fn content(&self) -> &[TextFragment] {
        &self.content
    }

    pub fn suffix(&self) -> &TextFragment {
        &self.suffix
    }

    /// Shared provenance record.
    pub fn source(&self) -> &Arc<SourceRef> {
        &self.source
    }

    /// The family id cursors must carry to address this assembly.
    pub fn source_id(&self) -> SourceId {
        self.source.id
    }

    /// True for assemblies built directly from source text.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// True when cursors may be compared between the two assemblies.
    pub fn is_related(&self, other: &FragmentAssembly) -> bool {
        self.source.id == other.source.id
    }

    /// True when the assembly has no content fragments.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Prefix, content fragments, then suffix, in reading order.
    pub fn fragments(&self) -> impl Iterator<Item = &TextFragment> {
        std::iter::once(&self.prefix)
            .chain(self.content.iter())
            .chain(std::iter::once(&self.suffix))
    }

    /// The concatenation of `prefix + content + suffix`, memoized.
    pub fn text(&self) -> &str {
        self.text.get_or_init(|| {
            let mut out = String::with_capacity(
                self.prefix.len()
                    + self.content.iter().map(TextFragment::len).sum::<usize>()
                    + self.suffix.len(),
            );
            for frag in self.fragments() {
                out.push_str(frag.content());
            }
            out
        })
    }

    /// Offset statistics over the content fragments, memoized.
    pub fn stats(&self) -> &AssemblyStats {
        self.stats.get_or_init(|| {
            if self.content.is_empty() {
                let at = self.prefix.end_offset();
                return AssemblyStats {
                    min_offset: at,
                    max_offset: at,
                    concat_length: 0,
                    contiguous: true,
                };
            }
            let mut contiguous = true;
            for pair in self.content.windows(2) {
                if pair[0].end_offset() != pair[1].offset() {
                    contiguous = false;
                    break;
                }
            }
            AssemblyStats {
                min_offset: self.content.first().unwrap().offset(),
                max_offset: self.content.last().unwrap().end_offset(),
                concat_length: self.content.iter().map(TextFragment::len).sum(),
                contiguous,
            }
        })
    }

    // ── Cursor conversion ─────────────────────────────────────────────

    fn check_related(&self, cursor: Cursor) -> Result<()> {
        if cursor.origin() != self.source.id {
            return Err(AssemblyError::UnrelatedCursor {
                cursor: cursor.origin(),
                assembly: self.source.id,
            });
        }
        Ok(())
    }

    fn expect_fragment_cursor(&self, cursor: Cursor) -> Result<usize> {
        self.check_related(cursor)?;
        match cursor {
            Cursor::Fragment { offset, .. } => Ok(offset),
            Cursor::FullText { .. } => Err(AssemblyError::WrongCursorKind {
                expected: "fragment",
                found: "full-text",
            }),
        }
    }

    /// Convert a fragment cursor into this assembly's full-text domain.
    ///
    /// Errors if the cursor's offset is not covered by any fragment actually
    /// present.
    pub fn to_full_text(&self, cursor: Cursor) -> Result<Cursor> {
        let offset = self.expect_fragment_cursor(cursor)?;
        let mut consumed = 0usize;
        for frag in self.fragments() {
            if !frag.is_empty() && frag.contains_offset(offset) {
                return Ok(Cursor::full_text(
                    self.source.id,
                    consumed + (offset - frag.offset()),
                ));
            }
            consumed += frag.len();
        }
        Err(AssemblyError::FragmentNotFound(offset))
    }

    /// Convert a full-text cursor back into fragment space.
    ///
    /// Offsets that fall exactly between two fragments are disambiguated by,
    /// in order: (1) between prefix and suffix with empty content, prefer the
    /// non-empty prefix, else the non-empty suffix, else the source's prefix,
    /// else offset 0; (2) between an affix and content, prefer content; (3)
    /// between two content fragments of differing wordiness, prefer the wordy
    /// one; (4) otherwise the fragment that comes first in reading order.
    pub fn from_full_text(&self, cursor: Cursor) -> Result<Cursor> {
        self.check_related(cursor)?;
        let offset = match cursor {
            Cursor::FullText { offset, .. } => offset,
            Cursor::Fragment { .. } => {
                return Err(AssemblyError::WrongCursorKind {
                    expected: "full-text",
                    found: "fragment",
                });
            }
        };
        let len = self.text().len();
        if offset > len {
            return Err(AssemblyError::FullTextOutOfBounds { offset, len });
        }

        // Collect non-empty fragments with their full-text start positions.
        let mut placed: Vec<(&TextFragment, usize, CursorPosition)> = Vec::new();
        let mut consumed = 0usize;
        let content_len = self.content.len();
        for (i, frag) in self.fragments().enumerate() {
            let kind = if i == 0 {
                CursorPosition::Prefix
            } else if i <= content_len {
                CursorPosition::Content
            } else {
                CursorPosition::Suffix
            };
            if !frag.is_empty() {
                placed.push((frag, consumed, kind));
            }
            consumed += frag.len();
        }

        let mut hits = placed
            .iter()
            .filter(|(frag, start, _)| offset >= *start && offset <= start + frag.len());

        let Some(&(first, first_start, first_kind)) = hits.next() else {
            // Everything is empty. Fall back to the source's prefix, then
            // to the zero offset.
            let src_prefix = &self.source.prefix;
            let at = if src_prefix.is_empty() {
                0
            } else {
                src_prefix.end_offset()
            };
            return Ok(Cursor::fragment(self.source.id, at));
        };

        let chosen = match hits.next() {
            None => (first, first_start),
            Some(&(second, second_start, second_kind)) => {
                let prefer_second = match (first_kind, second_kind) {
                    // Rule 1: prefix/suffix seam with no content between.
                    (CursorPosition::Prefix, CursorPosition::Suffix) => false,
                    // Rule 2: content wins over an affix.
                    (CursorPosition::Content, _) if second_kind != CursorPosition::Content => {
                        false
                    }
                    (_, CursorPosition::Content) if first_kind != CursorPosition::Content => true,
                    // Rule 3: between content fragments, prefer the wordy one.
                    (CursorPosition::Content, CursorPosition::Content)
                        if first.has_words() != second.has_words() =>
                    {
                        second.has_words()
                    }
                    // Rule 4: natural order.
                    _ => false,
                };
                if prefer_second {
                    (second, second_start)
                } else {
                    (first, first_start)
                }
            }
        };

        Ok(Cursor::fragment(
            self.source.id,
            chosen.0.offset() + (offset - chosen.1),
        ))
    }

    // ── Cursor queries ────────────────────────────────────────────────

    /// True iff the cursor's offset lands inside some fragment currently
    /// present. A cursor pointing into a gap left behind by trimming is not
    /// found.
    pub fn is_found_in(&self, cursor: Cursor) -> bool {
        if cursor.origin() != self.source.id {
            return false;
        }
        match cursor {
            Cursor::Fragment { offset, .. } => self
                .fragments()
                .any(|frag| !frag.is_empty() && frag.contains_offset(offset)),
            Cursor::FullText { offset, .. } => offset <= self.text().len(),
        }
    }

    /// Relocate a cursor to the nearest present fragment boundary if it is
    /// not found, by absolute offset distance with ties broken toward the
    /// earlier boundary.
    ///
    /// With `prefer_content`, only content fragments are considered, falling
    /// back to the source's prefix/suffix when content is empty.
    pub fn find_best(&self, cursor: Cursor, prefer_content: bool) -> Result<Cursor> {
        let offset = self.expect_fragment_cursor(cursor)?;

        let candidates: Vec<&TextFragment> = if prefer_content {
            if self.content.is_empty() {
                [&self.source.prefix, &self.source.suffix]
                    .into_iter()
                    .filter(|f| !f.is_empty())
                    .collect()
            } else {
                self.content.iter().collect()
            }
        } else {
            self.fragments().filter(|f| !f.is_empty()).collect()
        };

        if candidates.iter().any(|f| f.contains_offset(offset)) {
            return Ok(cursor);
        }
        if candidates.is_empty() {
            return Ok(Cursor::fragment(self.source.id, 0));
        }

        let mut best: Option<(usize, usize)> = None; // (position, distance)
        for frag in candidates {
            let clamped = offset.clamp(frag.offset(), frag.end_offset());
            let distance = offset.abs_diff(clamped);
            match best {
                Some((_, d)) if d <= distance => {}
                _ => best = Some((clamped, distance)),
            }
        }
        Ok(Cursor::fragment(self.source.id, best.unwrap().0))
    }

    /// Classify where a fragment cursor lands. Seam offsets resolve to
    /// content unless content is empty.
    pub fn position_of(&self, cursor: Cursor) -> CursorPosition {
        let Cursor::Fragment { origin, offset } = cursor else {
            return CursorPosition::Unrelated;
        };
        if origin != self.source.id {
            return CursorPosition::Unrelated;
        }
        if !self.content.is_empty() {
            let stats = self.stats();
            if offset >= stats.min_offset && offset <= stats.max_offset {
                return CursorPosition::Content;
            }
        }
        if !self.prefix.is_empty() && self.prefix.contains_offset(offset) {
            return CursorPosition::Prefix;
        }
        if !self.suffix.is_empty() && self.suffix.contains_offset(offset) {
            return CursorPosition::Suffix;
        }
        CursorPosition::Unrelated
    }

    /// Resolve a cursor to a position inside a present content fragment, or
    /// `None` when that is impossible. With `loose`, the cursor is first
    /// relocated via [`find_best`](Self::find_best) restricted to content.
    pub fn content_cursor_of(&self, cursor: Cursor, loose: bool) -> Result<Option<Cursor>> {
        let offset = self.expect_fragment_cursor(cursor)?;
        if self
            .content
            .iter()
            .any(|frag| frag.contains_offset(offset))
        {
            return Ok(Some(cursor));
        }
        if loose && !self.content.is_empty() {
            let best = self.find_best(cursor, true)?;
            if self
                .content
                .iter()
                .any(|frag| frag.contains_offset(best.offset()))
            {
                return Ok(Some(best));
            }
        }
        Ok(None)
    }

    // ── Manipulation ──────────────────────────────────────────────────

    /// Split the assembly in two at a content cursor.
    ///
    /// The left result keeps the original prefix and gets an empty suffix;
    /// the right result gets an empty prefix and the original suffix. The
    /// fragment straddling the cut is split at the exact offset. Returns
    /// `Ok(None)` when the cursor cannot be placed inside content.
    pub fn split_at(&self, cursor: Cursor, loose: bool) -> Result<Option<(Self, Self)>> {
        let Some(resolved) = self.content_cursor_of(cursor, loose)? else {
            return Ok(None);
        };
        let offset = resolved.offset();
        let idx = self
            .content
            .iter()
            .position(|frag| frag.contains_offset(offset))
            .expect("content cursor resolved to a present fragment");

        let mut left_frags: Vec<TextFragment> = self.content[..idx].to_vec();
        let mut right_frags: Vec<TextFragment> = Vec::with_capacity(self.content.len() - idx);
        let straddler = &self.content[idx];
        if offset == straddler.offset() {
            right_frags.push(straddler.clone());
        } else if offset == straddler.end_offset() {
            left_frags.push(straddler.clone());
        } else {
            let (l, r) = straddler.split(offset)?;
            left_frags.push(l);
            right_frags.push(r);
        }
        right_frags.extend_from_slice(&self.content[idx + 1..]);

        let left = Self {
            prefix: self.prefix.clone(),
            content: left_frags,
            suffix: TextFragment::empty(offset),
            source: Arc::clone(&self.source),
            root: false,
            text: OnceLock::new(),
            stats: OnceLock::new(),
        };
        let right = Self {
            prefix: TextFragment::empty(offset),
            content: right_frags,
            suffix: self.suffix.clone(),
            source: Arc::clone(&self.source),
            root: false,
            text: OnceLock::new(),
            stats: OnceLock::new(),
        };
        Ok(Some((left, right)))
    }

    /// A derived assembly with zero-length prefix/suffix and the same source,
    /// reusing the original fragment values when they are already empty.
    pub fn remove_affix(&self) -> Self {
        if self.prefix.is_empty() && self.suffix.is_empty() {
            return self.clone();
        }
        let prefix = if self.prefix.is_empty() {
            self.prefix.clone()
        } else {
            TextFragment::empty(self.prefix.end_offset())
        };
        let suffix = if self.suffix.is_empty() {
            self.suffix.clone()
        } else {
            TextFragment::empty(self.suffix.offset())
        };
        Self {
            prefix,
            content: self.content.clone(),
            suffix,
            source: Arc::clone(&self.source),
            root: false,
            text: OnceLock::new(),
            stats: OnceLock::new(),
        }
    }
}
