//! Pure splitting functions over text fragments.
//!
//! Every splitter produces a **lazy, finite, restartable** iterator of
//! sub-fragments whose concatenation (in original order) reconstructs the
//! input exactly, each annotated with its true absolute offset. Splitters
//! never yield empty fragments.
//!
//! Granularities:
//!
//! - [`by_line`] / [`by_line_from_end`] — newlines are their own
//!   one-character fragments, so blank lines stay representable and prunable
//! - [`by_sentence`] — sentence bodies vs. inter-sentence whitespace
//! - [`by_word`] — word tokens vs. runs of non-word characters

use crate::fragment::{TextFragment, is_quote_char, is_terminal_char};

/// Split on `\n`, yielding each newline as its own one-character fragment.
pub fn by_line(fragment: &TextFragment) -> ByLine<'_> {
    ByLine {
        content: fragment.content(),
        base: fragment.offset(),
        pos: 0,
    }
}

/// Iterator returned by [`by_line`].
#[derive(Debug, Clone)]
pub struct ByLine<'a> {
    content: &'a str,
    base: usize,
    pos: usize,
}

impl Iterator for ByLine<'_> {
    type Item = TextFragment;

    fn next(&mut self) -> Option<TextFragment> {
        let rest = &self.content[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let start = self.pos;
        let len = if rest.as_bytes()[0] == b'\n' {
            1
        } else {
            rest.find('\n').unwrap_or(rest.len())
        };
        self.pos += len;
        Some(TextFragment::new(
            &rest[..len],
            self.base + start,
        ))
    }
}

/// Same fragments as [`by_line`], produced from the end backward.
///
/// Uses bounded-size lookback windows instead of a full reverse scan, so a
/// huge text does not require materializing the whole split. The output is
/// exactly `by_line(fragment)` reversed.
pub fn by_line_from_end(fragment: &TextFragment) -> ByLineFromEnd<'_> {
    ByLineFromEnd {
        content: fragment.content(),
        base: fragment.offset(),
        end: fragment.len(),
        buffered: Vec::new(),
    }
}

/// Iterator returned by [`by_line_from_end`].
#[derive(Debug, Clone)]
pub struct ByLineFromEnd<'a> {
    content: &'a str,
    base: usize,
    end: usize,
    /// Fragments of the current window, stored in forward order and popped
    /// from the back.
    buffered: Vec<TextFragment>,
}

impl ByLineFromEnd<'_> {
    /// Lookback window size in bytes. Windows only grow past this when a
    /// single line is longer than the window.
    const LOOKBACK: usize = 4096;

    fn refill(&mut self) {
        if self.end == 0 {
            return;
        }
        let bytes = self.content.as_bytes();
        let mut start = self.end.saturating_sub(Self::LOOKBACK);
        while !self.content.is_char_boundary(start) {
            start -= 1;
        }
        // Walk the window start forward to a safe cut: position 0, a
        // position right after a newline, or the newline itself. A cut
        // before a newline is safe because the partial line ahead of it
        // stays whole in the next (earlier) window.
        loop {
            if start == 0 || bytes[start - 1] == b'\n' {
                break;
            }
            if let Some(found) = self.content[start..self.end].find('\n') {
                start += found;
                break;
            }
            // One line longer than the window: look further back.
            start = start.saturating_sub(Self::LOOKBACK);
            while !self.content.is_char_boundary(start) {
                start -= 1;
            }
        }
        let window = TextFragment::new(&self.content[start..self.end], self.base + start);
        self.buffered.extend(by_line(&window));
        self.end = start;
    }
}

impl Iterator for ByLineFromEnd<'_> {
    type Item = TextFragment;

    fn next(&mut self) -> Option<TextFragment> {
        if self.buffered.is_empty() {
            self.refill();
        }
        self.buffered.pop()
    }
}

/// Split into sentences.
///
/// Yields alternating sentence fragments and inter-sentence whitespace
/// fragments. A sentence ends at a run of terminal punctuation, with any
/// trailing punctuation and trailing quote characters merged onto the
/// sentence body.
///
/// Known limitations, accepted rather than fixed: nested quoted sentences
/// split at the inner terminator, and ellipses *after* the terminating
/// punctuation attach to the wrong side. Downstream consumers rely on the
/// current split points.
pub fn by_sentence(fragment: &TextFragment) -> BySentence<'_> {
    BySentence {
        content: fragment.content(),
        base: fragment.offset(),
        pos: 0,
    }
}

/// Iterator returned by [`by_sentence`].
#[derive(Debug, Clone)]
pub struct BySentence<'a> {
    content: &'a str,
    base: usize,
    pos: usize,
}

impl Iterator for BySentence<'_> {
    type Item = TextFragment;

    fn next(&mut self) -> Option<TextFragment> {
        let rest = &self.content[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let start = self.pos;
        let first = rest.chars().next().unwrap();

        let len = if first.is_whitespace() {
            // Inter-sentence whitespace run.
            rest.find(|c: char| !c.is_whitespace()).unwrap_or(rest.len())
        } else {
            // Sentence body: scan to a terminal-punctuation run, absorb it
            // plus trailing quotes, then stop if whitespace or end follows.
            let mut chars = rest.char_indices().peekable();
            let mut len = rest.len();
            while let Some((idx, ch)) = chars.next() {
                if !is_terminal_char(ch) {
                    continue;
                }
                let mut end = idx + ch.len_utf8();
                while let Some(&(next_idx, next_ch)) = chars.peek() {
                    if is_terminal_char(next_ch) || is_quote_char(next_ch) {
                        end = next_idx + next_ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                match chars.peek() {
                    None => {
                        len = end;
                        break;
                    }
                    Some(&(_, next_ch)) if next_ch.is_whitespace() => {
                        len = end;
                        break;
                    }
                    _ => {} // mid-token punctuation ("3.5", "e.g.x"), keep going
                }
            }
            len
        };

        self.pos += len;
        Some(TextFragment::new(&rest[..len], self.base + start))
    }
}

/// Split into word tokens and runs of non-word characters.
///
/// Contractions ("don't") count as a single word. A `\n` is always isolated
/// into its own fragment, even inside a longer non-word run.
pub fn by_word(fragment: &TextFragment) -> ByWord<'_> {
    ByWord {
        content: fragment.content(),
        base: fragment.offset(),
        pos: 0,
    }
}

fn is_word_start(ch: char) -> bool {
    ch.is_alphanumeric()
}

/// Iterator returned by [`by_word`].
#[derive(Debug, Clone)]
pub struct ByWord<'a> {
    content: &'a str,
    base: usize,
    pos: usize,
}

impl Iterator for ByWord<'_> {
    type Item = TextFragment;

    fn next(&mut self) -> Option<TextFragment> {
        let rest = &self.content[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let start = self.pos;
        let first = rest.chars().next().unwrap();

        let len = if first == '\n' {
            1
        } else if is_word_start(first) {
            // Word run; an apostrophe joins the word only when flanked by
            // word characters on both sides.
            let mut len = rest.len();
            let mut chars = rest.char_indices().peekable();
            while let Some((idx, ch)) = chars.next() {
                if ch.is_alphanumeric() {
                    continue;
                }
                if matches!(ch, '\'' | '\u{2019}') {
                    if let Some(&(_, next_ch)) = chars.peek() {
                        if next_ch.is_alphanumeric() {
                            continue;
                        }
                    }
                }
                len = idx;
                break;
            }
            len
        } else {
            // Non-word run, stopping at any word character or newline.
            rest.find(|c: char| is_word_start(c) || c == '\n')
                .unwrap_or(rest.len())
        };

        self.pos += len;
        Some(TextFragment::new(&rest[..len], self.base + start))
    }
}
