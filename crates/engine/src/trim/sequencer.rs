//! Granularity sequencers for the coarse-to-fine trim search.
//!
//! Each sequencer pairs a splitter granularity with the streaming-encoder
//! buffer size appropriate to it: newline pieces are long, so a larger
//! volatile window amortizes better; sentence and word pieces re-tokenize
//! less text per emission.

use crate::entry::TrimType;
use contextloom_core::{TextFragment, by_line, by_line_from_end, by_sentence, by_word};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Sequencer {
    granularity: TrimType,
    buffer_size: usize,
}

impl Sequencer {
    /// The escalation chain, coarsest first, truncated at `maximum`.
    pub(crate) fn chain(maximum: TrimType) -> Vec<Sequencer> {
        [
            Sequencer {
                granularity: TrimType::Newline,
                buffer_size: 10,
            },
            Sequencer {
                granularity: TrimType::Sentence,
                buffer_size: 5,
            },
            Sequencer {
                granularity: TrimType::Token,
                buffer_size: 5,
            },
        ]
        .into_iter()
        .filter(|s| s.granularity <= maximum)
        .collect()
    }

    /// A standalone sequencer for one granularity, used for insertion-point
    /// counting.
    pub(crate) fn single(granularity: TrimType) -> Sequencer {
        Sequencer {
            granularity,
            buffer_size: 5,
        }
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Split one fragment into pieces at this granularity. With `reversed`
    /// the pieces come out in reverse reading order; the newline granularity
    /// uses the bounded-lookback reverse splitter so huge fragments are not
    /// materialized up front.
    pub(crate) fn split(&self, fragment: &TextFragment, reversed: bool) -> Vec<TextFragment> {
        match self.granularity {
            TrimType::Newline => {
                if reversed {
                    by_line_from_end(fragment).collect()
                } else {
                    by_line(fragment).collect()
                }
            }
            TrimType::Sentence => {
                let mut pieces: Vec<_> = by_sentence(fragment).collect();
                if reversed {
                    pieces.reverse();
                }
                pieces
            }
            TrimType::Token => {
                let mut pieces: Vec<_> = by_word(fragment).collect();
                if reversed {
                    pieces.reverse();
                }
                pieces
            }
        }
    }
}
