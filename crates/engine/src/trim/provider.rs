//! Fragment preparation ahead of trimming.
//!
//! Comment stripping removes whole `##`-prefixed lines together with the
//! newline that follows them, so the surrounding lines join up cleanly.

use contextloom_core::{FragmentAssembly, TextFragment, by_line};

/// The content fragments of `assembly`, with comment lines removed when
/// `strip_comments` is set.
pub(super) fn preprocess(assembly: &FragmentAssembly, strip_comments: bool) -> Vec<TextFragment> {
    if !strip_comments {
        return assembly.content().to_vec();
    }
    let mut out = Vec::new();
    let mut eat_newline = false;
    for fragment in assembly.content() {
        for piece in by_line(fragment) {
            if eat_newline {
                eat_newline = false;
                if piece.content() == "\n" {
                    continue;
                }
            }
            if piece.content().starts_with("##") {
                eat_newline = true;
                continue;
            }
            out.push(piece);
        }
    }
    out
}
