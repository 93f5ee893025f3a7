//! Sentence segmentation for sequential playback

use std::sync::LazyLock;

use regex::Regex;

static TERMINATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

/// Split text into sentences, keeping each terminator run attached
///
/// Sentences are trimmed and blank fragments are dropped. Trailing text
/// without a terminator becomes the last sentence.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for terminator in TERMINATOR.find_iter(text) {
        push_trimmed(&mut sentences, &text[start..terminator.end()]);
        start = terminator.end();
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, fragment: &str) {
    let fragment = fragment.trim();
    if !fragment.is_empty() {
        sentences.push(fragment.to_string());
    }
}
