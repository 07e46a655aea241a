//! Sentence Capper.
//!
//! Caps a reply at `max` sentences without flattening it: the budget is spent
//! paragraph by paragraph, each surviving paragraph is cut at the end of its
//! last allotted sentence, and paragraphs that get no sentences are dropped.
//!
//! A sentence is a run of non-terminator characters followed by optional
//! `.`/`!`/`?` and closing quotes. Abbreviations and decimals are not special.

use std::sync::LazyLock;

use regex::Regex;

static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[^.!?]+(?:[.!?]+["'”’)]*)?|[.!?]+["'”’)]*"#).expect("valid sentence regex")
});

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

/// End offsets of each sentence in `paragraph`, ignoring whitespace-only runs.
fn sentence_ends(paragraph: &str) -> Vec<usize> {
    SENTENCE
        .find_iter(paragraph)
        .filter(|m| !m.as_str().trim().is_empty())
        .map(|m| m.end())
        .collect()
}

pub fn cap_sentences(text: &str, max: usize) -> String {
    let mut remaining = max;
    let mut kept: Vec<&str> = Vec::new();

    for paragraph in PARAGRAPH_BREAK.split(text).map(str::trim) {
        if remaining == 0 {
            break;
        }
        let ends = sentence_ends(paragraph);
        if ends.is_empty() {
            continue;
        }

        if ends.len() <= remaining {
            kept.push(paragraph);
            remaining -= ends.len();
        } else {
            kept.push(paragraph[..ends[remaining - 1]].trim_end());
            remaining = 0;
        }
    }

    kept.join("\n\n")
}
