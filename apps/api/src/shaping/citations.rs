//! Citation Normalizer: uppercases dashed citation codes, e.g.
//! `[hiv-prep-elig-001]` becomes `[HIV-PREP-ELIG-001]`. Numeric citations and
//! text outside brackets are left alone.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static DASHED_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([A-Za-z0-9]+(?:-[A-Za-z0-9]+)+)\]").expect("valid citation regex")
});

pub fn normalize_citations(text: &str) -> String {
    DASHED_TOKEN
        .replace_all(text, |caps: &Captures| {
            format!("[{}]", caps[1].to_ascii_uppercase())
        })
        .into_owned()
}
