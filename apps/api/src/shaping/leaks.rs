//! Leak Sanitizer: removes a mode's forbidden content from the visible reply.
//!
//! Whole JSON objects carrying `"scores"` are cut out first with a balanced
//! brace scan, so nested values go with them. Then the contract's pattern list
//! (the one the validator flags with) is applied until nothing matches, since
//! removing one match can splice text into a new one.

use tracing::debug;

use crate::contracts::ModeContract;
use crate::shaping::coach_block::balanced_object;
use crate::shaping::sanitize::tidy_whitespace;

const MAX_PASSES: usize = 8;

const SCORES_KEY: &str = "\"scores\"";

/// Removes every balanced `{...}` object that mentions `"scores"`.
fn strip_score_objects(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        match balanced_object(&rest[open..]) {
            Some((_, close)) if rest[open..=open + close].contains(SCORES_KEY) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            _ => {
                out.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn strip_leaks(reply: &str, contract: &ModeContract) -> String {
    if contract.leak_patterns.is_empty() {
        return reply.to_string();
    }

    let mut text = strip_score_objects(reply);
    for _ in 0..MAX_PASSES {
        let mut changed = false;
        for leak in &contract.leak_patterns {
            if leak.pattern.is_match(&text) {
                debug!("Stripping leak from {} reply: {}", contract.mode, leak.reason);
                text = leak.pattern.replace_all(&text, "").into_owned();
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    tidy_whitespace(&text)
}
