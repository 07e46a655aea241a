//! Coach-Block Extractor.
//!
//! Models are asked to append `<coach>{...}</coach>` after the visible reply.
//! The payload may contain nested objects and braces inside strings, so the
//! JSON is located by a balanced-brace scan instead of a regex. Extraction is
//! total: a missing or unparseable block yields `coach: None`, never an error.

use serde_json::Value;
use tracing::debug;

use crate::shaping::sanitize::sanitize;

const OPEN_TAG: &str = "<coach>";
const CLOSE_TAG: &str = "</coach>";

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Parsed coach JSON object, if one was found and parsed.
    pub coach: Option<Value>,
    /// Visible reply with the block removed, sanitized.
    pub clean: String,
}

/// Byte range `start..=end` of the first balanced `{...}` in `text`.
///
/// Braces inside JSON string literals are ignored.
pub(crate) fn balanced_object(text: &str) -> Option<(usize, usize)> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset));
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(json: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(json) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => {
            debug!("Coach block is valid JSON but not an object");
            None
        }
        Err(e) => {
            debug!("Coach block failed to parse: {}", e);
            None
        }
    }
}

/// Splits a raw completion into its visible text and the embedded coach JSON.
pub fn extract_coach(raw: &str) -> Extraction {
    let Some(open) = raw.find(OPEN_TAG) else {
        return Extraction {
            coach: None,
            clean: sanitize(raw),
        };
    };

    let head = &raw[..open];
    let rest = &raw[open + OPEN_TAG.len()..];

    let (region, after) = match rest.find(CLOSE_TAG) {
        Some(close) => (&rest[..close], &rest[close + CLOSE_TAG.len()..]),
        None => (rest, ""),
    };

    let coach = balanced_object(region).and_then(|(start, end)| parse_object(&region[start..=end]));

    let joined = [head.trim(), after.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Extraction {
        coach,
        clean: sanitize(&joined),
    }
}
