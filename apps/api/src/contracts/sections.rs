//! Relaxed section-header matching, labeled-section extraction and bullet parsing.
//!
//! Headers match case-insensitively with a trailing `:` or ` - `, or bare when
//! the label stands alone on its own line.

use std::sync::LazyLock;

use regex::{Match, Regex};

use crate::contracts::{SectionKey, SectionSpec};

fn label_pattern(key: SectionKey) -> String {
    key.label()
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

fn header_pattern(labels: &str) -> String {
    format!(r"(?im)(?:\b(?:{labels})[ \t]*(?::|-[ \t])|^[ \t]*(?:{labels})[ \t]*$)")
}

static HEADER_REGEXES: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    SectionKey::ALL.map(|key| {
        Regex::new(&header_pattern(&label_pattern(key))).expect("valid header regex")
    })
});

static ANY_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let labels = SectionKey::ALL
        .iter()
        .map(|k| label_pattern(*k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&header_pattern(&labels)).expect("valid header regex")
});

/// Regex matching the header of one section.
pub fn header_regex(key: SectionKey) -> &'static Regex {
    let index = match key {
        SectionKey::Challenge => 0,
        SectionKey::RepApproach => 1,
        SectionKey::Impact => 2,
        SectionKey::SuggestedPhrasing => 3,
    };
    &HEADER_REGEXES[index]
}

/// Regex matching any of the four sales-coach headers.
pub fn any_header_regex() -> &'static Regex {
    &ANY_HEADER_REGEX
}

/// First occurrence of a section header in `text`.
pub fn find_header(text: &str, key: SectionKey) -> Option<Match<'_>> {
    header_regex(key).find(text)
}

/// Body of a labeled section: everything after its header up to the earliest
/// header listed in `spec.next`, trimmed. `None` if the header is absent.
pub fn extract_section<'a>(text: &'a str, spec: &SectionSpec) -> Option<&'a str> {
    let header = find_header(text, spec.key)?;
    let after = &text[header.end()..];

    let end = spec
        .next
        .iter()
        .filter_map(|next| find_header(after, *next).map(|m| m.start()))
        .min()
        .unwrap_or(after.len());

    Some(after[..end].trim())
}

/// Compiled bullet markers for one bullet rule.
///
/// `N.` stands for a numbered item (`1.` or `1)`). Dashes and numbers only
/// count at the start of a line; the other markers also split inline lists.
#[derive(Debug, Clone)]
pub struct BulletMarkers {
    line: Regex,
    leading: Regex,
    inline: Option<Regex>,
}

impl BulletMarkers {
    pub fn new(markers: &[&str]) -> Self {
        let alternatives = markers
            .iter()
            .map(|m| match *m {
                "N." => r"\d+[.)]".to_string(),
                other => regex::escape(other),
            })
            .collect::<Vec<_>>()
            .join("|");

        let inline_chars: String = markers
            .iter()
            .filter(|m| **m != "N." && **m != "-")
            .map(|m| regex::escape(m))
            .collect();
        let inline = (!inline_chars.is_empty()).then(|| {
            Regex::new(&format!(r"[{inline_chars}]\s*([^{inline_chars}]*)"))
                .expect("valid inline bullet regex")
        });

        Self {
            line: Regex::new(&format!(r"^(?:{alternatives})\s*(.+)$")).expect("valid bullet regex"),
            leading: Regex::new(&format!(r"^(?:{alternatives})\s*")).expect("valid marker regex"),
            inline,
        }
    }
}

/// Splits a section body into bullet items.
///
/// Line-start markers win when they yield at least three items; otherwise
/// semicolon-separated items, then inline markers.
pub fn parse_bullets(body: &str, markers: &BulletMarkers) -> Vec<String> {
    let line_bullets: Vec<String> = body
        .lines()
        .map(str::trim)
        .filter_map(|line| markers.line.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|item| !item.is_empty())
        .collect();

    if line_bullets.len() >= 3 {
        return line_bullets;
    }

    if body.contains(';') {
        let items: Vec<String> = body
            .split(';')
            .map(|part| markers.leading.replace(part.trim(), "").trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.len() >= 3 {
            return items;
        }
    }

    let inline: Vec<String> = match &markers.inline {
        Some(inline) => inline
            .captures_iter(body)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
            .filter(|item| !item.is_empty())
            .collect(),
        None => Vec::new(),
    };

    if !inline.is_empty() {
        return inline;
    }

    line_bullets
}
