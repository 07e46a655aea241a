//! Section/Paragraph Enforcer for sales-coach replies.

use std::sync::LazyLock;

use regex::Regex;

use crate::contracts::sections::any_header_regex;

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Puts every recognized section header at the start of its own paragraph.
///
/// CRLF is normalized first; headers already preceded by a blank line are
/// left in place. Blank-line runs are collapsed afterwards and the result trimmed.
pub fn enforce_sections(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;

    for header in any_header_regex().find_iter(&text) {
        // Bare headers match from line start, including leading blanks.
        let start = header.start()
            + header.as_str().len()
            - header.as_str().trim_start_matches([' ', '\t']).len();
        let before = text[last..start].trim_end_matches([' ', '\t']);
        out.push_str(before);
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push_str(if out.ends_with('\n') { "\n" } else { "\n\n" });
        }
        last = start;
    }
    out.push_str(&text[last..]);

    EXCESS_NEWLINES.replace_all(&out, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::validator::validate_reply;
    use crate::models::mode::Mode;

    const CONTIGUOUS: &str = "Challenge: The HCP doubts renal safety.\nRep Approach:\n• Share eGFR data\n• Ask about monitoring\n• Offer a follow-up\nImpact: Builds confidence.\nSuggested Phrasing: Would a renal review help?";

    #[test]
    fn test_contiguous_sections_become_four_paragraphs() {
        let out = enforce_sections(CONTIGUOUS);
        let blocks: Vec<&str> = out.split("\n\n").collect();
        assert_eq!(blocks.len(), 4);
        assert!(blocks[0].starts_with("Challenge:"));
        assert!(blocks[1].starts_with("Rep Approach:"));
        assert!(blocks[2].starts_with("Impact:"));
        assert!(blocks[3].starts_with("Suggested Phrasing:"));
        assert!(validate_reply(&out, Mode::SalesCoach).passed);
    }

    #[test]
    fn test_inline_headers_are_split() {
        let out = enforce_sections("Challenge: X. Rep Approach: • a • b • c Impact: Y. Suggested Phrasing: Z?");
        assert_eq!(
            out,
            "Challenge: X.\n\nRep Approach: • a • b • c\n\nImpact: Y.\n\nSuggested Phrasing: Z?"
        );
    }

    #[test]
    fn test_crlf_and_blank_runs_normalized() {
        let out = enforce_sections("Challenge: X\r\n\r\n\r\n\r\nImpact: Y\r\nSuggested Phrasing: Z");
        assert_eq!(out, "Challenge: X\n\nImpact: Y\n\nSuggested Phrasing: Z");
    }

    #[test]
    fn test_already_separated_is_unchanged() {
        let text = "Challenge: X\n\nRep Approach:\n- a\n- b\n- c\n\nImpact: Y\n\nSuggested Phrasing: Z";
        assert_eq!(enforce_sections(text), text);
        assert_eq!(enforce_sections(&enforce_sections(CONTIGUOUS)), enforce_sections(CONTIGUOUS));
    }

    #[test]
    fn test_text_without_headers_only_trimmed() {
        assert_eq!(enforce_sections("  plain reply\n"), "plain reply");
    }
}
