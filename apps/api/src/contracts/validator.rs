//! Contract Validator: checks a final visible reply against its mode's contract.
//!
//! Reports the first violated rule and never repairs anything. Checks run in a
//! fixed order: sections, bullets, citations, paragraphs, leaks, closing question.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::contracts::sections::{extract_section, find_header, parse_bullets};
use crate::contracts::{CitationForm, ModeContract, SectionKey};
use crate::models::mode::Mode;

static NUMERIC_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d+\]$").expect("valid citation regex"));

static DASHED_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[[A-Z]{2,}(?:-[A-Z0-9]{2,}){1,2}-\d+\]$").expect("valid citation regex")
});

/// Bracketed tokens that look like an attempted citation.
static CITATION_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]\s]{1,64})\]").expect("valid citation regex"));

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+").expect("valid paragraph regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractViolation {
    #[error("missing required section: {}", .section.label())]
    MissingSection { section: SectionKey },

    #[error("section {} appears before the section it should follow", .section.label())]
    SectionOrder { section: SectionKey },

    #[error("expected {min}-{max} bullets in {}, found {found}", .section.label())]
    BulletCount {
        section: SectionKey,
        min: usize,
        max: usize,
        found: usize,
    },

    #[error("citations are required but none were found")]
    MissingCitations,

    #[error("malformed citation token: {token}")]
    MalformedCitations { token: String },

    #[error("reply has no paragraph breaks")]
    ParagraphCollapse,

    #[error("expected at least {required} paragraph blocks, found {found}")]
    InsufficientSections { required: usize, found: usize },

    #[error("leaked content: {reason}")]
    LeakDetected { reason: String },

    #[error("reply does not end with a reflective question")]
    MissingReflectiveQuestion,
}

impl ContractViolation {
    /// Stable error kind, e.g. `missingRepApproach` or `PARAGRAPH_COLLAPSE`.
    pub fn code(&self) -> String {
        match self {
            ContractViolation::MissingSection { section } => {
                let key = section.as_str();
                let mut chars = key.chars();
                match chars.next() {
                    Some(first) => format!("missing{}{}", first.to_ascii_uppercase(), chars.as_str()),
                    None => "missing".to_string(),
                }
            }
            ContractViolation::SectionOrder { .. } => "sectionOrder".to_string(),
            ContractViolation::BulletCount { .. } => "bulletCount".to_string(),
            ContractViolation::MissingCitations => "MISSING_CITATIONS".to_string(),
            ContractViolation::MalformedCitations { .. } => "MALFORMED_CITATIONS".to_string(),
            ContractViolation::ParagraphCollapse => "PARAGRAPH_COLLAPSE".to_string(),
            ContractViolation::InsufficientSections { .. } => "INSUFFICIENT_SECTIONS".to_string(),
            ContractViolation::LeakDetected { .. } => "LEAK_DETECTED".to_string(),
            ContractViolation::MissingReflectiveQuestion => {
                "MISSING_REFLECTIVE_QUESTION".to_string()
            }
        }
    }

    /// Section the violation is attached to, if any.
    pub fn section_key(&self) -> Option<SectionKey> {
        match self {
            ContractViolation::MissingSection { section }
            | ContractViolation::SectionOrder { section }
            | ContractViolation::BulletCount { section, .. } => Some(*section),
            _ => None,
        }
    }

    /// Violations of the reply's shape, which a rebuilt template can fix.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ContractViolation::MissingSection { .. }
                | ContractViolation::SectionOrder { .. }
                | ContractViolation::BulletCount { .. }
                | ContractViolation::ParagraphCollapse
                | ContractViolation::InsufficientSections { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ContractViolation>,
}

impl ValidationResult {
    fn pass() -> Self {
        Self {
            passed: true,
            error: None,
        }
    }

    fn fail(violation: ContractViolation) -> Self {
        Self {
            passed: false,
            error: Some(violation),
        }
    }

    pub fn error_kind(&self) -> Option<String> {
        self.error.as_ref().map(ContractViolation::code)
    }

    pub fn section_key(&self) -> Option<&'static str> {
        self.error
            .as_ref()
            .and_then(ContractViolation::section_key)
            .map(|k| k.as_str())
    }
}

/// True when `token` (brackets included) is in the canonical citation grammar.
pub fn is_canonical_citation(token: &str) -> bool {
    NUMERIC_CITATION.is_match(token) || DASHED_CITATION.is_match(token)
}

fn citation_accepted(token: &str, accepted: &[CitationForm]) -> bool {
    accepted.iter().any(|form| match form {
        CitationForm::Numeric => NUMERIC_CITATION.is_match(token),
        CitationForm::DashedCode => DASHED_CITATION.is_match(token),
    })
}

/// Bracket tokens that contain a digit or a hyphen; plain words like `[sic]`
/// are not treated as citations.
fn citation_candidates(reply: &str) -> impl Iterator<Item = &str> {
    CITATION_CANDIDATE
        .captures_iter(reply)
        .filter(|caps| {
            caps.get(1)
                .is_some_and(|inner| inner.as_str().chars().any(|c| c.is_ascii_digit() || c == '-'))
        })
        .filter_map(|caps| caps.get(0).map(|m| m.as_str()))
}

/// Every section present, with headers in contract order.
fn check_sections(reply: &str, contract: &ModeContract) -> Result<(), ContractViolation> {
    let mut positions = Vec::with_capacity(contract.sections.len());
    for spec in contract.sections {
        match find_header(reply, spec.key) {
            Some(header) => positions.push((spec.key, header.start())),
            None => return Err(ContractViolation::MissingSection { section: spec.key }),
        }
    }

    for pair in positions.windows(2) {
        let (_, previous) = pair[0];
        let (key, start) = pair[1];
        if start <= previous {
            return Err(ContractViolation::SectionOrder { section: key });
        }
    }
    Ok(())
}

fn check_bullets(reply: &str, contract: &ModeContract) -> Result<(), ContractViolation> {
    let Some(rule) = &contract.bullet_rule else {
        return Ok(());
    };
    let Some(spec) = contract.section(rule.section) else {
        return Ok(());
    };
    let Some(body) = extract_section(reply, spec) else {
        return if rule.required {
            Err(ContractViolation::MissingSection {
                section: rule.section,
            })
        } else {
            Ok(())
        };
    };

    let found = parse_bullets(body, &rule.markers).len();
    if found < rule.min_count || found > rule.max_count {
        return Err(ContractViolation::BulletCount {
            section: rule.section,
            min: rule.min_count,
            max: rule.max_count,
            found,
        });
    }
    Ok(())
}

fn check_citations(reply: &str, contract: &ModeContract) -> Result<(), ContractViolation> {
    let Some(rule) = contract.citation_rule else {
        return Ok(());
    };

    let mut seen = false;
    for token in citation_candidates(reply) {
        seen = true;
        if !citation_accepted(token, rule.accepted) {
            return Err(ContractViolation::MalformedCitations {
                token: token.to_string(),
            });
        }
    }

    if rule.required && !seen {
        return Err(ContractViolation::MissingCitations);
    }
    Ok(())
}

fn check_paragraphs(reply: &str, contract: &ModeContract) -> Result<(), ContractViolation> {
    let Some(rule) = contract.paragraph_rule else {
        return Ok(());
    };

    if !reply.contains("\n\n") {
        return Err(ContractViolation::ParagraphCollapse);
    }

    let found = PARAGRAPH_BREAK
        .split(reply)
        .filter(|block| !block.trim().is_empty())
        .count();
    if found < rule.min_blocks {
        return Err(ContractViolation::InsufficientSections {
            required: rule.min_blocks,
            found,
        });
    }
    Ok(())
}

fn check_leaks(reply: &str, contract: &ModeContract) -> Result<(), ContractViolation> {
    match contract
        .leak_patterns
        .iter()
        .find(|leak| leak.pattern.is_match(reply))
    {
        Some(leak) => Err(ContractViolation::LeakDetected {
            reason: leak.reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_closing_question(reply: &str, contract: &ModeContract) -> Result<(), ContractViolation> {
    if contract.closing_question && !reply.trim_end().ends_with('?') {
        return Err(ContractViolation::MissingReflectiveQuestion);
    }
    Ok(())
}

fn run_checks(reply: &str, contract: &ModeContract) -> Result<(), ContractViolation> {
    check_sections(reply, contract)?;
    check_bullets(reply, contract)?;
    check_citations(reply, contract)?;
    check_paragraphs(reply, contract)?;
    check_leaks(reply, contract)?;
    check_closing_question(reply, contract)
}

/// Validates `reply` against the contract of `mode`, stopping at the first failure.
pub fn validate_reply(reply: &str, mode: Mode) -> ValidationResult {
    match run_checks(reply, mode.contract()) {
        Ok(()) => ValidationResult::pass(),
        Err(violation) => ValidationResult::fail(violation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SALES_COACH: &str = "Challenge: The HCP doubts renal safety.\n\n\
        Rep Approach:\n• Share eGFR thresholds [HIV-PREP-TAF-002]\n• Ask about monitoring\n• Propose a follow-up\n\n\
        Impact: Builds confidence in the safety profile.\n\n\
        Suggested Phrasing: Would reviewing the renal data together help?";

    #[test]
    fn test_valid_sales_coach_passes() {
        let result = validate_reply(VALID_SALES_COACH, Mode::SalesCoach);
        assert!(result.passed, "{:?}", result.error);
        assert_eq!(result.error_kind(), None);
        assert_eq!(result.section_key(), None);
    }

    #[test]
    fn test_missing_section_is_named() {
        let reply = VALID_SALES_COACH.replace("Challenge:", "Context:");
        let result = validate_reply(&reply, Mode::SalesCoach);
        assert!(!result.passed);
        assert_eq!(result.error_kind().as_deref(), Some("missingChallenge"));
        assert_eq!(result.section_key(), Some("challenge"));

        let reply = VALID_SALES_COACH.replace("Rep Approach:", "Plan:");
        let result = validate_reply(&reply, Mode::SalesCoach);
        assert_eq!(result.error_kind().as_deref(), Some("missingRepApproach"));
    }

    #[test]
    fn test_sections_out_of_order_fail() {
        let reply = "Suggested Phrasing: Z?\n\nImpact: Y.\n\nChallenge: X.\n\nRep Approach:\n• a\n• b\n• c";
        let result = validate_reply(reply, Mode::SalesCoach);
        assert!(!result.passed);
        assert_eq!(result.error_kind().as_deref(), Some("sectionOrder"));
        assert_eq!(result.section_key(), Some("impact"));
        assert!(result.error.unwrap().is_structural());
    }

    #[test]
    fn test_swapped_adjacent_sections_fail() {
        let reply = VALID_SALES_COACH
            .replace("Impact:", "TMP:")
            .replace("Suggested Phrasing:", "Impact:")
            .replace("TMP:", "Suggested Phrasing:");
        let result = validate_reply(&reply, Mode::SalesCoach);
        assert_eq!(result.error_kind().as_deref(), Some("sectionOrder"));
        assert_eq!(result.section_key(), Some("suggestedPhrasing"));
    }

    #[test]
    fn test_five_bullets_fail_with_observed_count() {
        let reply = "Challenge: X\n\nRep Approach:\n• a\n• b\n• c\n• d\n• e\n\nImpact: Y\n\nSuggested Phrasing: Z";
        let result = validate_reply(reply, Mode::SalesCoach);
        assert!(!result.passed);
        assert_eq!(result.error_kind().as_deref(), Some("bulletCount"));
        assert_eq!(result.section_key(), Some("repApproach"));
        match result.error {
            Some(ContractViolation::BulletCount { found, .. }) => assert_eq!(found, 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_collapsed_reply_fails_paragraph_check() {
        let reply = "Challenge: X\nRep Approach:\n• a\n• b\n• c\nImpact: Y\nSuggested Phrasing: Z";
        let result = validate_reply(reply, Mode::SalesCoach);
        assert_eq!(result.error_kind().as_deref(), Some("PARAGRAPH_COLLAPSE"));
    }

    #[test]
    fn test_two_blocks_are_insufficient() {
        let reply = "Challenge: X\nRep Approach:\n• a\n• b\n• c\n\nImpact: Y\nSuggested Phrasing: Z";
        let result = validate_reply(reply, Mode::SalesCoach);
        assert_eq!(
            result.error,
            Some(ContractViolation::InsufficientSections {
                required: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_malformed_citation_is_flagged() {
        let result = validate_reply("Dosing is weight based [hiv-prep-elig-001].", Mode::ProductKnowledge);
        assert_eq!(result.error_kind().as_deref(), Some("MALFORMED_CITATIONS"));

        let result = validate_reply("See [ABC-12].", Mode::ProductKnowledge);
        assert_eq!(result.error_kind().as_deref(), Some("MALFORMED_CITATIONS"));
    }

    #[test]
    fn test_canonical_citations_pass() {
        let reply = "Efficacy improved [1]. Renal data [HIV-PREP-TAF-002] and [HIV-PREP-ABC-123]. Note [sic].";
        assert!(validate_reply(reply, Mode::ProductKnowledge).passed);
    }

    #[test]
    fn test_is_canonical_citation() {
        assert!(is_canonical_citation("[12]"));
        assert!(is_canonical_citation("[CV-SGLT2-HF-001]"));
        assert!(is_canonical_citation("[ONC-ADC-CHEMO-002]"));
        assert!(!is_canonical_citation("[cv-sglt2-hf-001]"));
        assert!(!is_canonical_citation("[ONC-ADC-VS-CHEMO-002]"));
        assert!(!is_canonical_citation("[HIV]"));
    }

    #[test]
    fn test_role_play_leak_detected() {
        let result = validate_reply(
            "I check renal function first. Suggested Phrasing: ask about adherence.",
            Mode::RolePlay,
        );
        assert_eq!(result.error_kind().as_deref(), Some("LEAK_DETECTED"));
        assert!(validate_reply("I check renal function first.", Mode::RolePlay).passed);
    }

    #[test]
    fn test_emotional_assessment_requires_question() {
        let result = validate_reply("You sounded rushed in that exchange.", Mode::EmotionalAssessment);
        assert_eq!(
            result.error_kind().as_deref(),
            Some("MISSING_REFLECTIVE_QUESTION")
        );
        assert!(validate_reply("What did you notice about your tone?  ", Mode::EmotionalAssessment).passed);
    }

    #[test]
    fn test_general_knowledge_has_no_rules() {
        assert!(validate_reply("Anything goes [lower-case-1]", Mode::GeneralKnowledge).passed);
    }

    #[test]
    fn test_structural_classification() {
        assert!(ContractViolation::ParagraphCollapse.is_structural());
        assert!(ContractViolation::MissingSection {
            section: SectionKey::Impact
        }
        .is_structural());
        assert!(!ContractViolation::MissingReflectiveQuestion.is_structural());
        assert!(!ContractViolation::MalformedCitations {
            token: "[x-1]".to_string()
        }
        .is_structural());
    }

    #[test]
    fn test_violation_serializes_with_kind_tag() {
        let json = serde_json::to_value(ContractViolation::BulletCount {
            section: SectionKey::RepApproach,
            min: 3,
            max: 3,
            found: 5,
        })
        .unwrap();
        assert_eq!(json["kind"], "bullet_count");
        assert_eq!(json["section"], "repApproach");
        assert_eq!(json["found"], 5);
    }
}
