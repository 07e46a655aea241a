//! Mode Contract Registry: the declarative output rules each mode's reply must satisfy.
//!
//! One immutable `ModeContract` per mode, built once on first use and never
//! mutated. Lookup is an exhaustive match on `Mode`, so adding a mode without
//! a contract does not compile.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::contracts::sections::BulletMarkers;
use crate::models::mode::Mode;

pub mod sections;
pub mod validator;

// ────────────────────────────────────────────────────────────────────────────
// Contract building blocks
// ────────────────────────────────────────────────────────────────────────────

/// The four sales-coach sections, in their required order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionKey {
    Challenge,
    RepApproach,
    Impact,
    SuggestedPhrasing,
}

impl SectionKey {
    pub const ALL: [SectionKey; 4] = [
        SectionKey::Challenge,
        SectionKey::RepApproach,
        SectionKey::Impact,
        SectionKey::SuggestedPhrasing,
    ];

    /// Key used in validation results, e.g. `repApproach`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Challenge => "challenge",
            SectionKey::RepApproach => "repApproach",
            SectionKey::Impact => "impact",
            SectionKey::SuggestedPhrasing => "suggestedPhrasing",
        }
    }

    /// Human-readable header label without punctuation.
    pub fn label(&self) -> &'static str {
        match self {
            SectionKey::Challenge => "Challenge",
            SectionKey::RepApproach => "Rep Approach",
            SectionKey::Impact => "Impact",
            SectionKey::SuggestedPhrasing => "Suggested Phrasing",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub key: SectionKey,
    /// Headers allowed to follow this one; they terminate this section's body.
    pub next: &'static [SectionKey],
}

#[derive(Debug, Clone)]
pub struct BulletRule {
    pub section: SectionKey,
    pub required: bool,
    pub min_count: usize,
    pub max_count: usize,
    /// Markers a bullet may start with.
    pub markers: BulletMarkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationForm {
    /// `[12]`
    Numeric,
    /// `[HIV-PREP-ELIG-001]`
    DashedCode,
}

#[derive(Debug, Clone, Copy)]
pub struct CitationRule {
    pub required: bool,
    pub accepted: &'static [CitationForm],
}

/// A forbidden pattern. Used both to flag a leak and to strip it.
#[derive(Debug, Clone)]
pub struct LeakPattern {
    pub pattern: Regex,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ParagraphRule {
    pub min_blocks: usize,
}

#[derive(Debug)]
pub struct ModeContract {
    pub mode: Mode,
    pub sections: &'static [SectionSpec],
    pub bullet_rule: Option<BulletRule>,
    pub citation_rule: Option<CitationRule>,
    pub leak_patterns: Vec<LeakPattern>,
    pub paragraph_rule: Option<ParagraphRule>,
    /// Reply must end with a question.
    pub closing_question: bool,
    /// Maximum sentences delivered in this mode.
    pub sentence_cap: usize,
}

impl ModeContract {
    pub fn section(&self, key: SectionKey) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.key == key)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-mode contracts
// ────────────────────────────────────────────────────────────────────────────

const SALES_COACH_SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        key: SectionKey::Challenge,
        next: &[
            SectionKey::RepApproach,
            SectionKey::Impact,
            SectionKey::SuggestedPhrasing,
        ],
    },
    SectionSpec {
        key: SectionKey::RepApproach,
        next: &[SectionKey::Impact, SectionKey::SuggestedPhrasing],
    },
    SectionSpec {
        key: SectionKey::Impact,
        next: &[SectionKey::SuggestedPhrasing],
    },
    SectionSpec {
        key: SectionKey::SuggestedPhrasing,
        next: &[],
    },
];

const BOTH_CITATION_FORMS: &[CitationForm] = &[CitationForm::Numeric, CitationForm::DashedCode];

fn leak(pattern: &str, reason: &'static str) -> LeakPattern {
    LeakPattern {
        pattern: Regex::new(pattern).expect("valid leak regex"),
        reason,
    }
}

/// Role-play leak patterns. Order matters for stripping: whole coach blocks
/// and score objects go before the bare tags and keys they contain.
fn role_play_leaks() -> Vec<LeakPattern> {
    vec![
        leak(r"(?is)<coach>.*?</coach>", "Leaked <coach> JSON block"),
        leak(r#"(?is)"scores"\s*:\s*\{.*?\}"#, "Embedded scoring JSON"),
        leak(r"(?i)</?coach>", "Stray coach tag"),
        leak(r"(?i)suggested\s+phrasing\s*:", r#"Contains "Suggested Phrasing:" heading"#),
        leak(r"(?i)rep\s+approach\s*:", r#"Contains "Rep Approach:" heading"#),
        leak(r"(?i)impact\s*:", r#"Contains "Impact:" heading"#),
        leak(r"(?i)challenge\s*:", r#"Contains "Challenge:" heading"#),
        leak(r"(?i)sales\s+coach", "Mentions Sales Coach"),
        leak(r#"(?i)"?rubric_version"?(?:\s*:\s*"[^"]*")?"#, "Rubric metadata leaked"),
        leak(r"(?i)\byou should say\b", r#"Meta-coaching: "you should say""#),
        leak(r"(?i)\bas the rep\b", r#"Meta-coaching: "as the rep""#),
    ]
}

struct Registry {
    sales_coach: ModeContract,
    role_play: ModeContract,
    product_knowledge: ModeContract,
    emotional_assessment: ModeContract,
    general_knowledge: ModeContract,
}

impl Registry {
    fn build() -> Self {
        Self {
            sales_coach: ModeContract {
                mode: Mode::SalesCoach,
                sections: SALES_COACH_SECTIONS,
                bullet_rule: Some(BulletRule {
                    section: SectionKey::RepApproach,
                    required: true,
                    min_count: 3,
                    max_count: 3,
                    markers: BulletMarkers::new(&["•", "●", "○", "-", "*", "N."]),
                }),
                citation_rule: Some(CitationRule {
                    required: false,
                    accepted: BOTH_CITATION_FORMS,
                }),
                leak_patterns: Vec::new(),
                paragraph_rule: Some(ParagraphRule { min_blocks: 3 }),
                closing_question: false,
                sentence_cap: 12,
            },
            role_play: ModeContract {
                mode: Mode::RolePlay,
                sections: &[],
                bullet_rule: None,
                citation_rule: None,
                leak_patterns: role_play_leaks(),
                paragraph_rule: None,
                closing_question: false,
                sentence_cap: 4,
            },
            product_knowledge: ModeContract {
                mode: Mode::ProductKnowledge,
                sections: &[],
                bullet_rule: None,
                citation_rule: Some(CitationRule {
                    required: false,
                    accepted: BOTH_CITATION_FORMS,
                }),
                leak_patterns: Vec::new(),
                paragraph_rule: None,
                closing_question: false,
                sentence_cap: 6,
            },
            emotional_assessment: ModeContract {
                mode: Mode::EmotionalAssessment,
                sections: &[],
                bullet_rule: None,
                citation_rule: None,
                leak_patterns: Vec::new(),
                paragraph_rule: None,
                closing_question: true,
                sentence_cap: 5,
            },
            general_knowledge: ModeContract {
                mode: Mode::GeneralKnowledge,
                sections: &[],
                bullet_rule: None,
                citation_rule: None,
                leak_patterns: Vec::new(),
                paragraph_rule: None,
                closing_question: false,
                sentence_cap: 6,
            },
        }
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::build);

impl Mode {
    /// The immutable contract for this mode.
    pub fn contract(self) -> &'static ModeContract {
        let registry = &*REGISTRY;
        match self {
            Mode::SalesCoach => &registry.sales_coach,
            Mode::RolePlay => &registry.role_play,
            Mode::ProductKnowledge => &registry.product_knowledge,
            Mode::EmotionalAssessment => &registry.emotional_assessment,
            Mode::GeneralKnowledge => &registry.general_knowledge,
        }
    }
}
