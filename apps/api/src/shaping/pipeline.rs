//! Runs a raw completion through the shaping stages and finalizes the turn.
//!
//! Order: extract (sanitizes) → normalize citations → enforce sections →
//! truncation guard → sentence cap → strip leaks. Citations and sections are
//! enforced again after a continuation. `finalize_turn` then applies
//! mode repairs, validates, degrades broken sales-coach replies to a template,
//! and guarantees a coach payload.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::contracts::validator::{validate_reply, ValidationResult};
use crate::llm_client::{ChatMessage, CompletionProvider};
use crate::models::coach::CoachPayload;
use crate::models::mode::Mode;
use crate::shaping::citations::normalize_citations;
use crate::shaping::coach_block::extract_coach;
use crate::shaping::leaks::strip_leaks;
use crate::shaping::scoring::deterministic_coach;
use crate::shaping::sections::enforce_sections;
use crate::shaping::sentences::cap_sentences;
use crate::shaping::truncation::continue_if_cut_off;

pub const EMPTY_REPLY_FALLBACK: &str = "I'm sorry — I couldn't generate a response just now.";

const REFLECTIVE_QUESTION: &str =
    "What insight does this give you about how you want to communicate moving forward?";

const CLINICIAN_PREFIX: &str = "From my perspective as the clinician, ";

static FIRST_PERSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:i|me|my)\b").expect("valid regex"));

/// Visible reply plus the model's coach JSON, if it sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedReply {
    pub reply: String,
    pub coach: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct FinalReply {
    pub reply: String,
    pub coach: CoachPayload,
    pub validation: ValidationResult,
    /// The reply was replaced by the sales-coach template.
    pub degraded: bool,
}

/// Shapes a raw completion. `messages` are the ones the completion answered,
/// reused if a continuation has to be requested.
pub async fn shape_reply(
    raw: &str,
    mode: Mode,
    provider: &dyn CompletionProvider,
    messages: &[ChatMessage],
    temperature: f32,
) -> ShapedReply {
    let contract = mode.contract();
    let extraction = extract_coach(raw);
    let mut reply = extraction.clean;

    if mode == Mode::ProductKnowledge {
        reply = normalize_citations(&reply);
    }
    if mode == Mode::SalesCoach {
        reply = enforce_sections(&reply);
    }

    reply = continue_if_cut_off(provider, messages, reply, temperature).await;
    // The continuation is new model text.
    if mode == Mode::ProductKnowledge {
        reply = normalize_citations(&reply);
    }
    if mode == Mode::SalesCoach {
        reply = enforce_sections(&reply);
    }

    reply = cap_sentences(&reply, contract.sentence_cap);
    reply = strip_leaks(&reply, contract);

    ShapedReply {
        reply,
        coach: extraction.coach,
    }
}

/// Fixed 4-section reply built from the rep's question.
pub fn sales_coach_template(user_message: &str) -> String {
    let opening = user_message
        .split_whitespace()
        .take(5)
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "Challenge: Addressing {opening}...\n\n\
         Rep Approach:\n\
         • Focus on patient safety and label alignment\n\
         • Use data to address specific concerns\n\
         • End with a clear next step question\n\n\
         Impact: Builds trust and advances patient care discussions\n\n\
         Suggested Phrasing: \"Based on the patient's profile, how can we ensure safety while exploring this option?\""
    )
}

fn apply_mode_repairs(reply: String, mode: Mode) -> String {
    if reply.is_empty() {
        return reply;
    }
    match mode {
        Mode::EmotionalAssessment if !reply.trim_end().ends_with('?') => {
            format!("{} {}", reply.trim_end(), REFLECTIVE_QUESTION)
        }
        Mode::RolePlay if !FIRST_PERSON.is_match(&reply) => format!("{CLINICIAN_PREFIX}{reply}"),
        _ => reply,
    }
}

/// Produces the delivered reply and coach payload for a turn.
pub fn finalize_turn(
    shaped: ShapedReply,
    mode: Mode,
    user_message: &str,
    used_fact_count: usize,
) -> FinalReply {
    let mut reply = apply_mode_repairs(shaped.reply, mode);
    let mut validation = validate_reply(&reply, mode);
    let mut degraded = false;

    if let Some(violation) = &validation.error {
        warn!(
            "Reply violates {} contract: {} ({})",
            mode,
            violation.code(),
            violation
        );
        if mode == Mode::SalesCoach && violation.is_structural() {
            reply = sales_coach_template(user_message);
            validation = validate_reply(&reply, mode);
            degraded = true;
        }
    }

    if reply.trim().is_empty() {
        reply = EMPTY_REPLY_FALLBACK.to_string();
    }

    let coach = match shaped.coach.and_then(CoachPayload::from_value) {
        Some(coach) => coach,
        None => {
            debug!("Using deterministic coach payload");
            deterministic_coach(&reply, user_message, used_fact_count)
        }
    };

    FinalReply {
        reply,
        coach,
        validation,
        degraded,
    }
}
