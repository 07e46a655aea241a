//! Deterministic Scorer: the fallback coach payload used when the model did
//! not supply a valid `<coach>` block.
//!
//! Algorithm:
//! 1. base = clamp(100 − |words − 110| × 0.35, 40, 92)
//! 2. bonus = min(8, used_facts × 3)
//! 3. overall = round(base + bonus), so always within 40..=100
//!
//! Dimension scores are fixed defaults; discovery is 4 when the reply ends with
//! a question, otherwise 3.

use crate::models::coach::{CoachContext, CoachPayload, CoachScores};

const TARGET_WORDS: f64 = 110.0;
const WORD_PENALTY: f64 = 0.35;
const BASE_MIN: f64 = 40.0;
const BASE_MAX: f64 = 92.0;
const FACT_BONUS_EACH: f64 = 3.0;
const FACT_BONUS_MAX: f64 = 8.0;

const WORKED: &str = "Tied guidance to facts";
const IMPROVE: &str = "End with one specific discovery question";
const PHRASING: &str = "Would confirming eGFR today help you identify one patient to start this month?";
const FEEDBACK: &str = "Stay concise. Cite label-aligned facts. Close with one clear question.";

pub fn overall_score(reply: &str, used_fact_count: usize) -> u8 {
    let words = reply.split_whitespace().count() as f64;
    let base = (100.0 - (words - TARGET_WORDS).abs() * WORD_PENALTY).clamp(BASE_MIN, BASE_MAX);
    let bonus = (used_fact_count as f64 * FACT_BONUS_EACH).min(FACT_BONUS_MAX);
    (base + bonus).round() as u8
}

pub fn deterministic_coach(reply: &str, user_message: &str, used_fact_count: usize) -> CoachPayload {
    let ends_with_question = reply.trim_end().ends_with('?');

    CoachPayload {
        overall: Some(overall_score(reply, used_fact_count)),
        scores: CoachScores {
            accuracy: 4,
            compliance: 4,
            discovery: if ends_with_question { 4 } else { 3 },
            clarity: 4,
            objection_handling: 3,
            empathy: 3,
        },
        worked: vec![WORKED.to_string()],
        improve: vec![IMPROVE.to_string()],
        phrasing: PHRASING.to_string(),
        feedback: FEEDBACK.to_string(),
        context: CoachContext {
            rep_question: user_message.to_string(),
            hcp_reply: reply.to_string(),
        },
    }
}
