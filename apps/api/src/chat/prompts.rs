// Per-mode system prompts for the chat turn.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{CITATION_INSTRUCTION, PLAIN_TEXT_INSTRUCTION};
use crate::models::fact::Plan;
use crate::models::mode::Mode;

/// Maximum number of reference lines listed under "References:".
pub const MAX_REFERENCE_LINES: usize = 6;

/// Scenario line. Replace `{disease}`, `{persona}`, `{goal}`.
const SCENARIO_TEMPLATE: &str = "Disease: {disease}; Persona: {persona}; Goal: {goal}.";

pub const SALES_COACH_SYSTEM: &str =
    "You are a pharmaceutical sales coach. Be label-aligned and specific to the facts.";

pub const SALES_COACH_FORMAT_CONTRACT: &str = r#"CRITICAL FORMAT CONTRACT — FOLLOW EXACTLY:

Return your answer in EXACTLY these 4 sections, in this order, nothing else:

Challenge: <one concise sentence summarizing the HCP or access challenge>

Rep Approach:
• <tactical coaching bullet 1>
• <tactical coaching bullet 2>
• <tactical coaching bullet 3>

Impact: <one sentence on the expected outcome or value to the HCP/patient>

Suggested Phrasing: "<2–4 sentence sample script, all inside one quoted block>"

HARD RULES:
Start each section on its own line with the exact labels above, including the colon.
Separate sections with one blank line.
Do NOT add any other headings or sections.
Do NOT preface with explanations. Start directly with "Challenge:" on the first line.
Rep Approach MUST have exactly 3 bullets, each starting with •."#;

/// Asks for the structured side-channel after the visible reply.
pub const COACH_BLOCK_INSTRUCTION: &str = r#"After the four sections, append a scoring block exactly in this form:
<coach>{"overall": 0-100, "scores": {"accuracy": 0-5, "compliance": 0-5, "discovery": 0-5, "clarity": 0-5, "objection_handling": 0-5, "empathy": 0-5}, "worked": ["..."], "improve": ["..."], "phrasing": "...", "feedback": "..."}</coach>
All scores are integers."#;

pub const ROLE_PLAY_SYSTEM: &str =
    r#"You are the HCP. First-person only. No coaching. No lists. No "<coach>"."#;

pub const ROLE_PLAY_RULES: &str = "Speak concisely. \
    In every turn you MUST speak strictly as the HCP in first person (I, me, my) \
    and NEVER speak as the rep or coach. \
    Never mention section labels such as Challenge, Rep Approach, Impact or Suggested Phrasing.";

pub const PRODUCT_KNOWLEDGE_SYSTEM: &str = "You are a medical expert providing product knowledge. \
    Be accurate and provide clear, evidence-based information.";

pub const EMOTIONAL_ASSESSMENT_SYSTEM: &str = "You are a coach helping users develop emotional intelligence. \
    Focus on recognizing emotions, perspective-taking, and self-reflection. \
    ALWAYS respond helpfully and END EVERY RESPONSE with a reflective question \
    that starts the user thinking deeper. \
    Your response MUST end with a question mark (?).";

pub const GENERAL_KNOWLEDGE_SYSTEM: &str =
    "You are a helpful AI assistant. Provide informative responses to general questions.";

/// Reply used in product-knowledge mode when the plan has no facts.
pub const NO_PRODUCT_FACTS_REPLY: &str = "I'm sorry, but I don't have specific product knowledge \
    information available for this query at the moment. \
    Please provide more details or try a different therapeutic area.";

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "—"
    } else {
        value
    }
}

fn scenario_line(plan: &Plan) -> String {
    SCENARIO_TEMPLATE
        .replace("{disease}", or_dash(&plan.disease))
        .replace("{persona}", or_dash(&plan.persona))
        .replace("{goal}", or_dash(&plan.goal))
}

/// `Facts:` list with citation ids, followed by up to six reference lines.
fn facts_block(plan: &Plan) -> String {
    let facts = plan
        .facts
        .iter()
        .map(|f| format!("- [{}] {}", f.id, f.text))
        .collect::<Vec<_>>()
        .join("\n");
    let references = plan
        .facts
        .iter()
        .flat_map(|f| f.cites.iter())
        .take(MAX_REFERENCE_LINES)
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Facts:\n{facts}\nReferences:\n{references}")
}

/// Builds the system prompt for `mode` from the turn's plan.
pub fn system_prompt(mode: Mode, plan: &Plan) -> String {
    let parts: Vec<String> = match mode {
        Mode::SalesCoach => vec![
            SALES_COACH_SYSTEM.to_string(),
            scenario_line(plan),
            facts_block(plan),
            CITATION_INSTRUCTION.to_string(),
            SALES_COACH_FORMAT_CONTRACT.to_string(),
            COACH_BLOCK_INSTRUCTION.to_string(),
        ],
        Mode::RolePlay => vec![
            ROLE_PLAY_SYSTEM.to_string(),
            scenario_line(plan),
            facts_block(plan),
            ROLE_PLAY_RULES.to_string(),
        ],
        Mode::ProductKnowledge => vec![
            PRODUCT_KNOWLEDGE_SYSTEM.to_string(),
            scenario_line(plan),
            facts_block(plan),
            CITATION_INSTRUCTION.to_string(),
        ],
        Mode::EmotionalAssessment => vec![EMOTIONAL_ASSESSMENT_SYSTEM.to_string()],
        Mode::GeneralKnowledge => vec![GENERAL_KNOWLEDGE_SYSTEM.to_string()],
    };

    let mut prompt = parts.join("\n");
    prompt.push('\n');
    prompt.push_str(PLAIN_TEXT_INSTRUCTION);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fact::PlanFact;
    use chrono::Utc;

    fn plan(mode: Mode) -> Plan {
        Plan {
            plan_id: "p1".to_string(),
            mode,
            disease: "HIV".to_string(),
            persona: String::new(),
            goal: "Discuss PrEP".to_string(),
            facts: (1..=4)
                .map(|i| PlanFact {
                    id: format!("HIV-PREP-TEST-00{i}"),
                    text: format!("Fact {i}."),
                    cites: vec![format!("Ref {i}a"), format!("Ref {i}b")],
                })
                .collect(),
            sentence_cap: mode.contract().sentence_cap,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sales_coach_prompt_carries_contract_and_facts() {
        let prompt = system_prompt(Mode::SalesCoach, &plan(Mode::SalesCoach));
        assert!(prompt.contains("- [HIV-PREP-TEST-001] Fact 1."));
        assert!(prompt.contains("Disease: HIV; Persona: —; Goal: Discuss PrEP."));
        assert!(prompt.contains("Rep Approach MUST have exactly 3 bullets"));
        assert!(prompt.contains("<coach>"));
    }

    #[test]
    fn test_references_are_capped() {
        let prompt = system_prompt(Mode::ProductKnowledge, &plan(Mode::ProductKnowledge));
        assert!(prompt.contains("- Ref 3b"));
        assert!(!prompt.contains("- Ref 4a"));
    }

    #[test]
    fn test_role_play_prompt_has_no_format_contract() {
        let prompt = system_prompt(Mode::RolePlay, &plan(Mode::RolePlay));
        assert!(prompt.contains("first person"));
        assert!(!prompt.contains("CRITICAL FORMAT CONTRACT"));
    }

    #[test]
    fn test_fact_free_modes_omit_facts() {
        for mode in [Mode::EmotionalAssessment, Mode::GeneralKnowledge] {
            let prompt = system_prompt(mode, &plan(mode));
            assert!(!prompt.contains("Facts:"), "{mode}");
            assert!(prompt.contains("Do NOT wrap the answer in markdown code fences"));
        }
    }
}
