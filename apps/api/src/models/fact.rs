use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::mode::Mode;

/// A unit of label/reference information with a stable citation id
/// (e.g. `HIV-PREP-ELIG-001`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    /// Therapeutic area the fact belongs to.
    #[serde(rename = "ta")]
    pub therapeutic_area: String,
    #[serde(default)]
    pub topic: String,
    pub text: String,
    #[serde(default)]
    pub cites: Vec<String>,
}

/// The slice of a fact that is attached to a turn's prompt context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFact {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub cites: Vec<String>,
}

impl From<&Fact> for PlanFact {
    fn from(fact: &Fact) -> Self {
        Self {
            id: fact.id.clone(),
            text: fact.text.clone(),
            cites: fact.cites.clone(),
        }
    }
}

/// Per-turn prompt context: mode, scenario and the facts selected for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub disease: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub facts: Vec<PlanFact>,
    /// Sentence budget applied to replies in this plan's mode.
    #[serde(default)]
    pub sentence_cap: usize,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}
