use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Upper bound for a per-dimension rubric score.
pub const MAX_DIMENSION_SCORE: u8 = 5;
/// Upper bound for the overall score.
pub const MAX_OVERALL_SCORE: u8 = 100;
/// Maximum number of improvement suggestions kept on a payload.
pub const MAX_IMPROVE_ITEMS: usize = 5;

/// Per-dimension rubric scores, each an integer in `0..=5`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachScores {
    pub accuracy: u8,
    pub compliance: u8,
    pub discovery: u8,
    pub clarity: u8,
    pub objection_handling: u8,
    pub empathy: u8,
}

impl CoachScores {
    pub fn values(&self) -> [u8; 6] {
        [
            self.accuracy,
            self.compliance,
            self.discovery,
            self.clarity,
            self.objection_handling,
            self.empathy,
        ]
    }
}

/// What the rep asked and what the reply said, captured for the feedback panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachContext {
    #[serde(default)]
    pub rep_question: String,
    #[serde(default)]
    pub hcp_reply: String,
}

/// Structured coaching side-channel attached to every turn.
///
/// Either parsed from the model's `<coach>` block (see [`CoachPayload::from_value`])
/// or synthesized by the deterministic scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachPayload {
    #[serde(default, alias = "score", skip_serializing_if = "Option::is_none")]
    pub overall: Option<u8>,
    pub scores: CoachScores,
    #[serde(default)]
    pub worked: Vec<String>,
    #[serde(default)]
    pub improve: Vec<String>,
    #[serde(default)]
    pub phrasing: String,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub context: CoachContext,
}

impl CoachPayload {
    /// Converts a best-effort-parsed coach block into a typed payload.
    ///
    /// Returns `None` when required scores are missing, non-integer, or out of
    /// range. Over-long `improve` lists are truncated rather than rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        let mut payload: CoachPayload = match serde_json::from_value(value) {
            Ok(p) => p,
            Err(e) => {
                debug!("Coach block rejected: {e}");
                return None;
            }
        };

        if payload
            .scores
            .values()
            .iter()
            .any(|&s| s > MAX_DIMENSION_SCORE)
        {
            debug!("Coach block rejected: dimension score out of range");
            return None;
        }

        if payload.overall.is_some_and(|o| o > MAX_OVERALL_SCORE) {
            debug!("Coach block rejected: overall score out of range");
            return None;
        }

        payload.improve.truncate(MAX_IMPROVE_ITEMS);
        Some(payload)
    }
}
