use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The conversational modes the coach can run. Each has its own output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    #[serde(alias = "sales-simulation")]
    SalesCoach,
    RolePlay,
    ProductKnowledge,
    EmotionalAssessment,
    GeneralKnowledge,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::SalesCoach,
        Mode::RolePlay,
        Mode::ProductKnowledge,
        Mode::EmotionalAssessment,
        Mode::GeneralKnowledge,
    ];

    /// Accepted mode keys, comma separated.
    pub fn key_list() -> String {
        Mode::ALL
            .iter()
            .map(Mode::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::SalesCoach => "sales-coach",
            Mode::RolePlay => "role-play",
            Mode::ProductKnowledge => "product-knowledge",
            Mode::EmotionalAssessment => "emotional-assessment",
            Mode::GeneralKnowledge => "general-knowledge",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode '{0}' (expected one of: {})", Mode::key_list())]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sales-coach" | "sales-simulation" => Ok(Mode::SalesCoach),
            "role-play" => Ok(Mode::RolePlay),
            "product-knowledge" => Ok(Mode::ProductKnowledge),
            "emotional-assessment" => Ok(Mode::EmotionalAssessment),
            "general-knowledge" => Ok(Mode::GeneralKnowledge),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}
