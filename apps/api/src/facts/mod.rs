//! Fact database and plan building.
//!
//! Facts are read-only reference data loaded once at startup, either from the
//! built-in `data/facts.json` or from a file named by `FACTS_PATH`. Every id
//! must be a canonical citation code so replies can cite it verbatim.

pub mod handlers;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::contracts::validator::is_canonical_citation;
use crate::errors::AppError;
use crate::models::fact::{Fact, Plan, PlanFact};
use crate::models::mode::Mode;

const BUILTIN_FACTS: &str = include_str!("../../data/facts.json");

/// Default number of facts returned by `/facts`.
pub const DEFAULT_FACT_LIMIT: usize = 6;
/// Maximum number of facts attached to a plan.
pub const MAX_PLAN_FACTS: usize = 8;

#[derive(Debug, Error)]
pub enum FactStoreError {
    #[error("failed to read facts file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("facts JSON is invalid: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate fact id: {0}")]
    DuplicateId(String),

    #[error("fact id is not a valid citation code: {0}")]
    InvalidId(String),
}

/// Scenario fields a plan is built from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub disease: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub topic: String,
}

/// Parses an optional mode key; absent or blank means sales-coach.
pub fn parse_mode(raw: Option<&str>) -> Result<Mode, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Mode::default()),
        Some(key) => key
            .parse::<Mode>()
            .map_err(|e| AppError::InvalidInput(e.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct FactStore {
    facts: Vec<Fact>,
}

impl FactStore {
    /// The fact database compiled into the binary.
    pub fn builtin() -> Result<Self, FactStoreError> {
        Self::from_json(BUILTIN_FACTS)
    }

    /// Loads a fact database from a JSON file.
    pub fn load(path: &Path) -> Result<Self, FactStoreError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FactStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json(&raw)?;
        info!("Loaded {} facts from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn from_json(raw: &str) -> Result<Self, FactStoreError> {
        let facts: Vec<Fact> = serde_json::from_str(raw)?;
        Self::new(facts)
    }

    pub fn new(facts: Vec<Fact>) -> Result<Self, FactStoreError> {
        let mut seen = HashSet::new();
        for fact in &facts {
            if !is_canonical_citation(&format!("[{}]", fact.id)) {
                return Err(FactStoreError::InvalidId(fact.id.clone()));
            }
            if !seen.insert(fact.id.as_str()) {
                return Err(FactStoreError::DuplicateId(fact.id.clone()));
            }
        }
        Ok(Self { facts })
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Facts in `disease` (exact, case-insensitive; empty matches any) whose
    /// topic contains `topic` (case-insensitive; empty matches any).
    pub fn filter(&self, disease: &str, topic: &str, limit: usize) -> Vec<&Fact> {
        let disease = disease.trim().to_lowercase();
        let topic = topic.trim().to_lowercase();

        self.facts
            .iter()
            .filter(|f| disease.is_empty() || f.therapeutic_area.to_lowercase() == disease)
            .filter(|f| topic.is_empty() || f.topic.to_lowercase().contains(&topic))
            .take(limit)
            .collect()
    }

    /// Builds a plan for one conversation turn.
    ///
    /// Product-knowledge ignores the disease filter. With `require_facts`, an
    /// empty plan is rejected for every other mode.
    pub fn build_plan(&self, request: &PlanRequest, require_facts: bool) -> Result<Plan, AppError> {
        let mode = parse_mode(request.mode.as_deref())?;
        let disease = if mode == Mode::ProductKnowledge {
            ""
        } else {
            request.disease.as_str()
        };

        let facts: Vec<PlanFact> = self
            .filter(disease, &request.topic, MAX_PLAN_FACTS)
            .into_iter()
            .map(PlanFact::from)
            .collect();

        if require_facts && facts.is_empty() && mode != Mode::ProductKnowledge {
            return Err(AppError::NoFacts);
        }

        Ok(Plan {
            plan_id: Uuid::new_v4().to_string(),
            mode,
            disease: request.disease.clone(),
            persona: request.persona.clone(),
            goal: request.goal.clone(),
            facts,
            sentence_cap: mode.contract().sentence_cap,
            created_at: Utc::now(),
        })
    }
}
