use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::facts::{PlanRequest, DEFAULT_FACT_LIMIT};
use crate::models::fact::{Fact, Plan};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FactsRequest {
    #[serde(default)]
    pub disease: String,
    #[serde(default)]
    pub topic: String,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct FactsResponse {
    pub facts: Vec<Fact>,
}

/// POST /facts
pub async fn handle_facts(
    State(state): State<AppState>,
    Json(req): Json<FactsRequest>,
) -> Result<Json<FactsResponse>, AppError> {
    let limit = req.limit.unwrap_or(DEFAULT_FACT_LIMIT);
    let facts = state
        .facts
        .filter(&req.disease, &req.topic, limit)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(FactsResponse { facts }))
}

/// POST /plan
pub async fn handle_plan(
    State(state): State<AppState>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<Plan>, AppError> {
    let plan = state.facts.build_plan(&req, state.config.require_facts)?;
    Ok(Json(plan))
}
