use axum::{extract::State, Json};

use crate::chat::service::{run_turn, ChatRequest, TurnOutput};
use crate::errors::AppError;
use crate::state::AppState;

/// POST /chat
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<TurnOutput>, AppError> {
    let turn = req.into_turn()?;
    let output = run_turn(&state, turn).await?;
    Ok(Json(output))
}
