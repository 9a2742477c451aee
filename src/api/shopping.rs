use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use super::json_body;
use crate::errors::AppError;
use crate::models::user::Identity;
use crate::validation::validate;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AssistRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssistResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalized: Option<bool>,
}

/// POST /api/shopping/assist
pub async fn assist(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<AssistRequest>, JsonRejection>,
) -> Result<Json<AssistResponse>, AppError> {
    let response = answer(&state, &identity, payload).await?;
    Ok(Json(AssistResponse {
        response,
        personalized: None,
    }))
}

/// POST /api/shopping/assist/enhanced
pub async fn assist_enhanced(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<AssistRequest>, JsonRejection>,
) -> Result<Json<AssistResponse>, AppError> {
    let response = answer(&state, &identity, payload).await?;
    Ok(Json(AssistResponse {
        response,
        personalized: Some(true),
    }))
}

async fn answer(
    state: &AppState,
    identity: &Identity,
    payload: Result<Json<AssistRequest>, JsonRejection>,
) -> Result<String, AppError> {
    let req = json_body(payload)?;
    let query = validate(&req.query)?;

    tracing::info!(
        user_id = %identity.id,
        query_len = query.as_str().len(),
        "shopping query received"
    );
    let text = state.pipeline.invoke(&query).await?;
    tracing::info!(user_id = %identity.id, "shopping response generated");
    Ok(text)
}
