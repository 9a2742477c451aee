use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::store::StoreError;
use crate::validation::ValidationError;

/// Debug chain of a 5xx error, carried in response extensions. The body
/// never includes it; the router's `error_details` middleware adds it for
/// development deployments only.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub message: String,
    pub details: String,
}

/// Bearer-token and role failures. The 401 variant is deliberately a single
/// kind so callers cannot probe why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid or missing token")]
    MissingOrInvalid,

    #[error("access denied")]
    Forbidden,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists")]
    Duplicate,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("all models failed: {0}")]
    UpstreamAggregated(String),

    #[error("no generation models configured")]
    Configuration,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(_) => AppError::Duplicate,
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::NoModelsConfigured => AppError::Configuration,
            failed @ PipelineError::AllModelsFailed { .. } => {
                AppError::UpstreamAggregated(failed.to_string())
            }
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(AuthError::MissingOrInvalid) => StatusCode::UNAUTHORIZED,
            AppError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Duplicate => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamAggregated(_)
            | AppError::Configuration
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = match &self {
            AppError::Validation(e) => e.to_string(),
            AppError::Auth(e) => e.to_string(),
            AppError::InvalidCredentials => "invalid email or password".to_string(),
            AppError::Duplicate => "username or email already registered".to_string(),
            AppError::NotFound(what) => format!("{} not found", what),
            AppError::UpstreamAggregated(e) => {
                tracing::error!("Generation failed on every model: {}", e);
                "failed to process shopping request".to_string()
            }
            AppError::Configuration => {
                tracing::error!("Generation pipeline has no models configured");
                "failed to process shopping request".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
        };

        let details = status.is_server_error().then(|| format!("{:?}", self));
        let mut resp = (status, Json(json!({ "error": &msg }))).into_response();
        if let Some(details) = details {
            resp.extensions_mut().insert(ErrorDetails {
                message: msg,
                details,
            });
        }
        resp
    }
}
