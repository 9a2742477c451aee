//! Route guards: verify the bearer token, then apply the role gate.
//!
//! On success the verified [`Identity`] is inserted into request extensions;
//! handlers read it with `Extension<Identity>`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::rbac::{authorize, RequiredRole};
use crate::errors::AppError;
use crate::models::user::Identity;
use crate::AppState;

/// Middleware: any authenticated identity.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    gate(&state, req, next, RequiredRole::Authenticated).await
}

/// Middleware: admin role only.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    gate(&state, req, next, RequiredRole::Admin).await
}

async fn gate(
    state: &AppState,
    mut req: Request,
    next: Next,
    required: RequiredRole,
) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let identity: Identity = state.tokens.verify(header).map_err(|e| {
        tracing::warn!(path = %req.uri().path(), "rejected request: {}", e);
        e
    })?;
    authorize(Some(&identity), required)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
