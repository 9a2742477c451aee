use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::auth::middleware::{require_admin, require_auth};
use crate::errors::{AppError, ErrorDetails};
use crate::validation::ValidationError;
use crate::AppState;

pub mod admin;
pub mod auth;
pub mod shopping;

/// Build the HTTP API. The caller mounts this under `/api`.
///
/// Guards are attached with `route_layer`, so unknown paths fall through to
/// the 404 handler instead of answering 401.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let authenticated = Router::new()
        .route("/auth/profile", get(auth::profile))
        .route("/shopping/assist", post(shopping::assist))
        .route("/shopping/assist/enhanced", post(shopping::assist_enhanced))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route(
            "/admin/users/:id",
            get(admin::get_user)
                .patch(admin::update_user)
                .delete(admin::delete_user),
        )
        .route("/admin/stats", get(admin::stats))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin)
        .fallback(fallback_404)
}

/// Top-level application router with health probes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api", api_router(state.clone()))
        .fallback(fallback_404)
        .layer(middleware::from_fn_with_state(state.clone(), error_details))
        .with_state(state)
}

/// Middleware: in development deployments, rebuild 5xx error bodies with
/// the error's debug chain. Otherwise responses pass through untouched.
async fn error_details(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let resp = next.run(req).await;
    if !state.expose_details {
        return resp;
    }
    match resp.extensions().get::<ErrorDetails>().cloned() {
        Some(ErrorDetails { message, details }) => (
            resp.status(),
            Json(json!({ "error": message, "details": details })),
        )
            .into_response(),
        None => resp,
    }
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}

/// Unwrap a JSON body, reporting malformed input as a 400 with an `error` field.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(v)| v).map_err(|rejection| {
        tracing::debug!("rejected request body: {}", rejection.body_text());
        AppError::Validation(ValidationError::Field {
            field: "body",
            message: "expected a JSON object".to_string(),
        })
    })
}
