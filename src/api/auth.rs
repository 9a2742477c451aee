use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use super::json_body;
use crate::auth::password::{spawn_hash, spawn_verify};
use crate::errors::{AppError, AuthError};
use crate::models::user::{Identity, NewUser, Role, User};
use crate::validation::validate_registration;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: User,
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/auth/register: create a member account and issue a token
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let req = json_body(payload)?;
    let reg = validate_registration(&req.username, &req.email, &req.password)?;

    let password_hash = spawn_hash(reg.password).await?;
    let record = state
        .users
        .create_user(NewUser {
            username: reg.username,
            email: reg.email,
            password_hash,
            role: Role::Member,
        })
        .await?;

    let token = state.tokens.issue(record.id, record.role)?;
    tracing::info!(user_id = %record.id, "user registered");

    Ok(Json(AuthResponse {
        token,
        user: User::from(record),
    }))
}

/// POST /api/auth/login: verify credentials and issue a token
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let req = json_body(payload)?;
    let email = req.email.trim().to_lowercase();

    let found = state.users.find_by_email(&email).await?;
    let stored_hash = found.as_ref().map(|r| r.password_hash.clone());
    let verified = spawn_verify(stored_hash, req.password).await;

    let Some(mut record) = found else {
        tracing::warn!("login failed: unknown email");
        return Err(AppError::InvalidCredentials);
    };
    if !verified {
        tracing::warn!(user_id = %record.id, "login failed: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    state.users.record_login(record.id).await?;
    record.last_login = Some(chrono::Utc::now());

    let token = state.tokens.issue(record.id, record.role)?;
    tracing::info!(user_id = %record.id, "user logged in");

    Ok(Json(AuthResponse {
        token,
        user: User::from(record),
    }))
}

/// GET /api/auth/profile: the account behind the presented token
pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ProfileResponse>, AppError> {
    // A valid token for a since-deleted account is treated like any other bad token.
    let record = state
        .users
        .find_by_id(identity.id)
        .await?
        .ok_or(AuthError::MissingOrInvalid)?;

    Ok(Json(ProfileResponse {
        user: User::from(record),
    }))
}
