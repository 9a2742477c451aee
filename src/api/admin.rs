use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::json_body;
use crate::errors::AppError;
use crate::models::user::{Identity, RoleCounts, User, UserPatch};
use crate::validation::{validate_email, ValidationError};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: RoleCounts,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Malformed ids are reported exactly like unknown ones.
fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("user"))
}

/// Trim and check the fields present in a PATCH body.
fn normalize_patch(mut patch: UserPatch) -> Result<UserPatch, AppError> {
    if patch.is_empty() {
        return Err(ValidationError::Field {
            field: "body",
            message: "no updatable fields supplied".to_string(),
        }
        .into());
    }
    if let Some(name) = patch.username.take() {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::Field {
                field: "username",
                message: "is required".to_string(),
            }
            .into());
        }
        patch.username = Some(name);
    }
    if let Some(email) = patch.email.take() {
        patch.email = Some(validate_email(&email)?);
    }
    Ok(patch)
}

/// GET /api/admin/users: every account, oldest first
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UsersResponse>, AppError> {
    let users = state.users.list_users().await?;
    Ok(Json(UsersResponse {
        users: users.into_iter().map(User::from).collect(),
    }))
}

/// GET /api/admin/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let id = parse_user_id(&id)?;
    let record = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(UserResponse {
        user: User::from(record),
    }))
}

/// PATCH /api/admin/users/:id: partial update of any profile field
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Identity>,
    Path(id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let id = parse_user_id(&id)?;
    let patch = normalize_patch(json_body(payload)?)?;

    let record = state
        .users
        .update_user(id, patch)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    tracing::info!(admin_id = %admin.id, user_id = %id, role = %record.role, "user updated");
    Ok(Json(UserResponse {
        user: User::from(record),
    }))
}

/// DELETE /api/admin/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_user_id(&id)?;
    if !state.users.delete_user(id).await? {
        return Err(AppError::NotFound("user"));
    }

    tracing::info!(admin_id = %admin.id, user_id = %id, "user deleted");
    Ok(Json(MessageResponse {
        message: "user deleted".to_string(),
    }))
}

/// GET /api/admin/stats: account totals by role
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.users.role_counts().await?;
    Ok(Json(StatsResponse { stats }))
}
