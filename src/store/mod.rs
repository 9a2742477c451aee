//! Credential store contract and its two backends.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::user::{NewUser, RoleCounts, UserPatch, UserRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field (username or email) is already taken.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user accounts. Emails are stored lowercased; callers
/// normalize before lookup.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>>;

    /// All users, oldest first.
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>>;

    /// Apply a partial update. `None` if the user does not exist.
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<UserRecord>>;

    /// `true` if a row was removed.
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    async fn record_login(&self, id: Uuid) -> StoreResult<()>;

    async fn role_counts(&self) -> StoreResult<RoleCounts>;
}
