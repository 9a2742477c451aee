/// In-process user store backed by `DashMap`.
/// Used when no `DATABASE_URL` is configured, and by tests.
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{StoreError, StoreResult, UserStore};
use crate::models::user::{NewUser, Role, RoleCounts, UserPatch, UserRecord};

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<Uuid, UserRecord>,
    /// Serializes the uniqueness check with the write that follows it.
    writes: Mutex<()>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the conflicting field name, ignoring `except`.
    fn conflict(&self, username: Option<&str>, email: Option<&str>, except: Option<Uuid>) -> Option<&'static str> {
        self.users.iter().find_map(|entry| {
            let u = entry.value();
            if Some(u.id) == except {
                return None;
            }
            if username.is_some_and(|n| n == u.username) {
                return Some("username");
            }
            if email.is_some_and(|e| e == u.email) {
                return Some("email");
            }
            None
        })
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let _writes = self.writes.lock().await;
        if let Some(field) = self.conflict(Some(&user.username), Some(&user.email), None) {
            return Err(StoreError::Duplicate(field.to_string()));
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
            last_login: None,
        };
        self.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self
            .users
            .iter()
            .find(|e| e.value().email == email)
            .map(|e| e.value().clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.get(&id).map(|e| e.value().clone()))
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<UserRecord>> {
        let _writes = self.writes.lock().await;
        if let Some(field) = self.conflict(patch.username.as_deref(), patch.email.as_deref(), Some(id)) {
            return Err(StoreError::Duplicate(field.to_string()));
        }
        let Some(mut entry) = self.users.get_mut(&id) else {
            return Ok(None);
        };
        let user = entry.value_mut();
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.users.remove(&id).is_some())
    }

    async fn record_login(&self, id: Uuid) -> StoreResult<()> {
        if let Some(mut entry) = self.users.get_mut(&id) {
            entry.value_mut().last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn role_counts(&self) -> StoreResult<RoleCounts> {
        let mut counts = RoleCounts::default();
        for entry in self.users.iter() {
            counts.total_users += 1;
            match entry.value().role {
                Role::Admin => counts.admin_users += 1,
                Role::Member => counts.member_users += 1,
            }
        }
        Ok(counts)
    }
}
