//! Client-side session lifecycle.
//!
//! Holds the bearer token, the cached profile, a loading flag and the last
//! user-visible auth error. Profile fetches capture the token they were
//! started with; a result that completes after the token changed (logout or
//! a fresh login) is discarded.

pub mod client;
pub mod store;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::user::{Role, User};
use crate::validation::MIN_PASSWORD_CHARS;
use client::{ApiError, AuthApi};
use store::TokenStore;

pub use client::HttpAuthApi;
pub use store::{FileTokenStore, MemoryTokenStore};

/// Shown for any assist failure; upstream detail never reaches the user.
pub const ASSIST_FAILURE_MESSAGE: &str =
    "Sorry, there was an error processing your request. Please try again.";

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Loading,
    Authenticated(User),
    Unauthenticated,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub profile: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Session {
    pub fn state(&self) -> AuthState {
        if self.loading {
            AuthState::Loading
        } else if let (Some(_), Some(profile)) = (&self.token, &self.profile) {
            AuthState::Authenticated(profile.clone())
        } else {
            AuthState::Unauthenticated
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The server refused the login or registration.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Invalid(String),

    #[error("failed to persist token: {0}")]
    Storage(String),

    #[error("not logged in")]
    NotAuthenticated,

    #[error("query is empty")]
    EmptyQuery,

    #[error("{}", ASSIST_FAILURE_MESSAGE)]
    AssistFailed,
}

pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    tokens: Arc<dyn TokenStore>,
    session: RwLock<Session>,
}

impl SessionManager {
    /// Picks up any persisted token. The session starts in `Loading` when a
    /// token exists, until [`SessionManager::start`] resolves it.
    pub fn new(api: Arc<dyn AuthApi>, tokens: Arc<dyn TokenStore>) -> Self {
        let token = tokens.load();
        let session = Session {
            loading: token.is_some(),
            token,
            ..Default::default()
        };
        Self {
            api,
            tokens,
            session: RwLock::new(session),
        }
    }

    /// Resolve the initial state: fetch the profile for a stored token, or
    /// settle on `Unauthenticated`.
    pub async fn start(&self) -> AuthState {
        self.refresh_profile().await
    }

    /// Fetch the profile for the current token. Any failure clears the
    /// token, which is how an expired or revoked token logs the user out.
    pub async fn refresh_profile(&self) -> AuthState {
        let token = {
            let mut session = self.session.write().await;
            match session.token.clone() {
                Some(token) => {
                    session.loading = true;
                    token
                }
                None => {
                    session.loading = false;
                    return session.state();
                }
            }
        };

        let result = self.api.profile(&token).await;

        let mut session = self.session.write().await;
        if session.token.as_deref() != Some(token.as_str()) {
            debug!("discarding profile response for a superseded token");
            return session.state();
        }
        match result {
            Ok(user) => {
                session.profile = Some(user);
            }
            Err(e) => {
                warn!(error = %e, "profile fetch failed, clearing session");
                if let Err(e) = self.tokens.clear() {
                    warn!(error = %e, "failed to remove stored token");
                }
                session.token = None;
                session.profile = None;
            }
        }
        session.loading = false;
        session.state()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        self.session.write().await.error = None;
        let result = self.api.login(email, password).await;
        self.complete_auth(result).await
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        self.session.write().await.error = None;
        let result = self.api.register(username, email, password).await;
        self.complete_auth(result).await
    }

    /// Registration form entry point: checks the confirmation and minimum
    /// length locally before any request is made.
    pub async fn register_confirmed(
        &self,
        username: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<User, SessionError> {
        let local = if password != confirm {
            Some("Passwords do not match".to_string())
        } else if password.chars().count() < MIN_PASSWORD_CHARS {
            Some(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_CHARS
            ))
        } else {
            None
        };
        if let Some(message) = local {
            self.session.write().await.error = Some(message.clone());
            return Err(SessionError::Invalid(message));
        }
        self.register(username, email, password).await
    }

    async fn complete_auth(
        &self,
        result: Result<crate::api::auth::AuthResponse, ApiError>,
    ) -> Result<User, SessionError> {
        let auth = match result {
            Ok(auth) => auth,
            Err(e) => {
                let message = e.to_string();
                self.session.write().await.error = Some(message.clone());
                return Err(SessionError::Rejected(message));
            }
        };

        // Persist under the write lock so a profile fetch finishing meanwhile
        // cannot clear the new token from storage.
        let mut session = self.session.write().await;
        if let Err(e) = self.tokens.save(&auth.token) {
            let err = SessionError::Storage(e.to_string());
            session.error = Some(err.to_string());
            return Err(err);
        }
        session.token = Some(auth.token);
        session.profile = Some(auth.user.clone());
        session.loading = false;
        session.error = None;
        info!(user_id = %auth.user.id, "session authenticated");
        Ok(auth.user)
    }

    pub async fn logout(&self) {
        let mut session = self.session.write().await;
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "failed to remove stored token");
        }
        *session = Session::default();
    }

    /// Ask the shopping assistant. Always uses the enhanced endpoint.
    pub async fn assist(&self, query: &str) -> Result<String, SessionError> {
        if query.trim().is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        let token = self
            .session
            .read()
            .await
            .token
            .clone()
            .ok_or(SessionError::NotAuthenticated)?;

        self.api.assist(&token, query).await.map_err(|e| {
            warn!(error = %e, "assist request failed");
            SessionError::AssistFailed
        })
    }

    pub async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn state(&self) -> AuthState {
        self.session.read().await.state()
    }

    pub async fn is_admin(&self) -> bool {
        self.session
            .read()
            .await
            .profile
            .as_ref()
            .is_some_and(|p| p.role == Role::Admin)
    }

    /// `Authorization` header value for the held token.
    pub async fn auth_header(&self) -> Option<String> {
        self.session
            .read()
            .await
            .token
            .as_ref()
            .map(|t| format!("Bearer {}", t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::AuthResponse;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use uuid::Uuid;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            role,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    /// Answers from fixed results. `gate`, when set, holds profile calls
    /// until notified.
    struct FakeApi {
        login: Mutex<Option<Result<AuthResponse, ApiError>>>,
        profile: Mutex<Option<Result<User, ApiError>>>,
        assist: Result<String, ApiError>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                login: Mutex::new(None),
                profile: Mutex::new(None),
                assist: Ok("Consider X".into()),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_login(self, r: Result<AuthResponse, ApiError>) -> Self {
            *self.login.lock().unwrap() = Some(r);
            self
        }

        fn with_profile(self, r: Result<User, ApiError>) -> Self {
            *self.profile.lock().unwrap() = Some(r);
            self
        }
    }

    #[async_trait]
    impl AuthApi for FakeApi {
        async fn register(&self, _: &str, _: &str, _: &str) -> Result<AuthResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.login.lock().unwrap().take().expect("no scripted register")
        }

        async fn login(&self, _: &str, _: &str) -> Result<AuthResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.login.lock().unwrap().take().expect("no scripted login")
        }

        async fn profile(&self, _: &str) -> Result<User, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.profile.lock().unwrap().take().expect("no scripted profile")
        }

        async fn assist(&self, _: &str, _: &str) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.assist.clone()
        }
    }

    fn unauthorized() -> ApiError {
        ApiError::Status {
            status: 401,
            message: "invalid or missing token".into(),
        }
    }

    #[tokio::test]
    async fn test_no_stored_token_is_unauthenticated() {
        let api = Arc::new(FakeApi::new());
        let mgr = SessionManager::new(api.clone(), Arc::new(MemoryTokenStore::new()));
        assert_eq!(mgr.state().await, AuthState::Unauthenticated);
        assert_eq!(mgr.start().await, AuthState::Unauthenticated);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stored_token_starts_loading_then_authenticates() {
        let alice = user(Role::Member);
        let api = Arc::new(FakeApi::new().with_profile(Ok(alice.clone())));
        let mgr = SessionManager::new(api, Arc::new(MemoryTokenStore::with_token("t1")));

        assert_eq!(mgr.state().await, AuthState::Loading);
        assert_eq!(mgr.start().await, AuthState::Authenticated(alice));
    }

    #[tokio::test]
    async fn test_profile_failure_clears_stored_token() {
        let tokens = Arc::new(MemoryTokenStore::with_token("expired"));
        let api = Arc::new(FakeApi::new().with_profile(Err(unauthorized())));
        let mgr = SessionManager::new(api, tokens.clone());

        assert_eq!(mgr.start().await, AuthState::Unauthenticated);
        assert_eq!(tokens.load(), None);
        assert_eq!(mgr.snapshot().await.token, None);
    }

    #[tokio::test]
    async fn test_login_success_persists_token() {
        let alice = user(Role::Admin);
        let api = Arc::new(FakeApi::new().with_login(Ok(AuthResponse {
            token: "fresh".into(),
            user: alice.clone(),
        })));
        let tokens = Arc::new(MemoryTokenStore::new());
        let mgr = SessionManager::new(api, tokens.clone());

        let got = mgr.login("alice@example.com", "secret1").await.unwrap();
        assert_eq!(got, alice);
        assert_eq!(tokens.load().as_deref(), Some("fresh"));
        assert_eq!(mgr.state().await, AuthState::Authenticated(alice));
        assert!(mgr.is_admin().await);
        assert_eq!(mgr.auth_header().await.as_deref(), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn test_login_failure_records_error_and_keeps_token() {
        let api = Arc::new(FakeApi::new().with_login(Err(ApiError::Status {
            status: 401,
            message: "invalid credentials".into(),
        })));
        let tokens = Arc::new(MemoryTokenStore::with_token("old"));
        let mgr = SessionManager::new(api, tokens.clone());

        let err = mgr.login("a@b.com", "wrong").await.unwrap_err();
        assert_eq!(err, SessionError::Rejected("invalid credentials".into()));
        assert_eq!(mgr.snapshot().await.error.as_deref(), Some("invalid credentials"));
        assert_eq!(tokens.load().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_register_confirmed_checks_locally() {
        let api = Arc::new(FakeApi::new());
        let mgr = SessionManager::new(api.clone(), Arc::new(MemoryTokenStore::new()));

        let err = mgr
            .register_confirmed("bob", "bob@x.com", "secret1", "secret2")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Invalid("Passwords do not match".into()));

        let err = mgr
            .register_confirmed("bob", "bob@x.com", "abc", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Invalid(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let alice = user(Role::Member);
        let tokens = Arc::new(MemoryTokenStore::with_token("t1"));
        let api = Arc::new(FakeApi::new().with_profile(Ok(alice)));
        let mgr = SessionManager::new(api, tokens.clone());
        mgr.start().await;

        mgr.logout().await;
        assert_eq!(mgr.snapshot().await, Session::default());
        assert_eq!(tokens.load(), None);
        assert!(!mgr.is_admin().await);
        assert_eq!(mgr.auth_header().await, None);
    }

    #[tokio::test]
    async fn test_stale_profile_is_discarded_after_logout() {
        let gate = Arc::new(Notify::new());
        let mut fake = FakeApi::new().with_profile(Ok(user(Role::Admin)));
        fake.gate = Some(gate.clone());
        let api = Arc::new(fake);
        let mgr = Arc::new(SessionManager::new(
            api.clone(),
            Arc::new(MemoryTokenStore::with_token("t1")),
        ));

        let pending = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.start().await }
        });
        // Let the fetch reach the gate, then log out underneath it.
        while api.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        mgr.logout().await;
        gate.notify_one();

        assert_eq!(pending.await.unwrap(), AuthState::Unauthenticated);
        assert_eq!(mgr.snapshot().await.profile, None);
    }

    /// Token store whose `save` releases `gate` and then stalls, leaving a
    /// window between persisting the token and returning.
    struct StallingTokenStore {
        inner: MemoryTokenStore,
        gate: Arc<Notify>,
    }

    impl TokenStore for StallingTokenStore {
        fn load(&self) -> Option<String> {
            self.inner.load()
        }

        fn save(&self, token: &str) -> anyhow::Result<()> {
            self.inner.save(token)?;
            self.gate.notify_one();
            std::thread::sleep(std::time::Duration::from_millis(100));
            Ok(())
        }

        fn clear(&self) -> anyhow::Result<()> {
            self.inner.clear()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_profile_during_login_keeps_new_token() {
        let gate = Arc::new(Notify::new());
        let fresh = user(Role::Member);
        let mut fake = FakeApi::new()
            .with_profile(Err(unauthorized()))
            .with_login(Ok(AuthResponse {
                token: "fresh".into(),
                user: fresh.clone(),
            }));
        fake.gate = Some(gate.clone());
        let tokens = Arc::new(StallingTokenStore {
            inner: MemoryTokenStore::with_token("stale"),
            gate,
        });
        let api = Arc::new(fake);
        let mgr = Arc::new(SessionManager::new(api.clone(), tokens.clone()));

        let pending = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.start().await }
        });
        while api.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // The 401 for "stale" resolves while the login is persisting "fresh".
        mgr.login("alice@example.com", "secret1").await.unwrap();
        pending.await.unwrap();

        assert_eq!(tokens.load().as_deref(), Some("fresh"));
        let session = mgr.snapshot().await;
        assert_eq!(session.token.as_deref(), Some("fresh"));
        assert_eq!(mgr.state().await, AuthState::Authenticated(fresh));
    }

    #[tokio::test]
    async fn test_assist_maps_failures_to_generic_message() {
        let mut fake = FakeApi::new();
        fake.assist = Err(ApiError::Status {
            status: 500,
            message: "failed to process shopping request".into(),
        });
        let mgr = SessionManager::new(Arc::new(fake), Arc::new(MemoryTokenStore::with_token("t")));

        let err = mgr.assist("laptop").await.unwrap_err();
        assert_eq!(err.to_string(), ASSIST_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_assist_skips_blank_query() {
        let api = Arc::new(FakeApi::new());
        let mgr = SessionManager::new(api.clone(), Arc::new(MemoryTokenStore::with_token("t")));
        assert_eq!(mgr.assist("   ").await, Err(SessionError::EmptyQuery));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);

        assert_eq!(mgr.assist("laptop").await.unwrap(), "Consider X");
    }
}
