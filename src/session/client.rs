/// HTTP client for the gateway's auth and shopping endpoints, as seen from
/// an end-user application.
use async_trait::async_trait;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::api::auth::{AuthResponse, ProfileResponse};
use crate::api::shopping::AssistResponse;
use crate::models::user::User;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Non-2xx response. `message` is the body's `error` field when present.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("could not reach server: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(&self, username: &str, email: &str, password: &str)
        -> Result<AuthResponse, ApiError>;

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    async fn profile(&self, token: &str) -> Result<User, ApiError>;

    /// Enhanced assist endpoint; returns the generated text.
    async fn assist(&self, token: &str, query: &str) -> Result<String, ApiError>;
}

pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().use_rustls_tls().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse<T: DeserializeOwned>(resp: Response, fallback: &str) -> Result<T, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()));
        }
        let message = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| fallback.to_string());
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let resp = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": username, "email": email, "password": password }))
            .send()
            .await
            .map_err(transport)?;
        Self::parse(resp, "Registration failed").await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let resp = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport)?;
        Self::parse(resp, "Login failed").await
    }

    async fn profile(&self, token: &str) -> Result<User, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/auth/profile"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        let body: ProfileResponse = Self::parse(resp, "Profile request failed").await?;
        Ok(body.user)
    }

    async fn assist(&self, token: &str, query: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.url("/api/shopping/assist/enhanced"))
            .bearer_auth(token)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(transport)?;
        let body: AssistResponse = Self::parse(resp, "Assist request failed").await?;
        Ok(body.response)
    }
}
