use std::time::Duration;

use crate::pipeline::gemini::DEFAULT_BASE_URL;

const PLACEHOLDER_JWT_SECRET: &str = "CHANGE_ME_SHOPASSIST_JWT_SECRET";
const DEFAULT_MODELS: &str = "gemini-1.5-flash,gemini-1.5-pro,gemini-pro-vision";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Deployment mode. Only `development` enables error details and the placeholder secret.
    pub env_mode: String,
    /// Postgres URL. `None` selects the in-memory credential store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub google_api_key: Option<String>,
    pub generation_url: String,
    /// Ordered fallback list, preferred model first.
    pub models: Vec<String>,
    /// Per-attempt timeout. `None` keeps the HTTP client's default.
    pub generation_timeout: Option<Duration>,
    pub dashboard_origin: String,
}

impl Config {
    pub fn is_development(&self) -> bool {
        is_development_mode(&self.env_mode)
    }
}

/// Only an explicit `development` (any case) enables development behavior.
/// Unknown modes such as `staging` or `prod` are treated as production.
pub fn is_development_mode(mode: &str) -> bool {
    mode.trim().eq_ignore_ascii_case("development")
}

/// The placeholder secret is tolerated in development only.
fn check_jwt_secret(env_mode: &str, secret: &str) -> anyhow::Result<()> {
    if secret != PLACEHOLDER_JWT_SECRET {
        return Ok(());
    }
    if !is_development_mode(env_mode) {
        anyhow::bail!(
            "SHOPASSIST_JWT_SECRET is still the insecure placeholder in '{}' mode. \
             Set a long random secret or run with SHOPASSIST_ENV=development.",
            env_mode
        );
    }
    eprintln!("⚠️  SHOPASSIST_JWT_SECRET is not set, using insecure placeholder. Set a random secret for production.");
    Ok(())
}

/// Split a comma-separated model list, dropping blanks. Order is preserved.
pub fn parse_models(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let env_mode = std::env::var("SHOPASSIST_ENV")
        .or_else(|_| std::env::var("RUST_ENV"))
        .unwrap_or_else(|_| "development".into());

    let jwt_secret = std::env::var("SHOPASSIST_JWT_SECRET")
        .unwrap_or_else(|_| PLACEHOLDER_JWT_SECRET.into());

    check_jwt_secret(&env_mode, &jwt_secret)?;

    Ok(Config {
        port: std::env::var("SHOPASSIST_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .unwrap_or(3000),
        env_mode,
        database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
        jwt_secret,
        token_ttl: chrono::Duration::hours(
            std::env::var("SHOPASSIST_TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
        ),
        google_api_key: std::env::var("GOOGLE_API_KEY").ok().filter(|s| !s.is_empty()),
        generation_url: std::env::var("SHOPASSIST_GENERATION_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
        models: parse_models(
            &std::env::var("SHOPASSIST_MODELS").unwrap_or_else(|_| DEFAULT_MODELS.into()),
        ),
        generation_timeout: std::env::var("SHOPASSIST_GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs),
        dashboard_origin: std::env::var("DASHBOARD_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3001".into()),
    })
}
