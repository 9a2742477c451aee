//! ShopAssist: authenticated shopping-assistant gateway.
//!
//! Library crate shared by the `shopassist` binary and the integration tests
//! in `tests/`.

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod validation;

use auth::TokenCodec;
use pipeline::ModelPipeline;
use store::UserStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub tokens: TokenCodec,
    pub pipeline: ModelPipeline,
    /// Add the debug chain to 5xx bodies. Development deployments only.
    pub expose_details: bool,
}
