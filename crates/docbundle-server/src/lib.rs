// ABOUTME: HTTP server for docbundle, exposing document and bundle operations as a JSON API.
// ABOUTME: Axum router over a shared BundleStore, with optional bearer auth and request tracing.

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod routes;

pub use api::ApiError;
pub use app_state::{AppState, SharedState};
pub use config::{BundlerConfig, ConfigError};
pub use routes::create_router;
