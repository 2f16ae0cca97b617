//! LeanCRM API - REST Layer with Ephemeral Demo Stores
//!
//! Axum HTTP API for LeanCRM. In demo mode every caller, identified by a
//! session cookie or an `X-Demo-Token` header, gets a private SQLite store
//! that is provisioned on first use and reclaimed once idle. With demo mode
//! off all requests share the default store.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{demo_purge_task, DemoPurgeConfig, DemoPurgeMetrics};
pub use middleware::{demo_routing_middleware, DemoContext, RoutedStore};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
pub use types::*;
