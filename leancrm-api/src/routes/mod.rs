//! REST API Routes Module
//!
//! Route handlers organized by entity type, plus the router assembly.
//!
//! Includes:
//! - Demo token issuance at /demo/token
//! - Registration and CRM routes under /api/v1/* (bound to a store by demo routing)
//! - Health check endpoints (Kubernetes-compatible)
//! - CORS support for browser-based clients

pub mod auth;
pub mod companies;
pub mod contacts;
pub mod deals;
pub mod demo;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::middleware::{
    demo_routing_middleware, rate_limit_middleware, RateLimitState, DEMO_TOKEN_HEADER,
};
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use auth::create_router as auth_router;
pub use companies::create_router as companies_router;
pub use contacts::create_router as contacts_router;
pub use deals::create_router as deals_router;
pub use demo::create_router as demo_router;
pub use health::create_router as health_router;

// ============================================================================
// OPENAPI ENDPOINTS
// ============================================================================

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// CORS
// ============================================================================

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(DEMO_TOKEN_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("retry-after"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        // Session cookies only cross origins with credentials allowed.
        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Routes that read or write a CRM store. Every one of them passes through
/// demo routing.
fn api_v1_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_router())
        .nest("/companies", companies_router())
        .nest("/contacts", contacts_router())
        .nest("/deals", deals_router())
        .layer(from_fn_with_state(state.clone(), demo_routing_middleware))
}

/// Create the complete API router.
///
/// - Registration and CRM routes under /api/v1/*
/// - Demo token issuance at /demo/token
/// - Health checks at /health/*
/// - Metrics at /metrics
/// - OpenAPI spec at /openapi.json
///
/// Rate limiting wraps everything, so throttled callers never reach store
/// provisioning.
pub fn create_api_router(state: AppState) -> Router {
    let rate_limit_state = RateLimitState::new(
        state.api_config.clone(),
        &state.sandbox.config().session_cookie,
    );
    let cors = build_cors_layer(&state.api_config);

    Router::new()
        .nest("/api/v1", api_v1_router(&state))
        .nest("/demo", demo_router())
        .nest("/health", health_router())
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
        .layer(from_fn(observability_middleware))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_both_modes() {
        let _dev = build_cors_layer(&ApiConfig::default());
        let _prod = build_cors_layer(&ApiConfig {
            cors_origins: vec!["https://demo.leancrm.test".to_string()],
            cors_allow_credentials: true,
            ..ApiConfig::default()
        });
    }
}
