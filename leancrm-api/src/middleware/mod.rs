//! Middleware modules for LeanCRM API
//!
//! - `demo`: binds each `/api/v1` request to its store
//! - `rate_limit`: per-caller request quotas
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .nest("/api/v1", api_routes.layer(from_fn_with_state(state, demo_routing_middleware)))
//!     // Rate limiting runs before any store is provisioned
//!     .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     .layer(from_fn(observability_middleware))
//!     .layer(cors)
//! ```

pub mod demo;
pub mod rate_limit;

pub use demo::{
    demo_routing_middleware, identity_from_headers, mint_session_id, DemoContext, IdentitySource,
    RoutedStore, BOOTSTRAP_PATH, DEMO_TOKEN_HEADER,
};
pub use rate_limit::{
    rate_limit_middleware, RateLimitError, RateLimitKey, RateLimitScope, RateLimitState,
};
