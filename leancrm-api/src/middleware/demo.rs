//! Demo Routing Middleware
//!
//! Runs before every `/api/v1` handler and binds the request to exactly one
//! store:
//!
//! 1. Demo mode off: the configured default store.
//! 2. `X-Demo-Token` header: the token's store, looked up in the token cache.
//! 3. Session cookie: the session's store, provisioned on the registration
//!    request if it does not exist yet.
//!
//! The bound [`StoreHandle`] travels in the request extensions and is read by
//! handlers through the [`RoutedStore`] extractor. Nothing about the active
//! store is global, so concurrent requests for different identities never
//! observe each other's store.

use axum::{
    async_trait,
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use leancrm_core::{DemoError, DemoResult, EphemeralIdentity, IdentityMode};
use leancrm_storage::StoreHandle;
use rand::RngCore;

use crate::error::ApiError;
use crate::state::AppState;
use crate::telemetry::METRICS;

/// Header carrying a demo token issued by `POST /demo/token`.
pub const DEMO_TOKEN_HEADER: &str = "x-demo-token";

/// The one route allowed to create a session store.
pub const BOOTSTRAP_PATH: &str = "/api/v1/auth/register";

/// Random bytes in a minted session id (40 base64url chars).
const SESSION_ID_BYTES: usize = 30;

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

/// What the routing middleware decided for this request.
#[derive(Debug, Clone)]
pub struct DemoContext {
    pub mode: IdentityMode,
    /// Identity fingerprint, safe to log.
    pub identity: String,
    pub expires_at: DateTime<Utc>,
    /// Whether this request created the store.
    pub provisioned: bool,
}

/// Extractor for the store bound to the current request.
#[derive(Debug, Clone)]
pub struct RoutedStore(pub StoreHandle);

#[async_trait]
impl<S> FromRequestParts<S> for RoutedStore
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<StoreHandle>()
            .cloned()
            .map(RoutedStore)
            .ok_or_else(|| {
                ApiError::internal_error(
                    "StoreHandle not found in request extensions. \
                     Ensure demo_routing_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for RoutedStore {
    type Target = StoreHandle;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// IDENTITY RESOLUTION
// ============================================================================

/// Where a request's identity came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    Token(EphemeralIdentity),
    Session(EphemeralIdentity),
}

impl IdentitySource {
    pub fn identity(&self) -> &EphemeralIdentity {
        match self {
            IdentitySource::Token(identity) | IdentitySource::Session(identity) => identity,
        }
    }
}

/// Read a cookie value from the `Cookie` headers.
pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Identify the caller. The token header wins over the session cookie.
///
/// `None` when the request carries neither; `Some(Err(_))` when the token
/// header is present but malformed.
pub fn identity_from_headers(
    headers: &HeaderMap,
    session_cookie: &str,
) -> Option<DemoResult<IdentitySource>> {
    if let Some(raw) = headers.get(DEMO_TOKEN_HEADER) {
        let token = raw
            .to_str()
            .map_err(|_| DemoError::InvalidIdentity {
                reason: "token header is not visible ASCII".to_string(),
            })
            .and_then(|t| EphemeralIdentity::token(t))
            .map(IdentitySource::Token);
        return Some(token);
    }

    cookie_value(headers, session_cookie)
        .and_then(|id| EphemeralIdentity::session(id).ok())
        .map(|identity| Ok(IdentitySource::Session(identity)))
}

/// A fresh session id for a caller arriving without one.
pub fn mint_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn is_bootstrap(method: &Method, path: &str) -> bool {
    method == Method::POST && path == BOOTSTRAP_PATH
}

fn session_cookie_header(name: &str, id: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, id)).ok()
}

fn record_failure(mode: IdentityMode, err: &DemoError) {
    let Ok(metrics) = METRICS.as_ref() else {
        return;
    };
    match err {
        DemoError::SessionExpired => metrics.record_expired(mode),
        DemoError::Provision(_) => metrics.record_provision_failure(mode),
        _ => {}
    }
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Bind the request to its store.
///
/// Returns `401 DEMO_SESSION_NOT_INITIALIZED` for an unknown identity outside
/// the registration route and `401 DEMO_SESSION_EXPIRED` after destroying a
/// lapsed store.
pub async fn demo_routing_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.demo_enabled() {
        request.extensions_mut().insert(state.default_store.clone());
        return next.run(request).await;
    }

    // Nested routers see a stripped path; match on the path the client sent.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let bootstrap = is_bootstrap(request.method(), &path);
    let cookie_name = state.sandbox.config().session_cookie.clone();

    let (source, minted) = match identity_from_headers(request.headers(), &cookie_name) {
        Some(Ok(source)) => (source, None),
        Some(Err(e)) => return ApiError::from(e).into_response(),
        None if bootstrap => {
            let id = mint_session_id();
            match EphemeralIdentity::session(id.clone()) {
                Ok(identity) => (IdentitySource::Session(identity), Some(id)),
                Err(e) => return ApiError::from(e).into_response(),
            }
        }
        None => return ApiError::session_not_initialized().into_response(),
    };

    let identity = source.identity();
    let resolution = match state.sandbox.route(identity, bootstrap).await {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::debug!(identity = %identity, error = %e, "Demo routing refused request");
            record_failure(identity.mode(), &e);
            return ApiError::from(e).into_response();
        }
    };

    if resolution.provisioned {
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_provisioned(identity.mode());
        }
    }

    let record = &resolution.record;
    request
        .extensions_mut()
        .insert(StoreHandle::for_record(record));
    let context = DemoContext {
        mode: identity.mode(),
        identity: identity.fingerprint(),
        expires_at: record.expires_at,
        provisioned: resolution.provisioned,
    };
    request.extensions_mut().insert(context.clone());

    let mut response = next.run(request).await;
    // Outer layers (rate limiting) only trust identities routing resolved.
    response.extensions_mut().insert(context);

    if let Some(id) = minted {
        match session_cookie_header(&cookie_name, &id) {
            Some(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            None => tracing::warn!("Minted session id is not a valid cookie value"),
        }
    }

    response
}
