//! Rate Limiting Middleware
//!
//! Per-caller quotas. Auth routes get the stricter quota and are always keyed
//! by client IP, since that is where stores get provisioned. Other routes are
//! keyed by demo identity once demo routing has resolved it, and by client IP
//! until then. Runs outside the demo routing layer so a flood of bootstrap
//! requests is rejected before any store is provisioned.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::middleware::demo::{identity_from_headers, DemoContext};

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Path prefix of the stricter auth quota.
const AUTH_PREFIX: &str = "/api/v1/auth/";

/// A limiter unused for this long has fully replenished and is dropped.
pub const LIMITER_IDLE_TTL: Duration = Duration::from_secs(120);

/// Minimum spacing between eviction passes.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Which quota a request counts against.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RateLimitScope {
    Api,
    Auth,
}

/// Key for rate limiting - either demo identity or IP address.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    /// Caller whose demo identity was resolved by routing, keyed by its fingerprint
    Identity(RateLimitScope, String),
    /// Anonymous or not yet resolved caller, keyed by client IP
    Ip(RateLimitScope, IpAddr),
}

impl RateLimitKey {
    fn scope(&self) -> RateLimitScope {
        match self {
            RateLimitKey::Identity(scope, _) | RateLimitKey::Ip(scope, _) => *scope,
        }
    }
}

struct TrackedLimiter {
    limiter: DirectRateLimiter,
    /// Milliseconds since `RateLimitState::epoch` at last use.
    last_seen_ms: AtomicU64,
}

/// State for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    session_cookie: Arc<str>,
    limiters: Arc<DashMap<RateLimitKey, Arc<TrackedLimiter>>>,
    epoch: Instant,
    last_eviction_ms: Arc<AtomicU64>,
}

impl RateLimitState {
    pub fn new(config: Arc<ApiConfig>, session_cookie: &str) -> Self {
        Self {
            config,
            session_cookie: Arc::from(session_cookie),
            limiters: Arc::new(DashMap::new()),
            epoch: Instant::now(),
            last_eviction_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    fn limit_for(&self, scope: RateLimitScope) -> u32 {
        match scope {
            RateLimitScope::Api => self.config.rate_limit_api,
            RateLimitScope::Auth => self.config.rate_limit_auth,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn get_or_create_limiter(&self, key: &RateLimitKey) -> Arc<TrackedLimiter> {
        let now = self.elapsed_ms();
        let tracked = self.limiters.entry(key.clone()).or_insert_with(|| {
            let per_minute = self.limit_for(key.scope());
            let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN))
                .allow_burst(
                    NonZeroU32::new(per_minute.saturating_add(self.config.rate_limit_burst))
                        .unwrap_or(NonZeroU32::MIN),
                );
            Arc::new(TrackedLimiter {
                limiter: RateLimiter::direct(quota),
                last_seen_ms: AtomicU64::new(now),
            })
        });
        tracked.last_seen_ms.store(now, Ordering::Relaxed);
        tracked.clone()
    }

    /// The identity key for `fingerprint`, if routing has resolved it before.
    fn resolved_identity_key(&self, fingerprint: String) -> Option<RateLimitKey> {
        let key = RateLimitKey::Identity(RateLimitScope::Api, fingerprint);
        self.limiters.contains_key(&key).then_some(key)
    }

    /// Start counting `context`'s API requests against its own quota.
    fn track_resolved(&self, context: &DemoContext) {
        let key = RateLimitKey::Identity(RateLimitScope::Api, context.identity.clone());
        if !self.limiters.contains_key(&key) {
            self.get_or_create_limiter(&key);
        }
    }

    /// Drop limiters unused for at least `max_idle`. Returns how many went.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.elapsed_ms();
        let max_idle_ms = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        let before = self.limiters.len();
        self.limiters.retain(|_, tracked| {
            now.saturating_sub(tracked.last_seen_ms.load(Ordering::Relaxed)) < max_idle_ms
        });
        before.saturating_sub(self.limiters.len())
    }

    fn maybe_evict(&self) {
        let now = self.elapsed_ms();
        let last = self.last_eviction_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < EVICTION_INTERVAL.as_millis() as u64 {
            return;
        }
        if self
            .last_eviction_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let evicted = self.evict_idle(LIMITER_IDLE_TTL);
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.limiters.len(), "Evicted idle rate limiters");
        }
    }

    /// Number of distinct callers currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.limiters.len()
    }
}

/// Error type for rate limit middleware.
pub struct RateLimitError {
    /// Seconds until the caller may retry
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(Some(self.retry_after));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response();
        response.headers_mut().insert(
            HeaderName::from_static("retry-after"),
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Extract client IP from request, considering proxy headers.
fn extract_client_ip(request: &Request) -> IpAddr {
    let headers = request.headers();

    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
    {
        if let Ok(ip) = first_ip.trim().parse() {
            return ip;
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse() {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn rate_limit_key(state: &RateLimitState, request: &Request) -> RateLimitKey {
    if request.uri().path().starts_with(AUTH_PREFIX) {
        return RateLimitKey::Ip(RateLimitScope::Auth, extract_client_ip(request));
    }

    // A claimed identity only earns its own quota once routing has resolved
    // it; rotating made-up tokens or cookies stays on the IP's quota.
    let claimed = match identity_from_headers(request.headers(), &state.session_cookie) {
        Some(Ok(source)) => Some(source.identity().fingerprint()),
        _ => None,
    };
    claimed
        .and_then(|fingerprint| state.resolved_identity_key(fingerprint))
        .unwrap_or_else(|| RateLimitKey::Ip(RateLimitScope::Api, extract_client_ip(request)))
}

/// Rate limiting middleware.
///
/// When rate limited, returns 429 Too Many Requests with Retry-After header.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    state.maybe_evict();
    let key = rate_limit_key(&state, &request);
    let tracked = state.get_or_create_limiter(&key);

    match tracked.limiter.check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            if let Some(context) = response.extensions().get::<DemoContext>() {
                state.track_resolved(context);
            }
            let limit = state.limit_for(key.scope());
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from_str(&limit.to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("60")),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);

            tracing::debug!(key = ?key, retry_after, "Rate limit exceeded");
            Err(RateLimitError { retry_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use chrono::Utc;
    use leancrm_core::{EphemeralIdentity, IdentityMode};
    use tower::ServiceExt;

    const KNOWN_TOKEN: &str = "known-token-known-token-known-token-0001";

    /// Stands in for demo routing: only `KNOWN_TOKEN` resolves.
    async fn routed() -> Response {
        let mut response = "ok".into_response();
        if let Ok(identity) = EphemeralIdentity::token(KNOWN_TOKEN) {
            response.extensions_mut().insert(DemoContext {
                mode: IdentityMode::Token,
                identity: identity.fingerprint(),
                expires_at: Utc::now(),
                provisioned: false,
            });
        }
        response
    }

    fn app_with(state: RateLimitState) -> Router {
        Router::new()
            .route("/api/v1/companies", get(|| async { "ok" }))
            .route("/api/v1/contacts", get(routed))
            .route("/api/v1/auth/register", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
    }

    fn app(config: ApiConfig) -> Router {
        app_with(RateLimitState::new(Arc::new(config), "leancrm_session"))
    }

    async fn send(app: &Router, uri: &str, ip: &str, headers: &[(&str, &str)]) -> Result<StatusCode, String> {
        let mut builder = Request::builder().uri(uri).header("x-forwarded-for", ip);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).map_err(|e| e.to_string())?;
        let response = app
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        Ok(response.status())
    }

    async fn status(app: &Router, uri: &str, ip: &str) -> Result<StatusCode, String> {
        send(app, uri, ip, &[]).await
    }

    #[tokio::test]
    async fn test_auth_routes_use_stricter_quota() -> Result<(), String> {
        let config = ApiConfig {
            rate_limit_api: 60,
            rate_limit_auth: 2,
            rate_limit_burst: 0,
            ..ApiConfig::default()
        };
        let app = app(config);

        assert_eq!(status(&app, "/api/v1/auth/register", "10.0.0.1").await?, StatusCode::OK);
        assert_eq!(status(&app, "/api/v1/auth/register", "10.0.0.1").await?, StatusCode::OK);
        assert_eq!(
            status(&app, "/api/v1/auth/register", "10.0.0.1").await?,
            StatusCode::TOO_MANY_REQUESTS
        );

        // Other callers and the API quota are unaffected.
        assert_eq!(status(&app, "/api/v1/auth/register", "10.0.0.2").await?, StatusCode::OK);
        assert_eq!(status(&app, "/api/v1/companies", "10.0.0.1").await?, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_rotating_session_cookies_share_the_ip_auth_quota() -> Result<(), String> {
        let state = RateLimitState::new(
            Arc::new(ApiConfig {
                rate_limit_auth: 5,
                rate_limit_burst: 0,
                ..ApiConfig::default()
            }),
            "leancrm_session",
        );
        let app = app_with(state.clone());

        let mut allowed = 0;
        for i in 0..20 {
            let cookie = format!("leancrm_session=attacker{}", i);
            let code = send(&app, "/api/v1/auth/register", "10.0.0.1", &[("cookie", cookie.as_str())]).await?;
            if code == StatusCode::OK {
                allowed += 1;
            } else {
                assert_eq!(code, StatusCode::TOO_MANY_REQUESTS);
            }
        }

        assert_eq!(allowed, 5);
        assert_eq!(state.tracked_keys(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unresolved_tokens_are_keyed_by_ip() -> Result<(), String> {
        let state = RateLimitState::new(
            Arc::new(ApiConfig {
                rate_limit_api: 2,
                rate_limit_burst: 0,
                ..ApiConfig::default()
            }),
            "leancrm_session",
        );
        let app = app_with(state.clone());

        for i in 0..2 {
            let token = format!("made-up-token-made-up-token-{:06}", i);
            let code = send(&app, "/api/v1/companies", "10.0.0.4", &[("x-demo-token", token.as_str())]).await?;
            assert_eq!(code, StatusCode::OK);
        }
        let token = "made-up-token-made-up-token-999999";
        assert_eq!(
            send(&app, "/api/v1/companies", "10.0.0.4", &[("x-demo-token", token)]).await?,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(state.tracked_keys(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolved_identity_gets_its_own_quota() -> Result<(), String> {
        let app = app(ApiConfig {
            rate_limit_api: 2,
            rate_limit_burst: 0,
            ..ApiConfig::default()
        });
        let known = [("x-demo-token", KNOWN_TOKEN)];

        // First request is charged to the IP; routing resolves the token.
        assert_eq!(send(&app, "/api/v1/contacts", "10.0.0.5", &known).await?, StatusCode::OK);
        assert_eq!(send(&app, "/api/v1/contacts", "10.0.0.5", &known).await?, StatusCode::OK);
        assert_eq!(send(&app, "/api/v1/contacts", "10.0.0.5", &known).await?, StatusCode::OK);
        assert_eq!(
            send(&app, "/api/v1/contacts", "10.0.0.5", &known).await?,
            StatusCode::TOO_MANY_REQUESTS
        );

        // The IP still has one request left.
        assert_eq!(status(&app, "/api/v1/companies", "10.0.0.5").await?, StatusCode::OK);
        assert_eq!(
            status(&app, "/api/v1/companies", "10.0.0.5").await?,
            StatusCode::TOO_MANY_REQUESTS
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_limiters_are_evicted() -> Result<(), String> {
        let state = RateLimitState::new(Arc::new(ApiConfig::default()), "leancrm_session");
        let app = app_with(state.clone());

        status(&app, "/api/v1/companies", "10.0.0.6").await?;
        status(&app, "/api/v1/companies", "10.0.0.7").await?;
        assert_eq!(state.tracked_keys(), 2);

        assert_eq!(state.evict_idle(LIMITER_IDLE_TTL), 0);
        assert_eq!(state.tracked_keys(), 2);

        assert_eq!(state.evict_idle(Duration::ZERO), 2);
        assert_eq!(state.tracked_keys(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejection_carries_retry_after() -> Result<(), String> {
        let config = ApiConfig {
            rate_limit_auth: 1,
            rate_limit_burst: 0,
            ..ApiConfig::default()
        };
        let app = app(config);
        let request = || {
            Request::builder()
                .uri("/api/v1/auth/register")
                .header("x-forwarded-for", "10.0.0.9")
                .body(Body::empty())
                .map_err(|e| e.to_string())
        };

        app.clone().oneshot(request()?).await.map_err(|e| format!("{:?}", e))?;
        let response = app.oneshot(request()?).await.map_err(|e| format!("{:?}", e))?;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_rate_limiting() -> Result<(), String> {
        let app = app(ApiConfig {
            rate_limit_auth: 1,
            ..ApiConfig::unthrottled()
        });
        for _ in 0..5 {
            assert_eq!(status(&app, "/api/v1/auth/register", "10.0.0.3").await?, StatusCode::OK);
        }
        Ok(())
    }
}
