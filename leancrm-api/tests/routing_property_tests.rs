//! Property-based tests for demo routing and credentials.
//!
//! A request whose identity is unknown or malformed is always refused with
//! `401 DEMO_SESSION_NOT_INITIALIZED` and never creates a store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use leancrm_api::{
    auth::{format_access_token, hash_password},
    create_api_router, ApiConfig, AppState, ListParams,
};
use leancrm_test_utils::Sandbox;
use proptest::prelude::*;
use tower::ServiceExt;

// ============================================================================
// STRATEGIES
// ============================================================================

/// Header values that can never name an issued token: wrong length, bad
/// characters, or well-formed but never issued.
fn unknown_token_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9_-]{1,31}",
        "[A-Za-z0-9]{20,40}[.+/=][A-Za-z0-9]{20,40}",
        "[A-Za-z0-9_-]{32,128}",
    ]
}

fn non_bootstrap_path_strategy() -> impl Strategy<Value = (&'static str, &'static str)> {
    prop_oneof![
        Just(("GET", "/api/v1/companies")),
        Just(("POST", "/api/v1/companies")),
        Just(("GET", "/api/v1/contacts")),
        Just(("GET", "/api/v1/deals")),
        Just(("GET", "/api/v1/auth/register")),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_unknown_identity_is_refused(
        token in unknown_token_strategy(),
        session in "[A-Za-z0-9_-]{1,64}",
        use_token in any::<bool>(),
        (method, path) in non_bootstrap_path_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let sandbox = Sandbox::new().unwrap();
            let app = create_api_router(AppState::new(
                sandbox.demo_config(),
                ApiConfig::unthrottled(),
            ));

            let builder = Request::builder().method(method).uri(path);
            let builder = if use_token {
                builder.header("x-demo-token", token.as_str())
            } else {
                builder.header("cookie", format!("leancrm_session={}", session))
            };
            let response = app
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap();

            prop_assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            prop_assert_eq!(&body["error"], "DEMO_SESSION_NOT_INITIALIZED");
            prop_assert!(sandbox.store_files().is_empty());
            Ok(())
        })?;
    }

    #[test]
    fn prop_password_hash_never_embeds_plaintext(password in "[g-z]{8,40}") {
        let stored = hash_password(&password);
        let parts: Vec<&str> = stored.split('$').collect();
        prop_assert_eq!(parts.len(), 3);
        prop_assert_eq!(parts[0], "sha256");
        prop_assert_eq!(parts[1].len(), 32);
        prop_assert_eq!(parts[2].len(), 64);
        prop_assert!(!stored.contains(&password));
        prop_assert_ne!(stored, hash_password(&password));
    }

    #[test]
    fn prop_access_token_starts_with_id(id in 1i64..1_000_000, secret in "[A-Za-z0-9_-]{40}") {
        let token = format_access_token(id, &secret);
        let (prefix, rest) = token.split_once('|').unwrap();
        prop_assert_eq!(prefix.parse::<i64>().unwrap(), id);
        prop_assert_eq!(rest, secret.as_str());
    }

    #[test]
    fn prop_list_limit_is_bounded(limit in proptest::option::of(any::<u32>())) {
        let params = ListParams { limit, ..Default::default() };
        prop_assert!((1..=100).contains(&params.limit()));
    }
}
