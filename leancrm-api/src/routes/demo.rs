//! Demo Token Routes
//!
//! `POST /demo/token` issues a token whose store is provisioned before the
//! response is sent. The token is then sent in the `X-Demo-Token` header.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::SecondsFormat;
use leancrm_core::DemoError;
use leancrm_storage::DemoSandbox;

use crate::error::ApiError;
use crate::state::AppState;
use crate::telemetry::METRICS;
use crate::types::{DemoDisabledResponse, DemoTokenResponse};

pub const TOKEN_USAGE_MESSAGE: &str = "Use this token in X-Demo-Token header for API requests";

pub const DEMO_DISABLED_MESSAGE: &str = "Demo mode is not enabled";

/// POST /demo/token - Issue a demo token
#[utoipa::path(
    post,
    path = "/demo/token",
    tag = "Demo",
    responses(
        (status = 200, description = "Token issued and its store provisioned", body = DemoTokenResponse),
        (status = 500, description = "Store provisioning failed", body = ApiError),
        (status = 503, description = "Demo mode is not enabled", body = DemoDisabledResponse),
    ),
)]
pub async fn issue_token(State(sandbox): State<DemoSandbox>) -> Response {
    let issued = match sandbox.issue_token().await {
        Ok(issued) => issued,
        // Clients match on the literal `error` text here, not on an error code.
        Err(DemoError::DemoModeDisabled) => return demo_disabled(),
        Err(e) => return ApiError::from(e).into_response(),
    };

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_provisioned(issued.identity.mode());
    }

    Json(DemoTokenResponse {
        token: issued.token().to_string(),
        expires_in: issued.expires_in_secs,
        expires_at: issued
            .expires_at
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        message: TOKEN_USAGE_MESSAGE.to_string(),
    })
    .into_response()
}

fn demo_disabled() -> Response {
    let body = DemoDisabledResponse {
        error: DEMO_DISABLED_MESSAGE.to_string(),
        message: DEMO_DISABLED_MESSAGE.to_string(),
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/token", post(issue_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_disabled_body_carries_message_in_error_field() {
        let response = demo_disabled();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Demo mode is not enabled");
        assert_eq!(body["message"], "Demo mode is not enabled");
    }
}
