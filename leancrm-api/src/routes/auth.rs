//! Authentication Routes
//!
//! `POST /api/v1/auth/register` is the bootstrap route: in session mode it is
//! the only request allowed to create the caller's store.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::auth::{format_access_token, generate_token_secret, hash_password, MIN_PASSWORD_LEN};
use crate::db::{self, NewUser};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{DemoContext, RoutedStore};
use crate::state::AppState;
use crate::types::{RegisterRequest, RegisterResponse};

fn validate(req: &RegisterRequest) -> ApiResult<()> {
    if req.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    if req.email.trim().is_empty() {
        return Err(ApiError::missing_field("email"));
    }
    if !req.email.contains('@') {
        return Err(ApiError::invalid_format("email", "a valid email address"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation_failed(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if req.password != req.password_confirmation {
        return Err(ApiError::validation_failed(
            "Password confirmation does not match",
        ));
    }
    Ok(())
}

/// POST /api/v1/auth/register - Register a user in the caller's store
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Demo session not initialized or expired", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError),
    ),
)]
pub async fn register(
    store: RoutedStore,
    demo: Option<Extension<DemoContext>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&req)?;

    let email = req.email.trim().to_string();
    let (secret, token_hash) = generate_token_secret();
    let user = NewUser {
        name: req.name.trim().to_string(),
        email: email.clone(),
        password_hash: hash_password(&req.password),
        token_hash,
    };

    let created = store
        .with_connection(move |conn| db::user_register(conn, &user))
        .await?;
    let Some((user, token_id)) = created else {
        return Err(ApiError::entity_already_exists("User", email));
    };

    if let Some(Extension(demo)) = demo {
        tracing::info!(
            identity = %demo.identity,
            mode = %demo.mode,
            provisioned = demo.provisioned,
            user_id = user.id,
            "Registered user in demo store"
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            access_token: format_access_token(token_id, &secret),
            token_type: "Bearer".to_string(),
            user,
        }),
    ))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/register", post(register))
}
