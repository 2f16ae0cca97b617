//! Company REST API Routes

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::middleware::RoutedStore;
use crate::state::AppState;
use crate::types::{
    CompanyResponse, CreateCompanyRequest, ListCompaniesResponse, ListParams, UpdateCompanyRequest,
};

const MAX_NAME_LEN: usize = 255;

fn validate_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation_failed(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/companies - List companies
#[utoipa::path(
    get,
    path = "/api/v1/companies",
    tag = "Companies",
    params(ListParams),
    responses(
        (status = 200, description = "Companies in the caller's store", body = ListCompaniesResponse),
        (status = 401, description = "Demo session not initialized or expired", body = ApiError),
    ),
)]
pub async fn list_companies(
    store: RoutedStore,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListCompaniesResponse>> {
    let response = store
        .with_connection(move |conn| db::company_list(conn, &params))
        .await?;
    Ok(Json(response))
}

/// POST /api/v1/companies - Create a company
#[utoipa::path(
    post,
    path = "/api/v1/companies",
    tag = "Companies",
    request_body = CreateCompanyRequest,
    responses(
        (status = 201, description = "Company created", body = CompanyResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Demo session not initialized or expired", body = ApiError),
    ),
)]
pub async fn create_company(
    store: RoutedStore,
    Json(req): Json<CreateCompanyRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_name(&req.name)?;

    let company = store
        .with_connection(move |conn| db::company_create(conn, &req))
        .await?;

    tracing::debug!(company_id = company.id, store = %store.path().display(), "Created company");
    Ok((StatusCode::CREATED, Json(company)))
}

/// GET /api/v1/companies/{id} - Get a company by ID
#[utoipa::path(
    get,
    path = "/api/v1/companies/{id}",
    tag = "Companies",
    params(("id" = i64, Path, description = "Company ID")),
    responses(
        (status = 200, description = "Company details", body = CompanyResponse),
        (status = 404, description = "Company not found", body = ApiError),
    ),
)]
pub async fn get_company(
    store: RoutedStore,
    Path(id): Path<i64>,
) -> ApiResult<Json<CompanyResponse>> {
    store
        .with_connection(move |conn| db::company_get(conn, id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::entity_not_found("Company", id))
}

/// PUT /api/v1/companies/{id} - Update a company
#[utoipa::path(
    put,
    path = "/api/v1/companies/{id}",
    tag = "Companies",
    params(("id" = i64, Path, description = "Company ID")),
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Company updated", body = CompanyResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 404, description = "Company not found", body = ApiError),
    ),
)]
pub async fn update_company(
    store: RoutedStore,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCompanyRequest>,
) -> ApiResult<Json<CompanyResponse>> {
    if let Some(name) = &req.name {
        validate_name(name)?;
    }

    store
        .with_connection(move |conn| db::company_update(conn, id, &req))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::entity_not_found("Company", id))
}

/// DELETE /api/v1/companies/{id} - Delete a company
#[utoipa::path(
    delete,
    path = "/api/v1/companies/{id}",
    tag = "Companies",
    params(("id" = i64, Path, description = "Company ID")),
    responses(
        (status = 204, description = "Company deleted"),
        (status = 404, description = "Company not found", body = ApiError),
    ),
)]
pub async fn delete_company(store: RoutedStore, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    let deleted = store
        .with_connection(move |conn| db::company_delete(conn, id))
        .await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::entity_not_found("Company", id))
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_companies).post(create_company))
        .route(
            "/:id",
            get(get_company).put(update_company).delete(delete_company),
        )
}
