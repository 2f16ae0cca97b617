//! Deal REST API Routes

use axum::{extract::Query, routing::get, Json, Router};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::middleware::RoutedStore;
use crate::state::AppState;
use crate::types::{ListDealsResponse, ListParams};

/// GET /api/v1/deals - List deals
#[utoipa::path(
    get,
    path = "/api/v1/deals",
    tag = "Deals",
    params(ListParams),
    responses(
        (status = 200, description = "Deals in the caller's store", body = ListDealsResponse),
        (status = 401, description = "Demo session not initialized or expired", body = ApiError),
    ),
)]
pub async fn list_deals(
    store: RoutedStore,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListDealsResponse>> {
    let response = store
        .with_connection(move |conn| db::deal_list(conn, &params))
        .await?;
    Ok(Json(response))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(list_deals))
}
