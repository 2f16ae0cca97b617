//! Contact REST API Routes

use axum::{extract::Query, routing::get, Json, Router};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::middleware::RoutedStore;
use crate::state::AppState;
use crate::types::{ListContactsResponse, ListParams};

/// GET /api/v1/contacts - List contacts
///
/// The `name` filter matches against "first last".
#[utoipa::path(
    get,
    path = "/api/v1/contacts",
    tag = "Contacts",
    params(ListParams),
    responses(
        (status = 200, description = "Contacts in the caller's store", body = ListContactsResponse),
        (status = 401, description = "Demo session not initialized or expired", body = ApiError),
    ),
)]
pub async fn list_contacts(
    store: RoutedStore,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListContactsResponse>> {
    let response = store
        .with_connection(move |conn| db::contact_list(conn, &params))
        .await?;
    Ok(Json(response))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(list_contacts))
}
