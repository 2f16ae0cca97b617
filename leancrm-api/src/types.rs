//! Request and response types for the REST API.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Default page size for list endpoints.
pub const DEFAULT_LIMIT: u32 = 15;

/// Largest page a caller may request.
pub const MAX_LIMIT: u32 = 100;

// ============================================================================
// DEMO
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DemoTokenResponse {
    /// Send this value in the `X-Demo-Token` header
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
    /// ISO-8601 expiry timestamp
    pub expires_at: String,
    pub message: String,
}

/// Body of the 503 returned by `POST /demo/token` while demo mode is off.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DemoDisabledResponse {
    /// Always "Demo mode is not enabled"
    pub error: String,
    pub message: String,
}

// ============================================================================
// AUTH
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub team_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

// ============================================================================
// LISTING
// ============================================================================

/// Query parameters shared by list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Case-insensitive substring filter on the record's name
    pub name: Option<String>,
    /// Page size (default 15, max 100)
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u32>,
}

impl ListParams {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// The name filter, ignoring blank values.
    pub fn name_filter(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

// ============================================================================
// COMPANIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CompanyResponse {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub notes: Option<String>,
    pub team_id: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateCompanyRequest {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListCompaniesResponse {
    pub data: Vec<CompanyResponse>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

// ============================================================================
// CONTACTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContactResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub company_id: Option<i64>,
    pub notes: Option<String>,
    pub team_id: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListContactsResponse {
    pub data: Vec<ContactResponse>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

// ============================================================================
// DEALS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DealResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub stage: String,
    pub probability: i64,
    pub expected_close_date: Option<String>,
    pub company_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub user_id: Option<i64>,
    pub team_id: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListDealsResponse {
    pub data: Vec<DealResponse>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}
