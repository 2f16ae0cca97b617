//! OpenAPI Specification for the LeanCRM API
//!
//! Generated by utoipa from the route annotations and DTO schemas.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{auth, companies, contacts, deals, demo, health};
use crate::types::*;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LeanCRM API",
        version = "0.1.0",
        description = "CRM REST API with isolated, self-expiring demo stores per session or token",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Demo", description = "Demo token issuance"),
        (name = "Authentication", description = "Registration; bootstraps session demo stores"),
        (name = "Companies", description = "Company records"),
        (name = "Contacts", description = "Contact records"),
        (name = "Deals", description = "Deal pipeline records"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        demo::issue_token,
        auth::register,
        companies::list_companies,
        companies::create_company,
        companies::get_company,
        companies::update_company,
        companies::delete_company,
        contacts::list_contacts,
        deals::list_deals,
        health::ping,
        health::liveness,
        health::readiness,
        crate::telemetry::metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            DemoTokenResponse, DemoDisabledResponse,
            RegisterRequest, RegisterResponse, UserResponse,
            CompanyResponse, CreateCompanyRequest, UpdateCompanyRequest, ListCompaniesResponse,
            ContactResponse, ListContactsResponse,
            DealResponse, ListDealsResponse,
            HealthResponse, HealthStatus, HealthDetails, ComponentHealth
        )
    ),
    modifiers(&DemoIdentityAddon)
)]
pub struct ApiDoc;

/// Documents the two ways a caller carries a demo identity.
struct DemoIdentityAddon;

impl Modify for DemoIdentityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "demo_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Demo-Token"))),
            );
            components.add_security_scheme(
                "demo_session",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("leancrm_session"))),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
