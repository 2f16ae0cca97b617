//! LeanCRM API Server Entry Point
//!
//! Loads configuration, prepares storage, starts the demo purge task when
//! demo mode is on, and serves the Axum router until Ctrl-C.

use std::net::SocketAddr;

use axum::Router;
use leancrm_api::telemetry::{init_tracing, TelemetryConfig};
use leancrm_api::{
    create_api_router, demo_purge_task, ApiConfig, ApiError, ApiResult, AppState, DemoPurgeConfig,
};
use leancrm_core::{DemoConfig, DemoError};
use leancrm_storage::ensure_schema;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let demo_config = DemoConfig::from_env();
    demo_config.validate().map_err(DemoError::from)?;
    let api_config = ApiConfig::from_env();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(demo_config.clone(), api_config);

    let purge_handle = if demo_config.enabled {
        tracing::info!(
            storage_root = %demo_config.storage_root.display(),
            session_ttl_secs = demo_config.session_ttl.as_secs(),
            token_ttl_secs = demo_config.token_ttl.as_secs(),
            "Demo mode enabled"
        );
        let purge_config = DemoPurgeConfig::from_demo_config(&demo_config);
        Some(tokio::spawn(demo_purge_task(
            state.sandbox.clone(),
            purge_config,
            shutdown_rx,
        )))
    } else {
        let path = demo_config.default_database_path.clone();
        tracing::info!(path = %path.display(), "Demo mode disabled, using default store");
        tokio::task::spawn_blocking(move || ensure_schema(&path))
            .await?
            .map_err(DemoError::from)?;
        None
    };

    let app: Router = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting LeanCRM API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = purge_handle {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Demo purge task did not stop cleanly");
        }
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("LEANCRM_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("LEANCRM_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());

    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
