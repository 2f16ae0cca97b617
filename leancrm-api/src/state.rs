//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use leancrm_core::DemoConfig;
use leancrm_storage::{DemoSandbox, StoreHandle};

use crate::config::ApiConfig;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Demo provisioning, registries and reaper. Inert when demo mode is off.
    pub sandbox: DemoSandbox,
    /// Store used by every request while demo mode is off.
    pub default_store: StoreHandle,
    pub api_config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(demo_config: DemoConfig, api_config: ApiConfig) -> Self {
        let default_store = StoreHandle::default_store(demo_config.default_database_path.clone());
        Self {
            sandbox: DemoSandbox::new(demo_config),
            default_store,
            api_config: Arc::new(api_config),
            start_time: Instant::now(),
        }
    }

    pub fn demo_enabled(&self) -> bool {
        self.sandbox.is_enabled()
    }
}

crate::impl_from_ref!(DemoSandbox, sandbox);
crate::impl_from_ref!(Arc<ApiConfig>, api_config);
crate::impl_from_ref!(Instant, start_time);
