//! Background Jobs for the LeanCRM API
//!
//! - `demo_purge`: reclaims demo stores idle past the purge TTL
//!
//! # Usage
//!
//! ```ignore
//! use leancrm_api::jobs::{demo_purge_task, DemoPurgeConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let config = DemoPurgeConfig::from_demo_config(sandbox.config());
//! tokio::spawn(demo_purge_task(sandbox.clone(), config, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod demo_purge;

pub use demo_purge::{demo_purge_task, DemoPurgeConfig, DemoPurgeMetrics, DemoPurgeSnapshot};
