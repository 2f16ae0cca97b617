//! LeanCRM Core - Demo Sandbox Domain Types
//!
//! Identity, record and configuration types shared by the storage and API
//! crates. Nothing here touches the filesystem beyond path arithmetic.

pub mod config;
pub mod error;
pub mod identity;
pub mod record;

pub use config::{to_chrono, DemoConfig};
pub use error::{ConfigError, DemoError, DemoResult, ProvisionError, RegistryError};
pub use identity::{EphemeralIdentity, IdentityMode};
pub use record::{ExpiryPolicy, StoreLocation, StoreRecord};
