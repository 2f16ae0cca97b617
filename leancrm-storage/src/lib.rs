//! LeanCRM Storage - Ephemeral Demo Stores
//!
//! Provisioning, identity registries, per-identity locking, request-scoped
//! store handles, and the reaper. Each demo identity owns one SQLite file;
//! the HTTP layer only ever sees a [`StoreHandle`].

pub mod handle;
pub mod layout;
pub mod locks;
pub mod provisioner;
pub mod reaper;
pub mod registry;
pub mod sandbox;
pub mod schema;

pub use handle::{StoreBinding, StoreError, StoreHandle};
pub use layout::StoreLayout;
pub use locks::{IdentityGuard, IdentityLocks};
pub use provisioner::{build_template, ProvisionOutcome, ProvisionSource, StoreProvisioner};
pub use reaper::{Reaper, SweepReport};
pub use registry::{generate_token, FsTimestampRegistry, IdentityRegistry, TokenCacheRegistry};
pub use sandbox::{route_blocking, DemoSandbox, IssuedToken, Resolution};
pub use schema::{ensure_schema, verify_store, REQUIRED_TABLES};
