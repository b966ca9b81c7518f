//! Identity configuration.
//!
//! # Layers
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  ConfigLoader                        │  file + APPID_* env vars
//! ├──────────────────────────────────────┤
//! │  IdentityConfig                      │  store root, heartbeat, root section
//! ├──────────────────────────────────────┤
//! │  PartySection (nested)               │  raw names, features, settings
//! ├──────────────────────────────────────┤
//! │  resolve_root / resolve_increment    │  PartyConfiguration + FeaturePolicy
//! └──────────────────────────────────────┘
//! ```
//!
//! Resolution is synchronous and side-effect free: a bad section is
//! rejected before anything reaches the party graph.
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `APPID_STORE_ROOT` | `store_root_path` | PathBuf |
//! | `APPID_HEARTBEAT_MS` | `heartbeat_ms` | u64 |

mod error;
mod loader;
mod policy;
mod resolve;
mod section;
mod types;

pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_HEARTBEAT_MS, ENV_STORE_ROOT};
pub use policy::FeaturePolicy;
pub use resolve::{
    resolve_increment, resolve_root, PartyConfiguration, PartyKind, ResolvedParties,
    ResolvedRoot, TenantDomainConfiguration,
};
pub use section::PartySection;
pub use types::{
    default_store_root, IdentityConfig, DEFAULT_HEARTBEAT_MS, MAX_HEARTBEAT_MS, MIN_HEARTBEAT_MS,
};
