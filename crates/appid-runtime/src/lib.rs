//! Application identity runtime.
//!
//! Maintains the identity graph of an application: the root party, the
//! remote parties it talks to, and tenant domains grouping remotes. Feature
//! drivers attach behavior to parties; they are set up and torn down in
//! dependency order as parties come and go.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  appid-types    : FullName, NameParts, ErrorCode            │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Runtime Layer (THIS CRATE)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config/     : IdentityConfig, PartySection, resolution     │
//! │  trampoline/ : round-based action executor                  │
//! │  agent/      : single-writer MicroAgent                     │
//! │  lifecycle/  : FeatureDriver, DriverRegistry, passes        │
//! │  party/      : RemoteParty, TenantDomainParty, events       │
//! │  service     : IdentityService (root party + agent)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! ## [`config`] - Configuration
//!
//! - [`IdentityConfig`](config::IdentityConfig): root section, store root, heartbeat
//! - [`ConfigLoader`](config::ConfigLoader): TOML file + environment overrides
//! - [`PartySection`](config::PartySection): declared parties, also used for increments
//!
//! ## [`agent`] - Serialized Execution
//!
//! - [`MicroAgent`](agent::MicroAgent): one task, one message at a time
//! - [`AgentHandler`](agent::AgentHandler): what the agent drives
//!
//! ## [`trampoline`] - Deferred Actions
//!
//! - [`Trampoline`](trampoline::Trampoline): actions and phase handlers
//! - [`TrampolineRunner`](trampoline::TrampolineRunner): one-shot execution
//!
//! ## [`lifecycle`] - Feature Drivers
//!
//! - [`FeatureDriver`](lifecycle::FeatureDriver): setup and teardown hooks
//! - [`DriverRegistry`](lifecycle::DriverRegistry): ordered registration
//! - [`LifecycleContext`](lifecycle::LifecycleContext): what a driver sees
//!
//! ## [`party`] - The Graph
//!
//! - [`RemoteParty`](party::RemoteParty), [`TenantDomainParty`](party::TenantDomainParty)
//! - [`PartyEvent`](party::PartyEvent), [`RemoteEvent`](party::RemoteEvent)
//!
//! # Example
//!
//! ```no_run
//! use appid_runtime::config::ConfigLoader;
//! use appid_runtime::IdentityService;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_file("appid.toml").load()?;
//! let service = IdentityService::new(&config)?;
//! // Register feature drivers here.
//! service.start_and_initialize().await?;
//! for party in service.all_parties() {
//!     println!("{party}");
//! }
//! service.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod lifecycle;
pub mod party;
pub mod trampoline;

mod error;
mod service;

pub use error::IdentityError;
pub use service::{IdentityService, Initialization};
