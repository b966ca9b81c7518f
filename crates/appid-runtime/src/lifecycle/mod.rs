//! Feature drivers and the lifecycle passes that run them.
//!
//! A [`FeatureDriver`] attaches a feature (behavior and state) to parties.
//! Drivers are registered in a [`DriverRegistry`]; registration order is
//! setup order and teardown runs in exact reverse.
//!
//! # Passes
//!
//! | Pass | When | Order | Failure |
//! |------|------|-------|---------|
//! | `setup` | agent start | registration | every driver runs, the initialization fails |
//! | `setup_dynamic` | add | registration, per new party | nothing is published |
//! | `teardown_dynamic` | destroy | reverse | logged |
//! | `teardown` | agent stop | reverse | logged |
//!
//! Every pass runs on one [`Trampoline`](crate::trampoline::Trampoline),
//! exposed with a shared [`Memory`](crate::trampoline::Memory) by the
//! [`LifecycleContext`]. A whole add batch shares one pass: its parties are
//! published together, in the second success round, or not at all.
//!
//! # Example
//!
//! ```
//! use appid_runtime::lifecycle::{DriverBinding, DriverError, FeatureDriver, LifecycleContext};
//! use appid_runtime::party::{OwnedPartyRef, Party};
//! use async_trait::async_trait;
//!
//! struct Greeting(String);
//!
//! struct GreetingFeatureDriver {
//!     binding: DriverBinding,
//! }
//!
//! #[async_trait]
//! impl FeatureDriver for GreetingFeatureDriver {
//!     fn binding(&self) -> &DriverBinding {
//!         &self.binding
//!     }
//!
//!     async fn setup(&self, cx: &LifecycleContext) -> Result<bool, DriverError> {
//!         for remote in cx.get_all_remotes() {
//!             if self.binding.is_allowed_feature(remote.as_ref()) {
//!                 remote.features().add(Greeting(format!("hello {remote}")))?;
//!             }
//!         }
//!         Ok(true)
//!     }
//!
//!     async fn setup_dynamic(
//!         &self,
//!         cx: &LifecycleContext,
//!         _party: &OwnedPartyRef,
//!     ) -> Result<bool, DriverError> {
//!         self.setup(cx).await
//!     }
//!
//!     async fn teardown_dynamic(
//!         &self,
//!         _cx: &LifecycleContext,
//!         _party: &OwnedPartyRef,
//!     ) -> Result<(), DriverError> {
//!         Ok(())
//!     }
//!
//!     async fn teardown(&self, _cx: &LifecycleContext) -> Result<(), DriverError> {
//!         Ok(())
//!     }
//! }
//! ```

mod context;
mod driver;
mod error;

pub(crate) use context::Lifecycle;

pub use context::LifecycleContext;
pub use driver::{DriverBinding, DriverRegistry};
pub use error::DriverError;

use crate::party::OwnedPartyRef;
use async_trait::async_trait;

/// Plugin attaching a feature to parties.
///
/// Every method runs on the identity agent, one at a time. Setup methods
/// fail by returning `Ok(false)` or an error.
///
/// Teardown methods may be called for parties the driver never set up and
/// must tolerate it.
#[async_trait]
pub trait FeatureDriver: Send + Sync + 'static {
    /// Binding received at registration.
    fn binding(&self) -> &DriverBinding;

    /// Feature name.
    fn feature_name(&self) -> &str {
        self.binding().feature_name()
    }

    /// Sets up the parties of the static configuration.
    async fn setup(&self, cx: &LifecycleContext) -> Result<bool, DriverError>;

    /// Sets up a party added at runtime. For a tenant domain,
    /// [`LifecycleContext::get_all_remotes`] yields its remotes.
    async fn setup_dynamic(
        &self,
        cx: &LifecycleContext,
        party: &OwnedPartyRef,
    ) -> Result<bool, DriverError>;

    /// Tears down a destroyed party.
    async fn teardown_dynamic(
        &self,
        cx: &LifecycleContext,
        party: &OwnedPartyRef,
    ) -> Result<(), DriverError>;

    /// Tears down everything on shutdown.
    async fn teardown(&self, cx: &LifecycleContext) -> Result<(), DriverError>;
}
