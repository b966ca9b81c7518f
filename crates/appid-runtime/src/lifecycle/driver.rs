//! Driver registration.

use super::FeatureDriver;
use crate::config::PartyConfiguration;
use crate::party::Party;
use crate::IdentityError;
use parking_lot::{Mutex, RwLock};
use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const DRIVER_SUFFIX: &str = "FeatureDriver";

/// Where a driver sits and what its root policy is.
///
/// Handed to the driver's constructor by [`DriverRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverBinding {
    feature_name: String,
    is_root_allowed: bool,
    position: usize,
}

impl DriverBinding {
    /// Feature name: the driver type name without its `FeatureDriver` suffix.
    #[must_use]
    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    /// Whether the feature is allowed on the root party.
    #[must_use]
    pub fn is_root_allowed(&self) -> bool {
        self.is_root_allowed
    }

    /// Rank in setup order, starting at 0.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether the feature is allowed on `party`.
    ///
    /// The root answers [`is_root_allowed`](Self::is_root_allowed). An
    /// owned party first evaluates its owner's policy from that answer,
    /// then its own policy from the owner's answer.
    pub fn is_allowed_feature(&self, party: &(impl Party + ?Sized)) -> bool {
        let Some(owner) = party.owner_configuration() else {
            return self.is_root_allowed;
        };
        let above = owner.is_allowed_feature(&self.feature_name, self.is_root_allowed);
        party
            .configuration()
            .is_allowed_feature(&self.feature_name, above)
    }
}

/// Ordered list of the feature drivers of one identity service.
///
/// Registration order is setup order. A driver can only be built once its
/// dependencies are registered (it receives them as `Arc`s), so this order
/// is always a topological order of the dependency graph.
///
/// The list is frozen when the identity agent starts.
pub struct DriverRegistry {
    root: Arc<PartyConfiguration>,
    drivers: RwLock<Vec<Arc<dyn FeatureDriver>>>,
    expected: Mutex<Vec<String>>,
    registering: Mutex<()>,
    frozen: AtomicBool,
}

impl DriverRegistry {
    pub(crate) fn new(root: Arc<PartyConfiguration>) -> Self {
        Self {
            root,
            drivers: RwLock::new(Vec::new()),
            expected: Mutex::new(Vec::new()),
            registering: Mutex::new(()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Builds and appends a driver of type `D`.
    ///
    /// `build` receives the binding. It may read the registry but must not
    /// register other drivers: register dependencies first and move them
    /// into `build`.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::InvalidDriverName`]: the type name does not end
    ///   with `FeatureDriver`.
    /// - [`IdentityError::DuplicateDriver`]: a driver with the same feature
    ///   name exists.
    /// - [`IdentityError::DriversFrozen`]: the agent already started.
    pub fn register<D, F>(&self, is_allowed_by_default: bool, build: F) -> Result<Arc<D>, IdentityError>
    where
        D: FeatureDriver,
        F: FnOnce(DriverBinding) -> D,
    {
        let feature_name = feature_name_of(type_name::<D>())?;
        // Serializes registrations; `build` runs without the list lock so it
        // may read the registry.
        let _registering = self.registering.lock();
        let position = {
            let drivers = self.drivers.read();
            self.check_registrable(&drivers, &feature_name)?;
            drivers.len()
        };
        let binding = DriverBinding {
            is_root_allowed: self
                .root
                .is_allowed_feature(&feature_name, is_allowed_by_default),
            feature_name,
            position,
        };
        debug!(
            feature = %binding.feature_name,
            position = binding.position,
            root_allowed = binding.is_root_allowed,
            "Registering feature driver"
        );
        let feature_name = binding.feature_name.clone();
        let driver = Arc::new(build(binding));

        let mut drivers = self.drivers.write();
        // The agent may have started while `build` ran.
        self.check_registrable(&drivers, &feature_name)?;
        drivers.push(Arc::clone(&driver) as Arc<dyn FeatureDriver>);
        Ok(driver)
    }

    fn check_registrable(
        &self,
        drivers: &[Arc<dyn FeatureDriver>],
        feature_name: &str,
    ) -> Result<(), IdentityError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(IdentityError::DriversFrozen(feature_name.to_string()));
        }
        if drivers
            .iter()
            .any(|d| d.feature_name().eq_ignore_ascii_case(feature_name))
        {
            return Err(IdentityError::DuplicateDriver(feature_name.to_string()));
        }
        Ok(())
    }

    /// Declares a feature that must be registered before the agent starts.
    ///
    /// A missing expected driver vetoes the start.
    pub fn expect(&self, feature_name: impl Into<String>) {
        self.expected.lock().push(feature_name.into());
    }

    /// Feature names in setup order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.drivers
            .read()
            .iter()
            .map(|d| d.feature_name().to_string())
            .collect()
    }

    /// Number of registered drivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers.read().len()
    }

    /// True when no driver is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the agent started.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Freezes the list. Returns `false` when an expected driver is missing.
    pub(crate) fn freeze(&self) -> bool {
        let drivers = self.drivers.write();
        self.frozen.store(true, Ordering::Release);
        if drivers.is_empty() {
            warn!("No feature driver registered");
        }
        let mut complete = true;
        for name in self.expected.lock().iter() {
            if !drivers
                .iter()
                .any(|d| d.feature_name().eq_ignore_ascii_case(name))
            {
                warn!(feature = %name, "Expected feature driver is not registered");
                complete = false;
            }
        }
        complete
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn FeatureDriver>> {
        self.drivers.read().clone()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.feature_names())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// `my_crate::drivers::SignFeatureDriver<T>` → `Sign`.
fn feature_name_of(type_name: &str) -> Result<String, IdentityError> {
    let path = type_name.split('<').next().unwrap_or(type_name);
    let short = path.rsplit("::").next().unwrap_or(path);
    match short.strip_suffix(DRIVER_SUFFIX) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(IdentityError::InvalidDriverName(short.to_string())),
    }
}
