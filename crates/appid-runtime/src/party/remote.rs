//! Remote parties.

use super::destroy::DestroyState;
use super::{LocalPartyRef, OwnedPartyRef, Party, PartyCore, TenantDomainParty};
use crate::config::PartyConfiguration;
use crate::service::{IdentityService, ServiceInner};
use crate::IdentityError;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};

/// Back link from a remote to its owner.
pub(crate) enum OwnerLink {
    Root(Weak<ServiceInner>),
    TenantDomain(Weak<TenantDomainParty>),
}

/// An external counterpart application, owned by the root or by a tenant
/// domain.
pub struct RemoteParty {
    core: PartyCore,
    owner: OwnerLink,
    owner_config: Arc<PartyConfiguration>,
    root: Weak<ServiceInner>,
    is_dynamic: bool,
    destroy: DestroyState,
}

impl RemoteParty {
    pub(crate) fn new(
        config: Arc<PartyConfiguration>,
        owner: OwnerLink,
        owner_config: Arc<PartyConfiguration>,
        root: Weak<ServiceInner>,
        is_dynamic: bool,
        store_root: &Path,
    ) -> Self {
        Self {
            core: PartyCore::new(config, store_root),
            owner,
            owner_config,
            root,
            is_dynamic,
            destroy: DestroyState::new(),
        }
    }

    /// Opaque address of the counterpart, if configured.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.configuration().address()
    }

    /// True for parties of the `External` domain.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.configuration().is_external()
    }

    /// The owning local party, `None` once the identity service is gone.
    #[must_use]
    pub fn owner(&self) -> Option<LocalPartyRef> {
        match &self.owner {
            OwnerLink::Root(root) => root
                .upgrade()
                .map(|inner| LocalPartyRef::Root(IdentityService::from_inner(inner))),
            OwnerLink::TenantDomain(tenant) => tenant.upgrade().map(LocalPartyRef::TenantDomain),
        }
    }

    /// True for parties added at runtime.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.is_dynamic
    }

    /// True from the first destroy request on.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroy.is_destroyed()
    }

    /// Requests destruction. Returns `false` if already requested.
    ///
    /// # Errors
    ///
    /// [`IdentityError::NotDynamic`] for statically configured parties,
    /// [`IdentityError::AgentStopped`] if the request cannot be scheduled.
    pub fn set_destroyed(self: &Arc<Self>) -> Result<bool, IdentityError> {
        if !self.is_dynamic {
            return Err(IdentityError::NotDynamic(self.full_name().to_string()));
        }
        if !self.destroy.begin() {
            return Ok(false);
        }
        let root = self.root.upgrade().ok_or(IdentityError::AgentStopped)?;
        root.post_destroy(OwnedPartyRef::Remote(Arc::clone(self)))?;
        Ok(true)
    }

    /// Requests destruction and waits for it to complete.
    ///
    /// Can be called any number of times, also after completion.
    ///
    /// # Errors
    ///
    /// See [`set_destroyed`](Self::set_destroyed). Also fails with
    /// [`IdentityError::AgentStopped`] when the agent stops first.
    pub async fn destroy(self: &Arc<Self>) -> Result<(), IdentityError> {
        self.set_destroyed()?;
        if self.destroy.is_completed() {
            return Ok(());
        }
        let root = self.root.upgrade().ok_or(IdentityError::AgentStopped)?;
        self.destroy.wait(root.agent().join()).await
    }

    /// Marks the remote destroying without scheduling a job: its owning
    /// tenant domain is being destroyed.
    pub(crate) fn mark_destroying(&self) -> bool {
        self.destroy.begin()
    }

    pub(crate) fn destroy_state(&self) -> &DestroyState {
        &self.destroy
    }

    pub(crate) fn on_shutdown_or_destroyed(&self, is_destroyed: bool) {
        self.core.shared_store().on_shutdown_or_destroyed(is_destroyed);
        if is_destroyed {
            self.destroy.complete();
        }
    }
}

impl Party for RemoteParty {
    fn core(&self) -> &PartyCore {
        &self.core
    }

    fn owner_configuration(&self) -> Option<&PartyConfiguration> {
        Some(&self.owner_config)
    }
}

impl fmt::Debug for RemoteParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteParty")
            .field("full_name", &self.full_name().to_string())
            .field("address", &self.address())
            .field("is_dynamic", &self.is_dynamic)
            .field("is_destroyed", &self.is_destroyed())
            .finish()
    }
}

impl fmt::Display for RemoteParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.full_name(), f)
    }
}
