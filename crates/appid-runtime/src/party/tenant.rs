//! Tenant domain parties.

use super::destroy::DestroyState;
use super::local::LocalNode;
use super::remote::OwnerLink;
use super::{
    FileStore, LocalPartyRef, OwnedPartyRef, Party, PartyCore, RemoteEvent, RemoteParty,
};
use crate::config::{PartyConfiguration, PartySection, TenantDomainConfiguration};
use crate::service::{IdentityService, ServiceInner};
use crate::IdentityError;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

/// A group of remotes sharing a domain, owned by the root.
pub struct TenantDomainParty {
    node: LocalNode,
    owner_config: Arc<PartyConfiguration>,
    root: Weak<ServiceInner>,
    is_dynamic: bool,
    destroy: DestroyState,
}

impl TenantDomainParty {
    pub(crate) fn new(
        config: &TenantDomainConfiguration,
        root_config: Arc<PartyConfiguration>,
        root: Weak<ServiceInner>,
        is_dynamic: bool,
        store_root: &Path,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| {
            let remotes = config
                .remotes
                .iter()
                .map(|remote| {
                    Arc::new(RemoteParty::new(
                        Arc::clone(remote),
                        OwnerLink::TenantDomain(me.clone()),
                        Arc::clone(&config.party),
                        root.clone(),
                        is_dynamic,
                        store_root,
                    ))
                })
                .collect();
            Self {
                node: LocalNode::new(PartyCore::new(Arc::clone(&config.party), store_root), remotes),
                owner_config: root_config,
                root,
                is_dynamic,
                destroy: DestroyState::new(),
            }
        })
    }

    /// The identity service, `None` once it is gone.
    #[must_use]
    pub fn owner(&self) -> Option<IdentityService> {
        self.root.upgrade().map(IdentityService::from_inner)
    }

    /// Current remotes snapshot.
    #[must_use]
    pub fn remotes(&self) -> Arc<Vec<Arc<RemoteParty>>> {
        self.node.remotes()
    }

    /// Appearance and disappearance of this domain's remotes.
    #[must_use]
    pub fn subscribe_remotes_changed(&self) -> broadcast::Receiver<RemoteEvent> {
        self.node.subscribe_remotes_changed()
    }

    /// Private store of this domain.
    #[must_use]
    pub fn local_store(&self) -> &FileStore {
        self.node.local_store()
    }

    /// Adds exactly one remote to this domain.
    ///
    /// # Errors
    ///
    /// Any [`IdentityError`] of the add flow; nothing is published on error.
    pub async fn add_remote(
        self: &Arc<Self>,
        increment: &PartySection,
    ) -> Result<Arc<RemoteParty>, IdentityError> {
        LocalPartyRef::TenantDomain(Arc::clone(self))
            .add_remote(increment)
            .await
    }

    /// Adds any number of remotes to this domain.
    ///
    /// # Errors
    ///
    /// Any [`IdentityError`] of the add flow; nothing is published on error.
    pub async fn add_multiple_remotes(
        self: &Arc<Self>,
        increment: &PartySection,
    ) -> Result<Vec<Arc<RemoteParty>>, IdentityError> {
        LocalPartyRef::TenantDomain(Arc::clone(self))
            .add_multiple_remotes(increment)
            .await
    }

    /// True for domains added at runtime.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.is_dynamic
    }

    /// True from the first destroy request on.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroy.is_destroyed()
    }

    /// Requests destruction of this domain and of its remotes.
    ///
    /// Returns `false` if already requested.
    ///
    /// # Errors
    ///
    /// [`IdentityError::NotDynamic`] for statically configured domains,
    /// [`IdentityError::AgentStopped`] if the request cannot be scheduled.
    pub fn set_destroyed(self: &Arc<Self>) -> Result<bool, IdentityError> {
        if !self.is_dynamic {
            return Err(IdentityError::NotDynamic(self.full_name().to_string()));
        }
        if !self.destroy.begin() {
            return Ok(false);
        }
        for remote in self.node.remotes().iter() {
            remote.mark_destroying();
        }
        let root = self.root.upgrade().ok_or(IdentityError::AgentStopped)?;
        root.post_destroy(OwnedPartyRef::TenantDomain(Arc::clone(self)))?;
        Ok(true)
    }

    /// Requests destruction and waits for it to complete.
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

    pub(crate) fn node(&self) -> &LocalNode {
        &self.node
    }

    pub(crate) fn destroy_state(&self) -> &DestroyState {
        &self.destroy
    }

    pub(crate) fn on_shutdown_or_destroyed(&self, is_destroyed: bool) {
        self.node.on_shutdown_or_destroyed(is_destroyed);
        if is_destroyed {
            self.destroy.complete();
        }
    }
}

impl Party for TenantDomainParty {
    fn core(&self) -> &PartyCore {
        self.node.core()
    }

    fn owner_configuration(&self) -> Option<&PartyConfiguration> {
        Some(&self.owner_config)
    }
}

impl fmt::Debug for TenantDomainParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantDomainParty")
            .field("full_name", &self.full_name().to_string())
            .field("remotes", &self.node.remotes().len())
            .field("is_dynamic", &self.is_dynamic)
            .field("is_destroyed", &self.is_destroyed())
            .finish()
    }
}

impl fmt::Display for TenantDomainParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.full_name(), f)
    }
}
