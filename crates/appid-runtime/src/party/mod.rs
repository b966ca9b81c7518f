//! The party graph.
//!
//! # Shape
//!
//! ```text
//! IdentityService (root, local)
//! ├── RemoteParty*            owned by the root
//! └── TenantDomainParty*      local, owned by the root
//!     └── RemoteParty*        owned by the domain
//! ```
//!
//! Every party has a unique full name (case-insensitive), a resolved
//! [`PartyConfiguration`], a [`FeatureSet`] and a shared [`FileStore`].
//! Local parties also own remotes and a private store.
//!
//! # Snapshots
//!
//! Party lists are copy-on-write: readers get an immutable snapshot and
//! never block the agent. A party read from a snapshot may already report
//! [`is_destroyed`](OwnedPartyRef::is_destroyed); check it when it matters.
//!
//! # Destroy
//!
//! ```text
//! Alive ──set_destroyed()──► Destroying ──agent job──► Destroyed
//! ```
//!
//! Only dynamic parties can be destroyed. Destroying a tenant domain
//! immediately marks its remotes as destroying too.

mod cow;
mod destroy;
mod features;
mod local;
mod remote;
mod store;
mod tenant;

pub(crate) use cow::CowList;
pub(crate) use local::LocalNode;
pub(crate) use remote::OwnerLink;

pub use features::FeatureSet;
pub use remote::RemoteParty;
pub use store::{FileStore, LOCAL_STORE_NAME};
pub use tenant::TenantDomainParty;

use crate::config::{PartyConfiguration, PartySection};
use crate::service::{AddShape, IdentityService};
use crate::IdentityError;
use appid_types::FullName;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of party change channels.
pub const EVENT_CAPACITY: usize = 256;

/// Data every party carries.
#[derive(Debug)]
pub struct PartyCore {
    config: Arc<PartyConfiguration>,
    features: FeatureSet,
    shared_store: FileStore,
}

impl PartyCore {
    pub(crate) fn new(config: Arc<PartyConfiguration>, store_root: &Path) -> Self {
        let shared_store = FileStore::shared(store_root, config.full_name());
        let features = FeatureSet::new(config.full_name().to_string());
        Self {
            config,
            features,
            shared_store,
        }
    }

    /// Resolved configuration.
    #[must_use]
    pub fn configuration(&self) -> &PartyConfiguration {
        &self.config
    }

    pub(crate) fn shared_configuration(&self) -> &Arc<PartyConfiguration> {
        &self.config
    }

    /// Attached features.
    #[must_use]
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Store shared by every process of this party.
    #[must_use]
    pub fn shared_store(&self) -> &FileStore {
        &self.shared_store
    }
}

/// Common view of every party.
pub trait Party: Send + Sync {
    /// Party data.
    fn core(&self) -> &PartyCore;

    /// Configuration of the owner; `None` for the root.
    fn owner_configuration(&self) -> Option<&PartyConfiguration>;

    /// Resolved configuration.
    fn configuration(&self) -> &PartyConfiguration {
        self.core().configuration()
    }

    /// Full name.
    fn full_name(&self) -> &FullName {
        self.configuration().full_name()
    }

    /// Attached features.
    fn features(&self) -> &FeatureSet {
        self.core().features()
    }

    /// Store shared by every process of this party.
    fn shared_store(&self) -> &FileStore {
        self.core().shared_store()
    }
}

/// A party that has an owner: a remote or a tenant domain.
#[derive(Clone)]
pub enum OwnedPartyRef {
    /// A remote party.
    Remote(Arc<RemoteParty>),
    /// A tenant domain.
    TenantDomain(Arc<TenantDomainParty>),
}

impl OwnedPartyRef {
    fn as_party(&self) -> &dyn Party {
        match self {
            Self::Remote(remote) => remote.as_ref(),
            Self::TenantDomain(tenant) => tenant.as_ref(),
        }
    }

    /// The owning local party, `None` once the identity service is gone.
    #[must_use]
    pub fn owner(&self) -> Option<LocalPartyRef> {
        match self {
            Self::Remote(remote) => remote.owner(),
            Self::TenantDomain(tenant) => tenant.owner().map(LocalPartyRef::Root),
        }
    }

    /// True for parties added at runtime.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.is_dynamic(),
            Self::TenantDomain(tenant) => tenant.is_dynamic(),
        }
    }

    /// True from the first destroy request on.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.is_destroyed(),
            Self::TenantDomain(tenant) => tenant.is_destroyed(),
        }
    }

    /// See [`RemoteParty::set_destroyed`] and
    /// [`TenantDomainParty::set_destroyed`].
    ///
    /// # Errors
    ///
    /// [`IdentityError::NotDynamic`] or [`IdentityError::AgentStopped`].
    pub fn set_destroyed(&self) -> Result<bool, IdentityError> {
        match self {
            Self::Remote(remote) => remote.set_destroyed(),
            Self::TenantDomain(tenant) => tenant.set_destroyed(),
        }
    }

    /// See [`RemoteParty::destroy`] and [`TenantDomainParty::destroy`].
    ///
    /// # Errors
    ///
    /// [`IdentityError::NotDynamic`] or [`IdentityError::AgentStopped`].
    pub async fn destroy(&self) -> Result<(), IdentityError> {
        match self {
            Self::Remote(remote) => remote.destroy().await,
            Self::TenantDomain(tenant) => tenant.destroy().await,
        }
    }

    /// The remote, if this is one.
    #[must_use]
    pub fn as_remote(&self) -> Option<&Arc<RemoteParty>> {
        match self {
            Self::Remote(remote) => Some(remote),
            Self::TenantDomain(_) => None,
        }
    }

    /// The tenant domain, if this is one.
    #[must_use]
    pub fn as_tenant_domain(&self) -> Option<&Arc<TenantDomainParty>> {
        match self {
            Self::Remote(_) => None,
            Self::TenantDomain(tenant) => Some(tenant),
        }
    }

    pub(crate) fn is_destroy_completed(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.destroy_state().is_completed(),
            Self::TenantDomain(tenant) => tenant.destroy_state().is_completed(),
        }
    }
}

impl Party for OwnedPartyRef {
    fn core(&self) -> &PartyCore {
        self.as_party().core()
    }

    fn owner_configuration(&self) -> Option<&PartyConfiguration> {
        self.as_party().owner_configuration()
    }
}

/// Identity comparison.
impl PartialEq for OwnedPartyRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Remote(a), Self::Remote(b)) => Arc::ptr_eq(a, b),
            (Self::TenantDomain(a), Self::TenantDomain(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for OwnedPartyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(remote) => fmt::Debug::fmt(remote, f),
            Self::TenantDomain(tenant) => fmt::Debug::fmt(tenant, f),
        }
    }
}

impl fmt::Display for OwnedPartyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.full_name(), f)
    }
}

/// A party that owns remotes: the root or a tenant domain.
#[derive(Clone)]
pub enum LocalPartyRef {
    /// The identity root.
    Root(IdentityService),
    /// A tenant domain.
    TenantDomain(Arc<TenantDomainParty>),
}

impl LocalPartyRef {
    pub(crate) fn node(&self) -> &LocalNode {
        match self {
            Self::Root(service) => service.node(),
            Self::TenantDomain(tenant) => tenant.node(),
        }
    }

    fn service(&self) -> Result<IdentityService, IdentityError> {
        match self {
            Self::Root(service) => Ok(service.clone()),
            Self::TenantDomain(tenant) => tenant.owner().ok_or(IdentityError::AgentStopped),
        }
    }

    /// Current remotes snapshot.
    #[must_use]
    pub fn remotes(&self) -> Arc<Vec<Arc<RemoteParty>>> {
        self.node().remotes()
    }

    /// Appearance and disappearance of this party's remotes.
    #[must_use]
    pub fn subscribe_remotes_changed(&self) -> broadcast::Receiver<RemoteEvent> {
        self.node().subscribe_remotes_changed()
    }

    /// Private store of this party.
    #[must_use]
    pub fn local_store(&self) -> &FileStore {
        self.node().local_store()
    }

    /// Adds exactly one remote.
    ///
    /// # Errors
    ///
    /// Any [`IdentityError`] of the add flow; nothing is published on error.
    pub async fn add_remote(&self, increment: &PartySection) -> Result<Arc<RemoteParty>, IdentityError> {
        let added = self
            .service()?
            .add_dynamic(self.clone(), increment, AddShape::SingleRemote)
            .await?;
        added
            .remotes
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::InvalidIncrement("a single remote is expected".into()))
    }

    /// Adds any number of remotes.
    ///
    /// # Errors
    ///
    /// Any [`IdentityError`] of the add flow; nothing is published on error.
    pub async fn add_multiple_remotes(
        &self,
        increment: &PartySection,
    ) -> Result<Vec<Arc<RemoteParty>>, IdentityError> {
        let added = self
            .service()?
            .add_dynamic(self.clone(), increment, AddShape::RemotesOnly)
            .await?;
        Ok(added.remotes)
    }
}

impl Party for LocalPartyRef {
    fn core(&self) -> &PartyCore {
        self.node().core()
    }

    fn owner_configuration(&self) -> Option<&PartyConfiguration> {
        match self {
            Self::Root(_) => None,
            Self::TenantDomain(tenant) => tenant.owner_configuration(),
        }
    }
}

impl fmt::Debug for LocalPartyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(service) => fmt::Debug::fmt(service, f),
            Self::TenantDomain(tenant) => fmt::Debug::fmt(tenant, f),
        }
    }
}

/// Structural change of a party collection.
#[derive(Debug, Clone, PartialEq)]
pub enum PartyChange<P> {
    /// The party was published.
    Appeared(P),
    /// The party was destroyed and removed.
    Disappeared(P),
}

impl<P> PartyChange<P> {
    /// The party concerned.
    pub fn party(&self) -> &P {
        match self {
            Self::Appeared(party) | Self::Disappeared(party) => party,
        }
    }

    /// Maps the party.
    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> PartyChange<Q> {
        match self {
            Self::Appeared(party) => PartyChange::Appeared(f(party)),
            Self::Disappeared(party) => PartyChange::Disappeared(f(party)),
        }
    }
}

/// Change anywhere in the graph, raised by the root.
pub type PartyEvent = PartyChange<OwnedPartyRef>;

/// Change of one local party's remotes.
pub type RemoteEvent = PartyChange<Arc<RemoteParty>>;

/// Parties published by one add call.
#[derive(Debug, Clone, Default)]
pub struct AddedParties {
    /// New remotes.
    pub remotes: Vec<Arc<RemoteParty>>,
    /// New tenant domains, with their remotes.
    pub tenant_domains: Vec<Arc<TenantDomainParty>>,
}

impl AddedParties {
    /// Number of remotes and tenant domains, nested remotes excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.remotes.len() + self.tenant_domains.len()
    }

    /// True when the call added nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remotes then tenant domains.
    pub fn parties(&self) -> impl Iterator<Item = OwnedPartyRef> + '_ {
        self.remotes
            .iter()
            .cloned()
            .map(OwnedPartyRef::Remote)
            .chain(self.tenant_domains.iter().cloned().map(OwnedPartyRef::TenantDomain))
    }
}
