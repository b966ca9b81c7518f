//! The identity service: root party of the graph and owner of the agent.
//!
//! # Flow
//!
//! ```text
//! caller ──add_*()──► resolve + checks ──InitializeDynamic──┐
//! caller ──destroy()──────────────────────────Destroy───────┤
//!                                                           ▼
//!                                                 ┌──────────────────┐
//!                                                 │  identity agent  │
//!                                                 │  (one job at a   │
//!                                                 │   time)          │
//!                                                 └────────┬─────────┘
//!                                                          │ Lifecycle pass
//!                                                 ┌────────▼─────────┐
//!                                                 │ feature drivers  │
//!                                                 └────────┬─────────┘
//!                                                          │ success
//!                                                 publish / remove + events
//! ```
//!
//! Every mutation of the graph happens on the agent. Readers take
//! snapshots and never wait for it.

use crate::agent::{AgentError, AgentHandler, MicroAgent, RunningStatus};
use crate::config::{resolve_increment, IdentityConfig, PartyConfiguration, PartySection, ResolvedParties};
use crate::lifecycle::{DriverRegistry, Lifecycle};
use crate::party::{
    AddedParties, CowList, FileStore, LocalNode, LocalPartyRef, OwnedPartyRef, OwnerLink, Party,
    PartyChange, PartyCore, PartyEvent, RemoteEvent, RemoteParty, TenantDomainParty,
    EVENT_CAPACITY,
};
use crate::trampoline::ActionError;
use crate::IdentityError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, error, info, warn};

/// State of the global setup.
#[derive(Debug, Clone, PartialEq)]
pub enum Initialization {
    /// The agent has not run its start yet.
    Pending,
    /// Every driver was set up.
    Succeeded,
    /// Global setup failed, or the start was refused.
    Failed(ActionError),
}

pub(crate) struct ServiceInner {
    node: LocalNode,
    tenants: CowList<TenantDomainParty>,
    all_party_changed: broadcast::Sender<PartyEvent>,
    heartbeat: broadcast::Sender<u64>,
    initialization: watch::Sender<Initialization>,
    drivers: DriverRegistry,
    agent: MicroAgent<IdentityAgent>,
    store_root: PathBuf,
}

impl ServiceInner {
    pub(crate) fn agent(&self) -> &MicroAgent<IdentityAgent> {
        &self.agent
    }

    pub(crate) fn post_destroy(&self, party: OwnedPartyRef) -> Result<(), IdentityError> {
        self.agent
            .post(IdentityJob::Destroy(party))
            .map_err(|_| IdentityError::AgentStopped)
    }
}

/// Shape an add call requires from its increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddShape {
    Any,
    SingleRemote,
    SingleTenant,
    RemotesOnly,
}

impl AddShape {
    fn check(self, owner: &LocalPartyRef, resolved: &ResolvedParties) -> Result<(), IdentityError> {
        let (remotes, tenants) = (resolved.remotes.len(), resolved.tenant_domains.len());
        if tenants > 0 && matches!(owner, LocalPartyRef::TenantDomain(_)) {
            return Err(IdentityError::InvalidIncrement(format!(
                "tenant domain '{}' cannot own tenant domains",
                owner.full_name()
            )));
        }
        let expected = match self {
            Self::Any => return Ok(()),
            Self::SingleRemote if remotes == 1 && tenants == 0 => return Ok(()),
            Self::SingleTenant if tenants == 1 && remotes == 0 => return Ok(()),
            Self::RemotesOnly if tenants == 0 => return Ok(()),
            Self::SingleRemote => "exactly one remote party",
            Self::SingleTenant => "exactly one tenant domain",
            Self::RemotesOnly => "remote parties only",
        };
        Err(IdentityError::InvalidIncrement(format!(
            "expected {expected}, got {remotes} remote(s) and {tenants} tenant domain(s)"
        )))
    }
}

pub(crate) struct DynamicBatch {
    owner: LocalPartyRef,
    added: AddedParties,
    reply: oneshot::Sender<Result<(), IdentityError>>,
}

/// Typed jobs of the identity agent.
pub(crate) enum IdentityJob {
    InitializeDynamic(DynamicBatch),
    Destroy(OwnedPartyRef),
}

/// Root party of an application identity.
///
/// Cheap to clone: clones share the same graph and agent.
///
/// # Example
///
/// ```no_run
/// use appid_runtime::config::{IdentityConfig, PartySection};
/// use appid_runtime::IdentityService;
///
/// # async fn run() -> Result<(), appid_runtime::IdentityError> {
/// let config = IdentityConfig::with_root(PartySection::full("Acme/$Hub"))
///     .with_store_root("/var/lib/appid");
/// let service = IdentityService::new(&config)?;
/// service.start_and_initialize().await?;
///
/// let remote = service
///     .add_remote(&PartySection::party("$Billing").with_address("10.0.0.7:4100"))
///     .await?;
/// remote.destroy().await?;
/// service.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IdentityService {
    inner: Arc<ServiceInner>,
}

impl IdentityService {
    /// Builds the graph of the static configuration. The agent is not
    /// started: register drivers first.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Config`] for an invalid configuration.
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let resolved = config.resolve()?;
        let heartbeat = config.heartbeat_period()?;
        let store_root = config.store_root()?;

        let slot = Arc::new(OnceLock::new());
        let agent = MicroAgent::new(
            format!("identity {}", resolved.root.full_name()),
            IdentityAgent {
                service: Arc::clone(&slot),
            },
            heartbeat,
        )?;

        let root = resolved.root;
        let parties = resolved.parties;
        let inner = Arc::new_cyclic(|weak: &Weak<ServiceInner>| {
            let remotes = parties
                .remotes
                .iter()
                .map(|remote| {
                    Arc::new(RemoteParty::new(
                        Arc::clone(remote),
                        OwnerLink::Root(weak.clone()),
                        Arc::clone(&root),
                        weak.clone(),
                        false,
                        &store_root,
                    ))
                })
                .collect();
            let tenants = parties
                .tenant_domains
                .iter()
                .map(|tenant| {
                    TenantDomainParty::new(tenant, Arc::clone(&root), weak.clone(), false, &store_root)
                })
                .collect();
            let (all_party_changed, _) = broadcast::channel(EVENT_CAPACITY);
            let (heartbeat, _) = broadcast::channel(EVENT_CAPACITY);
            let (initialization, _) = watch::channel(Initialization::Pending);
            ServiceInner {
                node: LocalNode::new(PartyCore::new(Arc::clone(&root), &store_root), remotes),
                tenants: CowList::new(tenants),
                all_party_changed,
                heartbeat,
                initialization,
                drivers: DriverRegistry::new(Arc::clone(&root)),
                agent,
                store_root: store_root.clone(),
            }
        });
        // Fresh cell: the set always succeeds.
        let _ = slot.set(Arc::downgrade(&inner));

        let service = Self { inner };
        info!(
            party = %service.full_name(),
            remotes = service.remotes().len(),
            tenant_domains = service.tenant_domains().len(),
            "Identity service created"
        );
        Ok(service)
    }

    pub(crate) fn from_inner(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn node(&self) -> &LocalNode {
        &self.inner.node
    }

    /// Feature drivers. Registration closes when the agent starts.
    #[must_use]
    pub fn drivers(&self) -> &DriverRegistry {
        &self.inner.drivers
    }

    /// Root of every party store.
    #[must_use]
    pub fn store_root(&self) -> &Path {
        &self.inner.store_root
    }

    /// Status of the identity agent.
    #[must_use]
    pub fn status(&self) -> RunningStatus {
        self.inner.agent.status()
    }

    /// Starts the agent, which then runs the global setup.
    ///
    /// # Errors
    ///
    /// [`IdentityError::StartRefused`] when an expected driver is missing,
    /// [`IdentityError::AgentStopped`] after [`stop`](Self::stop).
    pub fn start(&self) -> Result<(), IdentityError> {
        match self.inner.agent.try_start() {
            RunningStatus::Running => Ok(()),
            RunningStatus::WaitingForStart => Err(IdentityError::StartRefused),
            RunningStatus::Stopped => Err(IdentityError::AgentStopped),
        }
    }

    /// [`start`](Self::start), then [`initialization`](Self::initialization).
    ///
    /// # Errors
    ///
    /// See both.
    pub async fn start_and_initialize(&self) -> Result<(), IdentityError> {
        self.start()?;
        self.initialization().await
    }

    /// Waits for the outcome of the global setup.
    ///
    /// Resolves once the agent started (or refused to).
    ///
    /// # Errors
    ///
    /// [`IdentityError::InitializationFailed`] with the setup failure.
    pub async fn initialization(&self) -> Result<(), IdentityError> {
        let mut rx = self.inner.initialization.subscribe();
        let state = rx
            .wait_for(|state| *state != Initialization::Pending)
            .await
            .map_err(|_| IdentityError::AgentStopped)?
            .clone();
        match state {
            Initialization::Failed(e) => Err(IdentityError::InitializationFailed(e)),
            Initialization::Pending | Initialization::Succeeded => Ok(()),
        }
    }

    /// Stops the agent: global teardown, then store cleanup. Waits for it.
    pub async fn stop(&self) {
        self.inner.agent.send_stop();
        self.inner.agent.join().await;
    }

    /// Adds any mix of remotes and tenant domains.
    ///
    /// The whole increment is set up in one pass and published together.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::Config`]: the increment does not resolve.
    /// - [`IdentityError::NameCollision`]: a name is already in use.
    /// - [`IdentityError::NotRunning`]: the agent stopped. Calls made
    ///   before start wait for it.
    /// - [`IdentityError::SetupFailed`]: a driver failed; nothing was added.
    pub async fn add_parties(&self, increment: &PartySection) -> Result<AddedParties, IdentityError> {
        self.add_dynamic(LocalPartyRef::Root(self.clone()), increment, AddShape::Any)
            .await
    }

    /// Adds exactly one tenant domain (with its remotes).
    ///
    /// # Errors
    ///
    /// See [`add_parties`](Self::add_parties), plus
    /// [`IdentityError::InvalidIncrement`].
    pub async fn add_tenant_domain(
        &self,
        increment: &PartySection,
    ) -> Result<Arc<TenantDomainParty>, IdentityError> {
        let added = self
            .add_dynamic(LocalPartyRef::Root(self.clone()), increment, AddShape::SingleTenant)
            .await?;
        added
            .tenant_domains
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::InvalidIncrement("a single tenant domain is expected".into()))
    }

    /// Adds exactly one remote owned by the root.
    ///
    /// # Errors
    ///
    /// See [`add_parties`](Self::add_parties), plus
    /// [`IdentityError::InvalidIncrement`].
    pub async fn add_remote(&self, increment: &PartySection) -> Result<Arc<RemoteParty>, IdentityError> {
        LocalPartyRef::Root(self.clone()).add_remote(increment).await
    }

    /// Adds remotes owned by the root.
    ///
    /// # Errors
    ///
    /// See [`add_parties`](Self::add_parties), plus
    /// [`IdentityError::InvalidIncrement`].
    pub async fn add_multiple_remotes(
        &self,
        increment: &PartySection,
    ) -> Result<Vec<Arc<RemoteParty>>, IdentityError> {
        LocalPartyRef::Root(self.clone())
            .add_multiple_remotes(increment)
            .await
    }

    /// Remotes owned by the root.
    #[must_use]
    pub fn remotes(&self) -> Arc<Vec<Arc<RemoteParty>>> {
        self.inner.node.remotes()
    }

    /// Tenant domains.
    #[must_use]
    pub fn tenant_domains(&self) -> Arc<Vec<Arc<TenantDomainParty>>> {
        self.inner.tenants.snapshot()
    }

    /// Root remotes, then the remotes of each tenant domain.
    #[must_use]
    pub fn all_remotes(&self) -> Vec<Arc<RemoteParty>> {
        let mut all = self.remotes().to_vec();
        for tenant in self.tenant_domains().iter() {
            all.extend(tenant.remotes().iter().cloned());
        }
        all
    }

    /// Parties owned by the root: remotes, then tenant domains.
    #[must_use]
    pub fn parties(&self) -> Vec<OwnedPartyRef> {
        self.remotes()
            .iter()
            .cloned()
            .map(OwnedPartyRef::Remote)
            .chain(self.tenant_domains().iter().cloned().map(OwnedPartyRef::TenantDomain))
            .collect()
    }

    /// Every party but the root: root remotes, then each tenant domain
    /// followed by its remotes.
    #[must_use]
    pub fn all_parties(&self) -> Vec<OwnedPartyRef> {
        let mut all: Vec<_> = self.remotes().iter().cloned().map(OwnedPartyRef::Remote).collect();
        for tenant in self.tenant_domains().iter() {
            all.push(OwnedPartyRef::TenantDomain(Arc::clone(tenant)));
            all.extend(tenant.remotes().iter().cloned().map(OwnedPartyRef::Remote));
        }
        all
    }

    /// Appearance and disappearance of any party.
    #[must_use]
    pub fn subscribe_all_party_changed(&self) -> broadcast::Receiver<PartyEvent> {
        self.inner.all_party_changed.subscribe()
    }

    /// Appearance and disappearance of the root's remotes.
    #[must_use]
    pub fn subscribe_remotes_changed(&self) -> broadcast::Receiver<RemoteEvent> {
        self.inner.node.subscribe_remotes_changed()
    }

    /// Heartbeat ticks, raised on the agent.
    #[must_use]
    pub fn subscribe_heartbeat(&self) -> broadcast::Receiver<u64> {
        self.inner.heartbeat.subscribe()
    }

    /// Private store of the root.
    #[must_use]
    pub fn local_store(&self) -> &FileStore {
        self.inner.node.local_store()
    }

    pub(crate) async fn add_dynamic(
        &self,
        owner: LocalPartyRef,
        increment: &PartySection,
        shape: AddShape,
    ) -> Result<AddedParties, IdentityError> {
        let resolved = resolve_increment(owner.configuration(), increment)?;
        shape.check(&owner, &resolved)?;
        if resolved.is_empty() {
            return Ok(AddedParties::default());
        }
        if let LocalPartyRef::TenantDomain(tenant) = &owner {
            if tenant.is_destroyed() {
                return Err(IdentityError::OwnerDestroyed(tenant.full_name().to_string()));
            }
        }
        let existing = self.existing_names();
        if let Some(name) = resolved.full_names().find(|n| existing.contains(n.key())) {
            return Err(IdentityError::NameCollision(name.to_string()));
        }
        // Before start the job waits in the mailbox.
        if self.status() == RunningStatus::Stopped {
            return Err(IdentityError::NotRunning);
        }

        let added = self.build_dynamic(&owner, &resolved);
        let (reply, rx) = oneshot::channel();
        self.inner
            .agent
            .post(IdentityJob::InitializeDynamic(DynamicBatch {
                owner,
                added: added.clone(),
                reply,
            }))
            .map_err(|_| IdentityError::AgentStopped)?;
        rx.await.map_err(|_| IdentityError::AgentStopped)??;
        Ok(added)
    }

    /// Builds invisible wrappers for a resolved increment.
    fn build_dynamic(&self, owner: &LocalPartyRef, resolved: &ResolvedParties) -> AddedParties {
        let root = Arc::downgrade(&self.inner);
        let owner_config = Arc::clone(owner.core().shared_configuration());
        let store_root = &self.inner.store_root;
        let remotes = resolved
            .remotes
            .iter()
            .map(|remote| {
                let link = match owner {
                    LocalPartyRef::Root(_) => OwnerLink::Root(root.clone()),
                    LocalPartyRef::TenantDomain(tenant) => OwnerLink::TenantDomain(Arc::downgrade(tenant)),
                };
                Arc::new(RemoteParty::new(
                    Arc::clone(remote),
                    link,
                    Arc::clone(&owner_config),
                    root.clone(),
                    true,
                    store_root,
                ))
            })
            .collect();
        let root_config = self.root_configuration();
        let tenant_domains = resolved
            .tenant_domains
            .iter()
            .map(|tenant| {
                TenantDomainParty::new(tenant, Arc::clone(&root_config), root.clone(), true, store_root)
            })
            .collect();
        AddedParties {
            remotes,
            tenant_domains,
        }
    }

    fn root_configuration(&self) -> Arc<PartyConfiguration> {
        Arc::clone(self.inner.node.core().shared_configuration())
    }

    /// Case-insensitive keys of the root and of every live party.
    fn existing_names(&self) -> HashSet<String> {
        std::iter::once(self.full_name().key().to_string())
            .chain(self.all_parties().iter().map(|p| p.full_name().key().to_string()))
            .collect()
    }

    fn raise_party_changed(&self, change: PartyEvent) {
        let _ = self.inner.all_party_changed.send(change);
    }

    // ======================================================================
    // Agent side
    // ======================================================================

    async fn initialize_dynamic(&self, owner: LocalPartyRef, added: AddedParties) -> Result<(), IdentityError> {
        if self.status() != RunningStatus::Running {
            return Err(IdentityError::NotRunning);
        }
        if let LocalPartyRef::TenantDomain(tenant) = &owner {
            if tenant.is_destroyed() {
                return Err(IdentityError::OwnerDestroyed(tenant.full_name().to_string()));
            }
        }
        // Names may have been taken while the job waited.
        let existing = self.existing_names();
        let parties: Vec<OwnedPartyRef> = added.parties().collect();
        let mut candidates = parties.clone();
        for tenant in &added.tenant_domains {
            candidates.extend(tenant.remotes().iter().cloned().map(OwnedPartyRef::Remote));
        }
        if let Some(taken) = candidates
            .iter()
            .find(|p| existing.contains(p.full_name().key()))
        {
            error!(party = %taken, "Party already exists. A party must first be destroyed before being added again.");
            return Err(IdentityError::NameCollision(taken.full_name().to_string()));
        }

        info!(
            count = parties.len(),
            drivers = self.drivers().len(),
            "Initializing dynamic parties"
        );
        let publisher = {
            let service = self.clone();
            move || service.publish(&owner, &added)
        };
        Lifecycle::new(self.clone())
            .setup_dynamic(&parties, publisher)
            .await
            .map_err(|e| {
                warn!(error = %e, "Dynamic setup failed. Nothing is published.");
                IdentityError::SetupFailed(e)
            })
    }

    /// Inserts a batch and raises its events. Tenant domains appear before
    /// their remotes.
    fn publish(&self, owner: &LocalPartyRef, added: &AddedParties) {
        for remote in &added.remotes {
            owner.node().remote_list().push(remote);
            owner
                .node()
                .raise_remotes_changed(PartyChange::Appeared(Arc::clone(remote)));
            self.raise_party_changed(PartyChange::Appeared(OwnedPartyRef::Remote(Arc::clone(remote))));
            debug!(party = %remote, "Remote published");
        }
        for tenant in &added.tenant_domains {
            self.inner.tenants.push(tenant);
            self.raise_party_changed(PartyChange::Appeared(OwnedPartyRef::TenantDomain(Arc::clone(tenant))));
            for remote in tenant.remotes().iter() {
                tenant
                    .node()
                    .raise_remotes_changed(PartyChange::Appeared(Arc::clone(remote)));
                self.raise_party_changed(PartyChange::Appeared(OwnedPartyRef::Remote(Arc::clone(remote))));
            }
            debug!(party = %tenant, remotes = tenant.remotes().len(), "Tenant domain published");
        }
    }

    /// Tears down, removes and releases a destroyed party. Remotes
    /// disappear before their tenant domain.
    async fn destroy_party(&self, party: OwnedPartyRef) {
        if party.is_destroy_completed() {
            debug!(party = %party, "Already destroyed");
            return;
        }
        info!(party = %party, "Destroying party");
        Lifecycle::new(self.clone()).teardown_dynamic(&party).await;
        match &party {
            OwnedPartyRef::Remote(remote) => {
                if let Some(owner) = remote.owner() {
                    owner.node().remote_list().remove(remote);
                    owner
                        .node()
                        .raise_remotes_changed(PartyChange::Disappeared(Arc::clone(remote)));
                }
                self.raise_party_changed(PartyChange::Disappeared(party.clone()));
                remote.on_shutdown_or_destroyed(true);
            }
            OwnedPartyRef::TenantDomain(tenant) => {
                self.inner.tenants.remove(tenant);
                let remotes = tenant.node().remote_list().take();
                for remote in remotes.iter() {
                    tenant
                        .node()
                        .raise_remotes_changed(PartyChange::Disappeared(Arc::clone(remote)));
                    self.raise_party_changed(PartyChange::Disappeared(OwnedPartyRef::Remote(Arc::clone(remote))));
                    remote.on_shutdown_or_destroyed(true);
                }
                self.raise_party_changed(PartyChange::Disappeared(party.clone()));
                tenant.on_shutdown_or_destroyed(true);
            }
        }
    }

    async fn shutdown(&self) {
        Lifecycle::new(self.clone()).teardown().await;
        self.inner.node.on_shutdown_or_destroyed(false);
        for tenant in self.tenant_domains().iter() {
            tenant.on_shutdown_or_destroyed(false);
        }
        info!(party = %self.full_name(), "Identity service shut down");
    }
}

impl Party for IdentityService {
    fn core(&self) -> &PartyCore {
        self.inner.node.core()
    }

    fn owner_configuration(&self) -> Option<&PartyConfiguration> {
        None
    }
}

impl fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityService")
            .field("full_name", &self.full_name().to_string())
            .field("status", &self.status())
            .field("remotes", &self.remotes().len())
            .field("tenant_domains", &self.tenant_domains().len())
            .finish()
    }
}

impl fmt::Display for IdentityService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.full_name(), f)
    }
}

/// Handler of the identity agent.
pub(crate) struct IdentityAgent {
    service: Arc<OnceLock<Weak<ServiceInner>>>,
}

impl IdentityAgent {
    fn service(&self) -> Option<IdentityService> {
        self.service
            .get()
            .and_then(Weak::upgrade)
            .map(IdentityService::from_inner)
    }
}

#[async_trait]
impl AgentHandler for IdentityAgent {
    type Job = IdentityJob;

    fn on_try_start(&mut self) -> bool {
        let Some(service) = self.service() else {
            return false;
        };
        if service.inner.drivers.freeze() {
            return true;
        }
        service.inner.initialization.send_replace(Initialization::Failed(
            ActionError::failed("expected feature drivers are missing"),
        ));
        false
    }

    async fn on_start(&mut self) -> Result<(), AgentError> {
        let service = self
            .service()
            .ok_or_else(|| AgentError::handler("identity service is gone"))?;
        let state = match Lifecycle::new(service.clone()).setup().await {
            Ok(()) => {
                info!(party = %service.full_name(), "Identity initialized");
                Initialization::Succeeded
            }
            Err(e) => {
                error!(party = %service.full_name(), error = %e, "Identity initialization failed");
                Initialization::Failed(e)
            }
        };
        service.inner.initialization.send_replace(state);
        Ok(())
    }

    async fn on_heartbeat(&mut self, count: u64) -> Result<(), AgentError> {
        if let Some(service) = self.service() {
            let _ = service.inner.heartbeat.send(count);
        }
        Ok(())
    }

    async fn execute_job(&mut self, job: IdentityJob) -> Result<(), AgentError> {
        let Some(service) = self.service() else {
            return Err(AgentError::handler("identity service is gone"));
        };
        match job {
            IdentityJob::InitializeDynamic(batch) => {
                let result = service.initialize_dynamic(batch.owner, batch.added).await;
                // The caller may have given up waiting.
                let _ = batch.reply.send(result);
            }
            IdentityJob::Destroy(party) => service.destroy_party(party).await,
        }
        Ok(())
    }

    async fn on_stop(&mut self) -> Result<(), AgentError> {
        match self.service() {
            Some(service) => service.shutdown().await,
            None => warn!("Identity service dropped before stop: feature teardown skipped"),
        }
        Ok(())
    }
}
