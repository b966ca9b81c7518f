//! Lifecycle passes.

use super::{DriverError, FeatureDriver};
use crate::party::{LocalPartyRef, OwnedPartyRef, Party, RemoteParty};
use crate::service::IdentityService;
use crate::trampoline::{ActionError, Memory, Trampoline, TrampolineOutcome, TrampolineRunner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a feature driver sees during a lifecycle pass.
///
/// Cloning shares the trampoline and the memory of the pass.
#[derive(Clone)]
pub struct LifecycleContext {
    service: IdentityService,
    trampoline: Trampoline,
    memory: Memory,
    target: Option<OwnedPartyRef>,
}

impl LifecycleContext {
    /// The identity service.
    ///
    /// Drivers run on the identity agent: awaiting an add or a destroy from
    /// a driver blocks the agent for good. Schedule them instead.
    #[must_use]
    pub fn service(&self) -> &IdentityService {
        &self.service
    }

    /// Trampoline of the pass, to defer work or register handlers.
    #[must_use]
    pub fn trampoline(&self) -> &Trampoline {
        &self.trampoline
    }

    /// Memory shared by every action of the pass.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The party of a dynamic pass, `None` for global passes.
    #[must_use]
    pub fn target(&self) -> Option<&OwnedPartyRef> {
        self.target.as_ref()
    }

    /// Remotes concerned by the pass.
    ///
    /// | Target | Remotes |
    /// |--------|---------|
    /// | none | root remotes, then each tenant domain's remotes |
    /// | tenant domain | its remotes |
    /// | remote | itself |
    #[must_use]
    pub fn get_all_remotes(&self) -> Vec<Arc<RemoteParty>> {
        match &self.target {
            None => self.service.all_remotes(),
            Some(OwnedPartyRef::TenantDomain(tenant)) => tenant.remotes().to_vec(),
            Some(OwnedPartyRef::Remote(remote)) => vec![Arc::clone(remote)],
        }
    }

    /// Local parties concerned by the pass.
    ///
    /// | Target | Locals |
    /// |--------|--------|
    /// | none | root, then each tenant domain |
    /// | tenant domain | itself |
    /// | remote | none |
    #[must_use]
    pub fn get_all_locals(&self) -> Vec<LocalPartyRef> {
        match &self.target {
            None => std::iter::once(LocalPartyRef::Root(self.service.clone()))
                .chain(
                    self.service
                        .tenant_domains()
                        .iter()
                        .cloned()
                        .map(LocalPartyRef::TenantDomain),
                )
                .collect(),
            Some(OwnedPartyRef::TenantDomain(tenant)) => {
                vec![LocalPartyRef::TenantDomain(Arc::clone(tenant))]
            }
            Some(OwnedPartyRef::Remote(_)) => Vec::new(),
        }
    }
}

/// Runs drivers over the party graph, one trampoline per pass.
pub(crate) struct Lifecycle {
    service: IdentityService,
    drivers: Vec<Arc<dyn FeatureDriver>>,
    runner: TrampolineRunner,
}

impl Lifecycle {
    pub(crate) fn new(service: IdentityService) -> Self {
        let drivers = service.drivers().snapshot();
        Self {
            service,
            drivers,
            runner: TrampolineRunner::new(),
        }
    }

    fn context(&self, target: Option<OwnedPartyRef>) -> LifecycleContext {
        LifecycleContext {
            service: self.service.clone(),
            trampoline: self.runner.trampoline().clone(),
            memory: self.runner.memory().clone(),
            target,
        }
    }

    /// Global setup in registration order, every driver runs.
    pub(crate) async fn setup(mut self) -> Result<(), ActionError> {
        info!(drivers = self.drivers.len(), "Setting up features");
        let cx = self.context(None);
        let trampoline = self.runner.trampoline().clone();
        for driver in &self.drivers {
            let (driver, cx) = (Arc::clone(driver), cx.clone());
            trampoline.add_async(move || async move { gentle(driver.setup(&cx).await) })?;
        }
        let outcome = self.runner.execute_all().await?;
        if outcome.is_total_success() {
            return Ok(());
        }
        Err(failure_of(outcome))
    }

    /// Dynamic setup of a batch, party by party, each in registration order.
    ///
    /// `publish` runs in the second success round: after every success
    /// handler the drivers registered. Returns `Ok` only if it ran.
    pub(crate) async fn setup_dynamic<P>(
        mut self,
        parties: &[OwnedPartyRef],
        publish: P,
    ) -> Result<(), ActionError>
    where
        P: FnOnce() + Send + 'static,
    {
        let published = Arc::new(AtomicBool::new(false));
        let trampoline = self.runner.trampoline().clone();
        {
            let (outer, published) = (trampoline.clone(), Arc::clone(&published));
            trampoline.on_success(move || {
                outer.on_success(move || {
                    publish();
                    published.store(true, Ordering::Release);
                    Ok(())
                })?;
                Ok(())
            })?;
        }
        for party in parties {
            debug!(party = %party, "Scheduling dynamic setup");
            let cx = self.context(Some(party.clone()));
            for driver in &self.drivers {
                let (driver, cx, party) = (Arc::clone(driver), cx.clone(), party.clone());
                trampoline.add_async(move || async move {
                    gentle(driver.setup_dynamic(&cx, &party).await)
                })?;
            }
        }
        let outcome = self.runner.execute_all().await?;
        if published.load(Ordering::Acquire) {
            if !outcome.is_total_success() {
                warn!(result = ?outcome.result, "Parties published despite handler failures");
            }
            return Ok(());
        }
        Err(failure_of(outcome))
    }

    /// Dynamic teardown of one party in reverse registration order.
    /// Failures are logged.
    pub(crate) async fn teardown_dynamic(mut self, party: &OwnedPartyRef) {
        let cx = self.context(Some(party.clone()));
        let trampoline = self.runner.trampoline().clone();
        for driver in self.drivers.iter().rev() {
            let (driver, cx, party) = (Arc::clone(driver), cx.clone(), party.clone());
            let scheduled = trampoline.add_async(move || async move {
                driver
                    .teardown_dynamic(&cx, &party)
                    .await
                    .map_err(ActionError::from)
            });
            if let Err(e) = scheduled {
                warn!(error = %e, "Unable to schedule dynamic teardown");
            }
        }
        self.run_swallowed(party.full_name().to_string()).await;
    }

    /// Global teardown in reverse registration order. Failures are logged.
    pub(crate) async fn teardown(mut self) {
        info!(drivers = self.drivers.len(), "Tearing down features");
        let cx = self.context(None);
        let trampoline = self.runner.trampoline().clone();
        for driver in self.drivers.iter().rev() {
            let (driver, cx) = (Arc::clone(driver), cx.clone());
            let scheduled = trampoline.add_async(move || async move {
                driver.teardown(&cx).await.map_err(ActionError::from)
            });
            if let Err(e) = scheduled {
                warn!(error = %e, "Unable to schedule teardown");
            }
        }
        let root = self.service.full_name().to_string();
        self.run_swallowed(root).await;
    }

    async fn run_swallowed(&mut self, party: String) {
        match self.runner.execute_all().await {
            Ok(outcome) if outcome.is_total_success() => {}
            Ok(outcome) => warn!(
                %party,
                error = %failure_of(outcome),
                "Teardown failed. This is ignored."
            ),
            Err(e) => warn!(%party, error = %e, "Teardown failed. This is ignored."),
        }
    }
}

fn gentle(result: Result<bool, DriverError>) -> Result<(), ActionError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(ActionError::ReturnedFalse),
        Err(e) => Err(e.into()),
    }
}

fn failure_of(outcome: TrampolineOutcome) -> ActionError {
    outcome.failure.unwrap_or_else(|| {
        ActionError::failed(format!(
            "lifecycle result is {:?}: it is not safe to continue",
            outcome.result
        ))
    })
}
