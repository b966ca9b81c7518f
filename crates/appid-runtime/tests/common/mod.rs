//! Shared fixtures for integration tests.

#![allow(dead_code)]

use appid_runtime::config::{IdentityConfig, PartySection};
use appid_runtime::lifecycle::{DriverBinding, DriverError, FeatureDriver, LifecycleContext};
use appid_runtime::party::{OwnedPartyRef, Party, RemoteEvent};
use appid_runtime::IdentityService;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Calls recorded by drivers, in order.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Routes runtime logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Service over `root` with a temporary store and no heartbeat.
pub fn service(root: PartySection) -> (IdentityService, TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = IdentityConfig::with_root(root)
        .with_store_root(dir.path())
        .with_heartbeat_ms(0);
    let service = IdentityService::new(&config).expect("valid configuration");
    (service, dir)
}

/// Registers `D` and returns it type-erased.
pub fn register<D: FeatureDriver>(
    service: &IdentityService,
    build: impl FnOnce(DriverBinding) -> D,
) -> Arc<dyn FeatureDriver> {
    service.drivers().register(true, build).expect("register")
}

fn entry(kind: &str, feature: &str, party: Option<&OwnedPartyRef>) -> String {
    match party {
        Some(party) => format!("{kind} {feature} {}", party.full_name()),
        None => format!("{kind} {feature}"),
    }
}

macro_rules! recording_drivers {
    ($($ty:ident),* $(,)?) => {$(
        /// Records every call in the shared log.
        #[allow(non_camel_case_types)]
        pub struct $ty {
            binding: DriverBinding,
            log: Log,
            pub dependencies: Vec<Arc<dyn FeatureDriver>>,
        }

        impl $ty {
            pub fn new(binding: DriverBinding, log: Log, dependencies: Vec<Arc<dyn FeatureDriver>>) -> Self {
                Self { binding, log, dependencies }
            }
        }

        #[async_trait]
        impl FeatureDriver for $ty {
            fn binding(&self) -> &DriverBinding {
                &self.binding
            }

            async fn setup(&self, _cx: &LifecycleContext) -> Result<bool, DriverError> {
                self.log.lock().push(entry("setup", self.feature_name(), None));
                Ok(true)
            }

            async fn setup_dynamic(
                &self,
                _cx: &LifecycleContext,
                party: &OwnedPartyRef,
            ) -> Result<bool, DriverError> {
                self.log.lock().push(entry("setup_dynamic", self.feature_name(), Some(party)));
                Ok(true)
            }

            async fn teardown_dynamic(
                &self,
                _cx: &LifecycleContext,
                party: &OwnedPartyRef,
            ) -> Result<(), DriverError> {
                self.log.lock().push(entry("teardown_dynamic", self.feature_name(), Some(party)));
                Ok(())
            }

            async fn teardown(&self, _cx: &LifecycleContext) -> Result<(), DriverError> {
                self.log.lock().push(entry("teardown", self.feature_name(), None));
                Ok(())
            }
        }
    )*};
}

recording_drivers!(
    RecordFeatureDriver,
    F1FeatureDriver,
    F2_1FeatureDriver,
    F3_2FeatureDriver,
    FA_1FeatureDriver,
    FB_AFeatureDriver,
    FC_A_3FeatureDriver,
    FD_B_2FeatureDriver,
);

/// Fails global or dynamic setup on demand.
#[derive(Debug)]
pub struct FlakyFeatureDriver {
    binding: DriverBinding,
    pub fail_setup: AtomicBool,
    pub fail_dynamic: AtomicBool,
}

impl FlakyFeatureDriver {
    pub fn new(binding: DriverBinding) -> Self {
        Self {
            binding,
            fail_setup: AtomicBool::new(false),
            fail_dynamic: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FeatureDriver for FlakyFeatureDriver {
    fn binding(&self) -> &DriverBinding {
        &self.binding
    }

    async fn setup(&self, _cx: &LifecycleContext) -> Result<bool, DriverError> {
        if self.fail_setup.load(Ordering::SeqCst) {
            return Err(DriverError::failed(self.feature_name(), "setup refused"));
        }
        Ok(true)
    }

    async fn setup_dynamic(
        &self,
        _cx: &LifecycleContext,
        _party: &OwnedPartyRef,
    ) -> Result<bool, DriverError> {
        Ok(!self.fail_dynamic.load(Ordering::SeqCst))
    }

    async fn teardown_dynamic(
        &self,
        _cx: &LifecycleContext,
        _party: &OwnedPartyRef,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn teardown(&self, _cx: &LifecycleContext) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Feature attached by [`TagFeatureDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tag(pub String);

/// Tags every remote of the pass where the feature is allowed.
pub struct TagFeatureDriver {
    binding: DriverBinding,
}

impl TagFeatureDriver {
    pub fn new(binding: DriverBinding) -> Self {
        Self { binding }
    }

    fn tag_remotes(&self, cx: &LifecycleContext) -> Result<bool, DriverError> {
        for remote in cx.get_all_remotes() {
            if self.binding.is_allowed_feature(remote.as_ref()) {
                remote.features().add(Tag(remote.full_name().to_string()))?;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl FeatureDriver for TagFeatureDriver {
    fn binding(&self) -> &DriverBinding {
        &self.binding
    }

    async fn setup(&self, cx: &LifecycleContext) -> Result<bool, DriverError> {
        self.tag_remotes(cx)
    }

    async fn setup_dynamic(
        &self,
        cx: &LifecycleContext,
        _party: &OwnedPartyRef,
    ) -> Result<bool, DriverError> {
        self.tag_remotes(cx)
    }

    async fn teardown_dynamic(
        &self,
        _cx: &LifecycleContext,
        _party: &OwnedPartyRef,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn teardown(&self, _cx: &LifecycleContext) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Records the scope helpers' answers, as `<target>: <remotes> <locals>`.
pub struct ScopeFeatureDriver {
    binding: DriverBinding,
    pub seen: Mutex<Vec<String>>,
}

impl ScopeFeatureDriver {
    pub fn new(binding: DriverBinding) -> Self {
        Self {
            binding,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, cx: &LifecycleContext) {
        let target = cx
            .target()
            .map_or_else(|| "all".to_string(), |p| p.full_name().to_string());
        let remotes: Vec<String> = cx
            .get_all_remotes()
            .iter()
            .map(|r| r.full_name().party_name().to_string())
            .collect();
        let locals: Vec<String> = cx
            .get_all_locals()
            .iter()
            .map(|l| l.full_name().party_name().to_string())
            .collect();
        self.seen.lock().push(format!(
            "{target}: [{}] [{}]",
            remotes.join(","),
            locals.join(",")
        ));
    }
}

#[async_trait]
impl FeatureDriver for ScopeFeatureDriver {
    fn binding(&self) -> &DriverBinding {
        &self.binding
    }

    async fn setup(&self, cx: &LifecycleContext) -> Result<bool, DriverError> {
        self.record(cx);
        Ok(true)
    }

    async fn setup_dynamic(
        &self,
        cx: &LifecycleContext,
        _party: &OwnedPartyRef,
    ) -> Result<bool, DriverError> {
        self.record(cx);
        Ok(true)
    }

    async fn teardown_dynamic(
        &self,
        cx: &LifecycleContext,
        _party: &OwnedPartyRef,
    ) -> Result<(), DriverError> {
        self.record(cx);
        Ok(())
    }

    async fn teardown(&self, _cx: &LifecycleContext) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Checks from inside a dynamic pass whether its party is already visible.
///
/// Records `<stage> <party>: listed=<bool> owned=<bool> events=<n>` from
/// `setup_dynamic` and from a success handler it registers there. `events`
/// counts the changes raised between the two. Receivers subscribed on a
/// tenant domain's own `remotes_changed` are kept in `tenant_events`.
pub struct VisibilityFeatureDriver {
    binding: DriverBinding,
    pub seen: Log,
    pub tenant_events: Mutex<Vec<broadcast::Receiver<RemoteEvent>>>,
}

impl VisibilityFeatureDriver {
    pub fn new(binding: DriverBinding) -> Self {
        Self {
            binding,
            seen: new_log(),
            tenant_events: Mutex::new(Vec::new()),
        }
    }
}

fn visibility(service: &IdentityService, party: &OwnedPartyRef) -> String {
    let listed = service.all_parties().contains(party);
    let owned = match party {
        OwnedPartyRef::Remote(remote) => remote
            .owner()
            .is_some_and(|owner| owner.remotes().iter().any(|r| Arc::ptr_eq(r, remote))),
        OwnedPartyRef::TenantDomain(tenant) => service
            .tenant_domains()
            .iter()
            .any(|t| Arc::ptr_eq(t, tenant)),
    };
    format!("listed={listed} owned={owned}")
}

#[async_trait]
impl FeatureDriver for VisibilityFeatureDriver {
    fn binding(&self) -> &DriverBinding {
        &self.binding
    }

    async fn setup(&self, _cx: &LifecycleContext) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn setup_dynamic(
        &self,
        cx: &LifecycleContext,
        party: &OwnedPartyRef,
    ) -> Result<bool, DriverError> {
        let service = cx.service().clone();
        self.seen.lock().push(format!(
            "setup {party}: {} events=0",
            visibility(&service, party)
        ));
        let mut all = service.subscribe_all_party_changed();
        let mut mine = match party {
            OwnedPartyRef::Remote(remote) => remote.owner().map(|o| o.subscribe_remotes_changed()),
            OwnedPartyRef::TenantDomain(tenant) => {
                self.tenant_events.lock().push(tenant.subscribe_remotes_changed());
                Some(tenant.subscribe_remotes_changed())
            }
        };
        let (seen, party) = (Arc::clone(&self.seen), party.clone());
        cx.trampoline()
            .on_success(move || {
                let mut events = 0;
                while all.try_recv().is_ok() {
                    events += 1;
                }
                if let Some(mine) = mine.as_mut() {
                    while mine.try_recv().is_ok() {
                        events += 1;
                    }
                }
                seen.lock().push(format!(
                    "success {party}: {} events={events}",
                    visibility(&service, &party)
                ));
                Ok(())
            })
            .map_err(|e| DriverError::failed(self.feature_name(), e.to_string()))?;
        Ok(true)
    }

    async fn teardown_dynamic(
        &self,
        _cx: &LifecycleContext,
        _party: &OwnedPartyRef,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn teardown(&self, _cx: &LifecycleContext) -> Result<(), DriverError> {
        Ok(())
    }
}
