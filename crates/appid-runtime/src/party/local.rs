//! State shared by local parties (the root and tenant domains).

use super::cow::CowList;
use super::{FileStore, PartyCore, RemoteEvent, RemoteParty, EVENT_CAPACITY};
use std::sync::Arc;
use tokio::sync::broadcast;

pub(crate) struct LocalNode {
    core: PartyCore,
    remotes: CowList<RemoteParty>,
    remotes_changed: broadcast::Sender<RemoteEvent>,
    local_store: FileStore,
}

impl LocalNode {
    pub(crate) fn new(core: PartyCore, remotes: Vec<Arc<RemoteParty>>) -> Self {
        let local_store = FileStore::local(core.shared_store());
        let (remotes_changed, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            core,
            remotes: CowList::new(remotes),
            remotes_changed,
            local_store,
        }
    }

    pub(crate) fn core(&self) -> &PartyCore {
        &self.core
    }

    pub(crate) fn remotes(&self) -> Arc<Vec<Arc<RemoteParty>>> {
        self.remotes.snapshot()
    }

    pub(crate) fn remote_list(&self) -> &CowList<RemoteParty> {
        &self.remotes
    }

    pub(crate) fn subscribe_remotes_changed(&self) -> broadcast::Receiver<RemoteEvent> {
        self.remotes_changed.subscribe()
    }

    /// Sends `change` to this node's subscribers. No subscriber is fine.
    pub(crate) fn raise_remotes_changed(&self, change: RemoteEvent) {
        let _ = self.remotes_changed.send(change);
    }

    pub(crate) fn local_store(&self) -> &FileStore {
        &self.local_store
    }

    /// Releases the stores of this node and of its remaining remotes.
    pub(crate) fn on_shutdown_or_destroyed(&self, is_destroyed: bool) {
        self.core.shared_store().on_shutdown_or_destroyed(is_destroyed);
        self.local_store.on_shutdown_or_destroyed(is_destroyed);
        for remote in self.remotes.snapshot().iter() {
            remote.on_shutdown_or_destroyed(is_destroyed);
        }
    }
}
