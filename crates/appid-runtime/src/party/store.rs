//! Party file stores.

use appid_types::FullName;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Folder name of a local party's private store, below its shared store.
pub const LOCAL_STORE_NAME: &str = "-Local";

/// A folder dedicated to one party.
///
/// Paths are computed at construction; nothing touches the disk until
/// [`ensure_created`](Self::ensure_created).
///
/// ```text
/// <store_root>/#Prod/Acme/Sales/$Billing         shared store
/// <store_root>/#Prod/Acme/Sales/$Sales/-Local    private store of a local party
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStore {
    folder: PathBuf,
}

impl FileStore {
    /// Shared store of the party named `full_name`.
    #[must_use]
    pub fn shared(store_root: &Path, full_name: &FullName) -> Self {
        let mut folder = store_root.join(full_name.environment_name());
        for segment in full_name.domain_segments() {
            folder.push(segment);
        }
        folder.push(full_name.party_name());
        Self { folder }
    }

    /// Private store nested in `shared`.
    #[must_use]
    pub fn local(shared: &FileStore) -> Self {
        Self {
            folder: shared.folder.join(LOCAL_STORE_NAME),
        }
    }

    /// The store folder.
    #[must_use]
    pub fn folder_path(&self) -> &Path {
        &self.folder
    }

    /// Creates the folder and its parents if missing.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn ensure_created(&self) -> io::Result<&Path> {
        std::fs::create_dir_all(&self.folder)?;
        Ok(&self.folder)
    }

    pub(crate) fn on_shutdown_or_destroyed(&self, is_destroyed: bool) {
        trace!(folder = %self.folder.display(), is_destroyed, "File store released");
    }
}
