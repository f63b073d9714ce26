//! Public API for the container registry
//!
//! External modules should import from here rather than directly from the
//! internal modules.

use std::sync::LazyLock;

pub use crate::registry::error::{RegistryError, RegistryResult};
pub use crate::registry::manager::ContainerManager;

static CONTAINER_MANAGER: LazyLock<ContainerManager> = LazyLock::new(|| {
    log::trace!("Initializing container registry");
    ContainerManager::new()
});

/// Process-wide container registry
///
/// Every call returns the same instance.
///
/// # Examples
/// ```no_run
/// # use brokerpool::registry::api::container_manager;
/// let manager = container_manager();
/// if !manager.is_registered("queue://orders") {
///     // build and register the container
/// }
/// manager.start().unwrap();
/// ```
pub fn container_manager() -> &'static ContainerManager {
    &CONTAINER_MANAGER
}
