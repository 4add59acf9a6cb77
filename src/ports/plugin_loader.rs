use std::path::Path;
use std::sync::Arc;

use crate::miners::InstalledPlugin;

/// Port for turning an installed plugin directory into live adapters.
pub trait PluginLoader: Send + Sync {
    /// Load the plugin rooted at `dir`.
    ///
    /// Returns every adapter the directory registers; an empty vector means
    /// the directory holds no usable plugin.
    fn load_dir(&self, dir: &Path) -> Vec<Arc<InstalledPlugin>>;
}
