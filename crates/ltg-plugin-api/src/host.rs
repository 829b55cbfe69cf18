//! Host services injected into plugins at initialization.

use std::path::{Path, PathBuf};

use tracing::Dispatch;

use crate::HOST_VERSION;

/// Context passed to [`crate::PluginInterface::init`].
///
/// Each plugin library links its own copy of `tracing`, so events emitted
/// inside a plugin do not reach the host's subscriber unless the plugin
/// installs the host dispatcher carried here.
#[derive(Clone)]
pub struct HostContext {
    dispatch: Dispatch,
    host_version: u32,
    app_path: PathBuf,
}

impl HostContext {
    /// Capture the dispatcher currently active on this thread.
    pub fn new(app_path: impl Into<PathBuf>) -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
            host_version: HOST_VERSION,
            app_path: app_path.into(),
        }
    }

    /// Override the advertised host version.
    pub fn with_host_version(mut self, host_version: u32) -> Self {
        self.host_version = host_version;
        self
    }

    /// Use an explicit dispatcher.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn host_version(&self) -> u32 {
        self.host_version
    }

    pub fn app_path(&self) -> &Path {
        &self.app_path
    }

    /// Install the host dispatcher as the global default of the calling
    /// library. Returns `false` if that library already had one.
    pub fn install_logger(&self) -> bool {
        tracing::dispatcher::set_global_default(self.dispatch.clone()).is_ok()
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("host_version", &self.host_version)
            .field("app_path", &self.app_path)
            .finish()
    }
}
