//! Library keep-alive for objects handed out by plugins.
//!
//! Modules, indicators, panes and settings are allocated by plugin code, and
//! their vtables and drop glue live in the plugin library. Every such object
//! the host returns carries a [`LibraryLease`]; the library is unloaded once
//! its [`PluginInstance`](crate::PluginInstance) has been torn down and the
//! last lease is gone.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use ltg_plugin_api::{
    IndicatorComputing, IndicatorComputingPtr, PluginBridge, PluginModule, PluginModulePtr,
    PluginParam, Serie,
};

/// Shared claim on a loaded plugin library.
#[derive(Clone)]
pub struct LibraryLease(Rc<dyn Any>);

impl LibraryLease {
    pub(crate) fn new<T: 'static>(owner: Rc<T>) -> Self {
        Self(owner)
    }

    /// Claims currently held on the library, this one included.
    pub fn holders(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for LibraryLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryLease")
            .field("holders", &self.holders())
            .finish()
    }
}

/// A plugin-produced value together with a lease on its library.
///
/// Fields drop in declaration order: the value is released while the
/// library is still mapped.
pub struct Leased<T> {
    value: T,
    lease: LibraryLease,
}

impl<T> Leased<T> {
    pub(crate) fn new(value: T, lease: LibraryLease) -> Self {
        Self { value, lease }
    }

    pub fn lease(&self) -> &LibraryLease {
        &self.lease
    }
}

impl<T> Deref for Leased<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Leased<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leased")
            .field("value", &self.value)
            .field("lease", &self.lease)
            .finish()
    }
}

/// Host-side module wrapper. Its vtable belongs to the host, so dropping it
/// is safe anywhere; the inner module is released before the lease.
pub(crate) struct LeasedModule {
    module: PluginModulePtr,
    lease: LibraryLease,
}

impl LeasedModule {
    pub(crate) fn wrap(module: PluginModulePtr, lease: LibraryLease) -> PluginModulePtr {
        Rc::new(Self { module, lease })
    }
}

impl PluginModule for LeasedModule {
    fn init(&self, bridge: &dyn PluginBridge) -> bool {
        self.module.init(bridge)
    }

    fn unit(&self) {
        self.module.unit()
    }

    fn into_indicator(self: Rc<Self>) -> Option<IndicatorComputingPtr> {
        let indicator = Rc::clone(&self.module).into_indicator()?;
        Some(Rc::new(LeasedIndicator {
            indicator,
            _lease: self.lease.clone(),
        }))
    }
}

struct LeasedIndicator {
    indicator: IndicatorComputingPtr,
    _lease: LibraryLease,
}

impl IndicatorComputing for LeasedIndicator {
    fn compute(&self, input: &[f64], params: &[PluginParam]) -> Option<Serie> {
        self.indicator.compute(input, params)
    }
}
