//! Declarative macros for plugin development.

/// Export the `allocator` / `deleter` pair for a plugin type.
///
/// The constructor expression is any path callable with no arguments that
/// returns the plugin value.
///
/// # Example
///
/// ```rust
/// use ltg_plugin_api::prelude::*;
///
/// struct Broker;
///
/// impl Broker {
///     fn new() -> Self {
///         Broker
///     }
/// }
///
/// impl PluginInterface for Broker {
///     fn init(&mut self, _host: &HostContext) -> bool { true }
///     fn unit(&mut self) {}
///     fn name(&self) -> String { "Broker".into() }
///     fn author(&self) -> String { String::new() }
///     fn version(&self) -> String { "0.1.0".into() }
///     fn description(&self) -> String { String::new() }
///     fn modules_infos(&self) -> Vec<PluginModuleInfos> {
///         vec![PluginModuleInfos::new("", "Broker", PluginModuleType::DataBroker)]
///     }
///     fn create_module(&self, _name: &str, _bridge: &dyn PluginBridge) -> Option<PluginModulePtr> {
///         None
///     }
/// }
///
/// declare_plugin!(Broker, Broker::new);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($ty:ty, $ctor:path) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn allocator() -> *mut $crate::RootPlugin {
            let plugin: $ty = $ctor();
            let root: $crate::RootPlugin = ::std::boxed::Box::new(plugin);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(root))
        }

        /// # Safety
        ///
        /// `ptr` must come from this library's `allocator` and not be used afterwards.
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn deleter(ptr: *mut $crate::RootPlugin) {
            if !ptr.is_null() {
                drop(unsafe { ::std::boxed::Box::from_raw(ptr) });
            }
        }
    };
}
