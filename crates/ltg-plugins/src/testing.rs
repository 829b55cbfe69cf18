//! In-process stand-in for the OS loader.
//!
//! Libraries are registered per test thread by file name. Their exported
//! symbols point at functions of this module, and every lifecycle step
//! (plugin init/unit, deleter, library close) is appended to a journal so
//! tests can assert ordering.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use ltg_plugin_api::prelude::*;
use ltg_plugin_api::{DEFAULT_ALLOCATOR_SYMBOL, DEFAULT_DELETER_SYMBOL};

use crate::error::LibraryError;
use crate::library::SharedLibrary;

thread_local! {
    static LIBRARIES: RefCell<HashMap<String, FakeEntry>> = RefCell::new(HashMap::new());
    static JOURNAL: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static NEXT_SPEC: RefCell<Option<FakePluginSpec>> = const { RefCell::new(None) };
}

/// Append an event to the journal.
pub(crate) fn record(event: impl Into<String>) {
    JOURNAL.with(|j| j.borrow_mut().push(event.into()));
}

/// Events recorded so far on this thread.
pub(crate) fn journal() -> Vec<String> {
    JOURNAL.with(|j| j.borrow().clone())
}

#[derive(Clone)]
enum FakeEntry {
    Plain(Vec<String>),
    Plugin {
        spec: FakePluginSpec,
        allocator: bool,
        deleter: bool,
    },
    Broken,
}

/// Behaviour of a fake plugin.
#[derive(Debug, Clone)]
pub(crate) struct FakePluginSpec {
    pub name: String,
    pub version: String,
    pub description: String,
    pub modules: Vec<(String, PluginModuleType)>,
    pub init_ok: bool,
    pub null_instance: bool,
    pub minimal_host_version: u32,
}

impl FakePluginSpec {
    pub fn new(name: &str, modules: &[(&str, PluginModuleType)]) -> Self {
        Self {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: format!("{} plugin", name),
            modules: modules
                .iter()
                .map(|(label, t)| (label.to_string(), *t))
                .collect(),
            init_ok: true,
            null_instance: false,
            minimal_host_version: 0,
        }
    }

    pub fn failing_init(mut self) -> Self {
        self.init_ok = false;
        self
    }

    pub fn null_instance(mut self) -> Self {
        self.null_instance = true;
        self
    }

    pub fn requiring_host(mut self, version: u32) -> Self {
        self.minimal_host_version = version;
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }
}

/// Registry of fake libraries for the current test thread.
pub(crate) struct FakeRegistry;

/// Clears the registry and journal when dropped.
pub(crate) struct RegistryGuard;

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        FakeRegistry::reset();
    }
}

impl FakeRegistry {
    /// Start from an empty registry and journal.
    pub fn install() -> RegistryGuard {
        Self::reset();
        RegistryGuard
    }

    fn reset() {
        LIBRARIES.with(|l| l.borrow_mut().clear());
        JOURNAL.with(|j| j.borrow_mut().clear());
        NEXT_SPEC.with(|s| s.borrow_mut().take());
    }

    fn insert(file_name: &str, entry: FakeEntry) {
        LIBRARIES.with(|l| l.borrow_mut().insert(file_name.to_string(), entry));
    }

    /// A library exporting the given symbols, none of them plugin factories.
    pub fn add_plain(file_name: &str, symbols: &[&str]) {
        Self::insert(
            file_name,
            FakeEntry::Plain(symbols.iter().map(|s| s.to_string()).collect()),
        );
    }

    /// A library exporting both factory symbols.
    pub fn add_plugin(file_name: &str, spec: FakePluginSpec) {
        Self::insert(
            file_name,
            FakeEntry::Plugin {
                spec,
                allocator: true,
                deleter: true,
            },
        );
    }

    /// A library exporting `allocator` but no `deleter`.
    pub fn add_allocator_only(file_name: &str, spec: FakePluginSpec) {
        Self::insert(
            file_name,
            FakeEntry::Plugin {
                spec,
                allocator: true,
                deleter: false,
            },
        );
    }

    /// A file the loader refuses to map.
    pub fn add_broken(file_name: &str) {
        Self::insert(file_name, FakeEntry::Broken);
    }
}

/// Library backend resolving against [`FakeRegistry`].
pub(crate) struct FakeLibrary {
    file_name: String,
    entry: FakeEntry,
}

fn address(f: *const ()) -> Option<NonNull<c_void>> {
    NonNull::new(f as *mut c_void)
}

extern "C" fn fake_noop() {}

#[allow(improper_ctypes_definitions)]
extern "C" fn fake_allocator() -> *mut RootPlugin {
    match NEXT_SPEC.with(|s| s.borrow_mut().take()) {
        Some(spec) if !spec.null_instance => {
            let root: RootPlugin = Box::new(FakePlugin::new(spec));
            Box::into_raw(Box::new(root))
        }
        _ => ptr::null_mut(),
    }
}

#[allow(improper_ctypes_definitions)]
unsafe extern "C" fn fake_deleter(ptr: *mut RootPlugin) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr) });
    }
}

impl SharedLibrary for FakeLibrary {
    fn open(path: &Path) -> Result<Self, LibraryError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        match LIBRARIES.with(|l| l.borrow().get(&file_name).cloned()) {
            Some(FakeEntry::Broken) => Err(LibraryError::LoadFailed {
                path: path.to_path_buf(),
                reason: "invalid ELF header".to_string(),
            }),
            Some(entry) => Ok(Self { file_name, entry }),
            None => Err(LibraryError::ModuleNotFound {
                path: path.to_path_buf(),
                reason: "No such file or directory".to_string(),
            }),
        }
    }

    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        match &self.entry {
            FakeEntry::Plain(symbols) => symbols
                .iter()
                .any(|s| s == name)
                .then(|| address(fake_noop as *const ()))
                .flatten(),
            FakeEntry::Plugin {
                spec,
                allocator,
                deleter,
            } => {
                if *allocator && name == DEFAULT_ALLOCATOR_SYMBOL {
                    NEXT_SPEC.with(|s| *s.borrow_mut() = Some(spec.clone()));
                    address(fake_allocator as *const ())
                } else if *deleter && name == DEFAULT_DELETER_SYMBOL {
                    address(fake_deleter as *const ())
                } else {
                    None
                }
            }
            FakeEntry::Broken => None,
        }
    }

    fn close(self, _path: &Path) -> Result<(), LibraryError> {
        record(format!("close:{}", self.file_name));
        Ok(())
    }
}

/// Module handed out by [`FakePlugin::create_module`].
pub(crate) struct FakeModule {
    module_type: PluginModuleType,
}

impl PluginModule for FakeModule {
    fn into_indicator(self: Rc<Self>) -> Option<IndicatorComputingPtr> {
        if self.module_type == PluginModuleType::Indicator {
            Some(self)
        } else {
            None
        }
    }
}

impl IndicatorComputing for FakeModule {
    fn compute(&self, input: &[f64], _params: &[PluginParam]) -> Option<Serie> {
        Some(input.to_vec())
    }
}

struct FakePane;

impl PluginPane for FakePane {}

struct FakeSettings {
    category: String,
}

impl PluginSettings for FakeSettings {
    fn category(&self) -> String {
        self.category.clone()
    }

    fn export_settings(&self, _offset: &str, _kind: SettingsType) -> String {
        String::new()
    }

    fn import_setting(&self, _name: &str, _parent: &str, _value: &str, _kind: SettingsType) {}
}

/// Plugin object produced by `fake_allocator`.
pub(crate) struct FakePlugin {
    spec: FakePluginSpec,
    pane: Rc<dyn PluginPane>,
    settings: Rc<dyn PluginSettings>,
}

impl FakePlugin {
    fn new(spec: FakePluginSpec) -> Self {
        let settings = Rc::new(FakeSettings {
            category: format!("plugins/{}", spec.name),
        });
        Self {
            spec,
            pane: Rc::new(FakePane),
            settings,
        }
    }
}

impl Drop for FakePlugin {
    fn drop(&mut self) {
        record(format!("delete:{}", self.spec.name));
    }
}

impl PluginInterface for FakePlugin {
    fn init(&mut self, _host: &HostContext) -> bool {
        record(format!("init:{}", self.spec.name));
        self.spec.init_ok
    }

    fn unit(&mut self) {
        record(format!("unit:{}", self.spec.name));
    }

    fn minimal_host_version(&self) -> u32 {
        self.spec.minimal_host_version
    }

    fn name(&self) -> String {
        self.spec.name.clone()
    }

    fn author(&self) -> String {
        "tests".to_string()
    }

    fn version(&self) -> String {
        self.spec.version.clone()
    }

    fn description(&self) -> String {
        self.spec.description.clone()
    }

    fn modules_infos(&self) -> Vec<PluginModuleInfos> {
        self.spec
            .modules
            .iter()
            .map(|(label, t)| PluginModuleInfos::new("", label.clone(), *t))
            .collect()
    }

    fn create_module(
        &self,
        module_name: &str,
        bridge: &dyn PluginBridge,
    ) -> Option<PluginModulePtr> {
        // "<label>+<indicator>" asks the bridge for another plugin's indicator first
        let (label, dependency) = match module_name.split_once('+') {
            Some((label, dependency)) => (label, Some(dependency)),
            None => (module_name, None),
        };
        let (_, module_type) = self.spec.modules.iter().find(|(l, _)| l == label)?;
        if let Some(dependency) = dependency {
            bridge.indicator(dependency)?;
        }
        Some(Rc::new(FakeModule {
            module_type: *module_type,
        }))
    }

    fn panes(&self) -> Vec<PluginPaneConfig> {
        vec![PluginPaneConfig::new(
            Rc::downgrade(&self.pane),
            format!("{} pane", self.spec.name),
        )]
    }

    fn settings(&self) -> Vec<PluginSettingsConfig> {
        vec![PluginSettingsConfig::new(Rc::downgrade(&self.settings))]
    }
}
