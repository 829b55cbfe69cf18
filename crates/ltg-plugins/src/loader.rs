//! Plugin loader.
//!
//! Resolves the two factory symbols a plugin library exports and hands out
//! the constructed object wrapped in a [`PluginBox`], whose drop goes back
//! through the library's own deleter.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use ltg_plugin_api::{DEFAULT_ALLOCATOR_SYMBOL, DEFAULT_DELETER_SYMBOL};
use tracing::{debug, error, warn};

use crate::error::LibraryError;
use crate::library::{LibraryHandle, SharedLibrary, SystemLibrary};

type AllocatorFn<T> = unsafe extern "C" fn() -> *mut T;
type DeleterFn<T> = unsafe extern "C" fn(*mut T);

/// Names of the exported constructor and destructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolNames {
    pub allocator: String,
    pub deleter: String,
}

impl Default for SymbolNames {
    fn default() -> Self {
        Self {
            allocator: DEFAULT_ALLOCATOR_SYMBOL.to_string(),
            deleter: DEFAULT_DELETER_SYMBOL.to_string(),
        }
    }
}

/// Owning pointer to an object allocated inside a plugin library.
///
/// Dropping it calls the library's deleter, so it must not outlive the
/// library it came from.
pub struct PluginBox<T> {
    ptr: NonNull<T>,
    deleter: DeleterFn<T>,
}

impl<T> Deref for PluginBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `ptr` came from the allocator and stays valid until drop.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for PluginBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`, and `&mut self` guarantees exclusivity.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for PluginBox<T> {
    fn drop(&mut self) {
        // SAFETY: the pointer is handed back exactly once, to the deleter
        // exported next to the allocator that produced it.
        unsafe { (self.deleter)(self.ptr.as_ptr()) }
    }
}

impl<T> fmt::Debug for PluginBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBox").field("ptr", &self.ptr).finish()
    }
}

/// Loads one plugin library and constructs its root object.
pub struct PluginLoader<T, L: SharedLibrary = SystemLibrary> {
    path: PathBuf,
    symbols: SymbolNames,
    handle: LibraryHandle<L>,
    is_a_plugin: bool,
    _root: PhantomData<fn() -> T>,
}

impl<T, L: SharedLibrary> PluginLoader<T, L> {
    /// Loader for `path` using the default `allocator` / `deleter` names.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_symbols(path, SymbolNames::default())
    }

    pub fn with_symbols(path: impl Into<PathBuf>, symbols: SymbolNames) -> Self {
        Self {
            path: path.into(),
            symbols,
            handle: LibraryHandle::new(),
            is_a_plugin: true,
            _root: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the library. Failures are logged here; the caller only needs
    /// [`is_valid`](Self::is_valid).
    pub fn open_library(&mut self) -> Result<(), LibraryError> {
        match self.handle.open(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Library opened");
                Ok(())
            }
            Err(e) if e.is_module_not_found() => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Can't open and load library: module or one of its dependencies not found"
                );
                Err(e)
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Can't open and load library");
                Err(e)
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    /// `false` once [`instance`](Self::instance) found a factory symbol missing.
    pub fn is_a_plugin(&self) -> bool {
        self.is_a_plugin
    }

    /// Construct the plugin's root object.
    ///
    /// Returns `None` on an invalid handle, when a factory symbol is missing
    /// (the library is then closed and no longer considered a plugin) or when
    /// the allocator returns null.
    pub fn instance(&mut self) -> Option<PluginBox<T>> {
        if !self.handle.is_valid() {
            return None;
        }

        let allocator = self.handle.resolve_symbol(&self.symbols.allocator);
        let deleter = self.handle.resolve_symbol(&self.symbols.deleter);
        let (Some(allocator), Some(deleter)) = (allocator, deleter) else {
            debug!(
                path = %self.path.display(),
                allocator = %self.symbols.allocator,
                deleter = %self.symbols.deleter,
                "Factory symbols not found, not a plugin"
            );
            self.is_a_plugin = false;
            self.close_library();
            return None;
        };

        // SAFETY: both symbols are exported by the plugin ABI with exactly
        // these signatures for the root type `T`.
        let (allocator, deleter) = unsafe {
            (
                std::mem::transmute::<*mut std::ffi::c_void, AllocatorFn<T>>(allocator.as_ptr()),
                std::mem::transmute::<*mut std::ffi::c_void, DeleterFn<T>>(deleter.as_ptr()),
            )
        };

        // SAFETY: the library stays mapped while `self.handle` is valid.
        let raw = unsafe { allocator() };
        match NonNull::new(raw) {
            Some(ptr) => Some(PluginBox { ptr, deleter }),
            None => {
                warn!(path = %self.path.display(), "Plugin allocator returned null");
                None
            }
        }
    }

    /// Unload the library. Every [`PluginBox`] from this loader must be
    /// dropped first.
    pub fn close_library(&mut self) {
        if let Err(e) = self.handle.close() {
            warn!(error = %e, "Library unload failed");
        }
    }

    /// Drop the handle without unloading the library.
    pub fn leak_library(&mut self) {
        self.handle.leak();
    }
}

impl<T, L: SharedLibrary> fmt::Debug for PluginLoader<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("path", &self.path)
            .field("symbols", &self.symbols)
            .field("handle", &self.handle)
            .field("is_a_plugin", &self.is_a_plugin)
            .finish()
    }
}
