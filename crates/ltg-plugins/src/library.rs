//! Cross-platform dynamic library handle.
//!
//! [`LibraryHandle`] owns at most one loaded module and exposes the three
//! operations the plugin loader needs: open, resolve a symbol, close. The OS
//! loader itself sits behind [`SharedLibrary`]; [`SystemLibrary`] is the
//! `libloading` implementation used in production.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::error::LibraryError;

/// Platform loader backend.
pub trait SharedLibrary: Sized + 'static {
    /// Map the library at `path`.
    fn open(path: &Path) -> Result<Self, LibraryError>;

    /// Address of the exported symbol `name`, if present.
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>>;

    /// Unmap the library.
    fn close(self, path: &Path) -> Result<(), LibraryError>;
}

/// The operating system's dynamic loader.
pub type SystemLibrary = libloading::Library;

impl SharedLibrary for libloading::Library {
    fn open(path: &Path) -> Result<Self, LibraryError> {
        // SAFETY: running library initializers is inherent to loading plugins;
        // candidates are restricted to the plugin directory by the caller.
        unsafe { open_restricted(path) }.map_err(|e| classify_open_error(path, e))
    }

    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        // SAFETY: the value is only read as an address, never dereferenced here.
        let symbol =
            unsafe { libloading::Library::get::<*mut c_void>(self, name.as_bytes()) }.ok()?;
        NonNull::new(*symbol)
    }

    fn close(self, path: &Path) -> Result<(), LibraryError> {
        libloading::Library::close(self).map_err(|e| LibraryError::UnloadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Dependencies resolve from the library's own directory and the default
/// system directories only.
#[cfg(windows)]
unsafe fn open_restricted(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::windows::{
        Library, LOAD_LIBRARY_SEARCH_DEFAULT_DIRS, LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR,
    };

    unsafe {
        Library::load_with_flags(
            path,
            LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR | LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
        )
    }
    .map(Into::into)
}

/// Symbols stay local to the library and are bound eagerly.
#[cfg(unix)]
unsafe fn open_restricted(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_LOCAL, RTLD_NOW};

    unsafe { Library::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Into::into)
}

fn classify_open_error(path: &Path, error: libloading::Error) -> LibraryError {
    let not_found = !path.exists() || dependency_missing(&error);
    let reason = match std::error::Error::source(&error) {
        Some(source) => format!("{error}: {source}"),
        None => error.to_string(),
    };
    if not_found {
        LibraryError::ModuleNotFound {
            path: path.to_path_buf(),
            reason,
        }
    } else {
        LibraryError::LoadFailed {
            path: path.to_path_buf(),
            reason,
        }
    }
}

/// OS error code carried by the direct source of `error`.
#[cfg(any(windows, test))]
fn source_os_error(error: &dyn std::error::Error) -> Option<i32> {
    error
        .source()?
        .downcast_ref::<std::io::Error>()?
        .raw_os_error()
}

#[cfg(windows)]
fn dependency_missing(error: &libloading::Error) -> bool {
    const ERROR_MOD_NOT_FOUND: i32 = 126;
    matches!(error, libloading::Error::LoadLibraryExW { .. })
        && source_os_error(error) == Some(ERROR_MOD_NOT_FOUND)
}

#[cfg(unix)]
fn dependency_missing(error: &libloading::Error) -> bool {
    let reason = error.to_string();
    reason.contains("cannot open shared object file") || reason.contains("image not found")
}

/// Native shared library extension of the current platform.
pub fn native_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// Exclusive owner of one loaded library.
///
/// Invalid until [`open`](Self::open) succeeds and again after
/// [`close`](Self::close). Not safe to drive from several threads at once.
pub struct LibraryHandle<L: SharedLibrary = SystemLibrary> {
    path: PathBuf,
    library: Option<L>,
}

impl<L: SharedLibrary> LibraryHandle<L> {
    /// Create an unopened handle.
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            library: None,
        }
    }

    /// Load the library at `path`, replacing any library currently held.
    pub fn open(&mut self, path: &Path) -> Result<(), LibraryError> {
        self.close()?;
        self.path = path.to_path_buf();
        self.library = Some(L::open(path)?);
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.library.is_some()
    }

    /// Path of the last library opened through this handle.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve an exported symbol. `None` if missing or the handle is invalid.
    pub fn resolve_symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        self.library.as_ref()?.symbol(name)
    }

    /// Unload the library. Does nothing on an invalid handle.
    pub fn close(&mut self) -> Result<(), LibraryError> {
        match self.library.take() {
            Some(library) => library.close(&self.path),
            None => Ok(()),
        }
    }

    /// Give up ownership without unloading; the code stays mapped for the
    /// rest of the process.
    pub fn leak(&mut self) {
        if let Some(library) = self.library.take() {
            std::mem::forget(library);
        }
    }
}

impl<L: SharedLibrary> Default for LibraryHandle<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SharedLibrary> std::fmt::Debug for LibraryHandle<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("path", &self.path)
            .field("valid", &self.is_valid())
            .finish()
    }
}
