//! Dynamic Library Loader
//!
//! Locates `libcatboostmodel`, opens it with libloading and resolves every
//! capability into a [`SymbolTable`].

use std::ffi::CString;
use std::os::raw::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use log::{debug, warn};

use super::{Capability, FfiError, FfiResult, SymbolTable};

/// Environment variable that overrides the library location
pub const LIBRARY_PATH_ENV: &str = "CATBOOST_LIBRARY_PATH";

/// Base name of the CatBoost model-evaluation library
pub const LIBRARY_NAME: &str = "catboostmodel";

/// The loaded CatBoost library
pub struct NativeLibrary {
    /// Path to the library
    path: PathBuf,
    /// The loaded library handle
    library: Library,
}

impl NativeLibrary {
    /// Load a library from the given path
    pub fn load(path: impl AsRef<Path>) -> FfiResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading runs the library's initializers. The caller vouches
        // for the path pointing at a genuine CatBoost build.
        let library = unsafe {
            Library::new(&path).map_err(|e| {
                FfiError::LoadError(format!(
                    "Failed to load library '{}': {}",
                    path.display(),
                    e
                ))
            })?
        };

        debug!("loaded CatBoost library from {}", path.display());
        Ok(Self { path, library })
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve the address of a capability's entry point
    pub fn resolve(&self, capability: Capability) -> FfiResult<*const c_void> {
        let name = capability.symbol_name();
        let c_name = CString::new(name)
            .map_err(|_| FfiError::InvalidSymbol(format!("Invalid symbol name: {}", name)))?;

        // Safety: the symbol is read as an untyped address only. The typed
        // view is established by SymbolTable::bind.
        let symbol: Symbol<*const c_void> = unsafe {
            self.library.get(c_name.as_bytes_with_nul()).map_err(|e| {
                FfiError::SymbolNotFound(format!(
                    "Symbol '{}' not found in '{}': {}",
                    name,
                    self.path.display(),
                    e
                ))
            })?
        };

        Ok(*symbol)
    }

    /// Resolve and bind every capability.
    ///
    /// In strict mode the first missing symbol is an error. Otherwise missing
    /// optional entry points are left unbound and dispatching them reports
    /// [`FfiError::Unbound`].
    pub fn bind_all(&self, strict: bool) -> FfiResult<SymbolTable> {
        let mut table = SymbolTable::new();

        for capability in Capability::ALL {
            let address = match self.resolve(capability) {
                Ok(address) => address,
                Err(e) if !strict && capability.is_optional() => {
                    warn!("{}; leaving {} unbound", e, capability);
                    continue;
                }
                Err(e) => return Err(e),
            };

            // Safety: the address comes from the symbol named by the
            // capability, so it carries that capability's signature.
            unsafe { table.bind(capability, address)? };
        }

        Ok(table)
    }

    pub(crate) fn into_library(self) -> Library {
        self.library
    }
}

/// Library locator with search paths
pub struct LibraryLoader {
    /// Explicit library path; disables the search when set
    explicit: Option<PathBuf>,
    /// Search paths for libraries
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    /// Create a new library loader
    pub fn new() -> Self {
        Self {
            explicit: None,
            search_paths: Vec::new(),
        }
    }

    /// Use an explicit library path
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add a search path
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    /// Search locations, in the order they are tried when no explicit path is set
    pub fn candidates(&self) -> FfiResult<Vec<PathBuf>> {
        let mut candidates = Vec::new();

        if let Ok(path) = std::env::var(LIBRARY_PATH_ENV) {
            if !path.is_empty() {
                candidates.push(PathBuf::from(path));
            }
        }

        let file_name = library_filename(LIBRARY_NAME);
        for search_path in &self.search_paths {
            candidates.push(search_path.join(&file_name));
        }

        candidates.push(default_library_path()?);
        Ok(candidates)
    }

    /// Find the library on disk. An explicit path is returned as given, without
    /// any fallback, so a bare soname is left for the dynamic linker to resolve.
    pub fn find_library(&self) -> FfiResult<PathBuf> {
        if let Some(path) = &self.explicit {
            return Ok(path.clone());
        }

        let candidates = self.candidates()?;
        candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .ok_or_else(|| {
                FfiError::LoadError(format!(
                    "Library '{}' not found (tried {:?})",
                    LIBRARY_NAME, candidates
                ))
            })
    }

    /// Find and load the library. Failing to open an explicit path is an
    /// error; the search locations are not consulted.
    pub fn load(&self) -> FfiResult<NativeLibrary> {
        let path = self.find_library()?;
        NativeLibrary::load(path)
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Default install location of the CatBoost model library
pub fn default_library_path() -> FfiResult<PathBuf> {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        Ok(PathBuf::from("/usr/local/lib").join(library_filename(LIBRARY_NAME)))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(FfiError::UnsupportedPlatform(format!(
            "no default location for {} on {}",
            library_filename(LIBRARY_NAME),
            std::env::consts::OS
        )))
    }
}

/// Construct the platform-specific library filename
pub fn library_filename(name: &str) -> String {
    #[cfg(target_os = "linux")]
    {
        if name.starts_with("lib") && name.ends_with(".so") {
            name.to_string()
        } else {
            format!("lib{}.so", name)
        }
    }

    #[cfg(target_os = "macos")]
    {
        if name.starts_with("lib") && name.ends_with(".dylib") {
            name.to_string()
        } else {
            format!("lib{}.dylib", name)
        }
    }

    #[cfg(target_os = "windows")]
    {
        if name.ends_with(".dll") {
            name.to_string()
        } else {
            format!("{}.dll", name)
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        name.to_string()
    }
}
