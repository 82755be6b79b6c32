//! Dynamic plugin libraries
//!
//! Every shared library in a plugin directory is opened and must export the
//! plugin API version it was built against plus a registration function that
//! adds its plugins to the catalog. A library failing any check is skipped
//! and reported as a plugin load failure.

use dltlyse_engine::catalog::{RegisterFn, API_VERSION_SYMBOL, REGISTER_SYMBOL};
use dltlyse_engine::{PluginCatalog, PluginLoadError, PLUGIN_API_VERSION};
use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};

/// Why a plugin library could not be used
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("Failed to open plugin library: {0}")]
    Open(#[source] libloading::Error),

    #[error("Missing symbol `{symbol}`: {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("Plugin API version mismatch: library={library}, host={host}")]
    VersionMismatch { library: u32, host: u32 },

    #[error("Failed to read plugin directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LibraryError {
    fn into_load_error(self, path: &Path) -> PluginLoadError {
        PluginLoadError::new(path.display().to_string(), self.to_string())
    }
}

/// Loaded plugin libraries
///
/// Plugins and catalog entries created by a library run code from it, so
/// this must outlive the catalog, the registry and the analyser run.
#[derive(Default)]
pub struct PluginLibraries {
    loaded: Vec<(PathBuf, Library)>,
}

impl PluginLibraries {
    /// Paths of the libraries loaded so far
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.loaded.iter().map(|(path, _)| path.as_path())
    }

    /// Load every library found in `dirs` into the catalog
    pub fn load_dirs(&mut self, dirs: &[PathBuf], catalog: &mut PluginCatalog) -> Vec<PluginLoadError> {
        let mut failures = Vec::new();
        for dir in dirs {
            let libraries = match find_libraries(dir) {
                Ok(libraries) => libraries,
                Err(e) => {
                    log::error!("{}", e);
                    failures.push(e.into_load_error(dir));
                    continue;
                }
            };
            for path in libraries {
                if let Err(e) = self.load(&path, catalog) {
                    log::error!("Error loading plugin library {:?}: {}", path, e);
                    failures.push(e.into_load_error(&path));
                }
            }
        }
        failures
    }

    /// Open one library, check its API version and let it register its plugins
    pub fn load(&mut self, path: &Path, catalog: &mut PluginCatalog) -> Result<(), LibraryError> {
        // SAFETY: loading a library runs its initializers; plugin directories are trusted.
        let library = unsafe { Library::new(path) }.map_err(LibraryError::Open)?;

        // SAFETY: the symbol is a `u32` static by the plugin library contract.
        let version = unsafe {
            let symbol: Symbol<*const u32> = library
                .get(API_VERSION_SYMBOL.as_bytes())
                .map_err(|source| LibraryError::MissingSymbol {
                    symbol: API_VERSION_SYMBOL,
                    source,
                })?;
            **symbol
        };
        if version != PLUGIN_API_VERSION {
            return Err(LibraryError::VersionMismatch {
                library: version,
                host: PLUGIN_API_VERSION,
            });
        }

        // SAFETY: signature matches `declare_plugin_library!`, checked through the API version.
        let register: RegisterFn = unsafe {
            *library
                .get::<RegisterFn>(REGISTER_SYMBOL.as_bytes())
                .map_err(|source| LibraryError::MissingSymbol {
                    symbol: REGISTER_SYMBOL,
                    source,
                })?
        };

        let before = catalog.len();
        let mut library_catalog = PluginCatalog::new();
        register(&mut library_catalog);
        let origin = path.display().to_string();
        for entry in library_catalog.into_entries() {
            catalog.register(entry.with_origin(origin.clone()));
        }
        log::info!(
            "Loaded plugin library {:?} ({} plugin(s))",
            path,
            catalog.len() - before
        );

        self.loaded.push((path.to_path_buf(), library));
        Ok(())
    }
}

/// Shared libraries in `dir`, sorted by path
fn find_libraries(dir: &Path) -> Result<Vec<PathBuf>, LibraryError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| LibraryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut libraries: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|ext| ext.to_str())
                    == Some(std::env::consts::DLL_EXTENSION)
        })
        .collect();
    libraries.sort();
    log::debug!("Found {} plugin library(ies) in {:?}", libraries.len(), dir);
    Ok(libraries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_libraries_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let ext = std::env::consts::DLL_EXTENSION;
        std::fs::write(dir.path().join(format!("b_plugins.{}", ext)), b"").unwrap();
        std::fs::write(dir.path().join(format!("a_plugins.{}", ext)), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = find_libraries(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![
                dir.path().join(format!("a_plugins.{}", ext)),
                dir.path().join(format!("b_plugins.{}", ext)),
            ]
        );
    }

    #[test]
    fn test_invalid_library_becomes_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("broken.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&path, b"not a shared library").unwrap();

        let mut libraries = PluginLibraries::default();
        let mut catalog = PluginCatalog::new();
        let failures = libraries.load_dirs(&[dir.path().to_path_buf()], &mut catalog);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].plugin, path.display().to_string());
        assert!(catalog.is_empty());
        assert_eq!(libraries.paths().count(), 0);
    }

    #[test]
    fn test_missing_directory_is_reported() {
        let mut catalog = PluginCatalog::new();
        let failures =
            PluginLibraries::default().load_dirs(&[PathBuf::from("no/such/dir")], &mut catalog);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].reason.contains("Failed to read plugin directory"));
    }
}
