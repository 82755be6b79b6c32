//! Plugin catalog
//!
//! The catalog lists every plugin that *could* run: built-in plugins plus the
//! ones registered by dynamic plugin libraries. Selection (include, exclude,
//! manual plugins) happens on the catalog; only the selected entries are
//! instantiated, in catalog order, and handed to the registry.
//!
//! A plugin library exports its entry points with [`declare_plugin_library!`]:
//!
//! ```ignore
//! fn register(catalog: &mut dltlyse_engine::PluginCatalog) {
//!     catalog.register(CatalogEntry::new("MyPlugin", "Checks something", |_env| {
//!         Ok(Box::new(MyPlugin::default()))
//!     }));
//! }
//!
//! dltlyse_engine::declare_plugin_library!(register);
//! ```

use crate::error::{EngineError, PluginLoadError, Result};
use crate::guard::guard;
use crate::plugin::Plugin;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Symbol holding the plugin API version a library was built against
pub const API_VERSION_SYMBOL: &str = "DLTLYSE_PLUGIN_API_VERSION";

/// Symbol of the registration function of a plugin library
pub const REGISTER_SYMBOL: &str = "dltlyse_register_plugins";

/// Signature of the registration function exported by plugin libraries
pub type RegisterFn = fn(&mut PluginCatalog);

/// Environment handed to plugin factories
#[derive(Debug, Clone)]
pub struct PluginEnv {
    /// Root directory for extracted files and other attachments
    pub extract_dir: PathBuf,
}

impl PluginEnv {
    pub fn new(extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            extract_dir: extract_dir.into(),
        }
    }

    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }
}

/// Creates one plugin instance
pub type PluginFactory =
    Box<dyn Fn(&PluginEnv) -> std::result::Result<Box<dyn Plugin>, PluginLoadError>>;

/// One plugin known to the catalog
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    /// Only run when requested by name (or when manual plugins are included)
    pub manual: bool,
    /// Where the plugin comes from ("built-in" or a library path)
    pub origin: String,
    factory: PluginFactory,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("manual", &self.manual)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl CatalogEntry {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PluginEnv) -> std::result::Result<Box<dyn Plugin>, PluginLoadError> + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            manual: false,
            origin: "built-in".to_string(),
            factory: Box::new(factory),
        }
    }

    /// Builder method: mark the plugin as manually executed
    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    /// Builder method: set the origin shown in logs and listings
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Create the plugin; a failing or panicking factory becomes a load error
    pub fn instantiate(&self, env: &PluginEnv) -> std::result::Result<Box<dyn Plugin>, PluginLoadError> {
        log::info!("Loading plugin '{}' from '{}'", self.name, self.origin);
        guard(|| Ok((self.factory)(env)))
            .map_err(|detail| PluginLoadError::new(&self.name, detail))?
    }
}

/// Which catalog entries to run
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Run only these plugins (manual ones included); `None` runs all automatic plugins
    pub include: Option<Vec<String>>,
    pub exclude: Vec<String>,
    /// Also run manual plugins when no explicit include list is given
    pub include_manual: bool,
}

impl Selection {
    /// Select every automatic plugin
    pub fn all() -> Self {
        Self::default()
    }

    /// Select only the named plugins
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Builder method: exclude plugins by name
    pub fn excluding<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Builder method: include manual plugins
    pub fn with_manual(mut self, include_manual: bool) -> Self {
        self.include_manual = include_manual;
        self
    }
}

/// All plugins available to a run, in registration order
#[derive(Default)]
pub struct PluginCatalog {
    entries: Vec<CatalogEntry>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin to the catalog
    pub fn register(&mut self, entry: CatalogEntry) {
        log::debug!("Registered plugin '{}' ({})", entry.name, entry.origin);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a selection to catalog entries, keeping catalog order
    ///
    /// Requested names that are not in the catalog are an error.
    pub fn select(&self, selection: &Selection) -> Result<Vec<&CatalogEntry>> {
        let excluded: BTreeSet<&str> = selection.exclude.iter().map(String::as_str).collect();

        let selected = match &selection.include {
            Some(include) => {
                let requested: BTreeSet<&str> = include.iter().map(String::as_str).collect();
                let known: BTreeSet<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
                let unknown: Vec<String> = requested
                    .difference(&known)
                    .map(|name| name.to_string())
                    .collect();
                if !unknown.is_empty() {
                    log::error!("Some plugins that were requested were not found: {:?}", unknown);
                    return Err(EngineError::UnknownPlugins(unknown));
                }
                self.entries
                    .iter()
                    .filter(|e| requested.contains(e.name.as_str()))
                    .collect::<Vec<_>>()
            }
            None => self
                .entries
                .iter()
                .filter(|e| !e.manual || selection.include_manual)
                .collect(),
        };

        Ok(selected
            .into_iter()
            .filter(|e| !excluded.contains(e.name.as_str()))
            .collect())
    }

    /// Instantiate the selected plugins; failures are returned in place
    pub fn instantiate(
        &self,
        selection: &Selection,
        env: &PluginEnv,
    ) -> Result<Vec<std::result::Result<Box<dyn Plugin>, PluginLoadError>>> {
        Ok(self
            .select(selection)?
            .into_iter()
            .map(|entry| entry.instantiate(env))
            .collect())
    }

    /// Listing for `--show-plugins`
    pub fn show(&self) -> String {
        let mut text = String::from("Available plugins:\n");
        for entry in &self.entries {
            text.push_str(&format!(" - {} ({})", entry.name, entry.description));
            if entry.manual {
                text.push_str(" [manual]");
            }
            text.push('\n');
        }
        text
    }
}

/// Export the entry points of a dynamic plugin library
///
/// `$register` is a `fn(&mut PluginCatalog)` adding the library's plugins.
/// The library must be built with the same toolchain and engine version as
/// the host.
#[macro_export]
macro_rules! declare_plugin_library {
    ($register:path) => {
        #[no_mangle]
        pub static DLTLYSE_PLUGIN_API_VERSION: u32 = $crate::PLUGIN_API_VERSION;

        #[no_mangle]
        pub fn dltlyse_register_plugins(catalog: &mut $crate::PluginCatalog) {
            $register(catalog)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::AnalysisResult;
    use crate::types::TraceRecord;

    struct Nop(&'static str);

    impl Plugin for Nop {
        fn name(&self) -> &str {
            self.0
        }

        fn handle(&mut self, _record: &TraceRecord) -> anyhow::Result<()> {
            Ok(())
        }

        fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>> {
            Ok(Vec::new())
        }
    }

    fn catalog() -> PluginCatalog {
        let mut catalog = PluginCatalog::new();
        catalog.register(CatalogEntry::new("A", "first", |_| Ok(Box::new(Nop("A")))));
        catalog.register(CatalogEntry::new("B", "second", |_| Ok(Box::new(Nop("B")))));
        catalog.register(CatalogEntry::new("Manual", "on demand", |_| Ok(Box::new(Nop("Manual")))).manual());
        catalog.register(CatalogEntry::new("Broken", "cannot start", |_| {
            Err(PluginLoadError::new("Broken", "missing configuration"))
        }));
        catalog
    }

    fn names(entries: Vec<&CatalogEntry>) -> Vec<&str> {
        entries.into_iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_default_selection_skips_manual() {
        let catalog = catalog();
        assert_eq!(names(catalog.select(&Selection::all()).unwrap()), vec!["A", "B", "Broken"]);
        assert_eq!(
            names(catalog.select(&Selection::all().with_manual(true)).unwrap()),
            vec!["A", "B", "Manual", "Broken"]
        );
    }

    #[test]
    fn test_include_and_exclude() {
        let catalog = catalog();
        let selection = Selection::only(["Manual", "A"]);
        assert_eq!(names(catalog.select(&selection).unwrap()), vec!["A", "Manual"]);

        let selection = Selection::all().excluding(["B"]);
        assert_eq!(names(catalog.select(&selection).unwrap()), vec!["A", "Broken"]);
    }

    #[test]
    fn test_unknown_plugin_is_an_error() {
        let err = catalog().select(&Selection::only(["A", "Nope"])).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPlugins(names) if names == vec!["Nope".to_string()]));
    }

    #[test]
    fn test_instantiate_keeps_failures() {
        let catalog = catalog();
        let env = PluginEnv::new("extracted_files");
        let plugins = catalog.instantiate(&Selection::all(), &env).unwrap();
        assert_eq!(plugins.len(), 3);
        assert!(plugins[0].is_ok());
        let err = plugins[2].as_ref().err().unwrap();
        assert_eq!(err.plugin, "Broken");
    }

    #[test]
    fn test_panicking_factory_is_a_load_error() {
        let entry = CatalogEntry::new("Panics", "", |_| panic!("bad factory"));
        let err = entry.instantiate(&PluginEnv::new(".")).err().unwrap();
        assert!(err.reason.contains("bad factory"));
    }

    #[test]
    fn test_show_lists_all_entries() {
        let text = catalog().show();
        assert!(text.starts_with("Available plugins:\n"));
        assert!(text.contains(" - A (first)\n"));
        assert!(text.contains(" - Manual (on demand) [manual]\n"));
    }
}
