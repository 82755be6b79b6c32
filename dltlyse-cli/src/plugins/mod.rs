//! Built-in analysis plugins

pub mod context;
pub mod extract_files;
pub mod sys_errors;
pub mod sysmem;

use dltlyse_engine::{CatalogEntry, Plugin, PluginCatalog, PluginLoadError};

pub use context::ContextPlugin;
pub use extract_files::ExtractFilesPlugin;
pub use sys_errors::SysErrorPlugin;
pub use sysmem::SysmemPlugin;

/// Add the built-in plugins to the catalog
pub fn register_builtin(catalog: &mut PluginCatalog) {
    catalog.register(CatalogEntry::new(
        context::NAME,
        context::DESCRIPTION,
        |_env| Ok(Box::new(ContextPlugin::default()) as Box<dyn Plugin>),
    ));
    catalog.register(CatalogEntry::new(
        sys_errors::NAME,
        sys_errors::DESCRIPTION,
        |_env| {
            SysErrorPlugin::new()
                .map(|plugin| Box::new(plugin) as Box<dyn Plugin>)
                .map_err(|e| PluginLoadError::new(sys_errors::NAME, e.to_string()))
        },
    ));
    catalog.register(CatalogEntry::new(
        extract_files::NAME,
        extract_files::DESCRIPTION,
        |env| Ok(Box::new(ExtractFilesPlugin::new(env.extract_dir())) as Box<dyn Plugin>),
    ));
    catalog.register(CatalogEntry::new(
        sysmem::NAME,
        sysmem::DESCRIPTION,
        |env| Ok(Box::new(SysmemPlugin::new(env.extract_dir())) as Box<dyn Plugin>),
    ));
}
