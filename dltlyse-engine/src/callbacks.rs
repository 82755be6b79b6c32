//! Per-message callbacks inside one plugin
//!
//! A [`CallbackTable`] routes each record a plugin receives to the handlers
//! registered for a matching [`MessageFilter`], and derives the plugin's
//! filter set from them. The plugin keeps the table next to its state and
//! forwards `handle` to [`CallbackTable::dispatch`]:
//!
//! ```
//! use dltlyse_engine::callbacks::CallbackTable;
//! use dltlyse_engine::{AnalysisResult, MessageFilter, Plugin, TraceRecord};
//!
//! #[derive(Default)]
//! struct Versions {
//!     found: Vec<String>,
//! }
//!
//! struct VersionPlugin {
//!     callbacks: CallbackTable<Versions>,
//!     state: Versions,
//! }
//!
//! impl VersionPlugin {
//!     fn new() -> Self {
//!         let callbacks = CallbackTable::new().with(
//!             MessageFilter::new("LTM", "MAIN"),
//!             |state: &mut Versions, record: &TraceRecord| {
//!                 state.found.push(record.payload_decoded());
//!                 Ok(())
//!             },
//!         );
//!         Self {
//!             callbacks,
//!             state: Versions::default(),
//!         }
//!     }
//! }
//!
//! impl Plugin for VersionPlugin {
//!     fn name(&self) -> &str {
//!         "VersionPlugin"
//!     }
//!
//!     fn filters(&self) -> Vec<MessageFilter> {
//!         self.callbacks.filters()
//!     }
//!
//!     fn handle(&mut self, record: &TraceRecord) -> anyhow::Result<()> {
//!         self.callbacks.dispatch(&mut self.state, record)
//!     }
//!
//!     fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>> {
//!         Ok(vec![AnalysisResult::success().with_message(self.state.found.join(", "))])
//!     }
//! }
//! ```

use crate::error::Result;
use crate::plugin::MessageFilter;
use crate::types::TraceRecord;
use std::fs;
use std::path::{Path, PathBuf};

/// A record handler working on the plugin state `S`
pub type Callback<S> = Box<dyn FnMut(&mut S, &TraceRecord) -> anyhow::Result<()>>;

/// Handlers keyed by message filter, called in registration order
pub struct CallbackTable<S> {
    callbacks: Vec<(MessageFilter, Callback<S>)>,
}

impl<S> Default for CallbackTable<S> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }
}

impl<S> CallbackTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for records matching `filter`
    pub fn on<F>(&mut self, filter: MessageFilter, callback: F) -> &mut Self
    where
        F: FnMut(&mut S, &TraceRecord) -> anyhow::Result<()> + 'static,
    {
        self.callbacks.push((filter, Box::new(callback)));
        self
    }

    /// Builder method: register a handler for records matching `filter`
    pub fn with<F>(mut self, filter: MessageFilter, callback: F) -> Self
    where
        F: FnMut(&mut S, &TraceRecord) -> anyhow::Result<()> + 'static,
    {
        self.on(filter, callback);
        self
    }

    /// Register a handler built from a shared template
    ///
    /// The template receives the filter it was registered for and `userdata`
    /// (typically the payload text it looks for), so one function can watch
    /// several messages.
    pub fn on_template<U, F>(&mut self, filter: MessageFilter, userdata: U, template: F) -> &mut Self
    where
        U: 'static,
        F: Fn(&mut S, &TraceRecord, &MessageFilter, &U) -> anyhow::Result<()> + 'static,
    {
        let key = filter.clone();
        self.on(filter, move |state, record| template(state, record, &key, &userdata))
    }

    /// Filters to declare for the plugin; empty (every record) if any
    /// handler is registered for all records
    pub fn filters(&self) -> Vec<MessageFilter> {
        if self.callbacks.iter().any(|(filter, _)| filter.is_match_all()) {
            return Vec::new();
        }
        let mut filters: Vec<MessageFilter> = Vec::new();
        for (filter, _) in &self.callbacks {
            if !filters.contains(filter) {
                filters.push(filter.clone());
            }
        }
        filters
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Call every handler whose filter matches the record
    ///
    /// Stops at the first handler returning an error.
    pub fn dispatch(&mut self, state: &mut S, record: &TraceRecord) -> anyhow::Result<()> {
        for (filter, callback) in self.callbacks.iter_mut() {
            if filter.matches(record) {
                callback(state, record)?;
            }
        }
        Ok(())
    }
}

/// Text report file name of a plugin: `SysmemPlugin` becomes `sysmem_plugin.txt`
pub fn report_filename(plugin_name: &str) -> String {
    let mut name = String::with_capacity(plugin_name.len() + 8);
    for c in plugin_name.chars() {
        if c.is_ascii_uppercase() {
            name.push('_');
            name.push(c.to_ascii_lowercase());
        } else {
            name.push(c);
        }
    }
    format!("{}.txt", name.trim_matches('_'))
}

/// Write a text report below the extracted-files root
///
/// Returns the path relative to the root, to be used as an attachment.
pub fn write_domain_file(root: &Path, filename: &str, report: &str) -> Result<PathBuf> {
    let path = root.join(filename);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, report)?;
    log::info!("See {}", path.display());
    Ok(PathBuf::from(filename))
}

/// Write a plugin's collected report, if any, to its standard report file
pub fn write_plugin_report(root: &Path, plugin_name: &str, report: Option<&str>) -> Result<Option<PathBuf>> {
    match report {
        Some(report) => write_domain_file(root, &report_filename(plugin_name), report).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(apid: &str, ctid: &str, payload: &str) -> TraceRecord {
        TraceRecord::new("E1", apid, ctid, payload)
    }

    #[test]
    fn test_callbacks_called_for_matching_records() {
        let mut table: CallbackTable<Vec<String>> = CallbackTable::new();
        table
            .on(MessageFilter::new("SYS", "JOUR"), |matches, record| {
                matches.push(record.payload_decoded());
                Ok(())
            })
            .on(MessageFilter::new("LTM", "MAIN"), |matches, record| {
                matches.push(record.payload_decoded());
                Ok(())
            })
            .on_template(
                MessageFilter::new("MTEE", "MTEE"),
                "START".to_string(),
                |matches, record, _filter, expected| {
                    if record.payload_decoded() == *expected {
                        matches.push(record.payload_decoded());
                    }
                    Ok(())
                },
            );

        let mut matches = Vec::new();
        for record in [
            msg("SYS", "JOUR", "systemd!"),
            msg("LTM", "MAIN", "main!"),
            msg("DA1", "DC1", "New lifecycle!"),
            msg("MTEE", "MTEE", "STOP"),
            msg("MTEE", "MTEE", "START"),
        ] {
            table.dispatch(&mut matches, &record).unwrap();
        }

        assert_eq!(matches, vec!["systemd!", "main!", "START"]);
        assert_eq!(
            table.filters(),
            vec![
                MessageFilter::new("SYS", "JOUR"),
                MessageFilter::new("LTM", "MAIN"),
                MessageFilter::new("MTEE", "MTEE"),
            ]
        );
    }

    #[test]
    fn test_template_receives_its_filter() {
        let mut table: CallbackTable<Vec<String>> = CallbackTable::new();
        for apid in ["APP1", "APP2"] {
            table.on_template(MessageFilter::apid(apid), (), |seen, _record, filter, _| {
                seen.push(filter.to_string());
                Ok(())
            });
        }

        let mut seen = Vec::new();
        table.dispatch(&mut seen, &msg("APP2", "CTX", "")).unwrap();
        assert_eq!(seen, vec!["APP2|*"]);
    }

    #[test]
    fn test_match_all_handler_widens_filters() {
        let table = CallbackTable::<u32>::new()
            .with(MessageFilter::apid("SYS"), |count, _| {
                *count += 1;
                Ok(())
            })
            .with(MessageFilter::all(), |count, _| {
                *count += 10;
                Ok(())
            });
        assert!(table.filters().is_empty());
        assert_eq!(table.len(), 2);

        let mut table = table;
        let mut count = 0;
        table.dispatch(&mut count, &msg("SYS", "JOUR", "")).unwrap();
        table.dispatch(&mut count, &msg("APP", "MAIN", "")).unwrap();
        assert_eq!(count, 21);
    }

    #[test]
    fn test_handler_error_stops_dispatch() {
        let mut table: CallbackTable<u32> = CallbackTable::new();
        table
            .on(MessageFilter::all(), |_, record| anyhow::bail!("bad record {}", record.apid))
            .on(MessageFilter::all(), |count, _| {
                *count += 1;
                Ok(())
            });

        let mut count = 0;
        let err = table.dispatch(&mut count, &msg("SYS", "JOUR", "")).unwrap_err();
        assert_eq!(err.to_string(), "bad record SYS");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_report_filename() {
        assert_eq!(
            report_filename("CallBacksAndReportPluginForTesting"),
            "call_backs_and_report_plugin_for_testing.txt"
        );
        assert_eq!(report_filename("SysmemPlugin"), "sysmem_plugin.txt");
    }

    #[test]
    fn test_plugin_report_written_only_with_output() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(write_plugin_report(root.path(), "BootPlugin", None).unwrap(), None);
        assert!(!root.path().join("boot_plugin.txt").exists());

        let attachment = write_plugin_report(root.path(), "BootPlugin", Some("Something was found!"))
            .unwrap();
        assert_eq!(attachment, Some(PathBuf::from("boot_plugin.txt")));
        assert_eq!(
            fs::read_to_string(root.path().join("boot_plugin.txt")).unwrap(),
            "Something was found!"
        );
    }
}
