//! DLT Trace Analysis Engine
//!
//! Routes decoded DLT trace records to a set of analysis plugins, tracks
//! device lifecycles and aggregates every plugin's findings into a report.
//!
//! # Architecture
//!
//! - [`TraceSource`] concatenates inputs into one ordered record stream
//! - [`LifecycleTracker`] assigns every record to exactly one lifecycle
//! - [`PluginRegistry`] indexes plugins by their (apid, ctid) filters
//! - [`Dispatcher`] calls lifecycle callbacks and record handlers, each under
//!   its own fault boundary
//! - the aggregator finalizes every plugin once and builds the [`Report`]
//! - a [`ReportWriter`] serializes the report
//! - the [`PluginCatalog`] lists built-in and library plugins and selects
//!   the ones to run
//!
//! Plugin authors get a few helpers on top of the [`Plugin`] trait:
//! [`CsvOutput`] / [`LifecycleCsvOutput`] for managed CSV files and
//! [`CallbackTable`] for per-message handlers inside one plugin.
//!
//! The engine does NOT:
//! - Decode the binary DLT wire format (records arrive already decoded)
//! - Reorder records
//! - Run plugins in parallel
//!
//! # Example Usage
//!
//! ```no_run
//! use dltlyse_engine::{
//!     AnalysisResult, Analyser, MessageFilter, Plugin, PluginRegistry, TraceRecord, TraceSource,
//! };
//!
//! #[derive(Default)]
//! struct CountJournal {
//!     seen: usize,
//! }
//!
//! impl Plugin for CountJournal {
//!     fn name(&self) -> &str {
//!         "CountJournal"
//!     }
//!
//!     fn filters(&self) -> Vec<MessageFilter> {
//!         vec![MessageFilter::new("SYS", "JOUR")]
//!     }
//!
//!     fn handle(&mut self, _record: &TraceRecord) -> anyhow::Result<()> {
//!         self.seen += 1;
//!         Ok(())
//!     }
//!
//!     fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>> {
//!         Ok(vec![AnalysisResult::success().with_message(format!("{} journal lines", self.seen))])
//!     }
//! }
//!
//! let registry = PluginRegistry::build(vec![Box::new(CountJournal::default()) as Box<dyn Plugin>]);
//! let report = Analyser::new(registry).run(TraceSource::from_paths(["trace.jsonl"]));
//! std::process::exit(report.exit_code());
//! ```

// Public modules
pub mod aggregator;
pub mod analyser;
pub mod callbacks;
pub mod catalog;
pub mod config;
pub mod csv_output;
pub mod dispatcher;
pub mod error;
pub mod formats;
pub mod lifecycle;
pub mod plugin;
pub mod registry;
pub mod report;
pub mod source;
pub mod types;
pub mod writer;

// Internal modules
mod guard;

// Re-export main types for convenience
pub use analyser::Analyser;
pub use callbacks::{report_filename, write_domain_file, write_plugin_report, CallbackTable};
pub use catalog::{CatalogEntry, PluginCatalog, PluginEnv, PluginFactory, Selection};
pub use config::{DecodeErrorPolicy, EngineConfig};
pub use csv_output::{CsvOutput, LifecycleCsvOutput};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{
    DecodeError, EngineError, LifecycleInconsistencyError, PluginAction, PluginLoadError,
    PluginRuntimeError, Result,
};
pub use formats::{JsonLinesFormat, TraceFormat};
pub use lifecycle::{
    BoundaryDetector, DaemonStartMarker, Lifecycle, LifecycleState, LifecycleTracker, Transition,
};
pub use plugin::{MessageFilter, Plugin};
pub use registry::{PluginRegistry, PluginSlot};
pub use report::{AnalysisResult, Report, ReportMetadata, ResultState};
pub use source::{InputSummary, TraceInput, TraceSource};
pub use types::{PayloadArg, Timestamp, TraceRecord};
pub use writer::{resolve_attachments, JsonReportWriter, ReportWriter, EXTRACT_DIR};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version of the plugin interface; dynamic plugin libraries must match it
pub const PLUGIN_API_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: an empty registry runs over an empty source
        let report = Analyser::new(PluginRegistry::build(Vec::new())).run(TraceSource::new(Vec::new()));
        assert!(report.results.is_empty());
        assert!(report.is_success());
    }
}
