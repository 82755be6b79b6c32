//! Main analyser API
//!
//! The [`Analyser`] wires the pieces together: it owns the plugin registry,
//! builds a lifecycle tracker around the configured boundary detector, runs
//! the dispatcher over a [`TraceSource`] and aggregates the results.

use crate::aggregator::aggregate;
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::lifecycle::{BoundaryDetector, DaemonStartMarker, LifecycleTracker};
use crate::registry::PluginRegistry;
use crate::report::Report;
use crate::source::TraceSource;
use chrono::Utc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// The analyser - entry point for running plugins over traces
pub struct Analyser {
    config: EngineConfig,
    registry: PluginRegistry,
    detector: Box<dyn BoundaryDetector>,
    stop: Option<Arc<AtomicBool>>,
}

impl Analyser {
    /// Create an analyser for an already built plugin registry
    ///
    /// Uses the DLT daemon start message as lifecycle boundary and the
    /// default engine configuration.
    ///
    /// # Example
    /// ```no_run
    /// use dltlyse_engine::{Analyser, PluginRegistry, TraceSource};
    ///
    /// let registry = PluginRegistry::build(Vec::new());
    /// let report = Analyser::new(registry).run(TraceSource::from_paths(["trace.jsonl"]));
    /// println!("overall: {}", report.overall_status());
    /// ```
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            config: EngineConfig::default(),
            registry,
            detector: Box::new(DaemonStartMarker::default()),
            stop: None,
        }
    }

    /// Builder method: set the engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder method: use a different lifecycle boundary detector
    pub fn with_boundary_detector(mut self, detector: impl BoundaryDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    /// Builder method: stop reading (but still finalize) once `flag` is set
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Registered plugins
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Run all plugins over the source and build the report
    ///
    /// Always returns a report: decode errors, plugin faults and interrupts
    /// are recorded in it rather than returned. Use
    /// [`ReportMetadata::readable_inputs`](crate::ReportMetadata::readable_inputs)
    /// to detect a run that had nothing to read.
    pub fn run(self, mut source: TraceSource) -> Report {
        let started_at = Utc::now();
        log::info!(
            "Running {} plugin(s), decode error policy {:?}",
            self.registry.len(),
            self.config.decode_error_policy
        );

        let mut dispatcher = Dispatcher::new(self.registry, LifecycleTracker::from_boxed(self.detector))
            .with_decode_error_policy(self.config.decode_error_policy);
        if let Some(flag) = self.stop {
            dispatcher = dispatcher.with_stop_flag(flag);
        }

        let outcome = dispatcher.run(&mut source);
        aggregate(outcome, source.into_summaries(), &self.config, started_at)
    }
}
