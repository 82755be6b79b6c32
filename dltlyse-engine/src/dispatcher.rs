//! Dispatch loop
//!
//! For every record, in stream order:
//! 1. ask the lifecycle tracker for a transition and issue `end_lifecycle`
//!    (if a lifecycle was open) and `new_lifecycle` to every plugin
//! 2. call `handle` on every plugin whose filters match the record
//!
//! Each single plugin call runs inside a fault boundary. A plugin that
//! faults is marked crashed and skipped from then on; all other plugins keep
//! receiving records and lifecycle callbacks.
//!
//! Reading stops early when the decode failure policy says so or when the
//! stop flag is raised. In both cases the open lifecycle is still closed so
//! that finalize sees a consistent state.

use crate::config::DecodeErrorPolicy;
use crate::error::{DecodeError, LifecycleInconsistencyError, PluginAction, PluginRuntimeError};
use crate::guard::guard;
use crate::lifecycle::{Lifecycle, LifecycleTracker, Transition};
use crate::plugin::Plugin;
use crate::registry::{PluginRegistry, PluginSlot};
use crate::types::TraceRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// State handed to the aggregator once the stream has been consumed
pub struct DispatchOutcome {
    pub registry: PluginRegistry,
    pub lifecycles: Vec<Lifecycle>,
    pub records_processed: u64,
    pub decode_errors: usize,
    pub aborted: bool,
    pub interrupted: bool,
    /// Recovered lifecycle inconsistencies, in stream order
    pub lifecycle_warnings: Vec<LifecycleInconsistencyError>,
}

/// Routes records and lifecycle events to plugins
pub struct Dispatcher {
    registry: PluginRegistry,
    tracker: LifecycleTracker,
    policy: DecodeErrorPolicy,
    stop: Option<Arc<AtomicBool>>,
    matched: Vec<usize>,
    records_processed: u64,
    decode_errors: usize,
    aborted: bool,
    interrupted: bool,
}

impl Dispatcher {
    /// Create a dispatcher owning the registry and the lifecycle tracker
    pub fn new(registry: PluginRegistry, tracker: LifecycleTracker) -> Self {
        Self {
            registry,
            tracker,
            policy: DecodeErrorPolicy::default(),
            stop: None,
            matched: Vec::new(),
            records_processed: 0,
            decode_errors: 0,
            aborted: false,
            interrupted: false,
        }
    }

    /// Builder method: set the decode failure policy
    pub fn with_decode_error_policy(mut self, policy: DecodeErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder method: stop reading once `flag` becomes true
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Consume a record stream, then close the open lifecycle
    pub fn run<I>(mut self, records: I) -> DispatchOutcome
    where
        I: IntoIterator<Item = Result<TraceRecord, DecodeError>>,
    {
        for item in records {
            if self.stop_requested() {
                log::warn!("Interrupted, stopping after {} records", self.records_processed);
                self.interrupted = true;
                break;
            }

            match item {
                Ok(record) => self.dispatch(&record),
                Err(e) => {
                    self.decode_errors += 1;
                    if self.policy == DecodeErrorPolicy::Abort {
                        log::error!("Aborting analysis after decode error: {}", e);
                        self.aborted = true;
                        break;
                    }
                    log::warn!("Skipping rest of input after decode error: {}", e);
                }
            }
        }

        self.finish()
    }

    /// Dispatch one record: lifecycle transition first, then matching handlers
    pub fn dispatch(&mut self, record: &TraceRecord) {
        if let Transition::Started { closed, opened } = self.tracker.observe(record) {
            if let Some(closed) = closed {
                self.end_lifecycle(&closed);
            }
            self.start_lifecycle(&opened);
        }

        self.registry.matching(record, &mut self.matched);
        let slots = self.registry.slots_mut();
        for &index in &self.matched {
            invoke(&mut slots[index], PluginAction::Handle, Some(record.seq), |plugin| {
                plugin.handle(record)
            });
        }
        self.records_processed += 1;
    }

    /// Close the open lifecycle (if any) and hand over to the aggregator
    pub fn finish(mut self) -> DispatchOutcome {
        if let Some(last) = self.tracker.finish() {
            self.end_lifecycle(&last);
        }
        log::info!(
            "Processed {} records in {} lifecycle(s)",
            self.records_processed,
            self.tracker.closed().len()
        );

        DispatchOutcome {
            lifecycles: self.tracker.closed().to_vec(),
            registry: self.registry,
            records_processed: self.records_processed,
            decode_errors: self.decode_errors,
            aborted: self.aborted,
            interrupted: self.interrupted,
            lifecycle_warnings: self.tracker.warnings().to_vec(),
        }
    }

    /// Registered plugins and their fault state
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn start_lifecycle(&mut self, lifecycle: &Lifecycle) {
        for slot in self.registry.slots_mut() {
            invoke(slot, PluginAction::LifecycleStart, None, |plugin| {
                plugin.on_lifecycle_start(&lifecycle.ecu_id, lifecycle.lifecycle_id)
            });
        }
    }

    fn end_lifecycle(&mut self, lifecycle: &Lifecycle) {
        for slot in self.registry.slots_mut() {
            invoke(slot, PluginAction::LifecycleEnd, None, |plugin| {
                plugin.on_lifecycle_end(&lifecycle.ecu_id, lifecycle.lifecycle_id)
            });
        }
    }
}

/// Call one plugin under the fault boundary; crashed plugins are skipped
pub(crate) fn invoke<T>(
    slot: &mut PluginSlot,
    action: PluginAction,
    record_seq: Option<u64>,
    f: impl FnOnce(&mut dyn Plugin) -> anyhow::Result<T>,
) -> Option<T> {
    if slot.fault.is_some() {
        return None;
    }

    let start = Instant::now();
    let result = guard(|| f(slot.plugin.as_mut()));
    slot.timings[action.index()] += start.elapsed();

    match result {
        Ok(value) => Some(value),
        Err(detail) => {
            let fault = PluginRuntimeError {
                plugin: slot.name.clone(),
                action,
                detail,
                record_seq,
            };
            log::error!("{}", fault);
            slot.fault = Some(fault);
            None
        }
    }
}
