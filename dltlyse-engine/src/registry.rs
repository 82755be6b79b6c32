//! Plugin registry
//!
//! Built once before processing starts. Plugins are indexed by their message
//! filters so that dispatching a record is a handful of hash lookups instead
//! of asking every plugin. The index is never modified after construction.
//!
//! Registration order is the dispatch order: for every record the matching
//! plugins are called in the order they were registered, whichever index
//! they were found through.

use crate::error::{PluginAction, PluginLoadError, PluginRuntimeError};
use crate::guard::guard;
use crate::plugin::{MessageFilter, Plugin};
use crate::types::TraceRecord;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A registered plugin plus the bookkeeping the dispatcher keeps for it
pub struct PluginSlot {
    pub(crate) plugin: Box<dyn Plugin>,
    pub(crate) name: String,
    pub(crate) fault: Option<PluginRuntimeError>,
    pub(crate) timings: [Duration; 4],
}

impl PluginSlot {
    /// Plugin name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fault that crashed this plugin, if any
    pub fn fault(&self) -> Option<&PluginRuntimeError> {
        self.fault.as_ref()
    }

    pub fn is_crashed(&self) -> bool {
        self.fault.is_some()
    }

    /// Accumulated time spent in one kind of callback
    pub fn timing(&self, action: PluginAction) -> Duration {
        self.timings[action.index()]
    }
}

/// Registered plugins indexed by message filter
#[derive(Default)]
pub struct PluginRegistry {
    slots: Vec<PluginSlot>,
    by_message: HashMap<String, HashMap<String, Vec<usize>>>,
    by_apid: HashMap<String, Vec<usize>>,
    by_ctid: HashMap<String, Vec<usize>>,
    match_all: Vec<usize>,
    load_failures: Vec<PluginLoadError>,
}

impl PluginRegistry {
    /// Build a registry from loaded plugin instances
    pub fn build<I>(plugins: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Plugin>>,
    {
        Self::build_from_candidates(plugins.into_iter().map(Ok))
    }

    /// Build a registry from load attempts; failed loads are kept for the report
    pub fn build_from_candidates<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = Result<Box<dyn Plugin>, PluginLoadError>>,
    {
        let mut registry = Self::default();
        for candidate in candidates {
            match candidate.and_then(|plugin| registry.register(plugin)) {
                Ok(()) => {}
                Err(e) => {
                    log::error!("{}", e);
                    registry.load_failures.push(e);
                }
            }
        }
        registry.log_index();
        registry
    }

    fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginLoadError> {
        let name = plugin.name().to_string();
        if self.slots.iter().any(|slot| slot.name == name) {
            return Err(PluginLoadError::new(name, "a plugin with this name is already registered"));
        }

        let filters = guard(|| Ok(plugin.filters()))
            .map_err(|detail| PluginLoadError::new(&name, format!("filters() failed: {}", detail)))?;
        for filter in &filters {
            filter
                .validate()
                .map_err(|reason| PluginLoadError::new(&name, reason))?;
        }

        let index = self.slots.len();
        let unique: HashSet<&MessageFilter> = filters.iter().collect();
        if unique.is_empty() || unique.iter().any(|f| f.is_match_all()) {
            log::debug!("Plugin {} requires all messages", name);
            self.match_all.push(index);
        } else {
            let mut sorted: Vec<&MessageFilter> = unique.into_iter().collect();
            sorted.sort();
            for filter in sorted {
                let list = match (&filter.apid, &filter.ctid) {
                    (Some(apid), Some(ctid)) => self
                        .by_message
                        .entry(apid.clone())
                        .or_default()
                        .entry(ctid.clone())
                        .or_default(),
                    (Some(apid), None) => self.by_apid.entry(apid.clone()).or_default(),
                    (None, Some(ctid)) => self.by_ctid.entry(ctid.clone()).or_default(),
                    (None, None) => unreachable!("match-all filters handled above"),
                };
                list.push(index);
            }
        }

        log::info!("Loaded plugin {}", name);
        self.slots.push(PluginSlot {
            plugin,
            name,
            fault: None,
            timings: [Duration::ZERO; 4],
        });
        Ok(())
    }

    /// Indices of the plugins matching a record, in registration order
    ///
    /// `out` is cleared first; callers reuse it across records.
    pub fn matching(&self, record: &TraceRecord, out: &mut Vec<usize>) {
        out.clear();
        if let Some(list) = self
            .by_message
            .get(record.apid.as_str())
            .and_then(|by_ctid| by_ctid.get(record.ctid.as_str()))
        {
            out.extend_from_slice(list);
        }
        if let Some(list) = self.by_apid.get(record.apid.as_str()) {
            out.extend_from_slice(list);
        }
        if let Some(list) = self.by_ctid.get(record.ctid.as_str()) {
            out.extend_from_slice(list);
        }
        out.extend_from_slice(&self.match_all);
        out.sort_unstable();
        out.dedup();
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Registered plugin names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.name.as_str()).collect()
    }

    /// Plugins that could not be registered
    pub fn load_failures(&self) -> &[PluginLoadError] {
        &self.load_failures
    }

    pub fn slots(&self) -> &[PluginSlot] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [PluginSlot] {
        &mut self.slots
    }

    pub(crate) fn into_parts(self) -> (Vec<PluginSlot>, Vec<PluginLoadError>) {
        (self.slots, self.load_failures)
    }

    fn log_index(&self) {
        let names = |list: &[usize]| -> Vec<&str> {
            list.iter().map(|&i| self.slots[i].name.as_str()).collect()
        };
        for (apid, by_ctid) in &self.by_message {
            for (ctid, list) in by_ctid {
                log::debug!("Message filter {}|{}: {:?}", apid, ctid, names(list));
            }
        }
        for (apid, list) in &self.by_apid {
            log::debug!("APID filter {}: {:?}", apid, names(list));
        }
        for (ctid, list) in &self.by_ctid {
            log::debug!("CTID filter {}: {:?}", ctid, names(list));
        }
        log::debug!("Greedy plugins: {:?}", names(&self.match_all));
    }
}
