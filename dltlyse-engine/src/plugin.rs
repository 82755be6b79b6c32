//! Plugin contract
//!
//! A plugin is one independent analysis. The engine owns every plugin
//! instance exclusively for the whole run and calls it from a single thread,
//! so plugins keep their state in plain fields.
//!
//! Call order per run:
//! 1. `on_lifecycle_start` / `handle` / `on_lifecycle_end`, bracketed per lifecycle
//! 2. `finalize`, exactly once, after the last lifecycle closed
//!
//! Returning an error (or panicking) from any callback marks the plugin as
//! crashed: it receives no further calls and the report carries one error
//! result for it instead of its own results.

use crate::report::AnalysisResult;
use crate::types::TraceRecord;
use std::collections::BTreeMap;
use std::fmt;

/// Maximum length of a DLT application/context id
pub const MAX_ID_LEN: usize = 4;

/// One (apid, ctid) filter entry; `None` is a wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageFilter {
    pub apid: Option<String>,
    pub ctid: Option<String>,
}

impl MessageFilter {
    /// Exact (apid, ctid) pair
    pub fn new(apid: impl Into<String>, ctid: impl Into<String>) -> Self {
        Self {
            apid: Some(apid.into()),
            ctid: Some(ctid.into()),
        }
    }

    /// Every context of one application
    pub fn apid(apid: impl Into<String>) -> Self {
        Self {
            apid: Some(apid.into()),
            ctid: None,
        }
    }

    /// One context id, whatever the application
    pub fn ctid(ctid: impl Into<String>) -> Self {
        Self {
            apid: None,
            ctid: Some(ctid.into()),
        }
    }

    /// Matches every record
    pub fn all() -> Self {
        Self {
            apid: None,
            ctid: None,
        }
    }

    pub fn is_match_all(&self) -> bool {
        self.apid.is_none() && self.ctid.is_none()
    }

    /// Check whether a record passes this filter
    pub fn matches(&self, record: &TraceRecord) -> bool {
        self.apid.as_deref().map_or(true, |a| a == record.apid)
            && self.ctid.as_deref().map_or(true, |c| c == record.ctid)
    }

    /// Check that both ids are valid DLT ids (1-4 ASCII characters)
    pub fn validate(&self) -> std::result::Result<(), String> {
        for id in [&self.apid, &self.ctid].into_iter().flatten() {
            if id.is_empty() || id.len() > MAX_ID_LEN || !id.is_ascii() {
                return Err(format!("invalid DLT id {:?} in filter {}", id, self));
            }
        }
        Ok(())
    }
}

impl fmt::Display for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}",
            self.apid.as_deref().unwrap_or("*"),
            self.ctid.as_deref().unwrap_or("*")
        )
    }
}

/// Analysis plugin capability set
pub trait Plugin {
    /// Unique plugin name (used as the result class name)
    fn name(&self) -> &str;

    /// One-line description, used as the default result test name
    fn description(&self) -> &str {
        ""
    }

    /// Free-form metadata copied into every result of this plugin
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Records this plugin wants to see; empty means every record
    fn filters(&self) -> Vec<MessageFilter> {
        Vec::new()
    }

    /// Called once per matching record
    fn handle(&mut self, record: &TraceRecord) -> anyhow::Result<()>;

    /// Called at the start of each lifecycle (including the first)
    fn on_lifecycle_start(&mut self, _ecu_id: &str, _lifecycle_id: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called at the end of each lifecycle (including the last)
    fn on_lifecycle_end(&mut self, _ecu_id: &str, _lifecycle_id: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Report the run after all records have been read
    fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matching() {
        let record = TraceRecord::new("E1", "SYS", "JOUR", "");
        assert!(MessageFilter::new("SYS", "JOUR").matches(&record));
        assert!(!MessageFilter::new("SYS", "FILE").matches(&record));
        assert!(MessageFilter::apid("SYS").matches(&record));
        assert!(MessageFilter::ctid("JOUR").matches(&record));
        assert!(!MessageFilter::ctid("MEMS").matches(&record));
        assert!(MessageFilter::all().matches(&record));
    }

    #[test]
    fn test_filter_validation() {
        assert!(MessageFilter::new("SYS", "JOUR").validate().is_ok());
        assert!(MessageFilter::apid("TOOLONG").validate().is_err());
        assert!(MessageFilter::ctid("").validate().is_err());
        assert!(MessageFilter::all().validate().is_ok());
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(MessageFilter::apid("SYS").to_string(), "SYS|*");
        assert_eq!(MessageFilter::new("MON", "MEMS").to_string(), "MON|MEMS");
    }
}
