//! Lifecycle tracking
//!
//! A lifecycle is the span of records between one device start and the next
//! (or the end of the stream). Boundaries are recognised by an injected
//! [`BoundaryDetector`], so the tracker knows nothing about DLT daemon
//! messages itself.
//!
//! Exactly one lifecycle is open at a time. Its `ecu_id` is the ECU of the
//! record that opened it; records of other ECUs seen while it is open belong
//! to it as well. Lifecycle ids are counted per ECU and never reused.

use crate::error::LifecycleInconsistencyError;
use crate::types::TraceRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Predicate deciding whether a record starts a new lifecycle
pub trait BoundaryDetector {
    fn is_boundary(&self, record: &TraceRecord) -> bool;
}

impl<F> BoundaryDetector for F
where
    F: Fn(&TraceRecord) -> bool,
{
    fn is_boundary(&self, record: &TraceRecord) -> bool {
        self(record)
    }
}

/// Boundary detector matching the DLT daemon start message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonStartMarker {
    pub apid: String,
    pub ctid: String,
    /// Decoded payload the marker record must carry exactly
    pub payload: String,
}

impl Default for DaemonStartMarker {
    fn default() -> Self {
        Self {
            apid: "DLTD".to_string(),
            ctid: "INTM".to_string(),
            payload: "Daemon launched. Starting to output traces...".to_string(),
        }
    }
}

impl BoundaryDetector for DaemonStartMarker {
    fn is_boundary(&self, record: &TraceRecord) -> bool {
        record.is(&self.apid, &self.ctid) && record.payload_decoded() == self.payload
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Closed,
}

/// A single device lifecycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lifecycle {
    /// ECU whose record opened the lifecycle
    pub ecu_id: String,
    /// Per-ECU lifecycle number
    pub lifecycle_id: u32,
    pub state: LifecycleState,
    /// True if opened without a boundary record (stream start)
    pub implicit: bool,
    /// Sequence number of the first record
    pub first_seq: u64,
    /// Sequence number of the last record seen so far
    pub last_seq: u64,
    /// Number of records assigned to this lifecycle
    pub records: u64,
}

/// What observing a record did to the lifecycle state
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The record belongs to the lifecycle that was already open
    Continue,
    /// A new lifecycle was opened for this record
    Started {
        /// The lifecycle that was closed first, if one was open
        closed: Option<Lifecycle>,
        /// The newly opened lifecycle
        opened: Lifecycle,
    },
}

/// Per-stream lifecycle state machine
pub struct LifecycleTracker {
    detector: Box<dyn BoundaryDetector>,
    current: Option<Lifecycle>,
    last_ids: HashMap<String, u32>,
    closed: Vec<Lifecycle>,
    warnings: Vec<LifecycleInconsistencyError>,
}

impl LifecycleTracker {
    /// Create a tracker using the given boundary detector
    pub fn new(detector: impl BoundaryDetector + 'static) -> Self {
        Self::from_boxed(Box::new(detector))
    }

    pub fn from_boxed(detector: Box<dyn BoundaryDetector>) -> Self {
        Self {
            detector,
            current: None,
            last_ids: HashMap::new(),
            closed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Assign a record to a lifecycle, opening/closing lifecycles as needed
    ///
    /// The returned transition tells the caller which lifecycle callbacks to
    /// issue before dispatching the record.
    pub fn observe(&mut self, record: &TraceRecord) -> Transition {
        let transition = if self.detector.is_boundary(record) {
            let closed = self.close_current();
            let lifecycle_id = self.next_id(&record.ecu_id, 1);
            let opened = self.open(record, lifecycle_id, false);
            log::info!(
                "Starting lifecycle {} of ECU {}",
                opened.lifecycle_id,
                opened.ecu_id
            );
            Transition::Started { closed, opened }
        } else if self.current.is_none() {
            let lifecycle_id = self.next_id(&record.ecu_id, 0);
            let warning = LifecycleInconsistencyError::NoOpenLifecycle {
                seq: record.seq,
                ecu_id: record.ecu_id.clone(),
                lifecycle_id,
            };
            log::warn!("{}", warning);
            self.warnings.push(warning);
            let opened = self.open(record, lifecycle_id, true);
            Transition::Started {
                closed: None,
                opened,
            }
        } else {
            Transition::Continue
        };

        if let Some(current) = self.current.as_mut() {
            current.last_seq = record.seq;
            current.records += 1;
        }

        transition
    }

    /// Close the open lifecycle at end of stream
    pub fn finish(&mut self) -> Option<Lifecycle> {
        self.close_current()
    }

    /// The lifecycle currently open, if any
    pub fn current(&self) -> Option<&Lifecycle> {
        self.current.as_ref()
    }

    /// All lifecycles closed so far, in closing order
    pub fn closed(&self) -> &[Lifecycle] {
        &self.closed
    }

    /// Recovered inconsistencies (records seen with no open lifecycle)
    pub fn warnings(&self) -> &[LifecycleInconsistencyError] {
        &self.warnings
    }

    fn next_id(&mut self, ecu_id: &str, first: u32) -> u32 {
        let id = match self.last_ids.get(ecu_id) {
            Some(last) => last + 1,
            None => first,
        };
        self.last_ids.insert(ecu_id.to_string(), id);
        id
    }

    fn open(&mut self, record: &TraceRecord, lifecycle_id: u32, implicit: bool) -> Lifecycle {
        let lifecycle = Lifecycle {
            ecu_id: record.ecu_id.clone(),
            lifecycle_id,
            state: LifecycleState::Active,
            implicit,
            first_seq: record.seq,
            last_seq: record.seq,
            records: 0,
        };
        self.current = Some(lifecycle.clone());
        lifecycle
    }

    fn close_current(&mut self) -> Option<Lifecycle> {
        let mut lifecycle = self.current.take()?;
        lifecycle.state = LifecycleState::Closed;
        log::debug!(
            "Closing lifecycle {} of ECU {} ({} records)",
            lifecycle.lifecycle_id,
            lifecycle.ecu_id,
            lifecycle.records
        );
        self.closed.push(lifecycle.clone());
        Some(lifecycle)
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new(DaemonStartMarker::default())
    }
}
