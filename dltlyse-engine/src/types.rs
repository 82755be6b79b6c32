//! Core types for the trace analysis engine
//!
//! This module defines the decoded message record the engine consumes. Records
//! are produced by an external DLT decoder (or a trace format adapter) and are
//! never modified once produced - the engine only routes them to plugins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used for absolute (storage header) times
pub type Timestamp = DateTime<Utc>;

/// A single decoded DLT message record
///
/// This represents one line of a DLT trace after the wire format has been
/// decoded: the identifiers plugins filter on plus the typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// ECU that produced the message (e.g. "MGHS")
    #[serde(alias = "ecuid")]
    pub ecu_id: String,
    /// Application id (up to 4 characters)
    pub apid: String,
    /// Context id (up to 4 characters)
    pub ctid: String,
    /// Device-relative timestamp in seconds (DLT `tmsp`)
    #[serde(default, alias = "tmsp")]
    pub timestamp: f64,
    /// Absolute time from the storage header, if the decoder provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_time: Option<Timestamp>,
    /// DLT message counter (wraps at 256)
    #[serde(default, alias = "mcnt")]
    pub counter: u8,
    /// Session id of the sending application (if present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u32>,
    /// Position in the concatenated input stream (assigned by the trace source)
    #[serde(default)]
    pub seq: u64,
    /// Typed payload arguments
    #[serde(default)]
    pub payload: Vec<PayloadArg>,
}

/// One typed argument of a verbose DLT payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadArg {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
    Raw(Vec<u8>),
}

impl PayloadArg {
    /// Get the argument as text, if it is a string argument
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadArg::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the argument as an integer, if it is numeric
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PayloadArg::Signed(v) => Some(*v),
            PayloadArg::Unsigned(v) => i64::try_from(*v).ok(),
            PayloadArg::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the argument as raw bytes (strings are returned as their UTF-8 bytes)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PayloadArg::Raw(bytes) => Some(bytes),
            PayloadArg::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadArg::Bool(v) => write!(f, "{}", v),
            PayloadArg::Signed(v) => write!(f, "{}", v),
            PayloadArg::Unsigned(v) => write!(f, "{}", v),
            PayloadArg::Float(v) => write!(f, "{}", v),
            PayloadArg::Text(s) => write!(f, "{}", s),
            PayloadArg::Raw(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl TraceRecord {
    /// Create a record with the given identifiers and a single text argument
    pub fn new(
        ecu_id: impl Into<String>,
        apid: impl Into<String>,
        ctid: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            ecu_id: ecu_id.into(),
            apid: apid.into(),
            ctid: ctid.into(),
            timestamp: 0.0,
            storage_time: None,
            counter: 0,
            session_id: None,
            seq: 0,
            payload: vec![PayloadArg::Text(text.into())],
        }
    }

    /// Builder method: replace the payload arguments
    pub fn with_payload(mut self, payload: Vec<PayloadArg>) -> Self {
        self.payload = payload;
        self
    }

    /// Builder method: set the device-relative timestamp
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder method: set the DLT message counter
    pub fn with_counter(mut self, counter: u8) -> Self {
        self.counter = counter;
        self
    }

    /// Payload rendered as text, arguments joined by a single space
    ///
    /// This is the representation plugins and boundary detectors match on.
    pub fn payload_decoded(&self) -> String {
        let mut out = String::new();
        for (i, arg) in self.payload.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&arg.to_string());
        }
        out
    }

    /// Check whether this record carries the given (apid, ctid) pair
    pub fn is(&self, apid: &str, ctid: &str) -> bool {
        self.apid == apid && self.ctid == ctid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_decoded_joins_arguments() {
        let record = TraceRecord::new("ECU1", "SYS", "JOUR", "ignored").with_payload(vec![
            PayloadArg::Text("MemTotal:".to_string()),
            PayloadArg::Unsigned(2048),
            PayloadArg::Bool(true),
        ]);
        assert_eq!(record.payload_decoded(), "MemTotal: 2048 true");
    }

    #[test]
    fn test_record_deserialization_with_aliases() {
        let json = r#"{"ecuid":"MGHS","apid":"DLTD","ctid":"INTM","tmsp":1.5,"mcnt":7,
                       "payload":["FLDA", 3, [1, 2, 255], -4, 0.5]}"#;
        let record: TraceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.ecu_id, "MGHS");
        assert_eq!(record.timestamp, 1.5);
        assert_eq!(record.counter, 7);
        assert_eq!(record.payload[0], PayloadArg::Text("FLDA".to_string()));
        assert_eq!(record.payload[1].as_i64(), Some(3));
        assert_eq!(record.payload[2], PayloadArg::Raw(vec![1, 2, 255]));
        assert_eq!(record.payload[3], PayloadArg::Signed(-4));
        assert_eq!(record.payload[4], PayloadArg::Float(0.5));
    }

    #[test]
    fn test_raw_argument_display() {
        assert_eq!(PayloadArg::Raw(vec![0xde, 0xad]).to_string(), "dead");
        assert_eq!(PayloadArg::Signed(-1).to_string(), "-1");
    }
}
