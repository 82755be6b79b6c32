//! Trace source - concatenates inputs into one record stream
//!
//! The source opens inputs lazily in argument order and yields their records
//! one by one, stamping each with its position in the concatenated stream.
//! A decode error ends the failing input only; the next pull moves on to the
//! following input. Whether the caller keeps pulling after an error is the
//! caller's policy.

use crate::error::DecodeError;
use crate::formats::{JsonLinesFormat, RecordIter, TraceFormat};
use crate::types::TraceRecord;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;

/// One input of a trace source
pub enum TraceInput {
    /// A file opened through the source's [`TraceFormat`]
    File(PathBuf),
    /// Records already in memory (tests, embedding)
    Memory {
        name: String,
        records: Vec<Result<TraceRecord, DecodeError>>,
    },
}

impl TraceInput {
    /// Display name of the input (path or given name)
    pub fn name(&self) -> String {
        match self {
            TraceInput::File(path) => path.display().to_string(),
            TraceInput::Memory { name, .. } => name.clone(),
        }
    }
}

/// What happened to one input while reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSummary {
    /// Input name (file path for files)
    pub name: String,
    /// Number of records read from this input
    pub records: u64,
    /// Whether the input was opened successfully
    pub opened: bool,
    /// Decode error that ended this input, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InputSummary {
    fn pending(name: String) -> Self {
        Self {
            name,
            records: 0,
            opened: false,
            error: None,
        }
    }

    /// True if the input was opened and decoded without error
    pub fn is_ok(&self) -> bool {
        self.opened && self.error.is_none()
    }

    /// True if the input contributed to the run
    ///
    /// An input that opened but failed before its first record is not
    /// readable; an empty input without error is.
    pub fn is_readable(&self) -> bool {
        self.is_ok() || (self.opened && self.records > 0)
    }
}

/// Lazy, single-pass record stream over one or more inputs
pub struct TraceSource {
    format: Box<dyn TraceFormat>,
    pending: VecDeque<TraceInput>,
    current: Option<RecordIter>,
    current_index: Option<usize>,
    summaries: Vec<InputSummary>,
    next_seq: u64,
}

impl TraceSource {
    /// Create a source over trace files, read as JSON Lines
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::new(paths.into_iter().map(|p| TraceInput::File(p.into())).collect())
    }

    /// Create a source over arbitrary inputs
    pub fn new(inputs: Vec<TraceInput>) -> Self {
        let summaries = inputs
            .iter()
            .map(|input| InputSummary::pending(input.name()))
            .collect();
        Self {
            format: Box::new(JsonLinesFormat),
            pending: inputs.into(),
            current: None,
            current_index: None,
            summaries,
            next_seq: 0,
        }
    }

    /// Builder method: use a different format for file inputs
    pub fn with_format(mut self, format: impl TraceFormat + 'static) -> Self {
        self.format = Box::new(format);
        self
    }

    /// Per-input summaries (complete once the source is exhausted)
    pub fn summaries(&self) -> &[InputSummary] {
        &self.summaries
    }

    /// Consume the source and return the per-input summaries
    pub fn into_summaries(self) -> Vec<InputSummary> {
        self.summaries
    }

    /// Number of readable inputs, see [`InputSummary::is_readable`]
    pub fn readable_inputs(&self) -> usize {
        self.summaries.iter().filter(|s| s.is_readable()).count()
    }

    /// Advance to the next input; returns an error if it cannot be opened
    fn open_next(&mut self) -> Option<Result<(), DecodeError>> {
        let input = self.pending.pop_front()?;
        let index = self.current_index.map_or(0, |i| i + 1);
        self.current_index = Some(index);

        let opened = match input {
            TraceInput::File(path) => self.format.open(&path),
            TraceInput::Memory { records, .. } => Ok(Box::new(records.into_iter()) as RecordIter),
        };

        match opened {
            Ok(iter) => {
                self.summaries[index].opened = true;
                self.current = Some(iter);
                Some(Ok(()))
            }
            Err(e) => {
                log::error!("Error loading trace input {}: {}", self.summaries[index].name, e);
                self.summaries[index].error = Some(e.to_string());
                Some(Err(e))
            }
        }
    }
}

impl Iterator for TraceSource {
    type Item = Result<TraceRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(iter) = self.current.as_mut() {
                let index = self.current_index.unwrap_or(0);
                match iter.next() {
                    Some(Ok(mut record)) => {
                        record.seq = self.next_seq;
                        self.next_seq += 1;
                        self.summaries[index].records += 1;
                        return Some(Ok(record));
                    }
                    Some(Err(e)) => {
                        log::error!("Error decoding trace input {}: {}", self.summaries[index].name, e);
                        self.summaries[index].error = Some(e.to_string());
                        self.current = None;
                        return Some(Err(e));
                    }
                    None => {
                        log::debug!(
                            "Finished trace input {} ({} records)",
                            self.summaries[index].name,
                            self.summaries[index].records
                        );
                        self.current = None;
                    }
                }
            }

            match self.open_next()? {
                Ok(()) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(name: &str, records: Vec<Result<TraceRecord, DecodeError>>) -> TraceInput {
        TraceInput::Memory {
            name: name.to_string(),
            records,
        }
    }

    fn record(apid: &str) -> Result<TraceRecord, DecodeError> {
        Ok(TraceRecord::new("ECU1", apid, "CTX", "text"))
    }

    #[test]
    fn test_concatenates_inputs_and_assigns_seq() {
        let source = TraceSource::new(vec![
            memory("a", vec![record("A1"), record("A2")]),
            memory("b", vec![record("B1")]),
        ]);
        let records: Vec<_> = source.map(|r| r.unwrap()).collect();
        let seqs: Vec<_> = records.iter().map(|r| r.seq).collect();
        let apids: Vec<_> = records.iter().map(|r| r.apid.as_str()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(apids, vec!["A1", "A2", "B1"]);
    }

    #[test]
    fn test_decode_error_ends_only_that_input() {
        let malformed = DecodeError::Malformed {
            path: PathBuf::from("a"),
            line: 2,
            reason: "bad".to_string(),
        };
        let mut source = TraceSource::new(vec![
            memory("a", vec![record("A1"), Err(malformed), record("A3")]),
            memory("b", vec![record("B1")]),
        ]);

        assert!(source.next().unwrap().is_ok());
        assert!(source.next().unwrap().is_err());
        assert_eq!(source.next().unwrap().unwrap().apid, "B1");
        assert!(source.next().is_none());

        let summaries = source.summaries();
        assert_eq!(summaries[0].records, 1);
        assert!(summaries[0].error.is_some());
        assert!(summaries[1].is_ok());
        assert_eq!(source.readable_inputs(), 2);
    }

    #[test]
    fn test_missing_file_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.jsonl");
        std::fs::write(&good, "{\"ecu_id\":\"E\",\"apid\":\"SYS\",\"ctid\":\"JOUR\"}\n").unwrap();

        let mut source = TraceSource::from_paths([dir.path().join("missing.jsonl"), good]);
        assert!(matches!(source.next(), Some(Err(DecodeError::Open { .. }))));
        assert!(source.next().unwrap().is_ok());
        assert!(source.next().is_none());

        assert!(!source.summaries()[0].opened);
        assert_eq!(source.readable_inputs(), 1);
    }

    #[test]
    fn test_input_failing_on_first_line_is_not_readable() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.jsonl");
        let empty = dir.path().join("empty.jsonl");
        std::fs::write(&broken, "not json\n").unwrap();
        std::fs::write(&empty, "").unwrap();

        let mut source = TraceSource::from_paths([broken.clone()]);
        assert!(matches!(source.next(), Some(Err(DecodeError::Malformed { .. }))));
        assert!(source.next().is_none());
        assert!(source.summaries()[0].opened);
        assert!(!source.summaries()[0].is_readable());
        assert_eq!(source.readable_inputs(), 0);

        let mut source = TraceSource::from_paths([empty]);
        assert!(source.next().is_none());
        assert!(source.summaries()[0].is_readable());
        assert_eq!(source.readable_inputs(), 1);
    }
}
