//! JSON Lines trace reader
//!
//! Reads traces that an external DLT decoder has already converted into one
//! JSON object per line (see [`TraceRecord`] for the field names).
//!
//! ## Format notes
//! - Blank lines and lines starting with `#` are ignored
//! - `ecuid`, `tmsp` and `mcnt` are accepted as aliases of the record fields
//! - The first malformed line ends the input

use super::{RecordIter, TraceFormat};
use crate::error::DecodeError;
use crate::types::TraceRecord;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// File extension of pre-decoded trace files
pub const TRACE_FILE_EXTENSION: &str = "jsonl";

/// JSON Lines trace format
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesFormat;

impl JsonLinesFormat {
    /// Open a JSON Lines trace file
    pub fn parse(path: &Path) -> Result<JsonLinesIterator<BufReader<File>>, DecodeError> {
        log::info!("Reading trace file {:?}", path);

        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(JsonLinesIterator::new(path, BufReader::new(file)))
    }
}

impl TraceFormat for JsonLinesFormat {
    fn open(&self, path: &Path) -> Result<RecordIter, DecodeError> {
        Ok(Box::new(Self::parse(path)?))
    }
}

/// Iterator over the records of a JSON Lines reader
pub struct JsonLinesIterator<R> {
    path: PathBuf,
    lines: std::io::Lines<R>,
    line_no: usize,
    failed: bool,
}

impl<R: BufRead> JsonLinesIterator<R> {
    /// Wrap any buffered reader; `path` is only used in error messages
    pub fn new(path: &Path, reader: R) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: reader.lines(),
            line_no: 0,
            failed: false,
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesIterator<R> {
    type Item = Result<TraceRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let line = self.lines.next()?;
            self.line_no += 1;

            let line = match line {
                Ok(line) => line,
                Err(source) => {
                    self.failed = true;
                    return Some(Err(DecodeError::Read {
                        path: self.path.clone(),
                        line: self.line_no,
                        source,
                    }));
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            return match serde_json::from_str::<TraceRecord>(trimmed) {
                Ok(record) => Some(Ok(record)),
                Err(e) => {
                    self.failed = true;
                    Some(Err(DecodeError::Malformed {
                        path: self.path.clone(),
                        line: self.line_no,
                        reason: e.to_string(),
                    }))
                }
            };
        }
    }
}
