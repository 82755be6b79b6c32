//! Trace input formats
//!
//! Binary DLT decoding happens outside this crate. A format here only turns an
//! already-decoded trace file into a stream of [`TraceRecord`]s.

use crate::error::DecodeError;
use crate::types::TraceRecord;
use std::path::Path;

pub mod jsonl;

pub use jsonl::{JsonLinesFormat, JsonLinesIterator};

/// Iterator over the records of one opened input
pub type RecordIter = Box<dyn Iterator<Item = Result<TraceRecord, DecodeError>>>;

/// Common trait for all trace input formats
///
/// Implementations open one input and return a lazy iterator over its
/// records. The iterator is expected to stop after yielding an error.
pub trait TraceFormat {
    /// Open an input and return an iterator over its records
    fn open(&self, path: &Path) -> Result<RecordIter, DecodeError>;
}

impl<F> TraceFormat for F
where
    F: Fn(&Path) -> Result<RecordIter, DecodeError>,
{
    fn open(&self, path: &Path) -> Result<RecordIter, DecodeError> {
        self(path)
    }
}
