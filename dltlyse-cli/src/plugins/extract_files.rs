//! Extracting all files from DLT trace
//!
//! A DLT file transfer is a sequence of `SYS|FILE` (or `FLT|FILE`) messages:
//! - `FLST` starts a transfer: `[FLST, transfer_id, filename, length, date, FLST]`
//! - `FLDA` carries one data chunk: `[FLDA, transfer_id, index, data, FLDA]`
//! - `FLFI` ends it: `[FLFI, transfer_id, FLFI]`
//!
//! Chunks are written to `<extract_dir>/Coredumps/<transfer_id>/<filename>.part`
//! and moved to `<extract_dir>/Coredumps/<filename>` once the transfer ends
//! with all chunks present.
//!
//! Transfer ids must be numeric and only the base name of the announced file
//! is used, so nothing is ever written outside the extract root.

use anyhow::Context;
use dltlyse_engine::{AnalysisResult, MessageFilter, PayloadArg, Plugin, TraceRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const NAME: &str = "ExtractFilesPlugin";
pub const DESCRIPTION: &str = "Extracting all files from DLT trace";

/// Subdirectory of the extract root receiving the files
pub const COREDUMP_DIR: &str = "Coredumps";

struct Transfer {
    filename: String,
    index: i64,
    error: bool,
    finished: bool,
    part_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl Transfer {
    fn start(coredump_dir: &Path, transfer_id: &str, filename: String) -> anyhow::Result<Self> {
        let transfer_dir = coredump_dir.join(transfer_id);
        let part_path = transfer_dir.join(format!("{}.part", filename));
        if part_path.exists() {
            log::warn!("File '{}' exists already!", part_path.display());
        }
        fs::create_dir_all(&transfer_dir)
            .with_context(|| format!("Failed to create {:?}", transfer_dir))?;
        let file = File::create(&part_path)
            .with_context(|| format!("Failed to create {:?}", part_path))?;

        Ok(Self {
            filename,
            index: 0,
            error: false,
            finished: false,
            part_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    fn append(&mut self, index: Option<i64>, data: &[u8]) -> anyhow::Result<()> {
        self.index += 1;
        if index != Some(self.index) {
            if !self.error {
                log::error!(
                    "Expected index {}, got {:?}, failing file {}",
                    self.index,
                    index,
                    self.filename
                );
            }
            self.error = true;
        }
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write_all(data)
                .with_context(|| format!("Failed to write {:?}", self.part_path))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("Failed to write {:?}", self.part_path))?;
        }
        Ok(())
    }

    /// Close the part file and move it into place
    ///
    /// If a file with the same name was already extracted, the new copy stays
    /// in its transfer directory (without the `.part` suffix).
    fn close(&mut self, coredump_dir: &Path) -> anyhow::Result<()> {
        self.flush()?;
        if self.error {
            return Ok(());
        }

        let final_path = coredump_dir.join(&self.filename);
        let transfer_dir = self.part_path.parent().unwrap_or(coredump_dir);
        if !final_path.exists() {
            fs::rename(&self.part_path, &final_path)
                .with_context(|| format!("Failed to move {:?}", self.part_path))?;
            // only succeeds if the transfer directory is empty
            let _ = fs::remove_dir(transfer_dir);
        } else {
            let duplicate = transfer_dir.join(&self.filename);
            fs::rename(&self.part_path, &duplicate)
                .with_context(|| format!("Failed to move {:?}", self.part_path))?;
        }
        Ok(())
    }

    fn attachment(&self) -> PathBuf {
        Path::new(COREDUMP_DIR).join(&self.filename)
    }
}

pub struct ExtractFilesPlugin {
    coredump_dir: PathBuf,
    /// Transfers by transfer id
    transfers: BTreeMap<String, Transfer>,
}

impl ExtractFilesPlugin {
    pub fn new(extract_dir: &Path) -> Self {
        Self {
            coredump_dir: extract_dir.join(COREDUMP_DIR),
            transfers: BTreeMap::new(),
        }
    }
}

fn text_arg(record: &TraceRecord, index: usize) -> Option<String> {
    record
        .payload
        .get(index)
        .and_then(PayloadArg::as_bytes)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

impl Plugin for ExtractFilesPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn filters(&self) -> Vec<MessageFilter> {
        vec![MessageFilter::new("SYS", "FILE"), MessageFilter::new("FLT", "FILE")]
    }

    fn handle(&mut self, record: &TraceRecord) -> anyhow::Result<()> {
        let Some(header) = text_arg(record, 0) else {
            return Ok(());
        };
        let Some(transfer_id) = record.payload.get(1).and_then(PayloadArg::as_i64) else {
            log::warn!(
                "Ignoring {} message #{} without numeric transfer id",
                header,
                record.seq
            );
            return Ok(());
        };
        let transfer_id = transfer_id.to_string();

        match header.as_str() {
            "FLST" => {
                let Some(path) = text_arg(record, 2) else {
                    log::warn!("File transfer {} without file name", transfer_id);
                    return Ok(());
                };
                // ignore whatever path is included in DLT
                let Some(filename) = Path::new(&path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                else {
                    log::warn!("Ignoring file transfer {} of {:?}: no file name", transfer_id, path);
                    return Ok(());
                };
                log::info!("Found file '{}' in the trace", filename);
                let transfer = Transfer::start(&self.coredump_dir, &transfer_id, filename)?;
                self.transfers.insert(transfer_id, transfer);
            }
            "FLDA" => {
                let Some(transfer) = self.transfers.get_mut(&transfer_id) else {
                    log::warn!("Data for unknown file transfer {}", transfer_id);
                    return Ok(());
                };
                let index = record.payload.get(2).and_then(PayloadArg::as_i64);
                let data = record
                    .payload
                    .get(3)
                    .and_then(PayloadArg::as_bytes)
                    .unwrap_or_default();
                transfer.append(index, data)?;
            }
            "FLFI" => {
                let Some(transfer) = self.transfers.get_mut(&transfer_id) else {
                    log::warn!("End of unknown file transfer {}", transfer_id);
                    return Ok(());
                };
                transfer.finished = true;
                transfer.close(&self.coredump_dir)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>> {
        for transfer in self.transfers.values_mut() {
            transfer.flush()?;
        }

        let mut attachments: Vec<PathBuf> = Vec::new();
        for transfer in self.transfers.values().filter(|t| !t.error && t.finished) {
            let attachment = transfer.attachment();
            if !attachments.contains(&attachment) {
                attachments.push(attachment);
            }
        }

        let mut bad_files = BTreeSet::new();
        let mut text = String::from("extracted files found:\n");
        for transfer in self.transfers.values() {
            text.push_str(&format!(" - {}", transfer.filename));
            if transfer.error {
                bad_files.insert(transfer.filename.as_str());
                text.push_str(" ERROR: File parts missing!");
            }
            if !transfer.finished {
                if attachments.contains(&transfer.attachment()) {
                    // another transfer of the same file succeeded
                    log::warn!("File '{}' is not complete", transfer.filename);
                } else {
                    bad_files.insert(transfer.filename.as_str());
                    log::error!("File '{}' is not complete", transfer.filename);
                    text.push_str(" ERROR: File not complete!");
                }
            }
            text.push('\n');
        }

        let result = if bad_files.is_empty() {
            AnalysisResult::success()
        } else {
            AnalysisResult::error(format!("Error extracting {} files", bad_files.len()))
        };
        Ok(vec![result.with_stdout(text).with_attachments(attachments)])
    }
}
