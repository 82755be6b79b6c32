//! Report writers
//!
//! Attachments in results are relative to the extracted-files root. Before a
//! report is serialized each reference is resolved against that root; a file
//! that no longer exists is dropped with a warning instead of failing the
//! whole write.

use crate::error::{EngineError, Result};
use crate::report::Report;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default directory plugins write attachments into
pub const EXTRACT_DIR: &str = "extracted_files";

/// Serializes a finished report
pub trait ReportWriter {
    fn write(&self, report: &Report) -> Result<()>;
}

/// Resolve attachment references against `root`, dropping missing files
///
/// Absolute attachment paths are kept as they are (if they exist).
pub fn resolve_attachments(report: &Report, root: &Path) -> Report {
    let mut resolved = report.clone();
    for result in &mut resolved.results {
        let attachments = std::mem::take(&mut result.attachments);
        for attachment in attachments {
            let full = if attachment.is_absolute() {
                attachment.clone()
            } else {
                root.join(&attachment)
            };
            if full.exists() {
                result.attachments.push(full);
            } else {
                log::warn!(
                    "Dropping attachment {:?} of plugin {}: file does not exist",
                    full,
                    result.plugin_name
                );
            }
        }
    }
    resolved
}

/// Writes the report as pretty-printed JSON
pub struct JsonReportWriter {
    path: PathBuf,
    extract_dir: PathBuf,
}

impl JsonReportWriter {
    /// Create a writer for `path`, resolving attachments against `extract_dir`
    pub fn new(path: impl Into<PathBuf>, extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extract_dir: extract_dir.into(),
        }
    }

    /// Output file of this writer
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportWriter for JsonReportWriter {
    fn write(&self, report: &Report) -> Result<()> {
        let resolved = resolve_attachments(report, &self.extract_dir);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)
            .map_err(|e| EngineError::ReportWrite(format!("{:?}: {}", self.path, e)))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &resolved)?;
        out.write_all(b"\n")?;
        out.flush()?;

        log::info!("Report written to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AnalysisResult, ReportMetadata};
    use chrono::Utc;

    fn report_with_attachments(attachments: Vec<&str>) -> Report {
        let mut result = AnalysisResult::success().with_attachments(attachments);
        result.plugin_name = "ExtractFilesPlugin".to_string();
        let now = Utc::now();
        Report {
            results: vec![result],
            metadata: ReportMetadata {
                testsuite_name: "dltlyse".to_string(),
                started_at: now,
                finished_at: now,
                inputs: Vec::new(),
                records_processed: 0,
                lifecycles: Vec::new(),
                crashed_plugins: Vec::new(),
                failed_plugins: Vec::new(),
                aborted: false,
                interrupted: false,
                lifecycle_warnings: Vec::new(),
            },
        }
    }

    #[test]
    fn test_missing_attachments_are_dropped() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("Coredumps")).unwrap();
        std::fs::write(root.path().join("Coredumps/core.1"), b"core").unwrap();

        let report = report_with_attachments(vec!["Coredumps/core.1", "Coredumps/gone"]);
        let resolved = resolve_attachments(&report, root.path());

        assert_eq!(
            resolved.results[0].attachments,
            vec![root.path().join("Coredumps/core.1")]
        );
        // the input report is left untouched
        assert_eq!(report.results[0].attachments.len(), 2);
    }

    #[test]
    fn test_json_writer_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports/results.json");
        let writer = JsonReportWriter::new(&out, dir.path().join(EXTRACT_DIR));

        writer.write(&report_with_attachments(vec!["missing.csv"])).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["results"][0]["plugin_name"], "ExtractFilesPlugin");
        assert_eq!(json["results"][0]["state"], "success");
        assert!(json["results"][0].get("attachments").is_none());
        assert_eq!(json["metadata"]["testsuite_name"], "dltlyse");
    }
}
