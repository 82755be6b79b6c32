//! Gather system RAM usage from the monitor tool messages
//!
//! `MON|MEMS` payloads look like
//! `MemTotal: 3891.2MB MemAvailable: 2034.5MB Buffers: 12.0MB ...`.
//! Every message becomes one CSV row (values in kB), tagged with the lifecycle
//! it was seen in.

use dltlyse_engine::{AnalysisResult, CsvOutput, MessageFilter, Plugin, ResultState, TraceRecord};
use std::collections::BTreeMap;
use std::path::Path;

pub const NAME: &str = "SysmemPlugin";
pub const DESCRIPTION: &str = "Report system memory information";

/// CSV report, relative to the extract root
pub const REPORT_FILE: &str = "sysmem_report.csv";

const CSV_FIELDS: [&str; 7] = [
    "lifecycle",
    "time",
    "mem_total",
    "mem_available",
    "buffers",
    "cached",
    "shared",
];

const FIELD_MAPPING: [(&str, &str); 5] = [
    ("MemTotal", "mem_total"),
    ("MemAvailable", "mem_available"),
    ("Buffers", "buffers"),
    ("Cached", "cached"),
    ("Shmem", "shared"),
];

/// 1 GiB in kB
const MIN_MEM_AVAILABLE: i64 = 1024 * 1024;

pub struct SysmemPlugin {
    csv: CsvOutput,
    lifecycle: Option<u32>,
    min_mem_available: Option<i64>,
}

impl SysmemPlugin {
    pub fn new(extract_dir: &Path) -> Self {
        Self {
            csv: CsvOutput::new(extract_dir).with_file(REPORT_FILE, CSV_FIELDS),
            lifecycle: None,
            min_mem_available: None,
        }
    }
}

impl Plugin for SysmemPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn filters(&self) -> Vec<MessageFilter> {
        vec![MessageFilter::new("MON", "MEMS")]
    }

    fn on_lifecycle_start(&mut self, _ecu_id: &str, lifecycle_id: u32) -> anyhow::Result<()> {
        self.lifecycle = Some(lifecycle_id);
        Ok(())
    }

    fn handle(&mut self, record: &TraceRecord) -> anyhow::Result<()> {
        let mut row: BTreeMap<&str, String> = BTreeMap::new();
        row.insert("lifecycle", self.lifecycle.unwrap_or_default().to_string());
        row.insert("time", record.timestamp.to_string());

        let payload = record.payload_decoded();
        for combo_value in payload.split("MB") {
            let Some((field, value)) = combo_value.split_once(':') else {
                continue;
            };
            let field = field.trim();
            let Ok(value) = value.trim().parse::<f64>() else {
                log::debug!("Ignoring memory value {:?} of {}", value, field);
                continue;
            };
            let value = (value * 1024.0) as i64;
            if field == "MemAvailable" {
                self.min_mem_available = Some(self.min_mem_available.map_or(value, |min| min.min(value)));
            }
            if let Some((_, column)) = FIELD_MAPPING.iter().find(|(name, _)| *name == field) {
                row.insert(*column, value.to_string());
            }
        }

        self.csv
            .write_row(CSV_FIELDS.iter().map(|k| row.get(k).map(String::as_str).unwrap_or("")))?;
        Ok(())
    }

    fn on_lifecycle_end(&mut self, _ecu_id: &str, _lifecycle_id: u32) -> anyhow::Result<()> {
        self.csv.flush()?;
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>> {
        self.csv.close()?;
        if self.lifecycle.is_none() {
            return Ok(vec![AnalysisResult::new(ResultState::Skipped)
                .with_message("No lifecycle in the trace, no memory report written")]);
        }

        let result = match self.min_mem_available {
            Some(min) if min < MIN_MEM_AVAILABLE => {
                AnalysisResult::failure("Available memory dropped below 1Gb")
            }
            Some(min) => AnalysisResult::success()
                .with_message(format!("Minimum available memory: {} kB", min)),
            None => AnalysisResult::success().with_message("No memory information found"),
        };
        Ok(vec![result.with_attachments(self.csv.attachments())])
    }
}
