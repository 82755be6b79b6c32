//! Results and the run-level report

use crate::lifecycle::Lifecycle;
use crate::source::InputSummary;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Class name used for results the engine produces itself
pub const ENGINE_RESULT_CLASS: &str = "DLTAnalyser";

/// Test name of the per-input sanity results
pub const INPUT_SANITY_TEST_NAME: &str = "File Sanity Checks During Execution";

/// Outcome of one result, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultState {
    Success,
    Skipped,
    Failure,
    Error,
}

impl ResultState {
    /// Success and skipped results count as passed
    pub fn is_passed(self) -> bool {
        matches!(self, ResultState::Success | ResultState::Skipped)
    }

    /// Severity used for worst-case reduction (skipped ranks like success)
    fn severity(self) -> u8 {
        match self {
            ResultState::Success | ResultState::Skipped => 0,
            ResultState::Failure => 1,
            ResultState::Error => 2,
        }
    }

    /// Worst of two states (error > failure > success)
    pub fn worst(self, other: ResultState) -> ResultState {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultState::Success => write!(f, "success"),
            ResultState::Skipped => write!(f, "skipped"),
            ResultState::Failure => write!(f, "failure"),
            ResultState::Error => write!(f, "error"),
        }
    }
}

/// One finding emitted by a plugin (or by the engine itself)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Name of the plugin that emitted the result (filled in by the aggregator)
    pub plugin_name: String,
    /// Short description of the check (defaults to the plugin description)
    pub test_name: String,
    pub state: ResultState,
    pub message: String,
    /// Attachment paths, relative to the extracted-files root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<PathBuf>,
    /// Raw diagnostic text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl AnalysisResult {
    /// Create an empty result with the given state
    pub fn new(state: ResultState) -> Self {
        Self {
            plugin_name: String::new(),
            test_name: String::new(),
            state,
            message: String::new(),
            attachments: Vec::new(),
            stdout: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(ResultState::Success)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(ResultState::Failure).with_message(message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResultState::Error).with_message(message)
    }

    /// Builder method: set the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Builder method: set the raw diagnostic text
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    /// Builder method: set the test name
    pub fn with_test_name(mut self, test_name: impl Into<String>) -> Self {
        self.test_name = test_name.into();
        self
    }

    /// Builder method: add an attachment (relative to the extracted-files root)
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Builder method: add several attachments
    pub fn with_attachments<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.attachments.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Builder method: add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Run-level information stored next to the results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub testsuite_name: String,
    /// Timing metadata: excluded when comparing two runs
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub inputs: Vec<InputSummary>,
    pub records_processed: u64,
    pub lifecycles: Vec<Lifecycle>,
    /// Plugins that faulted during the run, in registration order
    pub crashed_plugins: Vec<String>,
    /// Plugins that could not be loaded
    pub failed_plugins: Vec<String>,
    /// Reading stopped because of the decode failure policy
    pub aborted: bool,
    /// Reading stopped because of an external interrupt
    pub interrupted: bool,
    /// Records seen outside any lifecycle (recovered, not fatal)
    pub lifecycle_warnings: Vec<String>,
}

impl ReportMetadata {
    /// Number of inputs that contributed records (or decoded cleanly)
    pub fn readable_inputs(&self) -> usize {
        self.inputs.iter().filter(|i| i.is_readable()).count()
    }
}

/// The aggregated outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub results: Vec<AnalysisResult>,
    pub metadata: ReportMetadata,
}

/// Exit code bit set when a result is not passed
pub const EXIT_RESULT_NOT_PASSED: i32 = 1;
/// Exit code bit set when a plugin crashed or failed to load
pub const EXIT_PLUGIN_FAULT: i32 = 2;
/// Exit code bit set when an input failed to decode
pub const EXIT_INPUT_FAULT: i32 = 4;

impl Report {
    /// Worst state over all results; success for an empty report
    pub fn overall_status(&self) -> ResultState {
        self.results
            .iter()
            .fold(ResultState::Success, |acc, r| acc.worst(r.state))
    }

    /// True if no result is failure or error
    pub fn is_success(&self) -> bool {
        self.overall_status().is_passed()
    }

    /// Process exit code: 0 on success, otherwise a bit mask of fault classes
    pub fn exit_code(&self) -> i32 {
        let mut code = 0;
        if self.results.iter().any(|r| !r.state.is_passed()) {
            code |= EXIT_RESULT_NOT_PASSED;
        }
        if !self.metadata.crashed_plugins.is_empty() || !self.metadata.failed_plugins.is_empty() {
            code |= EXIT_PLUGIN_FAULT;
        }
        if self.metadata.inputs.iter().any(|i| i.error.is_some()) {
            code |= EXIT_INPUT_FAULT;
        }
        code
    }

    /// Results emitted by one plugin, in emission order
    pub fn results_for<'a>(&'a self, plugin_name: &'a str) -> impl Iterator<Item = &'a AnalysisResult> + 'a {
        self.results.iter().filter(move |r| r.plugin_name == plugin_name)
    }

    /// Count results per state
    pub fn counts(&self) -> BTreeMap<ResultState, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.state).or_insert(0) += 1;
        }
        counts
    }
}
