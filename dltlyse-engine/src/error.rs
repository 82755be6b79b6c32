//! Error taxonomy of the engine
//!
//! Only [`EngineError::NoReadableInput`] is fatal for a run. Every other error
//! is local to one input or one plugin and ends up as a diagnostic result in
//! the report.

use std::path::PathBuf;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    PluginLoad(#[from] PluginLoadError),

    #[error(transparent)]
    PluginRuntime(#[from] PluginRuntimeError),

    #[error("No readable trace input (tried {0} input(s))")]
    NoReadableInput(usize),

    #[error("Error loading requested plugins: {}", .0.join(", "))]
    UnknownPlugins(Vec<String>),

    #[error("Failed to write report: {0}")]
    ReportWrite(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV file {0:?} is not declared")]
    UndeclaredCsvFile(String),

    #[error("No lifecycle open, cannot write CSV file {0:?}")]
    CsvOutsideLifecycle(String),
}

/// A trace input could not be opened or parsed
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to open trace file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read trace file {path:?} at line {line}: {source}")]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {path:?} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Unsupported trace format: {0:?}")]
    UnsupportedFormat(PathBuf),
}

/// A plugin could not be created or registered
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Error loading plugin {plugin}: {reason}")]
pub struct PluginLoadError {
    /// Name of the plugin (or library) that failed
    pub plugin: String,
    /// Human readable cause
    pub reason: String,
}

impl PluginLoadError {
    pub fn new(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

/// A plugin faulted (returned an error or panicked) inside a callback
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Error {action} plugin {plugin} - {detail}")]
pub struct PluginRuntimeError {
    /// Name of the faulting plugin
    pub plugin: String,
    /// Callback that faulted
    pub action: PluginAction,
    /// Error chain or panic message
    pub detail: String,
    /// Sequence number of the record being dispatched, if any
    pub record_seq: Option<u64>,
}

/// The plugin callback a fault happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginAction {
    Handle,
    LifecycleStart,
    LifecycleEnd,
    Finalize,
}

impl PluginAction {
    /// All actions, in the order they are reported in timing logs
    pub const ALL: [PluginAction; 4] = [
        PluginAction::Handle,
        PluginAction::LifecycleStart,
        PluginAction::LifecycleEnd,
        PluginAction::Finalize,
    ];

    pub fn index(self) -> usize {
        match self {
            PluginAction::Handle => 0,
            PluginAction::LifecycleStart => 1,
            PluginAction::LifecycleEnd => 2,
            PluginAction::Finalize => 3,
        }
    }
}

impl std::fmt::Display for PluginAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginAction::Handle => write!(f, "calling"),
            PluginAction::LifecycleStart => write!(f, "calling new_lifecycle"),
            PluginAction::LifecycleEnd => write!(f, "calling end_lifecycle"),
            PluginAction::Finalize => write!(f, "calling report"),
        }
    }
}

/// Internal lifecycle invariant violation, recovered by the tracker
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleInconsistencyError {
    #[error("Record #{seq} from ECU {ecu_id} observed with no open lifecycle; opened implicit lifecycle {lifecycle_id}")]
    NoOpenLifecycle {
        seq: u64,
        ecu_id: String,
        lifecycle_id: u32,
    },
}
