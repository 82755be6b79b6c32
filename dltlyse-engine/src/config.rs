//! Engine configuration types
//!
//! This module defines the small set of knobs the engine itself needs. Plugin
//! selection, paths and output locations are owned by the application layer.

use serde::{Deserialize, Serialize};

/// What to do when a trace input fails to decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorPolicy {
    /// Record the error, drop the rest of that input and continue with the next one
    #[default]
    SkipInput,
    /// Stop reading entirely; open lifecycles are closed and plugins finalized
    Abort,
}

/// Configuration for the analysis engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Decode failure policy
    #[serde(default)]
    pub decode_error_policy: DecodeErrorPolicy,

    /// Name of the test suite written into the report
    #[serde(default = "default_testsuite_name")]
    pub testsuite_name: String,

    /// Whether to add one "file sanity" result per input to the report
    #[serde(default = "default_true")]
    pub input_results: bool,
}

fn default_testsuite_name() -> String {
    "dltlyse".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decode_error_policy: DecodeErrorPolicy::default(),
            testsuite_name: default_testsuite_name(),
            input_results: true,
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the decode failure policy
    pub fn with_decode_error_policy(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_error_policy = policy;
        self
    }

    /// Builder method: set the report test suite name
    pub fn with_testsuite_name(mut self, name: impl Into<String>) -> Self {
        self.testsuite_name = name.into();
        self
    }

    /// Builder method: enable or disable per-input sanity results
    pub fn with_input_results(mut self, enabled: bool) -> Self {
        self.input_results = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::new()
            .with_decode_error_policy(DecodeErrorPolicy::Abort)
            .with_testsuite_name("nightly")
            .with_input_results(false);

        assert_eq!(config.decode_error_policy, DecodeErrorPolicy::Abort);
        assert_eq!(config.testsuite_name, "nightly");
        assert!(!config.input_results);
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.decode_error_policy, DecodeErrorPolicy::SkipInput);
        assert_eq!(config.testsuite_name, "dltlyse");
        assert!(config.input_results);
    }
}
