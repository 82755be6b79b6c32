//! Configuration loading and parsing
//!
//! Every section of the TOML file is optional; command line arguments
//! override the values read from the file.

use anyhow::{Context, Result};
use dltlyse_engine::{DaemonStartMarker, DecodeErrorPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from dltlyse.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub plugins: PluginsConfig,
    /// Record that starts a new lifecycle
    pub lifecycle: DaemonStartMarker,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    pub files: Vec<PathBuf>,
    pub recursive: bool,
    pub decode_errors: DecodeErrorPolicy,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directories searched for plugin libraries
    pub dirs: Vec<PathBuf>,
    /// Run only these plugins (empty: all automatic plugins)
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub include_manual: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub report: PathBuf,
    pub extracted_dir: PathBuf,
    pub testsuite_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report: PathBuf::from("dltlyse_results.json"),
            extracted_dir: PathBuf::from(dltlyse_engine::EXTRACT_DIR),
            testsuite_name: "dltlyse".to_string(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            files = ["trace.jsonl"]
            decode_errors = "abort"

            [plugins]
            exclude = ["SysmemPlugin"]

            [lifecycle]
            apid = "BOOT"

            [output]
            testsuite_name = "nightly"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.files.len(), 1);
        assert_eq!(config.input.decode_errors, DecodeErrorPolicy::Abort);
        assert_eq!(config.plugins.exclude, vec!["SysmemPlugin".to_string()]);
        assert_eq!(config.lifecycle.apid, "BOOT");
        assert_eq!(config.lifecycle.ctid, "INTM");
        assert_eq!(config.output.testsuite_name, "nightly");
        assert_eq!(config.output.report, PathBuf::from("dltlyse_results.json"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.input.files.is_empty());
        assert_eq!(config.input.decode_errors, DecodeErrorPolicy::SkipInput);
        assert_eq!(config.lifecycle, DaemonStartMarker::default());
        assert_eq!(config.output.extracted_dir, PathBuf::from("extracted_files"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
