//! Result aggregation
//!
//! Runs after the dispatcher closed the last lifecycle. Every plugin that did
//! not crash is finalized exactly once; a crashed plugin is not finalized
//! (its internal state is unknown) and gets one synthesized error result
//! carrying the captured fault instead.

use crate::config::EngineConfig;
use crate::dispatcher::{invoke, DispatchOutcome};
use crate::error::{PluginAction, PluginLoadError};
use crate::guard::guard;
use crate::registry::PluginSlot;
use crate::report::{
    AnalysisResult, Report, ReportMetadata, ResultState, ENGINE_RESULT_CLASS,
    INPUT_SANITY_TEST_NAME,
};
use crate::source::InputSummary;
use crate::types::Timestamp;
use chrono::Utc;

/// Test name of the synthesized result for a crashed plugin
pub const CRASH_TEST_NAME: &str = "Exceptions during execution";

/// Test name of the result recorded for a plugin that failed to load
pub const LOAD_FAILURE_TEST_NAME: &str = "Plugin loading";

/// Finalize all plugins and build the report
pub fn aggregate(
    outcome: DispatchOutcome,
    inputs: Vec<InputSummary>,
    config: &EngineConfig,
    started_at: Timestamp,
) -> Report {
    log::info!("Generating reports");

    let (mut slots, load_failures) = outcome.registry.into_parts();
    let mut results = Vec::new();
    for slot in slots.iter_mut() {
        let plugin_results = finalize_plugin(slot);
        log_plugin_summary(slot, &plugin_results);
        results.extend(plugin_results);
    }

    results.extend(load_failures.iter().map(load_failure_result));

    if config.input_results {
        let unread = outcome.aborted || outcome.interrupted;
        results.extend(inputs.iter().map(|input| input_result(input, unread)));
    }

    let crashed_plugins = slots
        .iter()
        .filter(|slot| slot.is_crashed())
        .map(|slot| slot.name().to_string())
        .collect();
    let failed_plugins = load_failures.iter().map(|e| e.plugin.clone()).collect();

    let report = Report {
        results,
        metadata: ReportMetadata {
            testsuite_name: config.testsuite_name.clone(),
            started_at,
            finished_at: Utc::now(),
            inputs,
            records_processed: outcome.records_processed,
            lifecycles: outcome.lifecycles,
            crashed_plugins,
            failed_plugins,
            aborted: outcome.aborted,
            interrupted: outcome.interrupted,
            lifecycle_warnings: outcome
                .lifecycle_warnings
                .iter()
                .map(ToString::to_string)
                .collect(),
        },
    };
    log::info!("Done. Overall status: {}", report.overall_status());
    report
}

/// Finalize one plugin (or synthesize its crash result) and fill result defaults
fn finalize_plugin(slot: &mut PluginSlot) -> Vec<AnalysisResult> {
    let produced =
        invoke(slot, PluginAction::Finalize, None, |plugin| plugin.finalize()).unwrap_or_default();

    let mut results = match slot.fault() {
        Some(fault) => vec![AnalysisResult::error("Exceptions detected while executing the plugin")
            .with_test_name(CRASH_TEST_NAME)
            .with_stdout(fault.to_string())],
        None => produced,
    };

    let plugin = &slot.plugin;
    let (description, metadata) =
        guard(|| Ok((plugin.description().to_string(), plugin.metadata()))).unwrap_or_default();
    for result in &mut results {
        result.plugin_name = slot.name().to_string();
        if result.test_name.is_empty() {
            result.test_name = if description.is_empty() {
                slot.name().to_string()
            } else {
                description.clone()
            };
        }
        for (key, value) in &metadata {
            result
                .metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
    results
}

fn load_failure_result(error: &PluginLoadError) -> AnalysisResult {
    let mut result = AnalysisResult::error(error.to_string()).with_test_name(LOAD_FAILURE_TEST_NAME);
    result.plugin_name = error.plugin.clone();
    result
}

fn input_result(input: &InputSummary, unread: bool) -> AnalysisResult {
    let mut result = match (&input.error, input.opened) {
        (Some(error), _) => AnalysisResult::error(error.clone()).with_stdout(error.clone()),
        (None, true) => AnalysisResult::success()
            .with_message("File Parsed Successfully")
            .with_stdout(format!("{} records read", input.records)),
        (None, false) if unread => {
            AnalysisResult::new(ResultState::Skipped).with_message("File not read, analysis stopped early")
        }
        (None, false) => AnalysisResult::error("File was never opened"),
    };
    result.plugin_name = ENGINE_RESULT_CLASS.to_string();
    result.test_name = INPUT_SANITY_TEST_NAME.to_string();
    result.with_metadata("file", input.name.clone())
}

fn log_plugin_summary(slot: &PluginSlot, results: &[AnalysisResult]) {
    let count = |state: ResultState| results.iter().filter(|r| r.state == state).count();
    let passed = results.iter().all(|r| r.state.is_passed());
    log::info!(
        "Report for {} ... {} success {} error {} failure {} skipped = {}",
        slot.name(),
        count(ResultState::Success),
        count(ResultState::Error),
        count(ResultState::Failure),
        count(ResultState::Skipped),
        if passed { "passed." } else { "failed." }
    );
    if !passed {
        for result in results.iter().filter(|r| !r.state.is_passed()) {
            log::debug!("- Error report for {}: {}", slot.name(), result.message);
            if let Some(stdout) = &result.stdout {
                log::debug!("{}", stdout);
            }
        }
    }

    let timings: Vec<String> = PluginAction::ALL
        .iter()
        .map(|&action| format!("{}={:.2}s", action, slot.timing(action).as_secs_f64()))
        .collect();
    log::debug!("Timings of plugin {}: {}", slot.name(), timings.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::lifecycle::LifecycleTracker;
    use crate::plugin::Plugin;
    use crate::registry::PluginRegistry;
    use crate::types::TraceRecord;

    struct Fixed {
        name: &'static str,
        results: Vec<AnalysisResult>,
        finalize_fails: bool,
    }

    impl Plugin for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Fixed results"
        }

        fn metadata(&self) -> std::collections::BTreeMap<String, String> {
            [("type".to_string(), "test".to_string())].into_iter().collect()
        }

        fn handle(&mut self, _record: &TraceRecord) -> anyhow::Result<()> {
            Ok(())
        }

        fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>> {
            if self.finalize_fails {
                anyhow::bail!("report file missing");
            }
            Ok(self.results.clone())
        }
    }

    fn run(plugins: Vec<Box<dyn Plugin>>) -> Report {
        let registry = PluginRegistry::build(plugins);
        let outcome = Dispatcher::new(registry, LifecycleTracker::default()).run(Vec::new());
        aggregate(outcome, Vec::new(), &EngineConfig::default(), Utc::now())
    }

    #[test]
    fn test_defaults_are_filled_in() {
        let report = run(vec![Box::new(Fixed {
            name: "Fixed",
            results: vec![
                AnalysisResult::success(),
                AnalysisResult::failure("f").with_test_name("custom").with_metadata("type", "own"),
            ],
            finalize_fails: false,
        })]);

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].plugin_name, "Fixed");
        assert_eq!(report.results[0].test_name, "Fixed results");
        assert_eq!(report.results[0].metadata["type"], "test");
        assert_eq!(report.results[1].test_name, "custom");
        assert_eq!(report.results[1].metadata["type"], "own");
        assert_eq!(report.overall_status(), ResultState::Failure);
    }

    #[test]
    fn test_finalize_fault_becomes_error_result() {
        let report = run(vec![Box::new(Fixed {
            name: "Broken",
            results: vec![AnalysisResult::success()],
            finalize_fails: true,
        })]);

        assert_eq!(report.results.len(), 1);
        let result = &report.results[0];
        assert_eq!(result.state, ResultState::Error);
        assert_eq!(result.test_name, CRASH_TEST_NAME);
        assert!(result.stdout.as_deref().unwrap().contains("report file missing"));
        assert_eq!(report.metadata.crashed_plugins, vec!["Broken".to_string()]);
    }

    #[test]
    fn test_input_results() {
        let ok = InputSummary {
            name: "a.jsonl".to_string(),
            records: 3,
            opened: true,
            error: None,
        };
        let bad = InputSummary {
            name: "b.jsonl".to_string(),
            records: 0,
            opened: false,
            error: Some("Failed to open".to_string()),
        };
        let unread = InputSummary {
            name: "c.jsonl".to_string(),
            records: 0,
            opened: false,
            error: None,
        };

        assert_eq!(input_result(&ok, false).state, ResultState::Success);
        assert_eq!(input_result(&bad, false).state, ResultState::Error);
        assert_eq!(input_result(&unread, true).state, ResultState::Skipped);
        assert_eq!(input_result(&ok, false).metadata["file"], "a.jsonl");
        assert_eq!(input_result(&ok, false).plugin_name, ENGINE_RESULT_CLASS);
    }
}
