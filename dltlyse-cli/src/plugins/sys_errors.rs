//! Search SYS|JOUR for detected errors

use dltlyse_engine::{AnalysisResult, MessageFilter, Plugin, TraceRecord};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

pub const NAME: &str = "SysErrorPlugin";
pub const DESCRIPTION: &str = "Errors found by SYS|JOUR";

const SHARED_LIBRARY_ERROR: &str = "error while loading shared libraries";

pub struct SysErrorPlugin {
    shared_regex: Regex,
    /// error kind -> distinct findings
    errors: BTreeMap<&'static str, BTreeSet<String>>,
}

impl SysErrorPlugin {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            shared_regex: Regex::new(
                r"\[[0-9]*\]: (?P<program>\S*?): error while loading shared libraries: (?P<library>\S*?): cannot open shared object file",
            )?,
            errors: BTreeMap::new(),
        })
    }
}

impl Plugin for SysErrorPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn filters(&self) -> Vec<MessageFilter> {
        vec![MessageFilter::new("SYS", "JOUR")]
    }

    fn handle(&mut self, record: &TraceRecord) -> anyhow::Result<()> {
        let payload = record.payload_decoded();
        if let Some(caps) = self.shared_regex.captures(&payload) {
            self.errors
                .entry(SHARED_LIBRARY_ERROR)
                .or_default()
                .insert(format!("{} failed to load {}", &caps["program"], &caps["library"]));
        }
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>> {
        if self.errors.is_empty() {
            return Ok(vec![AnalysisResult::success().with_message("No errors found")]);
        }

        let message = self.errors.keys().copied().collect::<Vec<_>>().join("\n");
        let stdout = self
            .errors
            .iter()
            .map(|(kind, findings)| {
                let findings: Vec<&str> = findings.iter().map(String::as_str).collect();
                format!("{}:\n{}", kind, findings.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n---\n");

        Ok(vec![AnalysisResult::failure(message).with_stdout(stdout)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dltlyse_engine::ResultState;

    fn journal(text: &str) -> TraceRecord {
        TraceRecord::new("E1", "SYS", "JOUR", text)
    }

    #[test]
    fn test_shared_library_errors_are_collected() {
        let mut plugin = SysErrorPlugin::new().unwrap();
        let line = "2024/01/01 10:00:00.000 [1234]: /usr/bin/navi: error while loading shared libraries: libmap.so.3: cannot open shared object file: No such file or directory";
        plugin.handle(&journal(line)).unwrap();
        plugin.handle(&journal(line)).unwrap();
        plugin.handle(&journal("[1]: systemd: started")).unwrap();

        let results = plugin.finalize().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, ResultState::Failure);
        assert_eq!(results[0].message, SHARED_LIBRARY_ERROR);
        assert_eq!(
            results[0].stdout.as_deref(),
            Some("error while loading shared libraries:\n/usr/bin/navi failed to load libmap.so.3")
        );
    }

    #[test]
    fn test_clean_journal() {
        let mut plugin = SysErrorPlugin::new().unwrap();
        plugin.handle(&journal("[1]: systemd: started")).unwrap();
        let results = plugin.finalize().unwrap();
        assert_eq!(results[0].state, ResultState::Success);
        assert_eq!(results[0].message, "No errors found");
    }
}
