//! Count DLTD INTM messages

use dltlyse_engine::{AnalysisResult, MessageFilter, Plugin, TraceRecord};

pub const NAME: &str = "ContextPlugin";
pub const DESCRIPTION: &str = "Count DLTD INTM messages";

#[derive(Debug, Default)]
pub struct ContextPlugin {
    matched_messages: usize,
}

impl Plugin for ContextPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn filters(&self) -> Vec<MessageFilter> {
        vec![MessageFilter::new("DLTD", "INTM")]
    }

    fn handle(&mut self, record: &TraceRecord) -> anyhow::Result<()> {
        if record.is("DLTD", "INTM") {
            self.matched_messages += 1;
        }
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<Vec<AnalysisResult>> {
        let result = if self.matched_messages > 0 {
            AnalysisResult::success()
                .with_stdout(format!("found {} DLTD INTM messages", self.matched_messages))
        } else {
            AnalysisResult::failure("could not find any DLTD INTM messages in the trace")
        };
        Ok(vec![result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dltlyse_engine::ResultState;

    #[test]
    fn test_counts_daemon_messages() {
        let mut plugin = ContextPlugin::default();
        plugin.handle(&TraceRecord::new("E1", "DLTD", "INTM", "Daemon launched. Starting to output traces...")).unwrap();
        plugin.handle(&TraceRecord::new("E1", "DLTD", "INTM", "ApplicationID 'SYS' registered")).unwrap();

        let results = plugin.finalize().unwrap();
        assert_eq!(results[0].state, ResultState::Success);
        assert_eq!(results[0].stdout.as_deref(), Some("found 2 DLTD INTM messages"));
    }

    #[test]
    fn test_no_messages_is_a_failure() {
        let results = ContextPlugin::default().finalize().unwrap();
        assert_eq!(results[0].state, ResultState::Failure);
    }
}
