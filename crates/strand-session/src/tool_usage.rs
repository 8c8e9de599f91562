use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub attempts: u64,
    pub failures: u64,
}

/// Per-tool attempt and failure counts. Keys are kept sorted so snapshots
/// compare and serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolUsageStats(BTreeMap<String, ToolUsage>);

impl ToolUsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self, tool: &str) {
        self.0.entry(tool.to_string()).or_default().attempts += 1;
    }

    pub fn record_failure(&mut self, tool: &str) {
        self.0.entry(tool.to_string()).or_default().failures += 1;
    }

    pub fn get(&self, tool: &str) -> Option<&ToolUsage> {
        self.0.get(tool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolUsage)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_changed(&self, previous: &ToolUsageStats) -> bool {
        self != previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_and_failures_are_independent() {
        let mut stats = ToolUsageStats::new();
        stats.record_attempt("read_file");
        stats.record_attempt("read_file");
        stats.record_failure("apply_diff");

        assert_eq!(
            stats.get("read_file"),
            Some(&ToolUsage {
                attempts: 2,
                failures: 0
            })
        );
        assert_eq!(stats.get("apply_diff").map(|u| u.failures), Some(1));

        let before = stats.clone();
        assert!(!stats.has_changed(&before));
        stats.record_failure("read_file");
        assert!(stats.has_changed(&before));
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut stats = ToolUsageStats::new();
        stats.record_attempt("execute_command");
        assert_eq!(
            serde_json::to_string(&stats).unwrap(),
            r#"{"execute_command":{"attempts":1,"failures":0}}"#
        );
    }
}
