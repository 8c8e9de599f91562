use anyhow::Context;
use std::fs;
use std::path::Path;
use strand_config::Config;
use strand_session::{reduce, LogEvent, TaskOrigin};

use crate::util::print_json;

pub(crate) fn handle_reduce_command(
    config: &Config,
    events: &Path,
    resumed: bool,
) -> anyhow::Result<()> {
    let content = fs::read_to_string(events)
        .with_context(|| format!("Failed to read {}", events.display()))?;
    let events = parse_events(&content)?;

    let origin = if resumed || config.resumed() {
        TaskOrigin::Resumed
    } else {
        TaskOrigin::NewTask
    };
    let reduced = reduce(&events, origin);
    tracing::info!(
        events = events.len(),
        visible = reduced.timeline.len(),
        origin = ?origin,
        "log reduced"
    );
    print_json(&reduced)
}

/// Accepts either a JSON array of events or one event per line.
pub(crate) fn parse_events(content: &str) -> anyhow::Result<Vec<LogEvent>> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).context("Invalid event array");
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", index + 1))
        })
        .collect()
}
