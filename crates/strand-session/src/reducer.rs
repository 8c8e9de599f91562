use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::log::{AskType, LogEvent, SayType};
use crate::tool_usage::ToolUsageStats;
use crate::usage::{ApiRequestInfo, CondensePayload, UsageAccumulator, UsageSnapshot};

/// Whether the task was just created or restored from saved history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskOrigin {
    #[default]
    NewTask,
    Resumed,
}

/// A visible log entry, with the command text attached to command output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub event: LogEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// What changed as a result of applying events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceOutcome {
    pub usage_changed: bool,
    pub tool_usage_changed: bool,
}

impl ReduceOutcome {
    fn merge(self, other: ReduceOutcome) -> Self {
        Self {
            usage_changed: self.usage_changed || other.usage_changed,
            tool_usage_changed: self.tool_usage_changed || other.tool_usage_changed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReducedLog {
    pub timeline: Vec<TimelineItem>,
    pub usage: UsageSnapshot,
    pub tool_usage: ToolUsageStats,
}

#[derive(Debug, thiserror::Error)]
pub enum LogPayloadError {
    #[error("event {ts}: missing payload")]
    Missing { ts: i64 },
    #[error("event {ts}: invalid payload: {source}")]
    Invalid {
        ts: i64,
        #[source]
        source: serde_json::Error,
    },
}

const EXECUTE_COMMAND_TOOL: &str = "execute_command";
const USE_MCP_TOOL: &str = "use_mcp_tool";
const APPLY_DIFF_TOOL: &str = "apply_diff";

// ============================================================================
// ConversationLogReducer
// ============================================================================

/// Folds the conversation log into a deduplicated timeline plus usage and
/// tool-usage totals.
///
/// Deliveries may repeat, arrive partially, or replay history already seen.
/// Totals are only folded the first time an id is finalized, so re-applying
/// any prefix of the log is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ConversationLogReducer {
    origin: TaskOrigin,
    seen: HashSet<i64>,
    timeline: BTreeMap<i64, TimelineItem>,
    usage: UsageAccumulator,
    tool_usage: ToolUsageStats,
    echo: Option<LogEvent>,
    pending_command: Option<(i64, String)>,
    consumed_commands: HashSet<i64>,
    output_commands: HashMap<i64, String>,
}

impl ConversationLogReducer {
    pub fn new(origin: TaskOrigin) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    pub fn origin(&self) -> TaskOrigin {
        self.origin
    }

    pub fn usage(&self) -> &UsageSnapshot {
        self.usage.snapshot()
    }

    pub fn tool_usage(&self) -> &ToolUsageStats {
        &self.tool_usage
    }

    /// Visible events in timestamp order.
    pub fn timeline(&self) -> impl Iterator<Item = &TimelineItem> {
        self.timeline.values()
    }

    pub fn is_finalized(&self, ts: i64) -> bool {
        self.seen.contains(&ts)
    }

    pub fn apply_batch<'a, I>(&mut self, events: I) -> ReduceOutcome
    where
        I: IntoIterator<Item = &'a LogEvent>,
    {
        events
            .into_iter()
            .fold(ReduceOutcome::default(), |acc, event| acc.merge(self.apply(event)))
    }

    pub fn apply(&mut self, event: &LogEvent) -> ReduceOutcome {
        if self.seen.contains(&event.ts) {
            tracing::trace!(ts = event.ts, "dropping redelivery of finalized event");
            return ReduceOutcome::default();
        }

        let usage_before = self.usage.snapshot().clone();
        let tools_before = self.tool_usage.clone();

        self.track_command(event);

        if !event.is_hidden() && !self.is_echo(event) {
            let command = self.command_for(event);
            self.timeline.insert(
                event.ts,
                TimelineItem {
                    event: event.clone(),
                    command,
                },
            );
        }

        if !event.partial {
            self.seen.insert(event.ts);
            self.fold_usage(event);
            self.fold_tool_usage(event);
        }

        ReduceOutcome {
            usage_changed: self.usage.snapshot().has_changed(&usage_before),
            tool_usage_changed: self.tool_usage.has_changed(&tools_before),
        }
    }

    pub fn snapshot(&self) -> ReducedLog {
        ReducedLog {
            timeline: self.timeline().cloned().collect(),
            usage: self.usage().clone(),
            tool_usage: self.tool_usage.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // timeline
    // ------------------------------------------------------------------------

    /// The earliest text say-event of a new task repeats the user's prompt.
    ///
    /// Suppression follows the lowest `ts` seen so far; an event displaced by
    /// an earlier one is put back in the timeline.
    fn is_echo(&mut self, event: &LogEvent) -> bool {
        if self.origin != TaskOrigin::NewTask || event.say_type() != Some(SayType::Text) {
            return false;
        }
        match self.echo.as_ref().map(|echo| echo.ts) {
            Some(echo_ts) if event.ts > echo_ts => false,
            Some(echo_ts) if event.ts == echo_ts => {
                self.echo = Some(event.clone());
                true
            }
            _ => {
                tracing::debug!(ts = event.ts, "suppressing first-turn echo");
                if let Some(displaced) = self.echo.replace(event.clone()) {
                    tracing::debug!(ts = displaced.ts, "restoring displaced echo candidate");
                    let command = self.command_for(&displaced);
                    self.timeline.insert(
                        displaced.ts,
                        TimelineItem {
                            event: displaced,
                            command,
                        },
                    );
                }
                self.timeline.remove(&event.ts);
                true
            }
        }
    }

    fn track_command(&mut self, event: &LogEvent) {
        if event.ask_type() == Some(AskType::Command) {
            // A late revision of a command that already has its output must
            // not attach to the next one.
            if !self.consumed_commands.contains(&event.ts) {
                self.pending_command = Some((event.ts, event.text().to_string()));
            }
            return;
        }
        if event.say_type() == Some(SayType::CommandOutput) {
            if !self.output_commands.contains_key(&event.ts) {
                if let Some((command_ts, command)) = self.pending_command.take() {
                    self.consumed_commands.insert(command_ts);
                    self.output_commands.insert(event.ts, command);
                }
            }
            return;
        }
        // Hidden bookkeeping and the command-output prompt sit between a
        // command and its output without breaking the pair.
        if !event.is_hidden() && event.ask_type() != Some(AskType::CommandOutput) {
            self.pending_command = None;
        }
    }

    fn command_for(&self, event: &LogEvent) -> Option<String> {
        self.output_commands.get(&event.ts).cloned()
    }

    // ------------------------------------------------------------------------
    // usage
    // ------------------------------------------------------------------------

    fn fold_usage(&mut self, event: &LogEvent) {
        match event.say_type() {
            Some(SayType::ApiReqStarted) => match parse_payload::<ApiRequestInfo>(event) {
                Ok(info) => self.usage.add_request(event.ts, &info),
                Err(err) => tracing::warn!(error = %err, "skipping api request usage"),
            },
            Some(SayType::CondenseContext) => match parse_payload::<CondensePayload>(event) {
                Ok(payload) => self.usage.add_condense(event.ts, &payload.context_condense),
                Err(err) => tracing::warn!(error = %err, "skipping condense usage"),
            },
            _ => {}
        }
    }

    fn fold_tool_usage(&mut self, event: &LogEvent) {
        if let Some(ask) = event.ask_type() {
            let tool = match ask {
                AskType::Tool => payload_field(event, "tool"),
                AskType::Command => Some(EXECUTE_COMMAND_TOOL.to_string()),
                AskType::UseMcpServer => {
                    Some(payload_field(event, "toolName").unwrap_or_else(|| USE_MCP_TOOL.to_string()))
                }
                _ => None,
            };
            if let Some(tool) = tool {
                self.tool_usage.record_attempt(&tool);
            }
            return;
        }

        let failed = match event.say_type() {
            Some(SayType::ToolError) => payload_field(event, "tool"),
            Some(SayType::DiffError) => Some(APPLY_DIFF_TOOL.to_string()),
            _ => None,
        };
        if let Some(tool) = failed {
            self.tool_usage.record_failure(&tool);
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(event: &LogEvent) -> Result<T, LogPayloadError> {
    let text = event
        .text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or(LogPayloadError::Missing { ts: event.ts })?;
    serde_json::from_str(text).map_err(|source| LogPayloadError::Invalid {
        ts: event.ts,
        source,
    })
}

fn payload_field(event: &LogEvent, key: &str) -> Option<String> {
    match parse_payload::<Value>(event) {
        Ok(payload) => payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        Err(err) => {
            tracing::warn!(error = %err, key, "tool name unavailable");
            None
        }
    }
}

/// Fold a whole log from scratch.
pub fn reduce(events: &[LogEvent], origin: TaskOrigin) -> ReducedLog {
    let mut reducer = ConversationLogReducer::new(origin);
    reducer.apply_batch(events);
    reducer.snapshot()
}
