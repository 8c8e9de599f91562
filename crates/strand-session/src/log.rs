use serde::{Deserialize, Serialize};

/// One entry of the append-only conversation log.
///
/// `ts` is the message id: deliveries sharing a `ts` are revisions of the same
/// logical message, and the last one with `partial == false` is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: i64,
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    /// Agent-originated output.
    Say { say: SayType },
    /// The agent is waiting on the user.
    Ask { ask: AskType },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SayType {
    Text,
    Reasoning,
    ApiReqStarted,
    ApiReqFinished,
    ApiReqRetried,
    ApiReqRetryDelayed,
    ApiReqDeleted,
    CheckpointSaved,
    CommandOutput,
    CompletionResult,
    UserFeedback,
    UserFeedbackDiff,
    Error,
    ToolError,
    DiffError,
    CondenseContext,
    CondenseContextError,
    McpServerRequestStarted,
    McpServerResponse,
    SubtaskResult,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskType {
    Followup,
    Command,
    CommandOutput,
    CompletionResult,
    Tool,
    ApiReqFailed,
    ResumeTask,
    ResumeCompletedTask,
    UseMcpServer,
    MistakeLimitReached,
    #[serde(other)]
    Unknown,
}

impl LogEvent {
    pub fn say(ts: i64, say: SayType, text: impl Into<String>) -> Self {
        Self {
            ts,
            kind: EventKind::Say { say },
            text: Some(text.into()),
            partial: false,
        }
    }

    pub fn ask(ts: i64, ask: AskType, text: impl Into<String>) -> Self {
        Self {
            ts,
            kind: EventKind::Ask { ask },
            text: Some(text.into()),
            partial: false,
        }
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn say_type(&self) -> Option<SayType> {
        match self.kind {
            EventKind::Say { say } => Some(say),
            EventKind::Ask { .. } => None,
        }
    }

    pub fn ask_type(&self) -> Option<AskType> {
        match self.kind {
            EventKind::Ask { ask } => Some(ask),
            EventKind::Say { .. } => None,
        }
    }

    /// Bookkeeping events that never show up in the timeline.
    pub fn is_hidden(&self) -> bool {
        matches!(
            self.say_type(),
            Some(
                SayType::ApiReqStarted
                    | SayType::ApiReqFinished
                    | SayType::ApiReqRetried
                    | SayType::ApiReqDeleted
                    | SayType::CheckpointSaved
            )
        )
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_flat() {
        let event = LogEvent::say(1700, SayType::ApiReqStarted, "{}");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"ts": 1700, "type": "say", "say": "api_req_started", "text": "{}"})
        );

        let parsed: LogEvent = serde_json::from_value(json!({
            "ts": 1701,
            "type": "ask",
            "ask": "command",
            "text": "cargo test",
            "partial": true
        }))
        .unwrap();
        assert_eq!(parsed, LogEvent::ask(1701, AskType::Command, "cargo test").partial());
    }

    #[test]
    fn unknown_subtypes_are_tolerated() {
        let parsed: LogEvent = serde_json::from_value(json!({
            "ts": 5,
            "type": "say",
            "say": "browser_action_launch"
        }))
        .unwrap();
        assert_eq!(parsed.say_type(), Some(SayType::Unknown));
        assert_eq!(parsed.text(), "");
    }

    #[test]
    fn hidden_subtypes() {
        assert!(LogEvent::say(1, SayType::CheckpointSaved, "abc").is_hidden());
        assert!(LogEvent::say(1, SayType::ApiReqStarted, "{}").is_hidden());
        assert!(!LogEvent::say(1, SayType::CondenseContext, "").is_hidden());
        assert!(!LogEvent::ask(1, AskType::Tool, "{}").is_hidden());
    }
}
