use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strand_types::Chunk;

/// Lifecycle of one tool call inside a single provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallPhase {
    NotStarted,
    Accumulating,
    Complete,
    Malformed,
}

#[derive(Debug, Clone)]
enum ToolCallState {
    Accumulating { name: String, buffer: String },
    Complete,
    Malformed,
}

/// A tool call whose accumulated arguments parsed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool call whose arguments did not parse. The raw text is kept so the
/// caller can report it back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedToolCall {
    pub id: String,
    pub name: String,
    pub raw: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallOutcome {
    Complete(ToolCall),
    Malformed(MalformedToolCall),
}

impl ToolCallOutcome {
    pub fn id(&self) -> &str {
        match self {
            ToolCallOutcome::Complete(call) => &call.id,
            ToolCallOutcome::Malformed(call) => &call.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolCallOutcome::Complete(call) => &call.name,
            ToolCallOutcome::Malformed(call) => &call.name,
        }
    }
}

/// Per-call-id state machine assembling streamed tool-call fragments.
///
/// Protocol violations (duplicate start, orphan delta or end, empty id) are
/// logged and ignored so the rest of the stream keeps flowing.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: HashMap<String, ToolCallState>,
    order: Vec<String>,
    cancelled: bool,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, id: &str) -> ToolCallPhase {
        match self.calls.get(id) {
            None => ToolCallPhase::NotStarted,
            Some(ToolCallState::Accumulating { .. }) => ToolCallPhase::Accumulating,
            Some(ToolCallState::Complete) => ToolCallPhase::Complete,
            Some(ToolCallState::Malformed) => ToolCallPhase::Malformed,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Ids of calls that have started but not ended, in start order.
    pub fn open_calls(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| matches!(self.calls.get(*id), Some(ToolCallState::Accumulating { .. })))
            .cloned()
            .collect()
    }

    pub fn start(&mut self, id: &str, name: &str) {
        if self.cancelled {
            return;
        }
        if id.is_empty() {
            tracing::warn!(tool_name = %name, "tool call start with empty id ignored");
            return;
        }
        if let Some(existing) = self.calls.get(id) {
            tracing::warn!(
                tool_call_id = %id,
                tool_name = %name,
                state = ?existing,
                "duplicate tool call start ignored"
            );
            return;
        }
        self.calls.insert(
            id.to_string(),
            ToolCallState::Accumulating {
                name: name.to_string(),
                buffer: String::new(),
            },
        );
        self.order.push(id.to_string());
    }

    pub fn delta(&mut self, id: &str, fragment: &str) {
        if self.cancelled {
            return;
        }
        match self.calls.get_mut(id) {
            Some(ToolCallState::Accumulating { buffer, .. }) => buffer.push_str(fragment),
            Some(_) => {
                tracing::warn!(tool_call_id = %id, "tool call delta after end ignored");
            }
            None => {
                tracing::warn!(tool_call_id = %id, "orphan tool call delta ignored");
            }
        }
    }

    /// Close a call and parse its buffer. Returns `None` for ids that are not
    /// accumulating.
    pub fn end(&mut self, id: &str) -> Option<ToolCallOutcome> {
        if self.cancelled {
            return None;
        }
        let (name, buffer) = match self.calls.get_mut(id) {
            Some(ToolCallState::Accumulating { name, buffer }) => {
                (std::mem::take(name), std::mem::take(buffer))
            }
            Some(_) => {
                tracing::warn!(tool_call_id = %id, "tool call end after end ignored");
                return None;
            }
            None => {
                tracing::warn!(tool_call_id = %id, "orphan tool call end ignored");
                return None;
            }
        };

        let outcome = parse_arguments(id, name, buffer);
        let state = match &outcome {
            ToolCallOutcome::Complete(_) => ToolCallState::Complete,
            ToolCallOutcome::Malformed(call) => {
                tracing::warn!(
                    tool_call_id = %id,
                    tool_name = %call.name,
                    error = %call.error,
                    "tool call arguments failed to parse"
                );
                ToolCallState::Malformed
            }
        };
        self.calls.insert(id.to_string(), state);
        Some(outcome)
    }

    /// Feed one canonical chunk. Non tool-call chunks are ignored.
    pub fn apply(&mut self, chunk: &Chunk) -> Option<ToolCallOutcome> {
        match chunk {
            Chunk::ToolCallStart { id, name } => {
                self.start(id, name);
                None
            }
            Chunk::ToolCallDelta { id, delta } => {
                self.delta(id, delta);
                None
            }
            Chunk::ToolCallEnd { id } => self.end(id),
            _ => None,
        }
    }

    /// Discard every call that has not ended and ignore all further input.
    /// Returns the discarded ids.
    pub fn cancel(&mut self) -> Vec<String> {
        let discarded = self.open_calls();
        for id in &discarded {
            tracing::warn!(tool_call_id = %id, "tool call discarded on cancel");
            self.calls.remove(id);
        }
        self.order.retain(|id| self.calls.contains_key(id));
        self.cancelled = true;
        discarded
    }

    /// Close every call still accumulating at end of stream, in start order,
    /// as if its `end` had arrived.
    pub fn finish(&mut self) -> Vec<ToolCallOutcome> {
        let open = self.open_calls();
        let mut outcomes = Vec::with_capacity(open.len());
        for id in open {
            tracing::debug!(tool_call_id = %id, "closing tool call at end of stream");
            if let Some(outcome) = self.end(&id) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

fn parse_arguments(id: &str, name: String, buffer: String) -> ToolCallOutcome {
    if buffer.trim().is_empty() {
        return ToolCallOutcome::Malformed(MalformedToolCall {
            id: id.to_string(),
            name,
            raw: buffer,
            error: "empty arguments".to_string(),
        });
    }
    match serde_json::from_str::<Value>(&buffer) {
        Ok(arguments) => ToolCallOutcome::Complete(ToolCall {
            id: id.to_string(),
            name,
            arguments,
        }),
        Err(err) => ToolCallOutcome::Malformed(MalformedToolCall {
            id: id.to_string(),
            name,
            raw: buffer,
            error: err.to_string(),
        }),
    }
}
