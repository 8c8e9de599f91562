use std::collections::BTreeMap;

use serde_json::Value;

use super::SseParser;
use crate::stream::{InputTokenDetails, OutputTokenDetails, StreamPart, UsagePart};

const REASONING_ID: &str = "reasoning-0";
const TEXT_ID: &str = "text-0";

#[derive(Debug, Clone)]
struct OpenCall {
    id: String,
    started: bool,
    /// Argument fragments received before the tool name.
    pending: String,
}

/// Parser for OpenAI-compatible chat-completions streams.
///
/// The first delta of a tool call usually carries its `id`; later deltas only
/// carry the `index`, so ids are tracked per index with a `tool-call-{index}`
/// fallback when the provider never sends one.
#[derive(Debug, Default)]
pub struct OpenAiStreamParser {
    calls: BTreeMap<u64, OpenCall>,
    reasoning_open: bool,
    text_open: bool,
    started: bool,
    finished: bool,
}

impl OpenAiStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn close_reasoning(&mut self, parts: &mut Vec<StreamPart>) {
        if self.reasoning_open {
            self.reasoning_open = false;
            parts.push(StreamPart::ReasoningEnd {
                id: Some(REASONING_ID.to_string()),
            });
        }
    }

    fn close_text(&mut self, parts: &mut Vec<StreamPart>) {
        if self.text_open {
            self.text_open = false;
            parts.push(StreamPart::TextEnd {
                id: Some(TEXT_ID.to_string()),
            });
        }
    }

    fn close_tool_calls(&mut self, parts: &mut Vec<StreamPart>) {
        for (_, call) in std::mem::take(&mut self.calls) {
            if call.started {
                parts.push(StreamPart::ToolInputEnd { id: call.id });
            } else if !call.pending.is_empty() {
                tracing::warn!(
                    tool_call_id = %call.id,
                    "tool call arguments without a name dropped"
                );
            }
        }
    }

    fn finish_parts(&mut self, finish_reason: Option<String>) -> Vec<StreamPart> {
        let mut parts = Vec::new();
        if self.finished {
            return parts;
        }
        self.finished = true;
        self.close_reasoning(&mut parts);
        self.close_text(&mut parts);
        self.close_tool_calls(&mut parts);
        parts.push(StreamPart::FinishStep {
            finish_reason: finish_reason.clone(),
        });
        parts.push(StreamPart::Finish { finish_reason });
        parts
    }

    fn tool_call_parts(&mut self, tc: &Value, parts: &mut Vec<StreamPart>) {
        let index = tc.get("index").and_then(Value::as_u64).unwrap_or(0);
        let explicit_id = tc
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        let call = self.calls.entry(index).or_insert_with(|| OpenCall {
            id: explicit_id
                .map(str::to_string)
                .unwrap_or_else(|| format!("tool-call-{}", index)),
            started: false,
            pending: String::new(),
        });

        let Some(func) = tc.get("function") else {
            return;
        };

        // Some compatible servers send an empty name on follow-up deltas.
        if let Some(name) = func
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
        {
            if !call.started {
                call.started = true;
                parts.push(StreamPart::ToolInputStart {
                    id: call.id.clone(),
                    tool_name: name.to_string(),
                });
                if !call.pending.is_empty() {
                    parts.push(StreamPart::ToolInputDelta {
                        id: call.id.clone(),
                        delta: std::mem::take(&mut call.pending),
                    });
                }
            }
        }

        let fragment = match func.get("arguments") {
            Some(Value::String(s)) => s.clone(),
            // Some proxies send the arguments as an already-parsed object.
            Some(Value::Object(obj)) if !obj.is_empty() => Value::Object(obj.clone()).to_string(),
            _ => String::new(),
        };
        if fragment.is_empty() {
            return;
        }
        if !call.started {
            tracing::debug!(
                tool_call_index = index,
                tool_call_id = %call.id,
                "buffering tool call arguments until name arrives"
            );
            call.pending.push_str(&fragment);
            return;
        }
        parts.push(StreamPart::ToolInputDelta {
            id: call.id.clone(),
            delta: fragment,
        });
    }
}

fn usage_part(usage: &Value) -> UsagePart {
    let count = |v: Option<&Value>| v.and_then(Value::as_u64);
    let cached = count(
        usage
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens")),
    );
    let reasoning = count(
        usage
            .get("completion_tokens_details")
            .and_then(|d| d.get("reasoning_tokens")),
    );
    UsagePart {
        input_tokens: count(usage.get("prompt_tokens")),
        output_tokens: count(usage.get("completion_tokens")),
        input_token_details: cached.map(|cache_read_tokens| InputTokenDetails {
            cache_read_tokens: Some(cache_read_tokens),
            cache_write_tokens: None,
        }),
        output_token_details: reasoning.map(|reasoning_tokens| OutputTokenDetails {
            reasoning_tokens: Some(reasoning_tokens),
        }),
        ..Default::default()
    }
}

impl SseParser for OpenAiStreamParser {
    fn parse_data(&mut self, data: &str) -> Vec<StreamPart> {
        if data == "[DONE]" {
            return self.finish_parts(None);
        }

        let chunk: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unparseable chunk");
                return Vec::new();
            }
        };

        let mut parts = Vec::new();
        if !self.started {
            self.started = true;
            parts.push(StreamPart::Start);
            parts.push(StreamPart::StartStep);
        }

        if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
            parts.push(StreamPart::Error {
                error: error.clone(),
            });
            return parts;
        }

        if let Some(choices) = chunk.get("choices").and_then(Value::as_array) {
            for choice in choices {
                if let Some(delta) = choice.get("delta") {
                    let reasoning = delta
                        .get("reasoning_content")
                        .or_else(|| delta.get("reasoning"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if !reasoning.is_empty() {
                        if !self.reasoning_open {
                            self.reasoning_open = true;
                            parts.push(StreamPart::ReasoningStart {
                                id: Some(REASONING_ID.to_string()),
                            });
                        }
                        parts.push(StreamPart::ReasoningDelta {
                            id: Some(REASONING_ID.to_string()),
                            text: reasoning.to_string(),
                        });
                    }

                    if let Some(text) = delta
                        .get("content")
                        .and_then(Value::as_str)
                        .filter(|t| !t.is_empty())
                    {
                        self.close_reasoning(&mut parts);
                        if !self.text_open {
                            self.text_open = true;
                            parts.push(StreamPart::TextStart {
                                id: Some(TEXT_ID.to_string()),
                            });
                        }
                        parts.push(StreamPart::TextDelta {
                            id: Some(TEXT_ID.to_string()),
                            text: text.to_string(),
                        });
                    }

                    if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
                        if !tool_calls.is_empty() {
                            self.close_reasoning(&mut parts);
                        }
                        for tc in tool_calls {
                            self.tool_call_parts(tc, &mut parts);
                        }
                    }
                }

                if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                    let reason = if reason == "tool_calls" {
                        "tool-calls".to_string()
                    } else {
                        reason.to_string()
                    };
                    if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
                        parts.push(StreamPart::Usage(usage_part(usage)));
                    }
                    parts.extend(self.finish_parts(Some(reason)));
                    return parts;
                }
            }
        }

        // With `stream_options.include_usage` usage arrives on its own chunk.
        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            parts.push(StreamPart::Usage(usage_part(usage)));
        }

        parts
    }

    fn finish(&mut self) -> Vec<StreamPart> {
        if self.started {
            self.finish_parts(None)
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::decode_sse;
    use serde_json::json;

    fn text_chunk(text: &str) -> String {
        json!({"choices": [{"index": 0, "delta": {"content": text}}]}).to_string()
    }

    fn parse_all(chunks: &[Value]) -> Vec<StreamPart> {
        let mut parser = OpenAiStreamParser::new();
        let mut parts = Vec::new();
        for chunk in chunks {
            parts.extend(parser.parse_data(&chunk.to_string()));
        }
        parts.extend(parser.parse_data("[DONE]"));
        parts
    }

    fn tool_parts(parts: &[StreamPart]) -> Vec<StreamPart> {
        parts
            .iter()
            .filter(|p| {
                matches!(
                    p,
                    StreamPart::ToolInputStart { .. }
                        | StreamPart::ToolInputDelta { .. }
                        | StreamPart::ToolInputEnd { .. }
                )
            })
            .cloned()
            .collect()
    }

    #[test]
    fn explicit_id_is_reused_for_index_only_deltas() {
        let parts = parse_all(&[
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_abc", "function": {"name": "read_file", "arguments": ""}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"path\":"}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "\"a\"}"}}]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ]);

        assert_eq!(
            tool_parts(&parts),
            vec![
                StreamPart::ToolInputStart {
                    id: "call_abc".to_string(),
                    tool_name: "read_file".to_string()
                },
                StreamPart::ToolInputDelta {
                    id: "call_abc".to_string(),
                    delta: "{\"path\":".to_string()
                },
                StreamPart::ToolInputDelta {
                    id: "call_abc".to_string(),
                    delta: "\"a\"}".to_string()
                },
                StreamPart::ToolInputEnd {
                    id: "call_abc".to_string()
                },
            ]
        );
        assert!(parts.contains(&StreamPart::Finish {
            finish_reason: Some("tool-calls".to_string())
        }));
        assert_eq!(
            parts
                .iter()
                .filter(|p| matches!(p, StreamPart::Finish { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn missing_id_falls_back_to_index() {
        let parts = parse_all(&[
            json!({"choices": [{"delta": {"tool_calls": [{"index": 1, "function": {"name": "list_files", "arguments": "{}"}}]}}]}),
        ]);
        assert_eq!(
            tool_parts(&parts),
            vec![
                StreamPart::ToolInputStart {
                    id: "tool-call-1".to_string(),
                    tool_name: "list_files".to_string()
                },
                StreamPart::ToolInputDelta {
                    id: "tool-call-1".to_string(),
                    delta: "{}".to_string()
                },
                StreamPart::ToolInputEnd {
                    id: "tool-call-1".to_string()
                },
            ]
        );
    }

    #[test]
    fn arguments_before_name_are_replayed_after_start() {
        let parts = parse_all(&[
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "c9", "function": {"arguments": "{\"path\":"}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"name": "read_file", "arguments": "\"a\"}"}}]}}]}),
        ]);
        assert_eq!(
            tool_parts(&parts),
            vec![
                StreamPart::ToolInputStart {
                    id: "c9".to_string(),
                    tool_name: "read_file".to_string()
                },
                StreamPart::ToolInputDelta {
                    id: "c9".to_string(),
                    delta: "{\"path\":".to_string()
                },
                StreamPart::ToolInputDelta {
                    id: "c9".to_string(),
                    delta: "\"a\"}".to_string()
                },
                StreamPart::ToolInputEnd {
                    id: "c9".to_string()
                },
            ]
        );
    }

    #[test]
    fn nameless_call_emits_nothing() {
        let parts = parse_all(&[
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "c", "function": {"arguments": "{}"}}]}}]}),
        ]);
        assert!(tool_parts(&parts).is_empty());
    }

    #[test]
    fn empty_follow_up_name_does_not_restart() {
        let parts = parse_all(&[
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "c", "function": {"name": "read_file"}}]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"name": "", "arguments": "{}"}}]}}]}),
        ]);
        let starts = parts
            .iter()
            .filter(|p| matches!(p, StreamPart::ToolInputStart { .. }))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn reasoning_then_text_with_usage() {
        let parts = parse_all(&[
            json!({"choices": [{"delta": {"reasoning_content": "think"}}]}),
            json!({"choices": [{"delta": {"content": "answer"}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
            json!({"choices": [], "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 20,
                "prompt_tokens_details": {"cached_tokens": 80},
                "completion_tokens_details": {"reasoning_tokens": 7}
            }}),
        ]);

        let reasoning_end = parts
            .iter()
            .position(|p| matches!(p, StreamPart::ReasoningEnd { .. }))
            .expect("reasoning end");
        let text = parts
            .iter()
            .position(|p| matches!(p, StreamPart::TextDelta { .. }))
            .expect("text delta");
        assert!(reasoning_end < text);

        let usage = parts
            .iter()
            .find_map(|p| match p {
                StreamPart::Usage(u) => Some(u.clone()),
                _ => None,
            })
            .expect("usage part");
        assert_eq!(usage.input_tokens, Some(100));
        assert_eq!(usage.cache_reads(), Some(80));
        assert_eq!(usage.reasoning(), Some(7));
        assert_eq!(usage.cache_writes(), None);
    }

    #[test]
    fn error_chunk_becomes_error_part() {
        let mut parser = OpenAiStreamParser::new();
        let parts =
            parser.parse_data(r#"{"error": {"message": "Rate limit reached", "code": 429}}"#);
        assert!(matches!(parts.last(), Some(StreamPart::Error { .. })));
    }

    #[test]
    fn decodes_raw_body_and_closes_on_eof() {
        let body = format!(
            "data: {}\n\ndata: {}\n\n",
            text_chunk("Hel"),
            json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "x", "function": {"name": "t", "arguments": "{}"}}]}}]})
        );
        let parts = decode_sse(OpenAiStreamParser::new(), &body);
        assert!(parts.contains(&StreamPart::ToolInputEnd {
            id: "x".to_string()
        }));
        assert!(matches!(parts.last(), Some(StreamPart::Finish { .. })));
    }

    #[test]
    fn garbage_is_skipped() {
        let mut parser = OpenAiStreamParser::new();
        assert!(parser.parse_data("not json").is_empty());
    }
}
