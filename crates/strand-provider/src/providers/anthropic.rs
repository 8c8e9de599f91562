use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value};

use super::SseParser;
use crate::stream::{InputTokenDetails, SourcePart, StreamPart, UsagePart};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart {
        message: AnthropicMessage,
    },
    ContentBlockStart {
        index: u64,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u64,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u64,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDelta,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessage {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text,
    Thinking,
    RedactedThinking,
    ToolUse {
        id: String,
        name: String,
    },
    ServerToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    CitationsDelta { citation: Citation },
    SignatureDelta,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Citation {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    cited_text: Option<String>,
    #[serde(default)]
    document_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Reasoning,
    Tool,
}

/// Parser for Anthropic Messages API streams.
///
/// Tool ids only appear on `content_block_start`; deltas and stops refer to
/// the block index, so the index is mapped back to the id.
#[derive(Debug, Default)]
pub struct AnthropicStreamParser {
    blocks: HashMap<u64, (BlockKind, String)>,
    input_usage: AnthropicUsage,
    finished: bool,
}

impl AnthropicStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn usage_part(&self, delta: Option<&AnthropicUsage>) -> UsagePart {
        let pick = |f: fn(&AnthropicUsage) -> Option<u64>| {
            delta.and_then(f).or_else(|| f(&self.input_usage))
        };
        let cache_reads = pick(|u| u.cache_read_input_tokens);
        let cache_writes = pick(|u| u.cache_creation_input_tokens);
        let details = (cache_reads.is_some() || cache_writes.is_some()).then(|| InputTokenDetails {
            cache_read_tokens: cache_reads,
            cache_write_tokens: cache_writes,
        });
        UsagePart {
            input_tokens: pick(|u| u.input_tokens),
            output_tokens: delta.and_then(|u| u.output_tokens),
            input_token_details: details,
            provider_metadata: cache_writes.map(|n| {
                json!({"anthropic": {"cacheCreationInputTokens": n}})
            }),
            ..Default::default()
        }
    }
}

impl SseParser for AnthropicStreamParser {
    fn parse_data(&mut self, data: &str) -> Vec<StreamPart> {
        let event: AnthropicEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unparseable event");
                return Vec::new();
            }
        };

        match event {
            AnthropicEvent::MessageStart { message } => {
                self.input_usage = message.usage.unwrap_or_default();
                vec![StreamPart::Start, StreamPart::StartStep]
            }
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::ToolUse { id, name } | ContentBlock::ServerToolUse { id, name } => {
                    self.blocks.insert(index, (BlockKind::Tool, id.clone()));
                    vec![StreamPart::ToolInputStart {
                        id,
                        tool_name: name,
                    }]
                }
                ContentBlock::Text => {
                    let id = index.to_string();
                    self.blocks.insert(index, (BlockKind::Text, id.clone()));
                    vec![StreamPart::TextStart { id: Some(id) }]
                }
                ContentBlock::Thinking | ContentBlock::RedactedThinking => {
                    let id = index.to_string();
                    self.blocks.insert(index, (BlockKind::Reasoning, id.clone()));
                    vec![StreamPart::ReasoningStart { id: Some(id) }]
                }
                ContentBlock::Other => Vec::new(),
            },
            AnthropicEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => vec![StreamPart::TextDelta {
                    id: Some(index.to_string()),
                    text,
                }],
                BlockDelta::ThinkingDelta { thinking } => vec![StreamPart::ReasoningDelta {
                    id: Some(index.to_string()),
                    text: thinking,
                }],
                BlockDelta::InputJsonDelta { partial_json } => match self.blocks.get(&index) {
                    Some((BlockKind::Tool, id)) => vec![StreamPart::ToolInputDelta {
                        id: id.clone(),
                        delta: partial_json,
                    }],
                    _ => {
                        tracing::warn!(block_index = index, "input_json_delta for non-tool block");
                        Vec::new()
                    }
                },
                BlockDelta::CitationsDelta { citation } => {
                    let source_type = match citation.url {
                        Some(_) => "url",
                        None => "document",
                    };
                    vec![StreamPart::Source(SourcePart {
                        source_type: Some(source_type.to_string()),
                        id: None,
                        title: citation.title.or(citation.document_title),
                        url: citation.url,
                        snippet: citation.cited_text,
                    })]
                }
                BlockDelta::SignatureDelta | BlockDelta::Other => Vec::new(),
            },
            AnthropicEvent::ContentBlockStop { index } => match self.blocks.remove(&index) {
                Some((BlockKind::Tool, id)) => vec![StreamPart::ToolInputEnd { id }],
                Some((BlockKind::Text, id)) => vec![StreamPart::TextEnd { id: Some(id) }],
                Some((BlockKind::Reasoning, id)) => vec![StreamPart::ReasoningEnd { id: Some(id) }],
                None => Vec::new(),
            },
            AnthropicEvent::MessageDelta { delta, usage } => {
                let reason = delta.stop_reason.map(|r| match r.as_str() {
                    "tool_use" => "tool-calls".to_string(),
                    "end_turn" | "stop_sequence" => "stop".to_string(),
                    "max_tokens" => "length".to_string(),
                    _ => r,
                });
                vec![
                    StreamPart::Usage(self.usage_part(usage.as_ref())),
                    StreamPart::FinishStep {
                        finish_reason: reason,
                    },
                ]
            }
            AnthropicEvent::MessageStop => {
                self.finished = true;
                vec![StreamPart::Finish {
                    finish_reason: None,
                }]
            }
            AnthropicEvent::Error { error } => vec![StreamPart::Error { error }],
            AnthropicEvent::Ping | AnthropicEvent::Unknown => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<StreamPart> {
        if self.finished {
            return Vec::new();
        }
        // Transport closed mid-message; close tool blocks so their input is
        // still assembled.
        let mut open: Vec<(u64, String)> = self
            .blocks
            .drain()
            .filter(|(_, (kind, _))| *kind == BlockKind::Tool)
            .map(|(index, (_, id))| (index, id))
            .collect();
        open.sort_by_key(|(index, _)| *index);
        open.into_iter()
            .map(|(_, id)| StreamPart::ToolInputEnd { id })
            .collect()
    }
}
