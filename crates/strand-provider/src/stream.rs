use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strand_types::{Chunk, ChunkErrorKind, GroundingSource, UsageChunk};

use crate::error::classify_error;

/// Provider-native stream part taxonomy. Provider boundary parsers translate
/// their wire events into these; anything unrecognised deserializes to
/// [`StreamPart::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    Start,
    StartStep,
    FinishStep {
        #[serde(default, rename = "finishReason", skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    Finish {
        #[serde(default, rename = "finishReason", skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    TextStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    TextDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(alias = "delta")]
        text: String,
    },
    TextEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    ReasoningStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    ReasoningDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(alias = "delta")]
        text: String,
    },
    ReasoningEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    ToolInputStart {
        id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolInputDelta {
        id: String,
        delta: String,
    },
    ToolInputEnd {
        id: String,
    },
    /// A whole tool call in one part, emitted by some providers next to the
    /// start/delta/end sequence for the same call.
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        input: Value,
    },
    Source(SourcePart),
    Usage(UsagePart),
    Error {
        error: Value,
    },
    Abort,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_token_details: Option<InputTokenDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_token_details: Option<OutputTokenDetails>,
    /// Per-provider extras, e.g. `{ "anthropic": { "cacheCreationInputTokens": 12 } }`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputTokenDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputTokenDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl UsagePart {
    fn metadata_count(&self, key: &str) -> Option<u64> {
        self.provider_metadata
            .as_ref()?
            .as_object()?
            .values()
            .find_map(|provider| provider.get(key).and_then(Value::as_u64))
    }

    pub fn cache_reads(&self) -> Option<u64> {
        self.input_token_details
            .as_ref()
            .and_then(|d| d.cache_read_tokens)
            .or(self.cached_input_tokens)
            .or_else(|| self.metadata_count("cacheReadInputTokens"))
    }

    pub fn cache_writes(&self) -> Option<u64> {
        self.input_token_details
            .as_ref()
            .and_then(|d| d.cache_write_tokens)
            .or_else(|| self.metadata_count("cacheCreationInputTokens"))
    }

    pub fn reasoning(&self) -> Option<u64> {
        self.output_token_details
            .as_ref()
            .and_then(|d| d.reasoning_tokens)
            .or(self.reasoning_tokens)
    }
}

pub type PartStream = Pin<Box<dyn Stream<Item = StreamPart> + Send>>;

// ---------------------------------------------------------------------------
// StreamNormalizer
// ---------------------------------------------------------------------------

/// Maps provider stream parts to canonical chunks, one part at a time.
#[derive(Debug, Clone)]
pub struct StreamNormalizer {
    provider_label: String,
}

impl StreamNormalizer {
    pub fn new(provider_label: impl Into<String>) -> Self {
        Self {
            provider_label: provider_label.into(),
        }
    }

    pub fn provider_label(&self) -> &str {
        &self.provider_label
    }

    /// Normalize a single part. Returns at most one chunk; lifecycle parts and
    /// the atomic tool-call part produce none.
    pub fn normalize(&self, part: StreamPart) -> Option<Chunk> {
        match part {
            StreamPart::TextDelta { text, .. } => {
                (!text.is_empty()).then(|| Chunk::Text { text })
            }
            StreamPart::ReasoningDelta { text, .. } => {
                (!text.is_empty()).then(|| Chunk::Reasoning { text })
            }
            StreamPart::ToolInputStart { id, tool_name } => Some(Chunk::ToolCallStart {
                id,
                name: tool_name,
            }),
            StreamPart::ToolInputDelta { id, delta } => Some(Chunk::ToolCallDelta { id, delta }),
            StreamPart::ToolInputEnd { id } => Some(Chunk::ToolCallEnd { id }),
            StreamPart::ToolCall { tool_call_id, .. } => {
                // The start/delta/end sequence already describes this call.
                tracing::debug!(tool_call_id = %tool_call_id, "dropping atomic tool-call part");
                None
            }
            StreamPart::Source(source) => source_to_grounding(source),
            StreamPart::Usage(usage) => Some(Chunk::Usage(UsageChunk {
                tokens_in: usage.input_tokens.unwrap_or(0),
                tokens_out: usage.output_tokens.unwrap_or(0),
                cache_reads: usage.cache_reads(),
                cache_writes: usage.cache_writes(),
                reasoning_tokens: usage.reasoning(),
            })),
            StreamPart::Error { error } => {
                let classified = classify_error(&self.provider_label, &error);
                Some(Chunk::Error {
                    kind: ChunkErrorKind::Provider,
                    message: classified.message,
                })
            }
            StreamPart::Abort => Some(Chunk::Error {
                kind: ChunkErrorKind::Aborted,
                message: format!("{}: request aborted", self.provider_label),
            }),
            StreamPart::Start
            | StreamPart::StartStep
            | StreamPart::FinishStep { .. }
            | StreamPart::Finish { .. }
            | StreamPart::TextStart { .. }
            | StreamPart::TextEnd { .. }
            | StreamPart::ReasoningStart { .. }
            | StreamPart::ReasoningEnd { .. } => None,
            StreamPart::Unknown => {
                tracing::trace!("ignoring unknown stream part");
                None
            }
        }
    }

    /// Lift [`StreamNormalizer::normalize`] over an async part stream.
    pub fn normalize_stream<S>(self, parts: S) -> impl Stream<Item = Chunk> + Send
    where
        S: Stream<Item = StreamPart> + Send,
    {
        parts.filter_map(move |part| futures::future::ready(self.normalize(part)))
    }
}

fn source_to_grounding(source: SourcePart) -> Option<Chunk> {
    let Some(url) = source.url.filter(|u| !u.is_empty()) else {
        tracing::debug!(source_id = ?source.id, "ignoring source without url");
        return None;
    };
    let title = source
        .title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.clone());
    Some(Chunk::Grounding {
        sources: vec![GroundingSource {
            title,
            url,
            snippet: source.snippet,
        }],
    })
}
