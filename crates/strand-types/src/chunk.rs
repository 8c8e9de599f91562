use serde::{Deserialize, Serialize};

/// One canonical, provider-independent stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    /// Incremental assistant text.
    Text { text: String },
    /// Incremental reasoning/thinking text.
    Reasoning { text: String },
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, delta: String },
    ToolCallEnd { id: String },
    Usage(UsageChunk),
    Grounding { sources: Vec<GroundingSource> },
    Error { kind: ChunkErrorKind, message: String },
}

/// Token counts reported by a provider. Optional fields stay `None` when the
/// provider did not report them, which is not the same as reporting zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageChunk {
    pub tokens_in: u64,
    pub tokens_out: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_reads: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_writes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkErrorKind {
    /// The provider reported an error inside the stream.
    Provider,
    /// The provider or transport aborted the response.
    Aborted,
}

impl Chunk {
    pub fn text(text: impl Into<String>) -> Self {
        Chunk::Text { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_chunk_omits_unreported_fields() {
        let chunk = Chunk::Usage(UsageChunk {
            tokens_in: 10,
            tokens_out: 4,
            cache_reads: Some(0),
            ..Default::default()
        });
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(
            value,
            json!({"type": "usage", "tokensIn": 10, "tokensOut": 4, "cacheReads": 0})
        );
    }
}
