use futures::{Stream, StreamExt};
use serde::Serialize;
use strand_types::{Chunk, ChunkErrorKind, GroundingSource, UsageChunk};
use tokio_util::sync::CancellationToken;

use crate::assembler::{ToolCallAssembler, ToolCallOutcome};
use crate::stream::{StreamNormalizer, StreamPart};

/// Everything one provider response produced once the stream has been drained.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOutcome {
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallOutcome>,
    pub usage: Vec<UsageChunk>,
    pub grounding: Vec<GroundingSource>,
    pub errors: Vec<ResponseError>,
    pub cancelled: bool,
    /// Ids of tool calls dropped because the response was cancelled.
    pub discarded_tool_calls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    pub kind: ChunkErrorKind,
    pub message: String,
}

impl ResponseOutcome {
    pub fn completed_tool_calls(&self) -> impl Iterator<Item = &crate::assembler::ToolCall> {
        self.tool_calls.iter().filter_map(|outcome| match outcome {
            ToolCallOutcome::Complete(call) => Some(call),
            ToolCallOutcome::Malformed(_) => None,
        })
    }

    pub fn total_usage(&self) -> UsageChunk {
        self.usage.iter().fold(UsageChunk::default(), |mut acc, u| {
            acc.tokens_in = acc.tokens_in.saturating_add(u.tokens_in);
            acc.tokens_out = acc.tokens_out.saturating_add(u.tokens_out);
            acc.cache_reads = add_optional(acc.cache_reads, u.cache_reads);
            acc.cache_writes = add_optional(acc.cache_writes, u.cache_writes);
            acc.reasoning_tokens = add_optional(acc.reasoning_tokens, u.reasoning_tokens);
            acc
        })
    }

    fn record(&mut self, chunk: Chunk) {
        match chunk {
            Chunk::Text { text } => self.text.push_str(&text),
            Chunk::Reasoning { text } => self.reasoning.push_str(&text),
            Chunk::Usage(usage) => self.usage.push(usage),
            Chunk::Grounding { sources } => self.grounding.extend(sources),
            Chunk::Error { kind, message } => self.errors.push(ResponseError { kind, message }),
            Chunk::ToolCallStart { .. } | Chunk::ToolCallDelta { .. } | Chunk::ToolCallEnd { .. } => {}
        }
    }
}

fn add_optional(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
    }
}

/// Drain a provider part stream into a [`ResponseOutcome`].
pub async fn drive_response<S>(
    parts: S,
    normalizer: &StreamNormalizer,
    cancel: &CancellationToken,
) -> ResponseOutcome
where
    S: Stream<Item = StreamPart> + Send,
{
    drive_response_with(parts, normalizer, cancel, |_| {}).await
}

/// Like [`drive_response`], handing every normalized chunk to `on_chunk` as
/// it arrives so a host can render incrementally.
pub async fn drive_response_with<S, F>(
    parts: S,
    normalizer: &StreamNormalizer,
    cancel: &CancellationToken,
    mut on_chunk: F,
) -> ResponseOutcome
where
    S: Stream<Item = StreamPart> + Send,
    F: FnMut(&Chunk),
{
    let mut parts = Box::pin(parts);
    let mut assembler = ToolCallAssembler::new();
    let mut outcome = ResponseOutcome::default();

    loop {
        let part = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome.discarded_tool_calls = assembler.cancel();
                outcome.cancelled = true;
                tracing::debug!(
                    provider = %normalizer.provider_label(),
                    discarded = outcome.discarded_tool_calls.len(),
                    "response cancelled"
                );
                return outcome;
            }
            part = parts.next() => part,
        };

        let Some(part) = part else { break };
        let Some(chunk) = normalizer.normalize(part) else {
            continue;
        };

        on_chunk(&chunk);
        if let Some(done) = assembler.apply(&chunk) {
            outcome.tool_calls.push(done);
        }
        outcome.record(chunk);
    }

    outcome.tool_calls.extend(assembler.finish());
    outcome
}
