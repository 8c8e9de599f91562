use anyhow::Context;
use std::fs;
use std::path::Path;
use strand_config::Config;
use strand_provider::{
    decode_sse, drive_response_with, AnthropicStreamParser, OpenAiStreamParser, ResponseOutcome,
    StreamNormalizer, StreamPart,
};
use strand_types::Chunk;
use tokio_util::sync::CancellationToken;

use crate::cli::StreamInput;
use crate::util::print_json;

pub(crate) async fn handle_normalize_command(
    config: &Config,
    parts: &Path,
    provider: Option<&str>,
    input: StreamInput,
) -> anyhow::Result<()> {
    let content = fs::read_to_string(parts)
        .with_context(|| format!("Failed to read {}", parts.display()))?;
    let parts = load_parts(&content, input)?;

    let label = provider
        .map(|id| config.provider_label(id))
        .unwrap_or_else(|| "provider".to_string());
    let normalizer = StreamNormalizer::new(label);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut printed = Ok(());
    let outcome = drive_response_with(
        futures::stream::iter(parts),
        &normalizer,
        &cancel,
        |chunk: &Chunk| {
            if printed.is_ok() {
                printed = serde_json::to_string(chunk).map(|line| println!("{}", line));
            }
        },
    )
    .await;
    printed?;

    log_outcome(&outcome);
    print_json(&outcome)
}

/// Parse a recorded stream into provider parts.
pub(crate) fn load_parts(content: &str, input: StreamInput) -> anyhow::Result<Vec<StreamPart>> {
    match input {
        StreamInput::Parts => content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Invalid stream part on line {}", index + 1))
            })
            .collect(),
        StreamInput::OpenaiSse => Ok(decode_sse(OpenAiStreamParser::new(), content)),
        StreamInput::AnthropicSse => Ok(decode_sse(AnthropicStreamParser::new(), content)),
    }
}

fn log_outcome(outcome: &ResponseOutcome) {
    let completed = outcome.completed_tool_calls().count();
    let malformed = outcome.tool_calls.len() - completed;
    if outcome.cancelled {
        tracing::warn!(
            discarded = outcome.discarded_tool_calls.len(),
            "stream cancelled before completion"
        );
    }
    tracing::info!(
        text_len = outcome.text.len(),
        tool_calls = completed,
        malformed,
        errors = outcome.errors.len(),
        "stream normalized"
    );
}
