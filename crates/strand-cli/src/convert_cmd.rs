use serde_json::Value;
use std::path::Path;
use strand_config::{Config, WireFormat};
use strand_provider::{convert_messages, convert_tools, to_openai_chat_messages, ConvertOptions, WireMessage};
use strand_types::{Message, ToolDefinition};

use crate::util::{print_json, read_json};

pub(crate) fn handle_convert_command(
    config: &Config,
    messages: &Path,
    provider: Option<&str>,
    system: Option<&str>,
) -> anyhow::Result<()> {
    let messages: Vec<Message> = read_json(messages)?;
    let output = render_messages(config, &messages, provider, system)?;
    print_json(&output)
}

pub(crate) fn handle_schema_command(tools: &Path) -> anyhow::Result<()> {
    let tools: Vec<ToolDefinition> = read_json(tools)?;
    print_json(&convert_tools(&tools)?)
}

/// Convert and render messages in the provider's configured wire format.
pub(crate) fn render_messages(
    config: &Config,
    messages: &[Message],
    provider: Option<&str>,
    system: Option<&str>,
) -> anyhow::Result<Value> {
    let provider_config = provider.and_then(|id| config.provider(id));
    let options = ConvertOptions {
        flatten_text_content: provider_config
            .and_then(|p| p.flatten_text_content)
            .unwrap_or(false),
    };
    let format = provider_config.and_then(|p| p.format).unwrap_or_default();

    let wire = convert_messages(messages, &options)?;
    tracing::debug!(
        provider = ?provider,
        format = ?format,
        messages = wire.len(),
        "converted messages"
    );

    let rendered = match format {
        WireFormat::OpenAiChat => Value::Array(to_openai_chat_messages(system, &wire)),
        WireFormat::AiSdk => {
            let mut all = Vec::with_capacity(wire.len() + 1);
            if let Some(system) = system {
                all.push(WireMessage::System {
                    content: system.to_string(),
                });
            }
            all.extend(wire);
            serde_json::to_value(all)?
        }
    };
    Ok(rendered)
}
