use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strand_types::{ContentBlock, Message, Role};

use crate::error::ConversionError;

/// Tool name used for a tool result whose call id does not match any earlier
/// `tool_use` block.
pub const UNKNOWN_TOOL_NAME: &str = "unknown_tool";

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

/// A message in the provider-facing wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum WireMessage {
    System { content: String },
    User { content: WireContent },
    Assistant { content: WireContent },
    Tool { content: Vec<ToolResultPart> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WirePart {
    Text {
        text: String,
    },
    Image {
        image: String,
        #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "tool-result")]
pub struct ToolResultPart {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub output: ToolResultOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolResultOutput {
    Text { value: String },
    ErrorText { value: String },
}

impl ToolResultOutput {
    pub fn value(&self) -> &str {
        match self {
            ToolResultOutput::Text { value } | ToolResultOutput::ErrorText { value } => value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    /// Collapse all-text content arrays into a single `\n`-joined string.
    pub flatten_text_content: bool,
}

// ---------------------------------------------------------------------------
// convert_messages
// ---------------------------------------------------------------------------

/// Convert the canonical conversation into wire messages.
///
/// Tool results are split out of the turn that carries them into dedicated
/// `tool` messages placed before the rest of that turn's content.
pub fn convert_messages(
    messages: &[Message],
    options: &ConvertOptions,
) -> Result<Vec<WireMessage>, ConversionError> {
    let mut tool_names: HashMap<&str, &str> = HashMap::new();
    let mut converted = Vec::with_capacity(messages.len());

    for (index, message) in messages.iter().enumerate() {
        match message.role {
            Role::Assistant => {
                converted.push(assistant_message(index, message)?);
                tool_names.extend(message.tool_use_ids());
            }
            Role::User | Role::Tool => {
                converted.extend(user_or_tool_messages(index, message, &tool_names)?);
            }
        }
    }

    if options.flatten_text_content {
        converted = flatten_text_content(converted);
    }

    Ok(converted)
}

fn assistant_message(index: usize, message: &Message) -> Result<WireMessage, ConversionError> {
    let mut parts = Vec::with_capacity(message.content.len());

    for block in &message.content {
        match block {
            ContentBlock::Text { text } => parts.push(WirePart::Text { text: text.clone() }),
            ContentBlock::Image { source } => parts.push(WirePart::Image {
                image: source.to_uri(),
                media_type: source.media_type().map(str::to_string),
            }),
            ContentBlock::ToolUse { id, name, input } => {
                if id.is_empty() {
                    return Err(ConversionError::EmptyToolCallId { index });
                }
                parts.push(WirePart::ToolCall {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                    input: input.clone(),
                });
            }
            ContentBlock::ToolResult { .. } => {
                return Err(ConversionError::ToolResultInAssistant { index });
            }
        }
    }

    // Some providers reject an assistant turn with no content at all.
    if parts.is_empty() {
        parts.push(WirePart::Text {
            text: String::new(),
        });
    }

    Ok(WireMessage::Assistant {
        content: WireContent::Parts(parts),
    })
}

fn user_or_tool_messages(
    index: usize,
    message: &Message,
    tool_names: &HashMap<&str, &str>,
) -> Result<Vec<WireMessage>, ConversionError> {
    let mut results = Vec::new();
    let mut rest = Vec::new();

    for block in &message.content {
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                output,
                is_error,
            } => {
                if tool_use_id.is_empty() {
                    return Err(ConversionError::EmptyToolCallId { index });
                }
                let tool_name = match tool_names.get(tool_use_id.as_str()) {
                    Some(name) => name.to_string(),
                    None => {
                        tracing::warn!(
                            tool_call_id = %tool_use_id,
                            message_index = index,
                            "tool result has no matching tool call"
                        );
                        UNKNOWN_TOOL_NAME.to_string()
                    }
                };
                let output = if *is_error {
                    ToolResultOutput::ErrorText {
                        value: output.clone(),
                    }
                } else {
                    ToolResultOutput::Text {
                        value: output.clone(),
                    }
                };
                results.push(ToolResultPart {
                    tool_call_id: tool_use_id.clone(),
                    tool_name,
                    output,
                });
            }
            ContentBlock::Text { text } => rest.push(WirePart::Text { text: text.clone() }),
            ContentBlock::Image { source } => rest.push(WirePart::Image {
                image: source.to_uri(),
                media_type: source.media_type().map(str::to_string),
            }),
            ContentBlock::ToolUse { .. } => {
                return Err(ConversionError::ToolUseOutsideAssistant { index });
            }
        }
    }

    let mut out = Vec::with_capacity(2);
    let had_results = !results.is_empty();
    if had_results {
        out.push(WireMessage::Tool { content: results });
    }
    if !rest.is_empty() {
        out.push(WireMessage::User {
            content: WireContent::Parts(rest),
        });
    } else if !had_results && message.role == Role::User {
        out.push(WireMessage::User {
            content: WireContent::Text(String::new()),
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// flatten_text_content
// ---------------------------------------------------------------------------

/// Collapse every user/assistant content array made only of text parts into a
/// single string joined with `\n`. Messages containing images or tool calls
/// are left untouched.
pub fn flatten_text_content(messages: Vec<WireMessage>) -> Vec<WireMessage> {
    messages
        .into_iter()
        .map(|message| match message {
            WireMessage::User { content } => WireMessage::User {
                content: flatten_content(content),
            },
            WireMessage::Assistant { content } => WireMessage::Assistant {
                content: flatten_content(content),
            },
            other => other,
        })
        .collect()
}

fn flatten_content(content: WireContent) -> WireContent {
    match content {
        WireContent::Parts(parts)
            if parts.iter().all(|p| matches!(p, WirePart::Text { .. })) =>
        {
            let texts: Vec<String> = parts
                .into_iter()
                .filter_map(|p| match p {
                    WirePart::Text { text } => Some(text),
                    _ => None,
                })
                .collect();
            WireContent::Text(texts.join("\n"))
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

/// Render wire messages in the OpenAI-compatible `/chat/completions` shape.
pub fn to_openai_chat_messages(system: Option<&str>, messages: &[WireMessage]) -> Vec<Value> {
    let mut converted = Vec::with_capacity(messages.len() + 1);

    if let Some(system) = system.filter(|s| !s.is_empty()) {
        converted.push(json!({"role": "system", "content": system}));
    }

    for message in messages {
        match message {
            WireMessage::System { content } => {
                converted.push(json!({"role": "system", "content": content}));
            }
            WireMessage::User { content } => {
                converted.push(json!({
                    "role": "user",
                    "content": user_content_to_openai(content),
                }));
            }
            WireMessage::Assistant { content } => {
                converted.push(assistant_message_to_openai(content));
            }
            WireMessage::Tool { content } => {
                for result in content {
                    converted.push(json!({
                        "role": "tool",
                        "tool_call_id": result.tool_call_id,
                        "content": result.output.value(),
                    }));
                }
            }
        }
    }

    converted
}

fn user_content_to_openai(content: &WireContent) -> Value {
    match content {
        WireContent::Text(text) => Value::String(text.clone()),
        WireContent::Parts(parts) => {
            let converted: Vec<Value> = parts
                .iter()
                .filter_map(|part| match part {
                    WirePart::Text { text } => Some(json!({"type": "text", "text": text})),
                    WirePart::Image { image, .. } => Some(json!({
                        "type": "image_url",
                        "image_url": {"url": image},
                    })),
                    WirePart::ToolCall { .. } => None,
                })
                .collect();
            if converted.is_empty() {
                Value::String(String::new())
            } else {
                Value::Array(converted)
            }
        }
    }
}

fn assistant_message_to_openai(content: &WireContent) -> Value {
    let parts = match content {
        WireContent::Text(text) => return json!({"role": "assistant", "content": text}),
        WireContent::Parts(parts) => parts,
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        match part {
            WirePart::Text { text: part_text } => text.push_str(part_text),
            WirePart::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => {
                let arguments =
                    serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string());
                tool_calls.push(json!({
                    "id": tool_call_id,
                    "type": "function",
                    "function": {"name": tool_name, "arguments": arguments},
                }));
            }
            WirePart::Image { .. } => {}
        }
    }

    let mut message = Map::new();
    message.insert("role".to_string(), Value::String("assistant".to_string()));
    if tool_calls.is_empty() {
        message.insert("content".to_string(), Value::String(text));
    } else {
        message.insert(
            "content".to_string(),
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            },
        );
        message.insert("tool_calls".to_string(), Value::Array(tool_calls));
    }
    Value::Object(message)
}
