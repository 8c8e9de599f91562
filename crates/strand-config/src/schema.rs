use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(
        rename = "logLevel",
        alias = "log_level",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_level: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<HashMap<String, ProviderConfig>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderConfig {
    /// Label prefixed to classified error messages, e.g. `"Groq"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(
        rename = "flattenTextContent",
        alias = "flatten_text_content",
        skip_serializing_if = "Option::is_none"
    )]
    pub flatten_text_content: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<WireFormat>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum WireFormat {
    #[default]
    #[serde(rename = "aiSdk", alias = "ai_sdk")]
    AiSdk,
    #[serde(rename = "openaiChat", alias = "openai_chat")]
    OpenAiChat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed: Option<bool>,
}

trait DeepMerge {
    fn deep_merge(&mut self, other: Self);
}

fn merge_option_replace<T>(target: &mut Option<T>, source: Option<T>) {
    if let Some(value) = source {
        *target = Some(value);
    }
}

fn merge_option_deep<T: DeepMerge>(target: &mut Option<T>, source: Option<T>) {
    if let Some(source_value) = source {
        if let Some(target_value) = target {
            target_value.deep_merge(source_value);
        } else {
            *target = Some(source_value);
        }
    }
}

fn merge_option_map_deep_values<T: DeepMerge>(
    target: &mut Option<HashMap<String, T>>,
    source: Option<HashMap<String, T>>,
) {
    let Some(source_map) = source else {
        return;
    };
    match target {
        Some(target_map) => {
            for (key, source_value) in source_map {
                if let Some(target_value) = target_map.get_mut(&key) {
                    target_value.deep_merge(source_value);
                } else {
                    target_map.insert(key, source_value);
                }
            }
        }
        None => *target = Some(source_map),
    }
}

impl DeepMerge for ProviderConfig {
    fn deep_merge(&mut self, other: Self) {
        merge_option_replace(&mut self.label, other.label);
        merge_option_replace(&mut self.flatten_text_content, other.flatten_text_content);
        merge_option_replace(&mut self.format, other.format);
    }
}

impl DeepMerge for SessionConfig {
    fn deep_merge(&mut self, other: Self) {
        merge_option_replace(&mut self.resumed, other.resumed);
    }
}

impl Config {
    /// Merge `other` on top of `self`; values present in `other` win.
    pub fn merge(&mut self, other: Config) {
        merge_option_replace(&mut self.schema, other.schema);
        merge_option_replace(&mut self.log_level, other.log_level);
        merge_option_map_deep_values(&mut self.provider, other.provider);
        merge_option_deep(&mut self.session, other.session);
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.provider.as_ref()?.get(id)
    }

    /// Error label for a provider, falling back to its id.
    pub fn provider_label(&self, id: &str) -> String {
        self.provider(id)
            .and_then(|p| p.label.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn resumed(&self) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.resumed)
            .unwrap_or(false)
    }
}
