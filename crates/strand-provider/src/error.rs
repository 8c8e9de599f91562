use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A canonical message list or tool definition could not be converted.
/// These are fatal for the turn and are never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("message {index}: tool call id is empty")]
    EmptyToolCallId { index: usize },

    #[error("message {index}: tool_use blocks are only valid in assistant messages")]
    ToolUseOutsideAssistant { index: usize },

    #[error("message {index}: tool_result blocks are not valid in assistant messages")]
    ToolResultInAssistant { index: usize },

    #[error("tool `{tool}`: invalid schema: {reason}")]
    InvalidToolSchema { tool: String, reason: String },
}

/// The original error kept alongside a classification for upstream logging.
#[derive(Debug, Clone)]
pub enum ErrorCause {
    /// A structured error payload (SDK error object, stream error body, ...).
    Structured(Value),
    /// A native Rust error.
    Native(Arc<dyn std::error::Error + Send + Sync>),
}

/// A provider error reduced to a label, a display message and an optional
/// HTTP status. Whether to retry is left to the caller.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub provider_label: String,
    pub message: String,
    pub status: Option<u16>,
    /// Number of attempts aggregated by a retry wrapper, when the error was one.
    pub attempts: Option<usize>,
    pub cause: ErrorCause,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            ErrorCause::Native(err) => Some(err.as_ref() as &(dyn std::error::Error + 'static)),
            ErrorCause::Structured(_) => None,
        }
    }
}

static OVERFLOW_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)prompt is too long").unwrap(),
        Regex::new(r"(?i)input is too long for requested model").unwrap(),
        Regex::new(r"(?i)exceeds the context window").unwrap(),
        Regex::new(r"(?i)input token count.*exceeds the maximum").unwrap(),
        Regex::new(r"(?i)maximum prompt length is \d+").unwrap(),
        Regex::new(r"(?i)reduce the length of the messages").unwrap(),
        Regex::new(r"(?i)maximum context length is \d+ tokens").unwrap(),
        Regex::new(r"(?i)exceeds the available context size").unwrap(),
        Regex::new(r"(?i)greater than the context length").unwrap(),
        Regex::new(r"(?i)context[_ ]length[_ ]exceeded").unwrap(),
    ]
});

impl ClassifiedError {
    /// Whether the message matches a known "context window exceeded" phrasing.
    /// Informational; callers use it to decide on condensing.
    pub fn is_context_overflow(&self) -> bool {
        OVERFLOW_PATTERNS.iter().any(|p| p.is_match(&self.message))
    }
}

// ---------------------------------------------------------------------------
// classification
// ---------------------------------------------------------------------------

/// Classify a structured error payload by shape.
///
/// Recognised shapes:
/// - retry wrapper: `{ errors: [...], lastError: { message, status? } }`
/// - single call: `{ message, status? }` (`statusCode` is accepted too)
///
/// Anything else falls back to the payload's own message or its string form.
pub fn classify_error(provider_label: &str, error: &Value) -> ClassifiedError {
    if let Some((attempts, last)) = retry_wrapper(error) {
        let status = status_of(last);
        let inner = message_of(last);
        return ClassifiedError {
            provider_label: provider_label.to_string(),
            message: format_message(provider_label, status, &inner),
            status,
            attempts: Some(attempts),
            cause: ErrorCause::Structured(error.clone()),
        };
    }

    let status = status_of(error);
    let inner = message_of(error);
    ClassifiedError {
        provider_label: provider_label.to_string(),
        message: format_message(provider_label, status, &inner),
        status,
        attempts: None,
        cause: ErrorCause::Structured(error.clone()),
    }
}

/// Classify a native error. Only its display text is available, so no status
/// is extracted.
pub fn classify_native_error<E>(provider_label: &str, error: E) -> ClassifiedError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let text = error.to_string();
    ClassifiedError {
        provider_label: provider_label.to_string(),
        message: format_message(provider_label, None, &text),
        status: None,
        attempts: None,
        cause: ErrorCause::Native(Arc::new(error)),
    }
}

fn format_message(provider_label: &str, status: Option<u16>, inner: &str) -> String {
    match status {
        Some(status) => format!("{}: ({}): {}", provider_label, status, inner),
        None => format!("{}: {}", provider_label, inner),
    }
}

fn retry_wrapper(error: &Value) -> Option<(usize, &Value)> {
    let obj = error.as_object()?;
    let errors = obj.get("errors")?.as_array()?;
    let last = obj
        .get("lastError")
        .filter(|v| !v.is_null())
        .or_else(|| errors.last())?;
    Some((errors.len(), last))
}

fn status_of(error: &Value) -> Option<u16> {
    let obj = error.as_object()?;
    let raw = obj.get("status").or_else(|| obj.get("statusCode"))?;
    let status = match raw {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u16::try_from(status).ok().filter(|s| (100..=999).contains(s))
}

fn message_of(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            if let Some(message) = obj
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
            {
                return message.to_string();
            }
            // Stream error bodies nest the message: `{ error: { message } }`.
            if let Some(message) = obj
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
            {
                return message.to_string();
            }
            if let Some(message) = obj
                .get("responseBody")
                .and_then(Value::as_str)
                .and_then(|body| serde_json::from_str::<Value>(body).ok())
                .and_then(|body| {
                    body.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
            {
                return message;
            }
            error.to_string()
        }
        Value::Null => "Unknown error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retry_wrapper_uses_last_error_status() {
        let error = json!({
            "name": "AI_RetryError",
            "errors": [
                {"message": "Too Many Requests", "status": 429},
                {"message": "Too Many Requests", "status": 429},
                {"message": "Too Many Requests", "status": 429}
            ],
            "lastError": {"message": "Too Many Requests", "status": 429}
        });
        let classified = classify_error("Groq", &error);

        assert!(classified.message.contains("Groq:"));
        assert!(classified.message.contains("429"));
        assert_eq!(classified.status, Some(429));
        assert_eq!(classified.attempts, Some(3));
        assert_eq!(classified.message, "Groq: (429): Too Many Requests");
    }

    #[test]
    fn retry_wrapper_without_status() {
        let error = json!({"errors": [{}], "lastError": {"message": "socket hang up"}});
        let classified = classify_error("OpenRouter", &error);
        assert_eq!(classified.message, "OpenRouter: socket hang up");
        assert_eq!(classified.status, None);
    }

    #[test]
    fn single_call_with_status_code_field() {
        let error = json!({"message": "Bad gateway", "statusCode": 502});
        let classified = classify_error("Mistral", &error);
        assert_eq!(classified.status, Some(502));
        assert_eq!(classified.message, "Mistral: (502): Bad gateway");
        assert_eq!(classified.attempts, None);
    }

    #[test]
    fn single_call_without_status() {
        let classified = classify_error("Groq", &json!({"message": "boom"}));
        assert_eq!(classified.message, "Groq: boom");
        assert_eq!(classified.status, None);
    }

    #[test]
    fn nested_stream_error_body() {
        let error = json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}});
        let classified = classify_error("Anthropic", &error);
        assert_eq!(classified.message, "Anthropic: Overloaded");
    }

    #[test]
    fn unknown_shapes_fall_back_to_string_form() {
        assert_eq!(
            classify_error("Groq", &json!("plain failure")).message,
            "Groq: plain failure"
        );
        assert_eq!(classify_error("Groq", &json!(42)).message, "Groq: 42");
        assert_eq!(
            classify_error("Groq", &json!({"code": "E1"})).message,
            r#"Groq: {"code":"E1"}"#
        );
    }

    #[test]
    fn cause_keeps_original_payload() {
        let error = json!({"message": "nope", "status": 401, "extra": true});
        let classified = classify_error("xAI", &error);
        match classified.cause {
            ErrorCause::Structured(value) => assert_eq!(value, error),
            other => panic!("unexpected cause: {:?}", other),
        }
    }

    #[test]
    fn native_errors_keep_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
        let classified = classify_native_error("Ollama", io);
        assert_eq!(classified.message, "Ollama: connection reset");
        assert!(classified.source().is_some());
    }

    #[test]
    fn overflow_detection() {
        let classified = classify_error(
            "OpenAI",
            &json!({"message": "This model's maximum context length is 128000 tokens", "status": 400}),
        );
        assert!(classified.is_context_overflow());
        assert!(!classify_error("OpenAI", &json!({"message": "rate limit"})).is_context_overflow());
    }
}
