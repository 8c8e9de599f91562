use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use strand_provider::{
    decode_sse, run_turn, ClassifiedError, CreateMessageOptions, OpenAiStreamParser, PartStream,
    ProviderClient, ToolCallOutcome, ToolProtocol, TurnError, TurnRequest, WireMessage,
};
use strand_types::{ContentBlock, Message, Role, ToolDefinition};
use tokio_util::sync::CancellationToken;

/// Replays a recorded SSE body and remembers what it was asked to send.
struct RecordedClient {
    body: String,
    sent: Mutex<Option<(Vec<WireMessage>, CreateMessageOptions)>>,
}

impl RecordedClient {
    fn new(body: String) -> Self {
        Self {
            body,
            sent: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ProviderClient for RecordedClient {
    fn label(&self) -> &str {
        "Groq"
    }

    async fn create_message(
        &self,
        _system_prompt: &str,
        messages: &[WireMessage],
        options: CreateMessageOptions,
    ) -> Result<PartStream, ClassifiedError> {
        *self.sent.lock().unwrap() = Some((messages.to_vec(), options));
        let parts = decode_sse(OpenAiStreamParser::new(), &self.body);
        Ok(Box::pin(futures::stream::iter(parts)))
    }
}

fn sse(events: &[serde_json::Value]) -> String {
    let mut body: String = events
        .iter()
        .map(|e| format!("data: {}\n\n", e))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn history() -> Vec<Message> {
    vec![
        Message::user("list the files"),
        Message::new(
            Role::Assistant,
            vec![ContentBlock::tool_use(
                "call_1",
                "list_files",
                json!({"path": "."}),
            )],
        ),
        Message::new(
            Role::User,
            vec![
                ContentBlock::tool_result("call_1", "a.rs\nb.rs"),
                ContentBlock::text("now read a.rs"),
            ],
        ),
    ]
}

fn read_file_tool() -> ToolDefinition {
    ToolDefinition::new(
        "read_file",
        Some("Read a file".to_string()),
        json!({"type": "object", "properties": {"path": {"type": "string"}}}),
    )
}

#[tokio::test]
async fn full_turn_converts_sends_and_assembles() {
    let client = RecordedClient::new(sse(&[
        json!({"choices": [{"delta": {"content": "Reading."}}]}),
        json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_2", "function": {"name": "read_file", "arguments": "{\"pa"}}]}}]}),
        json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "th\":\"a.rs\"}"}}]}}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}], "usage": {"prompt_tokens": 30, "completion_tokens": 9}}),
    ]));
    let messages = history();
    let tools = vec![read_file_tool()];
    let mut streamed = 0usize;

    let outcome = run_turn(
        &client,
        TurnRequest {
            system_prompt: "You are helpful.",
            messages: &messages,
            tools: &tools,
            ..Default::default()
        },
        &CancellationToken::new(),
        |_| streamed += 1,
    )
    .await
    .expect("turn should succeed");

    assert_eq!(outcome.text, "Reading.");
    assert_eq!(outcome.total_usage().tokens_in, 30);
    match outcome.tool_calls.as_slice() {
        [ToolCallOutcome::Complete(call)] => {
            assert_eq!(call.id, "call_2");
            assert_eq!(call.arguments, json!({"path": "a.rs"}));
        }
        other => panic!("unexpected tool calls: {:?}", other),
    }
    assert!(streamed >= 4);

    let sent = client.sent.lock().unwrap().take().expect("request recorded");
    let (wire, options) = sent;
    assert_eq!(wire.len(), 4);
    match &wire[2] {
        WireMessage::Tool { content } => {
            assert_eq!(content[0].tool_call_id, "call_1");
            assert_eq!(content[0].tool_name, "list_files");
        }
        other => panic!("unexpected message: {:?}", other),
    }
    let tools = options.tools.expect("native tools sent");
    assert!(tools[0].function.strict);
    assert_eq!(tools[0].function.parameters["required"], json!(["path"]));
}

#[tokio::test]
async fn xml_protocol_sends_no_tools() {
    let client = RecordedClient::new(sse(&[json!({"choices": [{"delta": {"content": "hi"}}]})]));
    let messages = vec![Message::user("hi")];
    let tools = vec![read_file_tool()];

    run_turn(
        &client,
        TurnRequest {
            system_prompt: "",
            messages: &messages,
            tools: &tools,
            tool_protocol: ToolProtocol::Xml,
            ..Default::default()
        },
        &CancellationToken::new(),
        |_| {},
    )
    .await
    .expect("turn should succeed");

    let (_, options) = client.sent.lock().unwrap().take().expect("request recorded");
    assert!(options.tools.is_none());
    assert_eq!(options.tool_protocol, ToolProtocol::Xml);
}

#[tokio::test]
async fn conversion_errors_never_reach_the_provider() {
    let client = RecordedClient::new(String::new());
    let messages = vec![Message::new(
        Role::User,
        vec![ContentBlock::tool_use("c", "read_file", json!({}))],
    )];

    let err = run_turn(
        &client,
        TurnRequest {
            messages: &messages,
            ..Default::default()
        },
        &CancellationToken::new(),
        |_| {},
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TurnError::Conversion(_)));
    assert!(client.sent.lock().unwrap().is_none());
}
