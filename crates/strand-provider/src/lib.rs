pub mod assembler;
pub mod client;
pub mod convert;
pub mod driver;
pub mod error;
pub mod providers;
pub mod schema;
pub mod stream;

pub use assembler::{MalformedToolCall, ToolCall, ToolCallAssembler, ToolCallOutcome, ToolCallPhase};
pub use client::{run_turn, CreateMessageOptions, ProviderClient, ToolProtocol, TurnError, TurnRequest};
pub use convert::{
    convert_messages, flatten_text_content, to_openai_chat_messages, ConvertOptions, ToolResultOutput,
    ToolResultPart, WireContent, WireMessage, WirePart, UNKNOWN_TOOL_NAME,
};
pub use driver::{drive_response, drive_response_with, ResponseError, ResponseOutcome};
pub use error::{classify_error, classify_native_error, ClassifiedError, ConversionError, ErrorCause};
pub use providers::{decode_sse, AnthropicStreamParser, OpenAiStreamParser, SseDecoder, SseParser};
pub use schema::{convert_tool, convert_tools, prepare_parameters, FunctionSpec, FunctionTool};
pub use stream::{PartStream, StreamNormalizer, StreamPart, UsagePart};
