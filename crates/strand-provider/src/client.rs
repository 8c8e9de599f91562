use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strand_types::{Message, ToolDefinition};
use tokio_util::sync::CancellationToken;

use crate::convert::{convert_messages, ConvertOptions, WireMessage};
use crate::driver::{drive_response_with, ResponseOutcome};
use crate::error::{ClassifiedError, ConversionError};
use crate::schema::{convert_tools, FunctionTool};
use crate::stream::{PartStream, StreamNormalizer};

/// How tools are offered to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolProtocol {
    /// Tools are sent as native function definitions.
    #[default]
    Native,
    /// Tools are described in the system prompt; nothing goes in `tools`.
    Xml,
}

#[derive(Debug, Clone, Default)]
pub struct CreateMessageOptions {
    pub tools: Option<Vec<FunctionTool>>,
    pub tool_protocol: ToolProtocol,
}

/// A provider that turns a converted conversation into a stream of
/// provider-native parts.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Human-readable label used as the error message prefix.
    fn label(&self) -> &str;

    async fn create_message(
        &self,
        system_prompt: &str,
        messages: &[WireMessage],
        options: CreateMessageOptions,
    ) -> Result<PartStream, ClassifiedError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Provider(#[from] ClassifiedError),
}

/// Inputs for one outbound turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest<'a> {
    pub system_prompt: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
    pub tool_protocol: ToolProtocol,
    pub convert: ConvertOptions,
}

/// Convert, send and drain one turn.
///
/// Conversion failures return before the provider is contacted.
pub async fn run_turn<C, F>(
    client: &C,
    request: TurnRequest<'_>,
    cancel: &CancellationToken,
    on_chunk: F,
) -> Result<ResponseOutcome, TurnError>
where
    C: ProviderClient + ?Sized,
    F: FnMut(&strand_types::Chunk),
{
    let wire = convert_messages(request.messages, &request.convert)?;
    let tools = match request.tool_protocol {
        ToolProtocol::Native if !request.tools.is_empty() => Some(convert_tools(request.tools)?),
        _ => None,
    };

    tracing::debug!(
        provider = %client.label(),
        messages = wire.len(),
        tools = tools.as_ref().map_or(0, Vec::len),
        protocol = ?request.tool_protocol,
        "sending turn"
    );

    let parts = client
        .create_message(
            request.system_prompt,
            &wire,
            CreateMessageOptions {
                tools,
                tool_protocol: request.tool_protocol,
            },
        )
        .await?;

    let normalizer = StreamNormalizer::new(client.label());
    Ok(drive_response_with(parts, &normalizer, cancel, on_chunk).await)
}
