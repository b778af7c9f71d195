//! OpenAI HTTP payload serde models and conversion helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Content, FunctionCall, GenerationOptions, LlmResponse, Message, ProviderError, TokenUsage,
    ToolCall, ToolDefinition,
};

pub(crate) fn build_api_request(
    messages: Vec<Message>,
    options: &GenerationOptions,
    default_model: &str,
    stream: bool,
) -> Result<ApiRequest, ProviderError> {
    if messages.is_empty() {
        return Err(ProviderError::invalid_request(
            "request requires at least one message",
        ));
    }

    let model = options
        .model
        .clone()
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| default_model.to_string());

    let tools = options
        .tools
        .as_ref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.iter().cloned().map(ApiTool::from).collect());

    Ok(ApiRequest {
        model,
        messages,
        stream,
        temperature: options.temperature,
        top_p: options.top_p,
        max_tokens: options.max_tokens,
        stop: options.stop.clone(),
        frequency_penalty: options.frequency_penalty,
        presence_penalty: options.presence_penalty,
        tools,
        tool_choice: options.tool_choice.clone(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: ApiFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl From<ToolDefinition> for ApiTool {
    fn from(value: ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: ApiFunction {
                name: value.name,
                description: value.description,
                parameters: value.parameters,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
}

pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok()?;
    Some(parsed.error.message)
}

/// Maps a non-2xx HTTP status to the wire error taxonomy.
pub(crate) fn status_to_error(status: u16, message: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::authentication(message),
        429 => ProviderError::rate_limited(message),
        400 | 422 => ProviderError::invalid_request(message),
        500..=599 => ProviderError::server(message),
        _ if message.to_ascii_lowercase().contains("quota") => {
            ProviderError::rate_limited(message)
        }
        _ => ProviderError::unknown(message),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    pub choices: Vec<ApiChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiChoice {
    pub message: ApiAssistantMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiAssistantMessage {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl TryFrom<ApiResponse> for LlmResponse {
    type Error = ProviderError;

    fn try_from(value: ApiResponse) -> Result<Self, Self::Error> {
        let choice = value
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::server("response did not include choices"))?;

        let content = choice
            .message
            .content
            .map(|content| content.flatten_text())
            .unwrap_or_default();

        Ok(Self {
            content,
            reasoning: choice.message.reasoning_content,
            tool_calls: choice.message.tool_calls,
            usage: value.usage,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiStreamChunk {
    #[serde(default)]
    pub choices: Vec<ApiStreamChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiStreamChoice {
    pub delta: ApiDelta,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ApiDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiDeltaToolCall {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<ApiDeltaFunction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiDeltaFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

impl From<ApiDeltaToolCall> for ToolCall {
    fn from(value: ApiDeltaToolCall) -> Self {
        let function = value.function.unwrap_or(ApiDeltaFunction {
            name: None,
            arguments: None,
        });

        Self {
            index: value.index.unwrap_or(0),
            id: value.id.unwrap_or_default(),
            kind: value.kind.unwrap_or_default(),
            function: FunctionCall {
                name: function.name.unwrap_or_default(),
                arguments: function.arguments.unwrap_or_default(),
            },
        }
    }
}

/// Expands one parsed stream chunk into zero or more partial responses.
///
/// A chunk-level `error` field fails the stream with a server error. A chunk
/// carrying `usage` yields an extra empty-content response so that usage
/// always arrives as its own terminal record.
pub(crate) fn chunk_to_responses(chunk: ApiStreamChunk) -> Result<Vec<LlmResponse>, ProviderError> {
    if let Some(error) = chunk.error {
        return Err(ProviderError::server(error.message));
    }

    let mut responses = Vec::new();

    if let Some(choice) = chunk.choices.into_iter().next() {
        let delta = choice.delta;
        responses.push(LlmResponse {
            content: delta.content.unwrap_or_default(),
            reasoning: delta.reasoning_content,
            tool_calls: delta
                .tool_calls
                .map(|calls| calls.into_iter().map(ToolCall::from).collect()),
            usage: None,
        });
    }

    if let Some(usage) = chunk.usage {
        responses.push(LlmResponse::default().with_usage(usage));
    }

    Ok(responses)
}
