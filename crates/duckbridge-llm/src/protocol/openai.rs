//! Client-facing chat completions wire format
//!
//! Inbound types are only ever read from client bodies and outbound types are
//! only ever written, so each side derives just the direction it needs. Tool
//! shapes travel both ways because the upstream accepts them verbatim.

use serde::{Deserialize, Serialize};

use super::duck::DuckMetadata;

// -- Inbound --

/// Body of `POST /v1/chat/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<OpenAiStop>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub stream_options: Option<OpenAiStreamOptions>,
    #[serde(default)]
    pub tools: Option<Vec<OpenAiTool>>,
    /// `"none"`, `"auto"`, `"required"` or a named function; interpreted later
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
    /// Upstream customization, accepted in the upstream's own camelCase shape
    #[serde(default)]
    pub metadata: Option<DuckMetadata>,
}

/// `stop` accepts a bare string as well as a list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OpenAiStop {
    One(String),
    Many(Vec<String>),
}

impl OpenAiStop {
    /// Normalize to a list
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(stop) => vec![stop],
            Self::Many(stops) => stops,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamOptions {
    #[serde(default)]
    pub include_usage: bool,
}

/// One conversation turn as a client sends it
///
/// `role` stays a string here so an unknown role surfaces as a validation
/// message rather than a body parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<OpenAiContent>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

/// Remote URL or `data:` URI; `detail` is accepted and ignored upstream
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiImageUrl {
    pub url: String,
    #[serde(default)]
    pub detail: Option<String>,
}

// -- Tools, both directions --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunction,
}

/// Function schema, forwarded without interpretation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    /// `strict` and anything newer
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A function call, either replayed from history or produced by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    pub function: OpenAiFunctionCall,
}

fn function_type() -> String {
    FUNCTION.to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON text, not a JSON value
    #[serde(default)]
    pub arguments: String,
}

/// The only tool type the API defines
pub const FUNCTION: &str = "function";

// -- Outbound --

/// Non-streaming answer
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiChoice {
    pub index: u32,
    pub message: OpenAiChoiceMessage,
    pub finish_reason: Option<&'static str>,
}

/// Assistant message; `content` serializes as `null` for tool-only answers
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiChoiceMessage {
    pub role: &'static str,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One `data:` payload of a streamed answer
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiStreamChunk {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    /// Empty on the trailing usage chunk
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiStreamChoice {
    pub index: u32,
    pub delta: OpenAiStreamDelta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OpenAiStreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

/// Streamed tool call
///
/// Calls are only emitted once their arguments are complete, so every field a
/// client would otherwise have to accumulate is present in one delta.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiStreamToolCall {
    pub index: u32,
    #[serde(flatten)]
    pub call: OpenAiToolCall,
}

/// Body of `GET /v1/models`
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiModelList {
    pub object: &'static str,
    pub data: Vec<OpenAiModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiModel {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: String,
}
