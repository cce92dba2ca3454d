//! Upstream chat API wire format types

use serde::{Deserialize, Serialize};

use super::openai::{OpenAiTool, OpenAiToolCall};

// -- Request types --

/// Chat request body posted to the upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuckRequest {
    /// Upstream model name
    pub model: String,
    /// Conversation messages
    pub messages: Vec<DuckMessage>,
    /// Answer customization and built-in tool toggles
    pub metadata: DuckMetadata,
    /// Whether the model may call the supplied tools
    #[serde(rename = "canUseTools")]
    pub can_use_tools: bool,
    /// Whether the upstream may use an approximate location
    #[serde(rename = "canUseApproxLocation")]
    pub can_use_approx_location: bool,
    /// Client tool definitions, forwarded untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    /// Client tool choice, forwarded untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
}

/// Message in the upstream conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuckMessage {
    /// Message role
    pub role: String,
    /// Content (string or array of content parts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<DuckContent>,
    /// Participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    /// Tool call ID this message responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Upstream content: a string or an array of parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DuckContent {
    /// Plain text content
    Text(String),
    /// Array of content parts
    Parts(Vec<DuckContentPart>),
}

/// Individual upstream content part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DuckContentPart {
    /// Text content
    Text {
        /// The text string
        text: String,
    },
    /// Inline image
    Image {
        /// Base64 data URI
        image: String,
        /// MIME type of the image
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Request metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuckMetadata {
    /// Built-in search tool toggles
    #[serde(rename = "toolChoice", default)]
    pub tool_choice: DuckToolChoice,
    /// Answer customization
    #[serde(default)]
    pub customization: DuckCustomization,
}

/// Built-in search tool toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DuckToolChoice {
    /// News search
    #[serde(default)]
    pub news_search: bool,
    /// Video search
    #[serde(default)]
    pub videos_search: bool,
    /// Local business search
    #[serde(default)]
    pub local_search: bool,
    /// Weather forecast lookup
    #[serde(default)]
    pub weather_forecast: bool,
}

/// Answer customization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuckCustomization {
    /// Extra instructions for the model
    #[serde(default)]
    pub additional_instructions: String,
    /// Ask a clarifying question instead of guessing
    #[serde(default)]
    pub should_seek_clarity: bool,
}

// -- Streaming types --

/// One `data:` event of the upstream chat stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuckStreamEvent {
    /// "success" for content events, "error" for in-band failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Author role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Upstream response id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Upstream model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Creation timestamp in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    /// Explicit finish reason
    #[serde(
        default,
        alias = "finishReason",
        skip_serializing_if = "Option::is_none"
    )]
    pub finish_reason: Option<String>,
    /// Tool call fragments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<DuckToolCallFragment>>,
    /// Status of an in-band error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Code of an in-band error (e.g. `ERR_CONVERSATION_LIMIT`)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl DuckStreamEvent {
    /// Whether the event reports an in-band error
    pub fn is_error(&self) -> bool {
        self.action.as_deref() == Some("error")
    }
}

/// Partial tool call within a stream event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuckToolCallFragment {
    /// Index within the `tool_calls` array
    #[serde(default)]
    pub index: u32,
    /// Tool call ID (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Partial function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<DuckFunctionFragment>,
}

/// Partial function call within a tool call fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuckFunctionFragment {
    /// Function name (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental arguments fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
