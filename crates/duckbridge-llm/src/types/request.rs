use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};

/// Parameters controlling text generation
///
/// Validated on the way in; the upstream has no fields for them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionParams {
    /// Sampling temperature (0.0 to 2.0)
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
    /// Frequency penalty (-2.0 to 2.0)
    pub frequency_penalty: Option<f64>,
    /// Presence penalty (-2.0 to 2.0)
    pub presence_penalty: Option<f64>,
    /// Random seed for deterministic generation
    pub seed: Option<i64>,
}

/// Upstream-specific request options a client may send under `metadata`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMetadata {
    /// Answer style customization
    pub customization: Customization,
    /// Built-in search tools the upstream may use
    pub tool_choice: SearchToggles,
}

/// Answer style customization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Customization {
    /// Extra instructions prepended by the upstream
    pub additional_instructions: String,
    /// Ask a clarifying question instead of guessing
    pub should_seek_clarity: bool,
}

/// Toggles for the upstream's built-in search tools
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchToggles {
    /// News search
    pub news_search: bool,
    /// Video search
    pub videos_search: bool,
    /// Local business search
    pub local_search: bool,
    /// Weather forecast lookup
    pub weather_forecast: bool,
}

/// Internal canonical completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Generation parameters
    pub params: CompletionParams,
    /// Tool definitions available to the model
    pub tools: Option<Vec<ToolDefinition>>,
    /// How the model should select tools
    pub tool_choice: Option<ToolChoice>,
    /// Whether to stream the response
    pub stream: bool,
    /// Append a usage chunk to the stream
    pub include_usage: bool,
    /// Upstream-specific options
    pub metadata: Option<ChatMetadata>,
}

impl CompletionRequest {
    /// Whether the request carries at least one tool definition
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }
}
