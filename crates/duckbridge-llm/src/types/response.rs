use super::message::ToolCall;

/// Why a completion ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of the answer
    Stop,
    /// Output limit reached
    Length,
    /// The model called at least one tool
    ToolCalls,
    /// The upstream withheld or cut the answer
    ContentFilter,
}

impl FinishReason {
    /// Wire name, e.g. `tool_calls`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
        }
    }
}

/// Estimated token counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Tokens in the request messages and tools
    pub prompt_tokens: u32,
    /// Tokens in the generated text and tool calls
    pub completion_tokens: u32,
    /// Sum of both
    pub total_tokens: u32,
}

impl Usage {
    /// Usage with `total_tokens` derived from the parts
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// One alternative answer; the upstream only ever produces index 0
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Position in `choices`
    pub index: u32,
    /// The generated message
    pub message: ChoiceMessage,
    /// Why generation stopped
    pub finish_reason: Option<FinishReason>,
}

/// The assistant's answer
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceMessage {
    /// `None` when the model only called tools
    pub content: Option<String>,
    /// Complete tool calls, `None` when there were none
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChoiceMessage {
    /// Build from everything collected off the stream
    pub fn assistant(text: String, tool_calls: Vec<ToolCall>) -> Self {
        let content = if text.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(text)
        };

        Self {
            content,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        }
    }
}

/// A finished non-streaming completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// `chatcmpl-` prefixed
    pub id: String,
    /// Unix seconds
    pub created: u64,
    /// Model name as the client asked for it
    pub model: String,
    /// Always a single choice
    pub choices: Vec<Choice>,
    /// Estimated token counts
    pub usage: Option<Usage>,
}
