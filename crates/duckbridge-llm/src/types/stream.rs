use super::message::Role;
use super::response::FinishReason;

/// One reframed piece of a streaming completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    /// Choice index this chunk belongs to
    pub index: u32,
    /// Role, present on the first chunk only
    pub role: Option<Role>,
    /// Incremental text content
    pub content: Option<String>,
    /// A complete tool call
    pub tool_call: Option<StreamToolCall>,
    /// Reason generation finished, present on the last chunk only
    pub finish_reason: Option<FinishReason>,
}

/// Tool call emitted once its arguments are complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamToolCall {
    /// Index of this tool call in the `tool_calls` array
    pub index: u32,
    /// Tool call ID
    pub id: String,
    /// Function name
    pub name: String,
    /// Complete JSON arguments
    pub arguments: String,
}

/// Client-side meaning of one upstream stream event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientDelta {
    /// Text fragment
    pub text: Option<String>,
    /// Tool call fragments, possibly partial
    pub tool_fragments: Vec<ToolCallFragment>,
    /// Explicit finish reason
    pub finish_reason: Option<FinishReason>,
}

/// Partial tool call data, keyed by index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    /// Index within the `tool_calls` array
    pub index: u32,
    /// Tool call ID (usually on the first fragment only)
    pub id: Option<String>,
    /// Function name (usually on the first fragment only)
    pub name: Option<String>,
    /// Arguments JSON fragment
    pub arguments: Option<String>,
}
