/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Instructions framing the conversation
    System,
    /// Newer name for `system`; forwarded as is
    Developer,
    /// The human side
    User,
    /// The model
    Assistant,
    /// Result of a tool call, answering an assistant `tool_calls` entry
    Tool,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Developer => "developer",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    /// Inverse of [`Role::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        [Self::System, Self::Developer, Self::User, Self::Assistant, Self::Tool]
            .into_iter()
            .find(|role| role.as_str() == name)
    }
}

/// One turn of the conversation after validation
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Who wrote the turn
    pub role: Role,
    /// `None` only for assistant turns that consist of tool calls
    pub content: Option<Content>,
    /// Optional participant name
    pub name: Option<String>,
    /// Calls the assistant made in this turn
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on `tool` turns
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Plain text turn with no name or tool data
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(Content::Text(text.into())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Message content, either a bare string or typed parts
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Plain text
    Text(String),
    /// Mixed text and image parts, in order
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Text of the content with image parts left out
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect(),
        }
    }
}

/// One element of multipart content
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// Text segment
    Text { text: String },
    /// Remote `http(s)` URL until resolved, then a base64 `data:` URI
    Image { url: String },
}

/// A function call made by the assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Identifier a later `tool` turn refers back to
    pub id: String,
    /// The function invoked
    pub function: FunctionCall,
}

/// Function name and arguments of a [`ToolCall`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// Function name, as offered in the request's tools
    pub name: String,
    /// JSON text
    pub arguments: String,
}
