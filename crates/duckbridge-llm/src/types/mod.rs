//! Internal canonical types for chat completion requests and responses
//!
//! Both wire formats (the `OpenAI` client protocol and the upstream chat
//! protocol) convert to and from these types.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, Message, Role, ToolCall};
pub use request::{ChatMetadata, CompletionParams, CompletionRequest, Customization, SearchToggles};
pub use response::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage};
pub use stream::{ClientDelta, StreamChunk, StreamToolCall, ToolCallFragment};
pub use tool::{ToolChoice, ToolDefinition};
