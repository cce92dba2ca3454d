//! Conversion between internal types and `OpenAI` wire format

use crate::protocol::openai::{
    FUNCTION, OpenAiChoice, OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiFunction,
    OpenAiFunctionCall, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStop, OpenAiStreamChoice,
    OpenAiStreamChunk, OpenAiStreamDelta, OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    Choice, CompletionParams, CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason,
    FunctionCall, Message, Role, StreamChunk, ToolCall, ToolChoice, ToolDefinition, Usage,
};

// -- Inbound: OpenAI wire format -> internal types --

impl From<OpenAiRequest> for CompletionRequest {
    fn from(req: OpenAiRequest) -> Self {
        let stream = req.stream.unwrap_or(false);

        Self {
            model: req.model,
            messages: req.messages.into_iter().map(Into::into).collect(),
            params: CompletionParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: req.max_tokens,
                stop: req.stop.map(OpenAiStop::into_vec),
                frequency_penalty: req.frequency_penalty,
                presence_penalty: req.presence_penalty,
                seed: req.seed,
            },
            tools: req.tools.map(|tools| tools.into_iter().map(Into::into).collect()),
            tool_choice: req.tool_choice.as_ref().and_then(ToolChoice::from_value),
            stream,
            include_usage: stream && req.stream_options.is_some_and(|o| o.include_usage),
            metadata: req.metadata.map(Into::into),
        }
    }
}

impl From<OpenAiMessage> for Message {
    fn from(msg: OpenAiMessage) -> Self {
        let content = msg.content.map(|content| match content {
            OpenAiContent::Text(text) => Content::Text(text),
            OpenAiContent::Parts(parts) => Content::Parts(parts.into_iter().map(Into::into).collect()),
        });

        let tool_calls = msg.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|tc| ToolCall {
                    id: tc.id,
                    function: FunctionCall {
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    },
                })
                .collect()
        });

        Self {
            role: Role::parse(&msg.role).unwrap_or(Role::User),
            content,
            name: msg.name,
            tool_calls,
            tool_call_id: msg.tool_call_id,
        }
    }
}

impl From<OpenAiContentPart> for ContentPart {
    fn from(part: OpenAiContentPart) -> Self {
        match part {
            OpenAiContentPart::Text { text } => Self::Text { text },
            OpenAiContentPart::ImageUrl { image_url } => Self::Image { url: image_url.url },
        }
    }
}

impl From<OpenAiTool> for ToolDefinition {
    fn from(tool: OpenAiTool) -> Self {
        let OpenAiFunction {
            name,
            description,
            parameters,
            extra,
        } = tool.function;

        Self {
            name,
            description,
            parameters,
            extra,
        }
    }
}

// -- Outbound: internal types -> OpenAI wire format --

/// Tool definition in `OpenAI` wire shape
pub fn tool_definition_to_openai(tool: &ToolDefinition) -> OpenAiTool {
    OpenAiTool {
        tool_type: FUNCTION.to_owned(),
        function: OpenAiFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
            extra: tool.extra.clone(),
        },
    }
}

/// Tool call in `OpenAI` wire shape
pub fn tool_call_to_openai(call: &ToolCall) -> OpenAiToolCall {
    OpenAiToolCall {
        id: call.id.clone(),
        tool_type: FUNCTION.to_owned(),
        function: OpenAiFunctionCall {
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        },
    }
}

impl From<CompletionResponse> for OpenAiResponse {
    fn from(resp: CompletionResponse) -> Self {
        Self {
            id: resp.id,
            object: "chat.completion",
            created: resp.created,
            model: resp.model,
            choices: resp.choices.into_iter().map(Into::into).collect(),
            usage: resp.usage.map(Into::into),
        }
    }
}

impl From<Choice> for OpenAiChoice {
    fn from(choice: Choice) -> Self {
        Self {
            index: choice.index,
            message: OpenAiChoiceMessage {
                role: "assistant",
                content: choice.message.content,
                tool_calls: choice
                    .message
                    .tool_calls
                    .map(|calls| calls.iter().map(tool_call_to_openai).collect()),
            },
            finish_reason: choice.finish_reason.map(FinishReason::as_str),
        }
    }
}

impl From<Usage> for OpenAiUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

// -- Stream conversion --

const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// Convert an internal stream chunk to an `OpenAI` stream chunk
pub fn chunk_to_openai(chunk: &StreamChunk, id: &str, model: &str, created: u64) -> OpenAiStreamChunk {
    let tool_calls = chunk.tool_call.as_ref().map(|tc| {
        vec![OpenAiStreamToolCall {
            index: tc.index,
            call: OpenAiToolCall {
                id: tc.id.clone(),
                tool_type: FUNCTION.to_owned(),
                function: OpenAiFunctionCall {
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                },
            },
        }]
    });

    OpenAiStreamChunk {
        id: id.to_owned(),
        object: CHUNK_OBJECT,
        created,
        model: model.to_owned(),
        choices: vec![OpenAiStreamChoice {
            index: chunk.index,
            delta: OpenAiStreamDelta {
                role: chunk.role.map(Role::as_str),
                content: chunk.content.clone(),
                tool_calls,
            },
            finish_reason: chunk.finish_reason.map(FinishReason::as_str),
        }],
        usage: None,
    }
}

/// Trailing chunk that carries only usage
pub fn usage_to_openai_chunk(usage: &Usage, id: &str, model: &str, created: u64) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: id.to_owned(),
        object: CHUNK_OBJECT,
        created,
        model: model.to_owned(),
        choices: Vec::new(),
        usage: Some((*usage).into()),
    }
}
