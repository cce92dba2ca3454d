//! Folding a chunk stream into one completion response

use std::collections::BTreeMap;

use futures_util::StreamExt;

use crate::error::LlmError;
use crate::reframe::ChunkStream;
use crate::types::{
    Choice, ChoiceMessage, CompletionRequest, CompletionResponse, FinishReason, FunctionCall, StreamToolCall, ToolCall,
};
use crate::usage;

/// Identity of the response being built
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// Response identifier (`chatcmpl-...`)
    pub id: String,
    /// Model name reported to the client
    pub model: String,
    /// Unix timestamp of creation
    pub created: u64,
}

impl ResponseMeta {
    /// Fresh identity for a response to `model`
    pub fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            model: model.to_owned(),
            created: duckbridge_core::unix_now(),
        }
    }
}

#[derive(Default)]
struct ChoiceBuilder {
    text: String,
    tool_calls: BTreeMap<u32, StreamToolCall>,
    finish_reason: Option<FinishReason>,
}

impl ChoiceBuilder {
    fn build(self, index: u32) -> Result<(Choice, String), LlmError> {
        let Some(finish_reason) = self.finish_reason else {
            return Err(LlmError::StreamDecode(format!(
                "choice {index} ended without a finish reason"
            )));
        };

        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_values()
            .map(|call| ToolCall {
                id: call.id,
                function: FunctionCall {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect();

        let mut completion_text = self.text.clone();
        for call in &tool_calls {
            completion_text.push_str(&call.function.name);
            completion_text.push_str(&call.function.arguments);
        }

        let choice = Choice {
            index,
            message: ChoiceMessage::assistant(self.text, tool_calls),
            finish_reason: Some(finish_reason),
        };
        Ok((choice, completion_text))
    }
}

/// Drain `chunks` into a `chat.completion` response
///
/// Any stream error fails the whole call and partial output is discarded.
pub async fn aggregate(
    mut chunks: ChunkStream,
    request: &CompletionRequest,
    meta: ResponseMeta,
) -> Result<CompletionResponse, LlmError> {
    let mut choices: BTreeMap<u32, ChoiceBuilder> = BTreeMap::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let builder = choices.entry(chunk.index).or_default();

        if let Some(content) = chunk.content {
            builder.text.push_str(&content);
        }
        if let Some(call) = chunk.tool_call {
            builder.tool_calls.insert(call.index, call);
        }
        if let Some(reason) = chunk.finish_reason {
            builder.finish_reason = Some(reason);
        }
    }

    if choices.is_empty() {
        return Err(LlmError::StreamDecode("upstream stream produced no output".to_owned()));
    }

    let mut built = Vec::with_capacity(choices.len());
    let mut completion_text = String::new();
    for (index, builder) in choices {
        let (choice, text) = builder.build(index)?;
        completion_text.push_str(&text);
        built.push(choice);
    }

    Ok(CompletionResponse {
        id: meta.id,
        created: meta.created,
        model: meta.model,
        choices: built,
        usage: Some(usage::usage_for(request, &completion_text)),
    })
}
