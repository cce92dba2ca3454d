//! Token usage estimates
//!
//! The upstream reports no usage, so counts are computed locally with the
//! `o200k_base` encoding. They are estimates, not billing-grade numbers.

use std::sync::LazyLock;

use tiktoken_rs::{CoreBPE, o200k_base};

use crate::convert::openai::tool_definition_to_openai;
use crate::protocol::openai::OpenAiTool;
use crate::types::{CompletionRequest, Usage};

/// Framing tokens added per message
const TOKENS_PER_MESSAGE: u32 = 3;

/// Tokens priming the assistant reply
const REPLY_PRIMING_TOKENS: u32 = 3;

static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| o200k_base().ok());

/// Estimate the token count of `text`
pub fn estimate_tokens(text: &str) -> u32 {
    let count = ENCODER.as_ref().map_or_else(
        || text.len().div_ceil(4),
        |bpe| bpe.encode_with_special_tokens(text).len(),
    );
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Estimate the prompt tokens of a request
///
/// Counts message text, names, prior tool calls and tool definitions. Images
/// are not counted.
pub fn prompt_tokens(request: &CompletionRequest) -> u32 {
    let mut total = REPLY_PRIMING_TOKENS;

    for message in &request.messages {
        total = total.saturating_add(TOKENS_PER_MESSAGE);

        if let Some(content) = &message.content {
            total = total.saturating_add(estimate_tokens(&content.as_text()));
        }
        if let Some(name) = &message.name {
            total = total.saturating_add(estimate_tokens(name));
        }
        for call in message.tool_calls.iter().flatten() {
            total = total
                .saturating_add(estimate_tokens(&call.function.name))
                .saturating_add(estimate_tokens(&call.function.arguments));
        }
    }

    if let Some(tools) = &request.tools
        && let Ok(serialized) =
            serde_json::to_string(&tools.iter().map(tool_definition_to_openai).collect::<Vec<OpenAiTool>>())
    {
        total = total.saturating_add(estimate_tokens(&serialized));
    }

    total
}

/// Usage for a request and its generated output
pub fn usage_for(request: &CompletionRequest, completion_text: &str) -> Usage {
    Usage::new(prompt_tokens(request), estimate_tokens(completion_text))
}
