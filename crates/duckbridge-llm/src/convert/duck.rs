//! Conversion between internal types and the upstream wire format

use crate::convert::openai::{tool_call_to_openai, tool_definition_to_openai};
use crate::error::LlmError;
use crate::protocol::duck::{
    DuckContent, DuckContentPart, DuckCustomization, DuckMessage, DuckMetadata, DuckRequest, DuckStreamEvent,
    DuckToolChoice,
};
use crate::types::{
    ChatMetadata, ClientDelta, CompletionRequest, Content, ContentPart, Customization, FinishReason, Message,
    SearchToggles, ToolCallFragment, ToolChoice,
};

/// A parsed `data:<mime>;base64,<payload>` URI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUri<'a> {
    /// MIME type, without parameters
    pub mime_type: &'a str,
    /// Base64 payload
    pub data: &'a str,
}

/// Parse a base64 image data URI; `None` for anything else
///
/// Only `image/*` MIME types are accepted.
pub fn parse_data_uri(url: &str) -> Option<DataUri<'_>> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;

    let mut params = header.split(';');
    let mime_type = params.next()?.trim();
    let subtype = mime_type
        .get(..6)
        .filter(|prefix| prefix.eq_ignore_ascii_case("image/"))
        .and_then(|_| mime_type.get(6..))?;
    if subtype.is_empty() || subtype.contains('/') {
        return None;
    }
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) || data.is_empty() {
        return None;
    }

    Some(DataUri { mime_type, data })
}

// -- Outbound: internal request -> upstream request --

/// Translate a resolved request into the upstream request for `model`
///
/// Every image must already be a data URI; remote URLs are resolved by
/// [`crate::image::resolve_images`] beforehand.
pub fn to_upstream(request: &CompletionRequest, model: &str) -> Result<DuckRequest, LlmError> {
    let messages = request
        .messages
        .iter()
        .map(message_to_upstream)
        .collect::<Result<Vec<_>, _>>()?;

    let metadata = request.metadata.clone().map(Into::into).unwrap_or_default();

    Ok(DuckRequest {
        model: model.to_owned(),
        messages,
        metadata,
        can_use_tools: request.has_tools(),
        can_use_approx_location: false,
        tools: request
            .tools
            .as_ref()
            .filter(|tools| !tools.is_empty())
            .map(|tools| tools.iter().map(tool_definition_to_openai).collect()),
        tool_choice: request.tool_choice.as_ref().map(ToolChoice::to_value),
    })
}

/// Translate one message into the upstream shape
pub fn message_to_upstream(message: &Message) -> Result<DuckMessage, LlmError> {
    let content = match &message.content {
        None => None,
        Some(Content::Text(text)) => Some(DuckContent::Text(text.clone())),
        Some(Content::Parts(parts)) => Some(DuckContent::Parts(
            parts.iter().map(part_to_upstream).collect::<Result<_, _>>()?,
        )),
    };

    Ok(DuckMessage {
        role: message.role.as_str().to_owned(),
        content,
        name: message.name.clone(),
        tool_calls: message
            .tool_calls
            .as_ref()
            .map(|calls| calls.iter().map(tool_call_to_openai).collect()),
        tool_call_id: message.tool_call_id.clone(),
    })
}

fn part_to_upstream(part: &ContentPart) -> Result<DuckContentPart, LlmError> {
    match part {
        ContentPart::Text { text } => Ok(DuckContentPart::Text { text: text.clone() }),
        ContentPart::Image { url, .. } => {
            let data_uri = parse_data_uri(url).ok_or_else(|| {
                LlmError::UnsupportedContent(
                    "image_url must be an http(s) URL or a base64 data URI with an image/* MIME type".to_owned(),
                )
            })?;

            Ok(DuckContentPart::Image {
                image: url.clone(),
                mime_type: data_uri.mime_type.to_owned(),
            })
        }
    }
}

impl From<ChatMetadata> for DuckMetadata {
    fn from(metadata: ChatMetadata) -> Self {
        Self {
            tool_choice: DuckToolChoice {
                news_search: metadata.tool_choice.news_search,
                videos_search: metadata.tool_choice.videos_search,
                local_search: metadata.tool_choice.local_search,
                weather_forecast: metadata.tool_choice.weather_forecast,
            },
            customization: DuckCustomization {
                additional_instructions: metadata.customization.additional_instructions,
                should_seek_clarity: metadata.customization.should_seek_clarity,
            },
        }
    }
}

/// Client `metadata` arrives in the upstream's camelCase shape
impl From<DuckMetadata> for ChatMetadata {
    fn from(metadata: DuckMetadata) -> Self {
        Self {
            customization: Customization {
                additional_instructions: metadata.customization.additional_instructions,
                should_seek_clarity: metadata.customization.should_seek_clarity,
            },
            tool_choice: SearchToggles {
                news_search: metadata.tool_choice.news_search,
                videos_search: metadata.tool_choice.videos_search,
                local_search: metadata.tool_choice.local_search,
                weather_forecast: metadata.tool_choice.weather_forecast,
            },
        }
    }
}

// -- Inbound: upstream shapes -> internal types --

/// Map one upstream stream event to its client-side delta
pub fn to_client(event: &DuckStreamEvent) -> ClientDelta {
    let tool_fragments = event
        .tool_calls
        .iter()
        .flatten()
        .map(|fragment| ToolCallFragment {
            index: fragment.index,
            id: fragment.id.clone(),
            name: fragment.function.as_ref().and_then(|f| f.name.clone()),
            arguments: fragment.function.as_ref().and_then(|f| f.arguments.clone()),
        })
        .collect();

    ClientDelta {
        text: event.message.clone(),
        tool_fragments,
        finish_reason: event.finish_reason.as_deref().map(finish_reason_from_upstream),
    }
}

/// Map an upstream finish reason onto the client vocabulary
pub fn finish_reason_from_upstream(reason: &str) -> FinishReason {
    match reason {
        "length" | "max_tokens" => FinishReason::Length,
        "tool_calls" | "tool_use" => FinishReason::ToolCalls,
        "content_filter" | "moderation" | "safety" => FinishReason::ContentFilter,
        "stop" | "end_turn" => FinishReason::Stop,
        other => {
            tracing::debug!(reason = other, "unknown upstream finish reason, treating as stop");
            FinishReason::Stop
        }
    }
}
