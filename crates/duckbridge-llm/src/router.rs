//! Axum route handlers for the OpenAI-compatible endpoints

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use duckbridge_core::{HttpError, error_body};
use futures_util::{Stream, StreamExt, stream};

use crate::aggregate::ResponseMeta;
use crate::convert;
use crate::error::LlmError;
use crate::protocol::openai::OpenAiResponse;
use crate::reframe::ChunkStream;
use crate::state::LlmState;
use crate::types::Usage;
use crate::usage;
use crate::validate::validate_request;

/// Build the router for chat completions and the model list
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/models", routing::get(list_models))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(State(state): State<LlmState>, body: Bytes) -> Response {
    let body: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            return error_response(&LlmError::Validation(format!("request body must be valid JSON: {e}")));
        }
    };

    let request = match validate_request(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    if request.stream {
        let prompt_tokens = request.include_usage.then(|| usage::prompt_tokens(&request));

        match state.complete_stream(request).await {
            Ok((meta, chunks)) => stream_response(meta, chunks, prompt_tokens).into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        match state.complete(request).await {
            Ok(response) => Json(OpenAiResponse::from(response)).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

/// Handle `GET /v1/models`
async fn list_models(State(state): State<LlmState>) -> Response {
    Json(state.models()).into_response()
}

struct SseState {
    chunks: ChunkStream,
    meta: ResponseMeta,
    prompt_tokens: Option<u32>,
    completion_text: String,
}

/// Build a streaming SSE response in `OpenAI` format
///
/// A usage chunk precedes `[DONE]` when `prompt_tokens` is set. An error ends
/// the stream after a single error event, without `[DONE]`.
fn stream_response(
    meta: ResponseMeta,
    chunks: ChunkStream,
    prompt_tokens: Option<u32>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let state = SseState {
        chunks,
        meta,
        prompt_tokens,
        completion_text: String::new(),
    };

    let events = stream::unfold(Some(state), |state| async move {
        let mut state = state?;

        match state.chunks.next().await {
            Some(Ok(chunk)) => {
                if let Some(content) = &chunk.content {
                    state.completion_text.push_str(content);
                }
                if let Some(call) = &chunk.tool_call {
                    state.completion_text.push_str(&call.name);
                    state.completion_text.push_str(&call.arguments);
                }

                let chunk = convert::openai::chunk_to_openai(
                    &chunk,
                    &state.meta.id,
                    &state.meta.model,
                    state.meta.created,
                );
                let data = serde_json::to_string(&chunk).unwrap_or_default();
                Some((vec![Event::default().data(data)], Some(state)))
            }
            Some(Err(e)) => {
                log_error(&e);
                let data = serde_json::to_string(&error_body(&e)).unwrap_or_default();
                Some((vec![Event::default().data(data)], None))
            }
            None => {
                let mut events = Vec::with_capacity(2);
                if let Some(prompt_tokens) = state.prompt_tokens {
                    let usage = Usage::new(prompt_tokens, usage::estimate_tokens(&state.completion_text));
                    let chunk = convert::openai::usage_to_openai_chunk(
                        &usage,
                        &state.meta.id,
                        &state.meta.model,
                        state.meta.created,
                    );
                    events.push(Event::default().data(serde_json::to_string(&chunk).unwrap_or_default()));
                }
                events.push(Event::default().data("[DONE]"));
                Some((events, None))
            }
        }
    })
    .flat_map(|events| stream::iter(events.into_iter().map(Ok::<_, Infallible>)));

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn log_error(error: &LlmError) {
    if error.is_client_fault() {
        tracing::debug!(error = %error, "request rejected");
    } else {
        tracing::error!(error = %error, "completion failed");
    }
}

/// Convert an LLM error to an `OpenAI`-style JSON error response
pub fn error_response(error: &LlmError) -> Response {
    log_error(error);
    (error.status_code(), Json(error_body(error))).into_response()
}
