//! Upstream SSE to completion chunk reframing

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;

use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};

use crate::convert::duck::to_client;
use crate::error::LlmError;
use crate::protocol::duck::DuckStreamEvent;
use crate::types::{FinishReason, Role, StreamChunk, StreamToolCall, ToolCallFragment};

/// Data payload terminating the upstream stream
const DONE_MARKER: &str = "[DONE]";

/// Status reported when the upstream connection breaks mid-stream
const BROKEN_STREAM_STATUS: u16 = 502;

/// Stream of reframed completion chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
    emitted: bool,
}

impl PendingToolCall {
    fn merge(&mut self, fragment: ToolCallFragment) {
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            self.id = Some(id);
        }
        if let Some(name) = fragment.name.filter(|name| !name.is_empty()) {
            self.name = Some(name);
        }
        if let Some(arguments) = fragment.arguments {
            self.arguments.push_str(&arguments);
        }
    }

    fn arguments_complete(&self) -> bool {
        let trimmed = self.arguments.trim_start();
        trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    }

    fn take(&mut self, index: u32) -> StreamToolCall {
        self.emitted = true;
        StreamToolCall {
            index,
            id: self
                .id
                .clone()
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: self.name.clone().unwrap_or_default(),
            arguments: self.arguments.trim().to_owned(),
        }
    }
}

/// Turns decoded upstream events into completion chunks
///
/// Only choice 0 exists upstream, so every chunk carries index 0.
#[derive(Debug, Default)]
pub struct Reframer {
    role_sent: bool,
    tool_calls: BTreeMap<u32, PendingToolCall>,
    finish_reason: Option<FinishReason>,
}

impl Reframer {
    fn chunk(&mut self) -> StreamChunk {
        let role = (!self.role_sent).then_some(Role::Assistant);
        self.role_sent = true;
        StreamChunk {
            role,
            ..StreamChunk::default()
        }
    }

    /// Handle one upstream event
    pub fn push(&mut self, event: &DuckStreamEvent) -> Result<Vec<StreamChunk>, LlmError> {
        if event.is_error() {
            return Err(LlmError::Upstream {
                status: event.status.unwrap_or(BROKEN_STREAM_STATUS),
                body: event.error_type.clone().unwrap_or_else(|| "upstream error event".to_owned()),
            });
        }

        let delta = to_client(event);
        let mut chunks = Vec::new();

        if let Some(text) = delta.text.filter(|text| !text.is_empty()) {
            chunks.push(StreamChunk {
                content: Some(text),
                ..self.chunk()
            });
        }

        for fragment in delta.tool_fragments {
            let index = fragment.index;
            let pending = self.tool_calls.entry(index).or_default();
            if pending.emitted {
                continue;
            }
            pending.merge(fragment);

            if pending.name.is_some() && pending.arguments_complete() {
                let call = pending.take(index);
                chunks.push(StreamChunk {
                    tool_call: Some(call),
                    ..self.chunk()
                });
            }
        }

        if let Some(reason) = delta.finish_reason {
            self.finish_reason = Some(reason);
        }

        Ok(chunks)
    }

    /// Whether the upstream already reported why it stopped
    pub const fn has_finish_reason(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Flush pending tool calls and emit the terminal chunk
    pub fn finish(&mut self) -> Result<Vec<StreamChunk>, LlmError> {
        let mut chunks = Vec::new();

        for (index, pending) in &mut self.tool_calls {
            if pending.emitted {
                continue;
            }
            if pending.name.is_none() {
                return Err(LlmError::StreamDecode(format!("tool call {index} has no function name")));
            }
            if pending.arguments.trim().is_empty() {
                pending.arguments = "{}".to_owned();
            } else if !pending.arguments_complete() {
                return Err(LlmError::StreamDecode(format!(
                    "tool call {index} ended with incomplete arguments"
                )));
            }

            let call = pending.take(*index);
            let role = (!self.role_sent).then_some(Role::Assistant);
            self.role_sent = true;
            chunks.push(StreamChunk {
                role,
                tool_call: Some(call),
                ..StreamChunk::default()
            });
        }

        let reason = match self.finish_reason {
            None | Some(FinishReason::Stop) if !self.tool_calls.is_empty() => FinishReason::ToolCalls,
            Some(reason) => reason,
            None => FinishReason::Stop,
        };

        chunks.push(StreamChunk {
            finish_reason: Some(reason),
            ..self.chunk()
        });
        Ok(chunks)
    }
}

struct ReframeState {
    events: BoxStream<'static, Result<String, LlmError>>,
    reframer: Reframer,
    pending: VecDeque<Result<StreamChunk, LlmError>>,
    done: bool,
}

impl ReframeState {
    fn handle(&mut self, data: &str) {
        let data = data.trim();
        if data.is_empty() {
            return;
        }

        if data == DONE_MARKER {
            let result = self.reframer.finish();
            self.extend(result);
            self.done = true;
            return;
        }

        match serde_json::from_str::<DuckStreamEvent>(data) {
            Ok(event) => {
                let result = self.reframer.push(&event);
                self.extend(result);
            }
            Err(e) => self.fail(LlmError::StreamDecode(format!("malformed upstream event: {e}"))),
        }
    }

    fn end_of_stream(&mut self) {
        if self.reframer.has_finish_reason() {
            let result = self.reframer.finish();
            self.extend(result);
        } else {
            self.fail(LlmError::StreamDecode(
                "upstream stream ended without a terminal signal".to_owned(),
            ));
        }
        self.done = true;
    }

    fn extend(&mut self, result: Result<Vec<StreamChunk>, LlmError>) {
        match result {
            Ok(chunks) => self.pending.extend(chunks.into_iter().map(Ok)),
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: LlmError) {
        tracing::warn!(error = %error, "upstream stream failed");
        self.pending.push_back(Err(error));
        self.done = true;
    }
}

/// Undecodable bytes are the upstream's fault; a broken connection is not
fn event_stream_error<E: std::fmt::Display>(error: EventStreamError<E>) -> LlmError {
    match error {
        EventStreamError::Utf8(e) => LlmError::StreamDecode(format!("upstream event is not UTF-8: {e}")),
        EventStreamError::Parser(e) => LlmError::StreamDecode(format!("malformed upstream event stream: {e}")),
        EventStreamError::Transport(e) => LlmError::Upstream {
            status: BROKEN_STREAM_STATUS,
            body: e.to_string(),
        },
    }
}

/// Reframe an upstream SSE byte stream into completion chunks
///
/// The returned stream is lazy; it reads from `bytes` only when polled and
/// ends after the terminal chunk or the first error.
pub fn reframe<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let events = bytes
        .eventsource()
        .map(|result| result.map(|event| event.data).map_err(event_stream_error))
        .boxed();

    let state = ReframeState {
        events,
        reframer: Reframer::default(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.events.next().await {
                Some(Ok(data)) => state.handle(&data),
                Some(Err(e)) => state.fail(e),
                None => state.end_of_stream(),
            }
        }
    }))
}
