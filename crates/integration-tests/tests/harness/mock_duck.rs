//! Mock duck.ai upstream for integration tests
//!
//! Serves the status handshake, a scripted chat event stream, a small PNG and
//! an oversized chunked one, and counts every call so tests can assert on
//! upstream traffic.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing};
use futures_util::stream;
use tokio_util::sync::CancellationToken;

/// Chunk size of the oversized image
pub const HUGE_IMAGE_CHUNK: usize = 1024 * 1024;

/// Number of chunks in the oversized image
pub const HUGE_IMAGE_CHUNKS: u64 = 64;

/// Smallest valid PNG header the image resolver recognizes
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n', 0, 0, 0, 13, b'I', b'H', b'D', b'R'];

/// What the chat endpoint answers with
#[derive(Debug, Clone)]
pub enum ChatScript {
    /// Stream these text fragments, then `[DONE]`
    Text(Vec<String>),
    /// Stream one tool call with its arguments split into fragments
    ToolCall {
        /// Function name
        name: String,
        /// Argument fragments, concatenated upstream-side
        arguments: Vec<String>,
    },
    /// Answer with a plain non-success status
    Status {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },
    /// Stream an in-band error event
    InBandError {
        /// Status inside the event
        status: u16,
        /// Error code inside the event
        code: String,
    },
    /// Stream text and stop without a terminal signal
    Truncated(Vec<String>),
    /// Hold the response headers back for this long, then answer `[DONE]`
    Stall(Duration),
    /// Stream a text event every `interval` until the client goes away
    Endless {
        /// Pause between events
        interval: Duration,
    },
}

/// Builder for [`MockDuck`]
pub struct MockDuckBuilder {
    script: ChatScript,
    reject_first: u32,
    status_delay: Duration,
    rotate: bool,
}

impl MockDuckBuilder {
    /// Chat answers with `script`
    pub fn script(mut self, script: ChatScript) -> Self {
        self.script = script;
        self
    }

    /// Reject the first `n` chat calls with a 418 token rejection
    pub fn reject_first(mut self, n: u32) -> Self {
        self.reject_first = n;
        self
    }

    /// Delay every status handshake
    pub fn status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    /// Return a fresh `x-vqd-4` on every successful chat response
    pub fn rotating(mut self) -> Self {
        self.rotate = true;
        self
    }

    /// Start the mock server
    pub async fn start(self) -> anyhow::Result<MockDuck> {
        let state = Arc::new(MockDuckState {
            status_count: AtomicU32::new(0),
            chat_count: AtomicU32::new(0),
            image_count: AtomicU32::new(0),
            image_bytes_served: AtomicU64::new(0),
            chat_events_served: AtomicU32::new(0),
            chat_stream_dropped: AtomicBool::new(false),
            reject_remaining: AtomicU32::new(self.reject_first),
            status_delay: self.status_delay,
            rotate: self.rotate,
            script: self.script,
            chat_tokens: Mutex::new(Vec::new()),
            last_body: Mutex::new(None),
        });

        let app = Router::new()
            .route("/duckchat/v1/status", routing::get(handle_status))
            .route("/duckchat/v1/chat", routing::post(handle_chat))
            .route("/images/cat.png", routing::get(handle_image))
            .route("/images/huge.png", routing::get(handle_huge_image))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(MockDuck { addr, shutdown, state })
    }
}

/// Mock upstream with call counters
pub struct MockDuck {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockDuckState>,
}

struct MockDuckState {
    status_count: AtomicU32,
    chat_count: AtomicU32,
    image_count: AtomicU32,
    image_bytes_served: AtomicU64,
    chat_events_served: AtomicU32,
    chat_stream_dropped: AtomicBool,
    reject_remaining: AtomicU32,
    status_delay: Duration,
    rotate: bool,
    script: ChatScript,
    /// `x-vqd-4` value sent with each chat call, in order
    chat_tokens: Mutex<Vec<String>>,
    last_body: Mutex<Option<serde_json::Value>>,
}

impl MockDuck {
    /// Builder answering "Hi! How can I help?" by default
    pub fn builder() -> MockDuckBuilder {
        MockDuckBuilder {
            script: ChatScript::Text(vec!["Hi".to_owned(), "! How can".to_owned(), " I help?".to_owned()]),
            reject_first: 0,
            status_delay: Duration::ZERO,
            rotate: false,
        }
    }

    /// Start with the default script
    pub async fn start() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    /// Status handshake URL
    pub fn status_url(&self) -> String {
        format!("http://{}/duckchat/v1/status", self.addr)
    }

    /// Chat URL
    pub fn chat_url(&self) -> String {
        format!("http://{}/duckchat/v1/chat", self.addr)
    }

    /// URL of the served PNG
    pub fn image_url(&self) -> String {
        format!("http://{}/images/cat.png", self.addr)
    }

    /// URL of a PNG far larger than any test cap, sent without Content-Length
    pub fn huge_image_url(&self) -> String {
        format!("http://{}/images/huge.png", self.addr)
    }

    /// Bytes of the oversized image handed to the connection so far
    pub fn image_bytes_served(&self) -> u64 {
        self.state.image_bytes_served.load(Ordering::SeqCst)
    }

    /// Events produced by an endless chat stream
    pub fn chat_events_served(&self) -> u32 {
        self.state.chat_events_served.load(Ordering::SeqCst)
    }

    /// Whether an endless chat stream was dropped by its reader
    pub fn chat_stream_dropped(&self) -> bool {
        self.state.chat_stream_dropped.load(Ordering::SeqCst)
    }

    /// Number of status handshakes received
    pub fn status_count(&self) -> u32 {
        self.state.status_count.load(Ordering::SeqCst)
    }

    /// Number of chat calls received
    pub fn chat_count(&self) -> u32 {
        self.state.chat_count.load(Ordering::SeqCst)
    }

    /// Number of image downloads served
    pub fn image_count(&self) -> u32 {
        self.state.image_count.load(Ordering::SeqCst)
    }

    /// `x-vqd-4` values presented by chat calls, in arrival order
    pub fn chat_tokens(&self) -> Vec<String> {
        self.state.chat_tokens.lock().unwrap().clone()
    }

    /// Body of the most recent chat call
    pub fn last_body(&self) -> Option<serde_json::Value> {
        self.state.last_body.lock().unwrap().clone()
    }
}

impl Drop for MockDuck {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_status(State(state): State<Arc<MockDuckState>>, headers: HeaderMap) -> Response {
    if headers.get("x-vqd-accept").and_then(|v| v.to_str().ok()) != Some("1") {
        return (StatusCode::BAD_REQUEST, "missing x-vqd-accept").into_response();
    }

    let n = state.status_count.fetch_add(1, Ordering::SeqCst) + 1;
    if !state.status_delay.is_zero() {
        tokio::time::sleep(state.status_delay).await;
    }

    (
        StatusCode::OK,
        [("x-vqd-4", format!("vqd-{n}")), ("x-vqd-hash-1", format!("hash-{n}"))],
        "",
    )
        .into_response()
}

async fn handle_chat(State(state): State<Arc<MockDuckState>>, headers: HeaderMap, body: Bytes) -> Response {
    let n = state.chat_count.fetch_add(1, Ordering::SeqCst) + 1;

    let token = headers
        .get("x-vqd-4")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    state.chat_tokens.lock().unwrap().push(token);
    *state.last_body.lock().unwrap() = serde_json::from_slice(&body).ok();

    let rejected = state
        .reject_remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if rejected {
        let body = serde_json::json!({"action": "error", "status": 418, "type": "ERR_INVALID_VQD"});
        return (StatusCode::IM_A_TEAPOT, body.to_string()).into_response();
    }

    let events = match &state.script {
        ChatScript::Status { status, body } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, body.clone()).into_response();
        }
        ChatScript::Text(fragments) => {
            let mut events: Vec<String> = fragments.iter().map(|f| text_event(f)).collect();
            events.push("[DONE]".to_owned());
            events
        }
        ChatScript::Truncated(fragments) => fragments.iter().map(|f| text_event(f)).collect(),
        ChatScript::ToolCall { name, arguments } => {
            let mut events: Vec<String> = arguments
                .iter()
                .enumerate()
                .map(|(i, fragment)| {
                    let mut function = serde_json::json!({"arguments": fragment});
                    if i == 0 {
                        function["name"] = serde_json::json!(name);
                    }
                    let mut call = serde_json::json!({"index": 0, "function": function});
                    if i == 0 {
                        call["id"] = serde_json::json!("call_mock");
                    }
                    serde_json::json!({"action": "success", "role": "assistant", "tool_calls": [call]}).to_string()
                })
                .collect();
            events.push("[DONE]".to_owned());
            events
        }
        ChatScript::InBandError { status, code } => {
            vec![serde_json::json!({"action": "error", "status": status, "type": code}).to_string()]
        }
        ChatScript::Stall(delay) => {
            tokio::time::sleep(*delay).await;
            vec!["[DONE]".to_owned()]
        }
        ChatScript::Endless { interval } => return endless_chat(Arc::clone(&state), *interval),
    };

    let sse: String = events.iter().map(|data| format!("data: {data}\n\n")).collect();

    let mut response = (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], sse).into_response();
    if state.rotate
        && let Ok(value) = format!("rotated-{n}").parse::<axum::http::HeaderValue>()
    {
        response.headers_mut().insert("x-vqd-4", value);
    }
    response
}

fn text_event(fragment: &str) -> String {
    serde_json::json!({
        "role": "assistant",
        "message": fragment,
        "created": 1_727_000_000,
        "id": "mock-1",
        "action": "success",
        "model": "gpt-4o-mini-2024-07-18"
    })
    .to_string()
}

async fn handle_image(State(state): State<Arc<MockDuckState>>) -> Response {
    state.image_count.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], PNG_BYTES).into_response()
}

/// Sets the dropped flag when the body stream goes away
struct DropFlag(Arc<MockDuckState>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.chat_stream_dropped.store(true, Ordering::SeqCst);
    }
}

fn endless_chat(state: Arc<MockDuckState>, interval: Duration) -> Response {
    let events = stream::unfold(DropFlag(state), move |flag| async move {
        tokio::time::sleep(interval).await;
        let n = flag.0.chat_events_served.fetch_add(1, Ordering::SeqCst);
        let event = format!("data: {}\n\n", text_event(&format!("tick {n} ")));
        Some((Ok::<_, std::io::Error>(Bytes::from(event)), flag))
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(events),
    )
        .into_response()
}

async fn handle_huge_image(State(state): State<Arc<MockDuckState>>) -> Response {
    state.image_count.fetch_add(1, Ordering::SeqCst);

    let chunks = stream::unfold(0_u64, move |sent| {
        let state = Arc::clone(&state);
        async move {
            if sent == HUGE_IMAGE_CHUNKS {
                return None;
            }
            let mut chunk = vec![0_u8; HUGE_IMAGE_CHUNK];
            if sent == 0 {
                chunk[..PNG_BYTES.len()].copy_from_slice(PNG_BYTES);
            }
            state.image_bytes_served.fetch_add(HUGE_IMAGE_CHUNK as u64, Ordering::SeqCst);
            Some((Ok::<_, std::io::Error>(Bytes::from(chunk)), sent + 1))
        }
    });

    // A streamed body carries no Content-Length
    (StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], Body::from_stream(chunks)).into_response()
}
