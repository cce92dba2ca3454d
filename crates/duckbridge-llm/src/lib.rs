//! OpenAI-compatible chat completions over the duck.ai upstream
//!
//! Requests are validated, translated into the upstream message format and
//! sent with a shared challenge token. The upstream event stream is reframed
//! into `chat.completion.chunk` events, or folded into a single
//! `chat.completion` for non-streaming calls.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod aggregate;
pub mod challenge;
pub mod convert;
pub mod error;
pub mod image;
pub mod models;
pub mod protocol;
pub mod reframe;
pub mod router;
pub mod state;
pub mod types;
pub mod upstream;
pub mod usage;
pub mod validate;

pub use challenge::{ChallengeToken, ChallengeTokenManager, TokenStatus};
pub use error::LlmError;
pub use router::llm_router;
pub use state::LlmState;
pub use types::{CompletionRequest, CompletionResponse, StreamChunk};
pub use validate::validate_request;
