//! Upstream chat client

use std::time::Duration;

use bytes::Bytes;
use duckbridge_config::UpstreamConfig;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use http::HeaderMap;
use http::header::{ACCEPT, CACHE_CONTROL, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use url::Url;

use crate::challenge::{ChallengeToken, ChallengeTokenManager};
use crate::error::LlmError;
use crate::protocol::duck::DuckRequest;

/// Status reported when the upstream could not be reached at all
const UNREACHABLE_STATUS: u16 = 502;

/// Raw upstream response body
pub type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Result of one chat call
#[derive(Debug)]
pub enum SendOutcome {
    /// The upstream accepted the call and is streaming
    Accepted(Response),
    /// The upstream refused the challenge token
    TokenRejected {
        /// Response status
        status: u16,
        /// Response body
        body: String,
    },
}

/// Posts chat requests to the upstream with a valid challenge token
pub struct UpstreamClient {
    client: Client,
    chat_url: Url,
    user_agent: String,
    origin: String,
    referer: String,
    rejection_statuses: Vec<u16>,
    rejection_markers: Vec<String>,
    first_byte_timeout: Duration,
    tokens: ChallengeTokenManager,
}

impl UpstreamClient {
    /// Create a client from upstream configuration
    pub fn new(client: Client, config: &UpstreamConfig, tokens: ChallengeTokenManager) -> Self {
        let origin = config.chat_url.origin().ascii_serialization();

        Self {
            client,
            chat_url: config.chat_url.clone(),
            user_agent: config.user_agent.clone(),
            referer: format!("{origin}/"),
            origin,
            rejection_statuses: config.token_rejection_statuses.clone(),
            rejection_markers: config.token_rejection_markers.clone(),
            first_byte_timeout: config.first_byte_timeout,
            tokens,
        }
    }

    fn is_token_rejection(&self, status: u16, body: &str) -> bool {
        self.rejection_statuses.contains(&status)
            || self.rejection_markers.iter().any(|marker| body.contains(marker.as_str()))
    }

    /// Post `request` once with `token`
    ///
    /// A successful response rotates the token when it carries fresh values.
    pub async fn send(&self, request: &DuckRequest, token: &ChallengeToken) -> Result<SendOutcome, LlmError> {
        let mut token_headers = HeaderMap::with_capacity(token.headers().len());
        for (name, value) in token.headers() {
            token_headers.insert(name.clone(), value.clone());
        }

        let builder = self
            .client
            .post(self.chat_url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(USER_AGENT, &self.user_agent)
            .header(ORIGIN, &self.origin)
            .header(REFERER, &self.referer)
            .header(CACHE_CONTROL, "no-store")
            .headers(token_headers)
            .json(request);

        let response = tokio::time::timeout(self.first_byte_timeout, builder.send())
            .await
            .map_err(|_| {
                tracing::warn!(timeout = ?self.first_byte_timeout, "upstream did not respond in time");
                LlmError::Timeout(format!("upstream sent no response within {:?}", self.first_byte_timeout))
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "upstream request failed");
                LlmError::Upstream {
                    status: UNREACHABLE_STATUS,
                    body: e.to_string(),
                }
            })?;

        let status = response.status();
        if status.is_success() {
            self.tokens.rotate(token, response.headers());
            return Ok(SendOutcome::Accepted(response));
        }

        let status = status.as_u16();
        let body = response.text().await.unwrap_or_default();

        if self.is_token_rejection(status, &body) {
            return Ok(SendOutcome::TokenRejected { status, body });
        }

        tracing::warn!(status, "upstream returned error");
        Err(LlmError::Upstream { status, body })
    }

    /// Open a chat stream, refreshing the token once if the upstream rejects it
    pub async fn open(&self, request: &DuckRequest) -> Result<ByteStream, LlmError> {
        let token = self.tokens.get_token().await?;

        let response = match self.send(request, &token).await? {
            SendOutcome::Accepted(response) => response,
            SendOutcome::TokenRejected { status, .. } => {
                tracing::warn!(
                    generation = token.generation(),
                    status,
                    "upstream rejected challenge token, retrying with a fresh one"
                );
                self.tokens.invalidate(&token);

                let fresh = self.tokens.get_token().await?;
                match self.send(request, &fresh).await? {
                    SendOutcome::Accepted(response) => response,
                    SendOutcome::TokenRejected { status, body } => {
                        tracing::error!(generation = fresh.generation(), status, "fresh challenge token rejected");
                        self.tokens.invalidate(&fresh);
                        return Err(LlmError::Upstream { status, body });
                    }
                }
            }
        };

        Ok(response.bytes_stream().boxed())
    }
}
