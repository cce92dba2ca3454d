//! Shared state for the chat route handlers

use std::sync::Arc;
use std::time::Instant;

use duckbridge_config::{ModelsConfig, UpstreamConfig};
use futures_util::{StreamExt, stream};
use reqwest::Client;

use crate::aggregate::{ResponseMeta, aggregate};
use crate::challenge::{ChallengeTokenManager, HttpChallengeSource, TokenPolicy};
use crate::convert;
use crate::error::LlmError;
use crate::image::{HttpImageResolver, ImageResolver, resolve_images};
use crate::models::ModelCatalog;
use crate::protocol::duck::DuckRequest;
use crate::protocol::openai::OpenAiModelList;
use crate::reframe::{ChunkStream, reframe};
use crate::types::{CompletionRequest, CompletionResponse};
use crate::upstream::UpstreamClient;

/// Shared state for chat route handlers
#[derive(Clone)]
pub struct LlmState {
    inner: Arc<LlmStateInner>,
}

struct LlmStateInner {
    upstream: UpstreamClient,
    images: Arc<dyn ImageResolver>,
    catalog: ModelCatalog,
}

impl LlmState {
    /// Build state from configuration
    ///
    /// No network call is made; the first challenge happens on the first chat
    /// request.
    pub fn from_config(upstream: &UpstreamConfig, models: &ModelsConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .user_agent(upstream.user_agent.clone())
            .build()
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        let source = Arc::new(HttpChallengeSource::new(client.clone(), upstream));
        let tokens = ChallengeTokenManager::new(source, TokenPolicy::from(upstream));

        Ok(Self::with_parts(
            UpstreamClient::new(client.clone(), upstream, tokens),
            Arc::new(HttpImageResolver::new(client, upstream)),
            ModelCatalog::from_config(models),
        ))
    }

    /// Assemble state from prebuilt parts
    pub fn with_parts(upstream: UpstreamClient, images: Arc<dyn ImageResolver>, catalog: ModelCatalog) -> Self {
        Self {
            inner: Arc::new(LlmStateInner {
                upstream,
                images,
                catalog,
            }),
        }
    }

    /// Model list served on `/v1/models`
    pub fn models(&self) -> OpenAiModelList {
        self.inner.catalog.list()
    }

    /// Inline images and translate the request for the upstream
    async fn prepare(&self, request: &mut CompletionRequest) -> Result<DuckRequest, LlmError> {
        resolve_images(request, self.inner.images.as_ref()).await?;
        let model = self.inner.catalog.upstream_model(&request.model);
        convert::duck::to_upstream(request, &model)
    }

    async fn open(&self, request: &mut CompletionRequest) -> Result<ChunkStream, LlmError> {
        let upstream_request = self.prepare(request).await?;
        let bytes = self.inner.upstream.open(&upstream_request).await?;
        Ok(reframe(bytes))
    }

    /// Run a completion and return the aggregated response
    pub async fn complete(&self, mut request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = Instant::now();
        let meta = ResponseMeta::new(&request.model);

        let chunks = self.open(&mut request).await?;
        let response = aggregate(chunks, &request, meta).await?;

        tracing::info!(
            model = %response.model,
            id = %response.id,
            latency = ?start.elapsed(),
            "completion finished"
        );
        Ok(response)
    }

    /// Start a streaming completion
    ///
    /// The first chunk is awaited before returning so that failures before any
    /// output surface as a plain error response instead of an SSE event.
    pub async fn complete_stream(
        &self,
        mut request: CompletionRequest,
    ) -> Result<(ResponseMeta, ChunkStream), LlmError> {
        let meta = ResponseMeta::new(&request.model);

        let mut chunks = self.open(&mut request).await?;
        let first = match chunks.next().await {
            Some(Ok(first)) => first,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(LlmError::StreamDecode("upstream stream produced no output".to_owned()));
            }
        };

        tracing::info!(model = %meta.model, id = %meta.id, "streaming completion started");
        let chunks: ChunkStream = Box::pin(stream::once(async move { Ok(first) }).chain(chunks));
        Ok((meta, chunks))
    }
}
