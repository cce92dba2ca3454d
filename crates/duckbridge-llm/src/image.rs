//! Remote image resolution
//!
//! The upstream only accepts inline images, so every `http(s)` image URL is
//! downloaded and rewritten into a base64 data URI before translation.

use async_trait::async_trait;
use base64::Engine;
use bytes::BytesMut;
use duckbridge_config::UpstreamConfig;
use futures_util::StreamExt;
use reqwest::Client;
use url::Url;

use crate::convert::duck::parse_data_uri;
use crate::error::LlmError;
use crate::types::{CompletionRequest, Content, ContentPart};

/// An image ready to be sent inline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

impl InlineImage {
    /// Encode raw bytes
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Render as a `data:` URI
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Turns an image URL into inline image data
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Fetch the image behind `url`
    async fn resolve(&self, url: &str) -> Result<InlineImage, LlmError>;
}

/// Fetches images over HTTP
pub struct HttpImageResolver {
    client: Client,
    user_agent: String,
    max_bytes: usize,
}

impl HttpImageResolver {
    /// Create a resolver honoring the upstream size cap
    pub fn new(client: Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_image_bytes,
        }
    }
}

#[async_trait]
impl ImageResolver for HttpImageResolver {
    async fn resolve(&self, url: &str) -> Result<InlineImage, LlmError> {
        let parsed = Url::parse(url)
            .map_err(|e| LlmError::UnsupportedContent(format!("image_url must be a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LlmError::UnsupportedContent(format!(
                "image_url scheme '{}' is not supported; it must be http(s) or a base64 data URI",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed.clone())
            .header(http::header::USER_AGENT, &self.user_agent)
            .header(http::header::ACCEPT, "image/*")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(host = ?parsed.host_str(), error = %e, "image fetch failed");
                LlmError::UnsupportedContent(format!("image at {url} could not be fetched: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::UnsupportedContent(format!(
                "image at {url} could not be fetched: status {status}"
            )));
        }

        if response
            .content_length()
            .is_some_and(|len| usize::try_from(len).map_or(true, |len| len > self.max_bytes))
        {
            return Err(self.too_large(url));
        }

        let header_mime = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| v.starts_with("image/"));

        // Content-Length is optional, so the cap is enforced while reading
        let mut bytes = BytesMut::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk =
                chunk.map_err(|e| LlmError::UnsupportedContent(format!("image at {url} could not be read: {e}")))?;
            if bytes.len().saturating_add(chunk.len()) > self.max_bytes {
                tracing::warn!(host = ?parsed.host_str(), max_bytes = self.max_bytes, "image download aborted");
                return Err(self.too_large(url));
            }
            bytes.extend_from_slice(&chunk);
        }

        let mime_type = header_mime
            .or_else(|| media_type_from_header(&bytes).map(str::to_owned))
            .or_else(|| media_type_from_extension(parsed.path()).map(str::to_owned))
            .ok_or_else(|| {
                LlmError::UnsupportedContent(format!(
                    "image at {url} must be PNG, JPEG, GIF or WebP"
                ))
            })?;

        tracing::debug!(host = ?parsed.host_str(), mime_type = %mime_type, bytes = bytes.len(), "image resolved");
        Ok(InlineImage::from_bytes(mime_type, &bytes))
    }
}

impl HttpImageResolver {
    fn too_large(&self, url: &str) -> LlmError {
        LlmError::UnsupportedContent(format!(
            "image at {url} must be at most {} bytes",
            self.max_bytes
        ))
    }
}

/// Detect an image type from its leading bytes
pub fn media_type_from_header(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n']) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

fn media_type_from_extension(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Rewrite every remote image URL in `request` into a data URI
///
/// Data URIs are left untouched. Images are fetched one at a time, in
/// message order.
pub async fn resolve_images(request: &mut CompletionRequest, resolver: &dyn ImageResolver) -> Result<(), LlmError> {
    for message in &mut request.messages {
        let Some(Content::Parts(parts)) = &mut message.content else {
            continue;
        };

        for part in parts.iter_mut() {
            let ContentPart::Image { url, .. } = part else {
                continue;
            };
            if url.starts_with("data:") {
                if parse_data_uri(url).is_none() {
                    return Err(LlmError::UnsupportedContent(
                        "image data URI must carry an image/* MIME type and a base64 payload".to_owned(),
                    ));
                }
                continue;
            }

            *url = resolver.resolve(url).await?.to_data_uri();
        }
    }

    Ok(())
}
