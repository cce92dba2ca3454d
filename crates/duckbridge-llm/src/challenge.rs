//! Upstream challenge token lifecycle
//!
//! The upstream only serves chat calls that carry a short-lived token, a
//! set of headers obtained from a separate handshake. One
//! [`ChallengeTokenManager`] owns the current token for the whole process:
//!
//! ```text
//! Empty ──get──▶ Fetching ──ok──▶ Valid ──invalidate / expire──▶ Empty
//!                   │                │
//!                   └──err──▶ Empty  └──rotate──▶ Valid (next generation)
//! ```
//!
//! Concurrent callers arriving while a handshake is in flight await the same
//! shared future, so at most one handshake runs at a time.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use duckbridge_config::{TokenHeaderConfig, UpstreamConfig};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

use crate::error::LlmError;

/// Header asking the status endpoint to issue a token
const VQD_ACCEPT_HEADER: &str = "x-vqd-accept";

/// Base delay between handshake attempts, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Header values captured from one handshake, in configured order
pub type TokenHeaders = Vec<(HeaderName, HeaderValue)>;

/// Why a handshake attempt failed
#[derive(Debug, Clone, Error)]
pub enum ChallengeError {
    /// The status endpoint could not be reached or refused the request
    #[error("challenge endpoint unreachable: {0}")]
    Unreachable(String),

    /// The handshake response lacked a required header
    #[error("challenge response unparsable: {0}")]
    Unparsable(String),

    /// The attempt exceeded the configured bound
    #[error("challenge handshake timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ChallengeError> for LlmError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::Timeout(_) => Self::Timeout(err.to_string()),
            ChallengeError::Unreachable(_) | ChallengeError::Unparsable(_) => Self::TokenAcquisition(err.to_string()),
        }
    }
}

/// A captured challenge token
///
/// Values never appear in `Debug` output or logs, only the generation and
/// header names.
pub struct ChallengeToken {
    generation: u64,
    headers: TokenHeaders,
    acquired_at: Instant,
    uses: AtomicU32,
}

impl ChallengeToken {
    /// Wrap captured headers as a token of the given generation
    pub fn new(generation: u64, headers: TokenHeaders) -> Self {
        Self {
            generation,
            headers,
            acquired_at: Instant::now(),
            uses: AtomicU32::new(0),
        }
    }

    /// Monotonic identity of this token
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Headers to attach to a chat call
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    /// Value of one token header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.to_str().ok())
    }

    /// Number of chat calls made with this token
    pub fn uses(&self) -> u32 {
        self.uses.load(Ordering::Relaxed)
    }

    fn record_use(&self) {
        self.uses.fetch_add(1, Ordering::Relaxed);
    }

    fn is_expired(&self, policy: &TokenPolicy) -> bool {
        policy.ttl.is_some_and(|ttl| self.acquired_at.elapsed() >= ttl)
            || policy.max_uses.is_some_and(|max| self.uses() >= max)
    }
}

impl fmt::Debug for ChallengeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeToken")
            .field("generation", &self.generation)
            .field(
                "headers",
                &self.headers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
            )
            .field("uses", &self.uses())
            .finish_non_exhaustive()
    }
}

/// Performs the challenge handshake
#[async_trait]
pub trait ChallengeSource: Send + Sync {
    /// Run one handshake and return the captured headers
    async fn fetch(&self) -> Result<TokenHeaders, ChallengeError>;
}

/// Handshake against the upstream status endpoint
pub struct HttpChallengeSource {
    client: Client,
    status_url: Url,
    user_agent: String,
    token_headers: Vec<TokenHeaderConfig>,
}

impl HttpChallengeSource {
    /// Create a source from upstream configuration
    pub fn new(client: Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            status_url: config.status_url.clone(),
            user_agent: config.user_agent.clone(),
            token_headers: config.token_headers.clone(),
        }
    }
}

#[async_trait]
impl ChallengeSource for HttpChallengeSource {
    async fn fetch(&self) -> Result<TokenHeaders, ChallengeError> {
        let response = self
            .client
            .get(self.status_url.clone())
            .header(VQD_ACCEPT_HEADER, "1")
            .header(http::header::USER_AGENT, &self.user_agent)
            .header(http::header::ACCEPT, "*/*")
            .header(http::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| ChallengeError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChallengeError::Unreachable(format!("status endpoint returned {status}")));
        }

        capture_headers(response.headers(), &self.token_headers)
    }
}

/// Pick the configured token headers out of a handshake response
///
/// Optional headers that are missing are skipped.
pub fn capture_headers(headers: &HeaderMap, wanted: &[TokenHeaderConfig]) -> Result<TokenHeaders, ChallengeError> {
    let mut captured = Vec::with_capacity(wanted.len());

    for header in wanted {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| ChallengeError::Unparsable(format!("invalid header name '{}': {e}", header.name)))?;

        match headers.get(&name).filter(|v| !v.is_empty()) {
            Some(value) => captured.push((name, value.clone())),
            None if header.required => {
                return Err(ChallengeError::Unparsable(format!(
                    "missing required header '{}'",
                    header.name
                )));
            }
            None => {}
        }
    }

    Ok(captured)
}

/// Acquisition and expiry rules
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    /// Bound on one handshake attempt
    pub timeout: Duration,
    /// Attempts before giving up
    pub attempts: u32,
    /// Delay unit between attempts
    pub backoff: Duration,
    /// Age after which a token is treated as absent
    pub ttl: Option<Duration>,
    /// Uses after which a token is treated as absent
    pub max_uses: Option<u32>,
}

impl From<&UpstreamConfig> for TokenPolicy {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            timeout: config.challenge_timeout,
            attempts: config.challenge_attempts.max(1),
            backoff: RETRY_BACKOFF,
            ttl: config.token_ttl,
            max_uses: config.max_uses,
        }
    }
}

type FetchFuture = Shared<BoxFuture<'static, Result<Arc<ChallengeToken>, ChallengeError>>>;

enum TokenState {
    Empty,
    Fetching(FetchFuture),
    Valid(Arc<ChallengeToken>),
}

/// Observable manager state, for logs and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// No token held
    Empty,
    /// A handshake is in flight
    Fetching,
    /// A token of the given generation is held
    Valid(u64),
}

/// Owns the current challenge token
#[derive(Clone)]
pub struct ChallengeTokenManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    source: Arc<dyn ChallengeSource>,
    policy: TokenPolicy,
    state: Mutex<TokenState>,
    generation: AtomicU64,
}

impl ManagerInner {
    fn lock_state(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_token(&self, headers: TokenHeaders) -> Arc<ChallengeToken> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        Arc::new(ChallengeToken::new(generation, headers))
    }

    /// Run up to `attempts` handshakes, each bounded by `timeout`
    async fn acquire(&self) -> Result<Arc<ChallengeToken>, ChallengeError> {
        let mut last_error = ChallengeError::Unreachable("no handshake attempted".to_owned());

        for attempt in 1..=self.policy.attempts {
            match tokio::time::timeout(self.policy.timeout, self.source.fetch()).await {
                Ok(Ok(headers)) => {
                    let token = self.next_token(headers);
                    tracing::debug!(generation = token.generation(), attempt, "challenge token acquired");
                    return Ok(token);
                }
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "challenge handshake failed");
                    last_error = e;
                }
                Err(_) => {
                    tracing::warn!(attempt, timeout = ?self.policy.timeout, "challenge handshake timed out");
                    last_error = ChallengeError::Timeout(self.policy.timeout);
                }
            }

            if attempt < self.policy.attempts {
                tokio::time::sleep(self.policy.backoff * attempt).await;
            }
        }

        Err(last_error)
    }
}

impl ChallengeTokenManager {
    /// Create a manager with no token
    pub fn new(source: Arc<dyn ChallengeSource>, policy: TokenPolicy) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                source,
                policy,
                state: Mutex::new(TokenState::Empty),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current state
    pub fn status(&self) -> TokenStatus {
        match &*self.inner.lock_state() {
            TokenState::Empty => TokenStatus::Empty,
            TokenState::Fetching(_) => TokenStatus::Fetching,
            TokenState::Valid(token) => TokenStatus::Valid(token.generation()),
        }
    }

    /// Return the current token, running the handshake if there is none
    ///
    /// Each call counts as one use of the returned token.
    pub async fn get_token(&self) -> Result<Arc<ChallengeToken>, LlmError> {
        let fetch = {
            let mut state = self.inner.lock_state();

            if let TokenState::Valid(token) = &*state {
                if !token.is_expired(&self.inner.policy) {
                    token.record_use();
                    return Ok(Arc::clone(token));
                }
                tracing::debug!(generation = token.generation(), uses = token.uses(), "challenge token expired");
            }

            if let TokenState::Fetching(fetch) = &*state {
                fetch.clone()
            } else {
                let fetch = self.start_fetch();
                *state = TokenState::Fetching(fetch.clone());
                fetch
            }
        };

        let token = fetch.await?;
        token.record_use();
        Ok(token)
    }

    fn start_fetch(&self) -> FetchFuture {
        let inner = Arc::clone(&self.inner);

        async move {
            let result = inner.acquire().await;

            let mut state = inner.lock_state();
            if matches!(*state, TokenState::Fetching(_)) {
                *state = match &result {
                    Ok(token) => TokenState::Valid(Arc::clone(token)),
                    Err(_) => TokenState::Empty,
                };
            }

            result
        }
        .boxed()
        .shared()
    }

    /// Drop `stale` if it is still the current token
    ///
    /// A newer token is never discarded by a late invalidation.
    pub fn invalidate(&self, stale: &ChallengeToken) {
        let mut state = self.inner.lock_state();
        if let TokenState::Valid(current) = &*state
            && current.generation() == stale.generation()
        {
            tracing::debug!(generation = stale.generation(), "challenge token invalidated");
            *state = TokenState::Empty;
        }
    }

    /// Replace `stale` with the fresh values an upstream response carried
    ///
    /// Headers absent from `response` keep their old values. Nothing happens
    /// when the response carries no token header or `stale` is no longer
    /// current.
    pub fn rotate(&self, stale: &ChallengeToken, response: &HeaderMap) {
        let mut changed = false;
        let headers: TokenHeaders = stale
            .headers()
            .iter()
            .map(|(name, value)| match response.get(name).filter(|v| !v.is_empty()) {
                Some(fresh) if fresh != value => {
                    changed = true;
                    (name.clone(), fresh.clone())
                }
                _ => (name.clone(), value.clone()),
            })
            .collect();

        if !changed {
            return;
        }

        let mut state = self.inner.lock_state();
        if let TokenState::Valid(current) = &*state
            && current.generation() == stale.generation()
        {
            let token = self.inner.next_token(headers);
            tracing::debug!(
                from = stale.generation(),
                to = token.generation(),
                "challenge token rotated"
            );
            *state = TokenState::Valid(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use futures_util::future::join_all;

    use super::*;

    /// Counts handshakes and hands out numbered vqd values
    struct CountingSource {
        calls: AtomicU32,
        delay: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                fail: true,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChallengeSource for CountingSource {
        async fn fetch(&self) -> Result<TokenHeaders, ChallengeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ChallengeError::Unreachable("connection refused".to_owned()));
            }
            Ok(vec![
                (
                    HeaderName::from_static("x-vqd-4"),
                    HeaderValue::from_str(&format!("4-{n}")).unwrap(),
                ),
                (HeaderName::from_static("x-vqd-hash-1"), HeaderValue::from_static("hash")),
            ])
        }
    }

    fn policy() -> TokenPolicy {
        TokenPolicy {
            timeout: Duration::from_secs(5),
            attempts: 1,
            backoff: Duration::from_millis(1),
            ttl: None,
            max_uses: None,
        }
    }

    #[tokio::test]
    async fn first_get_runs_handshake() {
        let source = CountingSource::new(Duration::ZERO);
        let manager = ChallengeTokenManager::new(source.clone(), policy());

        let token = manager.get_token().await.unwrap();

        assert_eq!(token.generation(), 1);
        assert_eq!(token.get("x-vqd-4"), Some("4-1"));
        assert_eq!(token.get("X-VQD-HASH-1"), Some("hash"));
        assert_eq!(manager.status(), TokenStatus::Valid(1));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn valid_token_is_reused() {
        let source = CountingSource::new(Duration::ZERO);
        let manager = ChallengeTokenManager::new(source.clone(), policy());

        manager.get_token().await.unwrap();
        let token = manager.get_token().await.unwrap();

        assert_eq!(token.uses(), 2);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_handshake() {
        let source = CountingSource::new(Duration::from_millis(50));
        let manager = ChallengeTokenManager::new(source.clone(), policy());

        let tokens = join_all((0..16).map(|_| manager.get_token())).await;

        assert_eq!(source.calls(), 1);
        for token in tokens {
            assert_eq!(token.unwrap().generation(), 1);
        }
    }

    #[tokio::test]
    async fn concurrent_gets_across_tasks_share_one_handshake() {
        let source = CountingSource::new(Duration::from_millis(50));
        let manager = ChallengeTokenManager::new(source.clone(), policy());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_token().await.map(|t| t.generation()) })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn failure_is_shared_and_resets_state() {
        let source = CountingSource::failing();
        let manager = ChallengeTokenManager::new(source.clone(), policy());

        let results = join_all((0..4).map(|_| manager.get_token())).await;

        assert_eq!(source.calls(), 1);
        assert!(results.iter().all(|r| matches!(r, Err(LlmError::TokenAcquisition(_)))));
        assert_eq!(manager.status(), TokenStatus::Empty);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let source = CountingSource::failing();
        let manager = ChallengeTokenManager::new(source.clone(), TokenPolicy {
            attempts: 3,
            ..policy()
        });

        let err = manager.get_token().await.unwrap_err();

        assert!(matches!(err, LlmError::TokenAcquisition(_)));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handshake_times_out() {
        let source = CountingSource::new(Duration::from_secs(60));
        let manager = ChallengeTokenManager::new(source.clone(), TokenPolicy {
            timeout: Duration::from_secs(1),
            ..policy()
        });

        let err = manager.get_token().await.unwrap_err();

        assert!(matches!(err, LlmError::Timeout(_)));
        assert_eq!(manager.status(), TokenStatus::Empty);
    }

    #[tokio::test]
    async fn invalidate_then_get_fetches_new_generation() {
        let source = CountingSource::new(Duration::ZERO);
        let manager = ChallengeTokenManager::new(source.clone(), policy());

        let first = manager.get_token().await.unwrap();
        manager.invalidate(&first);
        assert_eq!(manager.status(), TokenStatus::Empty);

        let second = manager.get_token().await.unwrap();
        assert_eq!(second.generation(), 2);
        assert_eq!(second.get("x-vqd-4"), Some("4-2"));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn stale_invalidation_keeps_newer_token() {
        let source = CountingSource::new(Duration::ZERO);
        let manager = ChallengeTokenManager::new(source.clone(), policy());

        let first = manager.get_token().await.unwrap();
        manager.invalidate(&first);
        let second = manager.get_token().await.unwrap();

        manager.invalidate(&first);

        assert_eq!(manager.status(), TokenStatus::Valid(second.generation()));
    }

    #[tokio::test]
    async fn rotate_replaces_current_token() {
        let source = CountingSource::new(Duration::ZERO);
        let manager = ChallengeTokenManager::new(source.clone(), policy());
        let token = manager.get_token().await.unwrap();

        let mut response = HeaderMap::new();
        response.insert("x-vqd-4", HeaderValue::from_static("4-rotated"));
        manager.rotate(&token, &response);

        let rotated = manager.get_token().await.unwrap();
        assert_eq!(rotated.generation(), 2);
        assert_eq!(rotated.get("x-vqd-4"), Some("4-rotated"));
        assert_eq!(rotated.get("x-vqd-hash-1"), Some("hash"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn rotate_without_token_headers_is_noop() {
        let source = CountingSource::new(Duration::ZERO);
        let manager = ChallengeTokenManager::new(source.clone(), policy());
        let token = manager.get_token().await.unwrap();

        manager.rotate(&token, &HeaderMap::new());

        assert_eq!(manager.status(), TokenStatus::Valid(1));
    }

    #[tokio::test]
    async fn token_expires_after_max_uses() {
        let source = CountingSource::new(Duration::ZERO);
        let manager = ChallengeTokenManager::new(source.clone(), TokenPolicy {
            max_uses: Some(2),
            ..policy()
        });

        manager.get_token().await.unwrap();
        manager.get_token().await.unwrap();
        let third = manager.get_token().await.unwrap();

        assert_eq!(third.generation(), 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn token_expires_after_ttl() {
        let source = CountingSource::new(Duration::ZERO);
        let manager = ChallengeTokenManager::new(source.clone(), TokenPolicy {
            ttl: Some(Duration::from_secs(300)),
            ..policy()
        });

        manager.get_token().await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        let later = manager.get_token().await.unwrap();

        assert_eq!(later.generation(), 2);
    }

    #[test]
    fn capture_requires_configured_headers() {
        let wanted = vec![
            TokenHeaderConfig {
                name: "x-vqd-4".to_owned(),
                required: true,
            },
            TokenHeaderConfig {
                name: "x-vqd-hash-1".to_owned(),
                required: true,
            },
            TokenHeaderConfig {
                name: "x-fe-version".to_owned(),
                required: false,
            },
        ];

        let mut headers = HeaderMap::new();
        headers.insert("x-vqd-4", HeaderValue::from_static("4-abc"));
        let err = capture_headers(&headers, &wanted).unwrap_err();
        assert!(err.to_string().contains("x-vqd-hash-1"));

        headers.insert("x-vqd-hash-1", HeaderValue::from_static("hash"));
        let captured = capture_headers(&headers, &wanted).unwrap();
        assert_eq!(captured.len(), 2);
    }

    #[test]
    fn debug_hides_values() {
        let token = ChallengeToken::new(7, vec![(
            HeaderName::from_static("x-vqd-4"),
            HeaderValue::from_static("4-secret"),
        )]);
        let rendered = format!("{token:?}");
        assert!(rendered.contains("x-vqd-4"));
        assert!(!rendered.contains("4-secret"));
    }
}
