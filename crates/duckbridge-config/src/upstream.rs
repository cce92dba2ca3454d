use std::time::Duration;

use serde::Deserialize;
use url::Url;

const DEFAULT_STATUS_URL: &str = "https://duckduckgo.com/duckchat/v1/status";
const DEFAULT_CHAT_URL: &str = "https://duckduckgo.com/duckchat/v1/chat";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Upstream chat service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Challenge handshake endpoint
    #[serde(default = "default_status_url")]
    pub status_url: Url,
    /// Chat endpoint
    #[serde(default = "default_chat_url")]
    pub chat_url: Url,
    /// Browser user agent sent on every upstream call
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Headers that make up the challenge token, in the order they are sent
    #[serde(default = "default_token_headers")]
    pub token_headers: Vec<TokenHeaderConfig>,
    /// Status codes meaning the upstream rejected the token
    #[serde(default = "default_rejection_statuses")]
    pub token_rejection_statuses: Vec<u16>,
    /// Body markers meaning the upstream rejected the token
    #[serde(default = "default_rejection_markers")]
    pub token_rejection_markers: Vec<String>,
    /// Bound on a single challenge handshake attempt
    #[serde(default = "default_challenge_timeout", deserialize_with = "crate::duration::deserialize")]
    pub challenge_timeout: Duration,
    /// Handshake attempts before giving up
    #[serde(default = "default_challenge_attempts")]
    pub challenge_attempts: u32,
    /// Bound on the wait for upstream response headers
    #[serde(default = "default_first_byte_timeout", deserialize_with = "crate::duration::deserialize")]
    pub first_byte_timeout: Duration,
    /// Age after which a token is re-acquired proactively
    #[serde(
        default = "default_token_ttl",
        deserialize_with = "crate::duration::deserialize_option"
    )]
    pub token_ttl: Option<Duration>,
    /// Number of chat calls after which a token is re-acquired proactively
    #[serde(default)]
    pub max_uses: Option<u32>,
    /// Largest remote image fetched for inline upload
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            status_url: default_status_url(),
            chat_url: default_chat_url(),
            user_agent: default_user_agent(),
            token_headers: default_token_headers(),
            token_rejection_statuses: default_rejection_statuses(),
            token_rejection_markers: default_rejection_markers(),
            challenge_timeout: default_challenge_timeout(),
            challenge_attempts: default_challenge_attempts(),
            first_byte_timeout: default_first_byte_timeout(),
            token_ttl: default_token_ttl(),
            max_uses: None,
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

/// One header captured from the challenge handshake
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenHeaderConfig {
    /// Header name, case-insensitive
    pub name: String,
    /// Handshake fails when a required header is missing or empty
    #[serde(default = "default_required")]
    pub required: bool,
}

impl TokenHeaderConfig {
    fn required(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            required: true,
        }
    }
}

fn default_status_url() -> Url {
    Url::parse(DEFAULT_STATUS_URL).expect("valid default status URL")
}

fn default_chat_url() -> Url {
    Url::parse(DEFAULT_CHAT_URL).expect("valid default chat URL")
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_owned()
}

fn default_token_headers() -> Vec<TokenHeaderConfig> {
    vec![
        TokenHeaderConfig::required("x-vqd-4"),
        TokenHeaderConfig::required("x-vqd-hash-1"),
    ]
}

fn default_rejection_statuses() -> Vec<u16> {
    vec![418]
}

fn default_rejection_markers() -> Vec<String> {
    vec!["ERR_INVALID_VQD".to_owned(), "ERR_CHALLENGE".to_owned()]
}

const fn default_challenge_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_challenge_attempts() -> u32 {
    3
}

const fn default_first_byte_timeout() -> Duration {
    Duration::from_secs(30)
}

#[allow(clippy::unnecessary_wraps)]
const fn default_token_ttl() -> Option<Duration> {
    Some(Duration::from_secs(300))
}

const fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024
}

#[allow(clippy::missing_const_for_fn)]
fn default_required() -> bool {
    true
}
