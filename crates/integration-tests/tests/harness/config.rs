//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::time::Duration;

use duckbridge_config::{Config, ModelEntry, ServerConfig};

use super::mock_duck::MockDuck;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Point the upstream at `mock` with short timeouts
    pub fn new(mock: &MockDuck) -> Self {
        let mut config = Config {
            server: ServerConfig {
                listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                ..ServerConfig::default()
            },
            ..Config::default()
        };

        config.upstream.status_url = mock.status_url().parse().expect("valid status URL");
        config.upstream.chat_url = mock.chat_url().parse().expect("valid chat URL");
        config.upstream.challenge_timeout = Duration::from_secs(5);
        config.upstream.first_byte_timeout = Duration::from_secs(5);

        Self { config }
    }

    /// Replace the model catalog
    pub fn with_catalog(mut self, entries: Vec<ModelEntry>) -> Self {
        self.config.models.catalog = Some(entries);
        self
    }

    /// Retire the token after `n` uses
    pub fn with_max_uses(mut self, n: u32) -> Self {
        self.config.upstream.max_uses = Some(n);
        self
    }

    /// Give up on chat calls whose headers take longer than `timeout`
    pub fn with_first_byte_timeout(mut self, timeout: Duration) -> Self {
        self.config.upstream.first_byte_timeout = timeout;
        self
    }

    /// Cap inlined image size
    pub fn with_max_image_bytes(mut self, n: usize) -> Self {
        self.config.upstream.max_image_bytes = n;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
