use std::net::SocketAddr;

use serde::Deserialize;

use crate::cors::CorsConfig;

/// Default port when neither the config nor `PORT` sets one
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_address: Option<SocketAddr>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Liveness route; answers `200 ok` without touching the upstream
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_owned(),
        }
    }
}

impl ServerConfig {
    /// Resolve the address to bind, falling back to `0.0.0.0:$PORT`
    pub fn effective_listen_address(&self) -> SocketAddr {
        self.listen_address.unwrap_or_else(|| {
            let port = std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT);
            SocketAddr::from(([0, 0, 0, 0], port))
        })
    }
}
