#![allow(clippy::must_use_candidate)]

pub mod cors;
mod duration;
mod env;
mod loader;
pub mod models;
pub mod server;
pub mod telemetry;
pub mod upstream;

use serde::Deserialize;

pub use cors::*;
pub use models::*;
pub use server::*;
pub use telemetry::*;
pub use upstream::*;

/// Top-level duckbridge configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream chat service and challenge handshake
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Model catalog served from `/v1/models`
    #[serde(default)]
    pub models: ModelsConfig,
    /// Logging and trace export
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
