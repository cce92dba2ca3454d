mod cors;

use std::net::SocketAddr;

use axum::Router;
use duckbridge_config::Config;
use duckbridge_llm::LlmState;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let llm_state = LlmState::from_config(&config.upstream, &config.models)?;
        Ok(Self::with_state(config, llm_state))
    }

    /// Build the server around an existing chat state
    pub fn with_state(config: &Config, llm_state: LlmState) -> Self {
        let listen_address = config.server.effective_listen_address();

        let mut app = Router::new();

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health));
        }

        app = app
            .merge(duckbridge_llm::llm_router(llm_state))
            .method_not_allowed_fallback(method_not_allowed)
            .fallback(not_found);

        app = app.layer(TraceLayer::new_for_http());

        if config.server.cors.enabled {
            app = app.layer(cors::cors_layer(&config.server.cors));
        }

        Self {
            router: app,
            listen_address,
        }
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok"}))
}

async fn not_found(uri: http::Uri) -> axum::response::Response {
    routing_error(http::StatusCode::NOT_FOUND, format!("no route for {}", uri.path()))
}

async fn method_not_allowed(method: http::Method, uri: http::Uri) -> axum::response::Response {
    routing_error(
        http::StatusCode::METHOD_NOT_ALLOWED,
        format!("method {method} is not allowed for {}", uri.path()),
    )
}

fn routing_error(status: http::StatusCode, message: String) -> axum::response::Response {
    use axum::response::IntoResponse;

    let body = duckbridge_core::ErrorBody {
        error: duckbridge_core::ErrorDetail {
            message,
            error_type: "invalid_request_error".to_owned(),
        },
    };
    (status, axum::Json(body)).into_response()
}
