use std::fmt::Display;
use std::str::FromStr;

use duckbridge_config::{AnyOrArray, CorsConfig};
use http::header::HeaderName;
use http::{HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// CORS layer for the configured origins, methods and headers
///
/// Entries that do not parse are skipped with a warning.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = match &config.origins {
        AnyOrArray::Any => AllowOrigin::any(),
        AnyOrArray::List(origins) => AllowOrigin::list(parse_all::<HeaderValue>("origin", origins)),
    };
    let methods = match &config.methods {
        AnyOrArray::Any => AllowMethods::any(),
        AnyOrArray::List(methods) => AllowMethods::list(parse_all::<Method>("method", methods)),
    };
    let headers = match &config.headers {
        AnyOrArray::Any => AllowHeaders::any(),
        AnyOrArray::List(headers) => AllowHeaders::list(parse_all::<HeaderName>("header", headers)),
    };

    let mut layer = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers);

    if !config.expose_headers.is_empty() {
        layer = layer.expose_headers(parse_all::<HeaderName>("expose header", &config.expose_headers));
    }

    // tower-http panics on credentials with a wildcard origin
    if config.credentials && config.origins != AnyOrArray::Any {
        layer = layer.allow_credentials(true);
    }

    if let Some(max_age) = config.max_age_duration() {
        layer = layer.max_age(max_age);
    }

    layer
}

fn parse_all<T>(kind: &str, values: &[String]) -> Vec<T>
where
    T: FromStr,
    T::Err: Display,
{
    values
        .iter()
        .filter_map(|value| {
            value
                .parse()
                .inspect_err(|e| tracing::warn!(%value, error = %e, "ignoring invalid CORS {kind}"))
                .ok()
        })
        .collect()
}
