//! Tower layers wrapped around every HTTP route.
//!
//! Listed outermost first: the first layer sees the request first and the
//! response last.

use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        TimeoutLayer,
        Stack<
            CorsLayer,
            Stack<
                CompressionLayer,
                Stack<
                    TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
                    Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>,
                >,
            >,
        >,
    >,
>;

/// Builds the transport middleware:
///
/// 1. `SetRequestId` assigns `X-Request-Id` when the client sent none
/// 2. `Trace` opens a span per request
/// 3. `Compression` gzips response bodies
/// 4. `CORS` per `cors_origins`, allowing every verb the dispatcher knows
/// 5. `Timeout` answers 408 once `request_timeout` elapses
/// 6. `PropagateRequestId` echoes `X-Request-Id` on the response
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .into_inner()
}

fn cors_methods() -> Vec<Method> {
    let mut methods = vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ];
    methods.extend(Method::from_bytes(b"MERGE").ok());
    methods
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(cors_methods())
        .allow_headers(Any)
        .expose_headers([X_REQUEST_ID])
}
