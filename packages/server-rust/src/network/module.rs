//! Network module with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds the listener, `serve()`
//! accepts connections until shutdown. Handlers are registered on the
//! [`ODataHttpHandler`] before it is passed in, so nothing mutates it once
//! traffic flows.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, odata_handler, readiness_handler, AppState,
};
use super::http_handler::ODataHttpHandler;
use super::lifecycle::Lifecycle;
use super::middleware::build_http_layers;

/// Owns the listener and the HTTP stack.
pub struct NetworkModule {
    config: NetworkConfig,
    odata: Arc<ODataHttpHandler>,
    listener: Option<TcpListener>,
    lifecycle: Arc<Lifecycle>,
    start_time: Instant,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, odata: ODataHttpHandler) -> Self {
        Self {
            config,
            odata: Arc::new(odata),
            listener: None,
            lifecycle: Arc::new(Lifecycle::new()),
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// Address of the bound listener, once `start()` succeeded.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Routes:
    /// - `GET /health`, `/health/live`, `/health/ready`
    /// - any method on `{context_path}{service_path}` and everything below it
    pub fn build_router(&self) -> Router {
        let state = AppState {
            odata: Arc::clone(&self.odata),
            lifecycle: Arc::clone(&self.lifecycle),
            local_addr: self.local_addr(),
            start_time: self.start_time,
        };

        let server_config = self.odata.handler().config();
        let mount = format!("{}{}", server_config.context_path, server_config.service_path);
        let mount = mount.trim_end_matches('/');

        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler));
        let router = if mount.is_empty() {
            router.fallback(odata_handler)
        } else {
            router
                .route(mount, any(odata_handler))
                .route(&format!("{mount}/"), any(odata_handler))
                .route(&format!("{mount}/{{*rest}}"), any(odata_handler))
        };

        router
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the listener and returns the bound port, which differs from the
    /// configured one when that was 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains.
    ///
    /// Readiness turns to 503 as soon as the signal fires; in-flight requests
    /// get `drain_timeout` to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let lifecycle = Arc::clone(&self.lifecycle);

        lifecycle.mark_ready();
        let signal_lifecycle = Arc::clone(&lifecycle);
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutdown requested, draining");
            signal_lifecycle.begin_drain();
        })
        .await?;

        lifecycle.begin_drain();
        if lifecycle.drain(self.config.drain_timeout).await {
            info!("all requests drained");
        } else {
            warn!(in_flight = lifecycle.in_flight(), "drain timeout expired");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::network::lifecycle::HealthState;
    use crate::service::testing::metadata;
    use crate::service::{JsonDebugSupport, ODataHandler, ServerConfig};

    fn module(server_config: ServerConfig) -> NetworkModule {
        let mut odata =
            ODataHttpHandler::new(ODataHandler::new(metadata(), Arc::new(server_config)));
        odata.register_debug_support(Arc::new(JsonDebugSupport));
        NetworkModule::new(NetworkConfig::default(), odata)
    }

    async fn send(router: Router, method: Method, uri: &str) -> (StatusCode, http::HeaderMap, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "localhost")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    #[tokio::test]
    async fn service_root_with_and_without_trailing_slash() {
        let router = module(ServerConfig::default()).build_router();
        for uri in ["/odata", "/odata/"] {
            let (status, headers, body) = send(router.clone(), Method::GET, uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert!(headers.contains_key("x-request-id"));
            assert_eq!(body["@odata.context"], "http://localhost/odata/$metadata");
        }
    }

    #[tokio::test]
    async fn metadata_document_end_to_end() {
        let router = module(ServerConfig::default()).build_router();
        let (status, headers, body) = send(router, Method::GET, "/odata/$metadata").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["odata-version"], "4.0");
        assert_eq!(body["$EntityContainer"], "Demo.Model.Container");
    }

    #[tokio::test]
    async fn errors_are_structured_end_to_end() {
        let router = module(ServerConfig::default()).build_router();

        let (status, _, body) = send(router.clone(), Method::GET, "/odata/Nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");

        let (status, _, body) = send(router.clone(), Method::DELETE, "/odata/$metadata").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"]["code"], "HTTP_METHOD_NOT_ALLOWED");

        let (status, _, body) = send(router, Method::GET, "/odata/People").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["error"]["code"], "PROCESSOR_NOT_IMPLEMENTED");
    }

    #[tokio::test]
    async fn context_path_and_split_end_to_end() {
        let router = module(ServerConfig {
            context_path: "/app".into(),
            split: 1,
            ..ServerConfig::default()
        })
        .build_router();

        let (status, _, body) =
            send(router.clone(), Method::GET, "/app/odata/tenant-a/$metadata").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("$Version").is_some());

        let (status, _, _) = send(router, Method::GET, "/odata/$metadata").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn debug_mode_end_to_end() {
        let router = module(ServerConfig::default()).build_router();
        let (status, _, body) =
            send(router, Method::GET, "/odata/$metadata?odata-debug=json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request"]["method"], "GET");
        assert_eq!(body["response"]["status"]["code"], 200);
        assert!(body["response"]["body"]["$Version"].is_string());
        assert_eq!(body["uri"]["kind"], "Metadata");
    }

    #[tokio::test]
    async fn health_routes_are_outside_the_service() {
        let module = module(ServerConfig::default());
        module.lifecycle().mark_ready();
        let router = module.build_router();

        let (status, _, body) = send(router.clone(), Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "ready");

        let (status, _, _) = send(router, Method::GET, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_mount_serves_everything_else() {
        let router = module(ServerConfig {
            service_path: String::new(),
            ..ServerConfig::default()
        })
        .build_router();
        let (status, _, body) = send(router, Method::GET, "/$metadata").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("$Version").is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = module(ServerConfig::default());
        assert!(module.serve(std::future::ready(())).await.is_err());
    }

    #[tokio::test]
    async fn serve_stops_on_signal() {
        let mut module = module(ServerConfig::default());
        let port = module.start().await.unwrap();
        assert!(port > 0);
        let lifecycle = module.lifecycle();

        module.serve(std::future::ready(())).await.unwrap();
        assert_eq!(lifecycle.state(), HealthState::Stopped);
    }
}
