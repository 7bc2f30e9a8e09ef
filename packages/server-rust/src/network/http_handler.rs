//! HTTP entry point: normalize, dispatch, optionally wrap in debug output,
//! then materialize.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use http::Response;
use metrics::{counter, histogram};

use super::inbound::InboundRequest;
use super::materialize::convert_to_http;
use crate::service::debug::{
    DebugFormat, DebugInformation, DebugSupport, RequestSummary, ResponseSnapshot,
    RuntimeDebugger, TransportEnvironment,
};
use crate::service::negotiate::CustomContentTypeSupport;
use crate::service::registry::{CustomETagSupport, ErrorProcessor, Processor};
use crate::service::request::ODataResponse;
use crate::service::{HandlerOutcome, HttpMethod, ODataHandler, ServerError};

const COMPONENT: &str = "ODataHttpHandler";

/// Wraps [`ODataHandler`] for the HTTP transport.
pub struct ODataHttpHandler {
    handler: ODataHandler,
    debug_support: Option<Arc<dyn DebugSupport>>,
}

impl ODataHttpHandler {
    #[must_use]
    pub fn new(handler: ODataHandler) -> Self {
        Self {
            handler,
            debug_support: None,
        }
    }

    #[must_use]
    pub fn handler(&self) -> &ODataHandler {
        &self.handler
    }

    pub fn register_processor(&mut self, processor: Arc<dyn Processor>) {
        self.handler.register_processor(processor);
    }

    pub fn register_error_processor(&mut self, processor: Arc<dyn ErrorProcessor>) {
        self.handler.register_error_processor(processor);
    }

    pub fn register_content_type_support(&mut self, support: Arc<dyn CustomContentTypeSupport>) {
        self.handler.register_content_type_support(support);
    }

    pub fn register_etag_support(&mut self, support: Arc<dyn CustomETagSupport>) {
        self.handler.register_etag_support(support);
    }

    /// Enables debug output for requests that `support` authorizes.
    pub fn register_debug_support(&mut self, support: Arc<dyn DebugSupport>) {
        self.debug_support = Some(support);
    }

    /// Handles one request. Every failure before or during dispatch ends up
    /// as an error response; only a body stream failure after this returns
    /// can still break the exchange.
    pub async fn process(&self, mut inbound: InboundRequest) -> Response<Body> {
        let started = Instant::now();
        let mut debugger = RuntimeDebugger::resolve(
            inbound.query(),
            inbound.headers(),
            self.debug_support.as_deref(),
        );

        let outer = debugger.start_span(COMPONENT, "process");
        let span = debugger.start_span(COMPONENT, "normalize");
        let config = self.handler.config();
        let normalized = inbound
            .normalize(config.split, config.max_body_bytes)
            .await;
        debugger.stop_span(span);

        let outcome = match normalized {
            Ok(request) => self.handler.process(&request, &mut debugger).await,
            Err(error) => {
                let server_error = ServerError::from(&error);
                let response =
                    self.handler
                        .handle_error(inbound.headers(), inbound.query(), &server_error);
                HandlerOutcome {
                    response,
                    error: Some(error),
                    route: None,
                }
            }
        };
        debugger.stop_span(outer);

        let method = HttpMethod::parse(inbound.method()).map_or("OTHER", HttpMethod::as_str);
        counter!(
            "odata_requests_total",
            "method" => method,
            "status" => outcome.response.status.as_u16().to_string()
        )
        .increment(1);
        histogram!("odata_request_duration_seconds").record(started.elapsed().as_secs_f64());

        let response = match debugger.format() {
            Some(format) => {
                let request = inbound.summary();
                let environment = inbound.environment().clone();
                self.debug_response(format, request, environment, outcome, debugger)
                    .await
            }
            None => outcome.response,
        };
        convert_to_http(response)
    }

    async fn debug_response(
        &self,
        format: DebugFormat,
        request: RequestSummary,
        environment: TransportEnvironment,
        outcome: HandlerOutcome,
        debugger: RuntimeDebugger,
    ) -> ODataResponse {
        let Some(support) = &self.debug_support else {
            return outcome.response;
        };
        let HandlerOutcome {
            response,
            error,
            route,
        } = outcome;
        let info = DebugInformation {
            request,
            response: ResponseSnapshot::capture(response).await,
            error,
            route,
            environment,
            runtime: debugger.into_spans(),
        };
        support.create_debug_response(format, info)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use http::{HeaderMap, Method, Request, StatusCode};
    use serde_json::Value;

    use super::*;
    use crate::service::testing::metadata;
    use crate::service::{JsonDebugSupport, ServerConfig};

    struct DenyAll;

    impl DebugSupport for DenyAll {
        fn is_user_authorized(&self, _headers: &HeaderMap) -> bool {
            false
        }

        fn create_debug_response(
            &self,
            _format: DebugFormat,
            _info: DebugInformation,
        ) -> ODataResponse {
            ODataResponse::new(StatusCode::IM_A_TEAPOT)
        }
    }

    fn http_handler(debug: Option<Arc<dyn DebugSupport>>) -> ODataHttpHandler {
        let mut handler = ODataHttpHandler::new(ODataHandler::new(
            metadata(),
            Arc::new(ServerConfig::default()),
        ));
        if let Some(support) = debug {
            handler.register_debug_support(support);
        }
        handler
    }

    fn inbound(method: Method, uri: &str) -> InboundRequest {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "example.com")
            .body(Body::empty())
            .unwrap();
        let remote: SocketAddr = "192.168.1.5:40000".parse().unwrap();
        InboundRequest::from_http(request, &ServerConfig::default(), Some(remote), None)
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn serves_service_document() {
        let handler = http_handler(None);
        let response = handler.process(inbound(Method::GET, "/odata/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert_eq!(doc["@odata.context"], "http://example.com/odata/$metadata");
    }

    #[tokio::test]
    async fn normalization_failure_becomes_error_response() {
        let handler = http_handler(None);
        let method = Method::from_bytes(b"BREW").unwrap();
        let response = handler.process(inbound(method, "/odata/People")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let doc = body_json(response).await;
        assert_eq!(doc["error"]["code"], "INVALID_HTTP_METHOD");
    }

    #[tokio::test]
    async fn debug_output_wraps_real_response() {
        let handler = http_handler(Some(Arc::new(JsonDebugSupport)));
        let response = handler
            .process(inbound(Method::GET, "/odata/Nope?odata-debug=json"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let doc = body_json(response).await;
        assert_eq!(doc["response"]["status"]["code"], 404);
        assert_eq!(
            doc["response"]["body"]["error"]["code"],
            "RESOURCE_NOT_FOUND"
        );
        assert_eq!(doc["exception"]["code"], "RESOURCE_NOT_FOUND");
        assert_eq!(doc["server"]["environment"]["remoteAddr"], "192.168.1.5");
        assert_eq!(doc["server"]["environment"]["localPort"], "unknown");

        let runtime = doc["runtime"].as_array().unwrap();
        assert!(runtime.iter().all(|span| span["stop_micros"].is_u64()));
        assert_eq!(runtime[0]["component"], COMPONENT);
    }

    #[tokio::test]
    async fn debug_requires_registered_and_authorizing_support() {
        let unsupported = http_handler(None);
        let response = unsupported
            .process(inbound(Method::GET, "/odata/?odata-debug=json"))
            .await;
        let doc = body_json(response).await;
        assert!(doc.get("runtime").is_none());
        assert!(doc.get("value").is_some());

        let denied = http_handler(Some(Arc::new(DenyAll)));
        let response = denied
            .process(inbound(Method::GET, "/odata/?odata-debug=json"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_debug_format_is_ignored() {
        let handler = http_handler(Some(Arc::new(JsonDebugSupport)));
        let response = handler
            .process(inbound(Method::GET, "/odata/?odata-debug=html"))
            .await;
        let doc = body_json(response).await;
        assert!(doc.get("value").is_some());
    }
}
