//! Protocol-level dispatch: route, validate, negotiate, invoke a processor,
//! and turn any failure into an error response.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use http::header::{ACCEPT, CONTENT_TYPE, IF_MATCH, IF_NONE_MATCH};
use http::HeaderMap;
use odata_core::MetadataCache;
use tracing::{debug, warn};

use super::config::ServerConfig;
use super::debug::RuntimeDebugger;
use super::error::{DispatchError, LibraryError, ODataError, ServerError};
use super::method::HttpMethod;
use super::negotiate::{
    negotiate, supported_content_types, ContentType, CustomContentTypeSupport, RepresentationKind,
};
use super::processor::DefaultProcessor;
use super::registry::{
    CustomETagSupport, ErrorProcessor, ProcessContext, Processor, ProcessorRegistry,
};
use super::request::{query_option, ODataRequest, ODataResponse, FORMAT_QUERY_OPTION};
use super::route::{resolve_route, ResourceKind, ResourceRoute};

/// Result of handling one request.
///
/// The error that produced an error response travels with it instead of
/// being stored on the handler, so concurrent requests never see each
/// other's failures.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub response: ODataResponse,
    pub error: Option<ODataError>,
    pub route: Option<ResourceRoute>,
}

/// Dispatches protocol-neutral requests to registered processors.
///
/// Registration takes `&mut self`; wrap the handler in an `Arc` once it is
/// configured.
pub struct ODataHandler {
    metadata: Arc<MetadataCache>,
    config: Arc<ServerConfig>,
    processors: ProcessorRegistry,
    error_processor: Arc<dyn ErrorProcessor>,
    content_types: Option<Arc<dyn CustomContentTypeSupport>>,
    etags: Option<Arc<dyn CustomETagSupport>>,
}

impl ODataHandler {
    /// Creates a handler with [`DefaultProcessor`] registered for the service
    /// document, the metadata document and error rendering.
    #[must_use]
    pub fn new(metadata: Arc<MetadataCache>, config: Arc<ServerConfig>) -> Self {
        let mut processors = ProcessorRegistry::new();
        processors.register(Arc::new(DefaultProcessor));
        Self {
            metadata,
            config,
            processors,
            error_processor: Arc::new(DefaultProcessor),
            content_types: None,
            etags: None,
        }
    }

    pub fn register_processor(&mut self, processor: Arc<dyn Processor>) {
        self.processors.register(processor);
    }

    pub fn register_error_processor(&mut self, processor: Arc<dyn ErrorProcessor>) {
        self.error_processor = processor;
    }

    pub fn register_content_type_support(&mut self, support: Arc<dyn CustomContentTypeSupport>) {
        self.content_types = Some(support);
    }

    pub fn register_etag_support(&mut self, support: Arc<dyn CustomETagSupport>) {
        self.etags = Some(support);
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handles `request`. Never fails: errors become error responses and are
    /// returned alongside them. A panic anywhere in dispatch, including the
    /// metadata provider and registered extensions, becomes an internal error.
    pub async fn process(
        &self,
        request: &ODataRequest,
        debugger: &mut RuntimeDebugger,
    ) -> HandlerOutcome {
        let mut route = None;
        let first_span = debugger.spans().len();
        let caught = AssertUnwindSafe(self.dispatch(request, debugger, &mut route))
            .catch_unwind()
            .await;
        let dispatched = match caught {
            Ok(result) => result,
            Err(panic) => {
                debugger.close_spans_since(first_span);
                Err(anyhow::anyhow!("dispatch panicked: {}", panic_message(&*panic)).into())
            }
        };
        match dispatched {
            Ok(response) => HandlerOutcome {
                response,
                error: None,
                route,
            },
            Err(error) => {
                let server_error = ServerError::from(&error);
                let span = debugger.start_span("ErrorProcessor", "process_error");
                let response = self.handle_error(
                    &request.headers,
                    request.raw_query_path.as_deref(),
                    &server_error,
                );
                debugger.stop_span(span);
                HandlerOutcome {
                    response,
                    error: Some(error),
                    route,
                }
            }
        }
    }

    /// Renders `error` in the format the request asked for, falling back to
    /// JSON when the requested format is not available for errors. If the
    /// registered error processor or content-type support panics, the default
    /// processor renders the error as JSON instead.
    #[must_use]
    pub fn handle_error(
        &self,
        headers: &HeaderMap,
        raw_query: Option<&str>,
        error: &ServerError,
    ) -> ODataResponse {
        if error.status.is_server_error() {
            warn!(
                status = error.status.as_u16(),
                code = %error.code,
                cause = error.cause.as_deref().unwrap_or_default(),
                "request failed"
            );
        } else {
            debug!(status = error.status.as_u16(), code = %error.code, "request rejected");
        }

        let format = query_option(raw_query, FORMAT_QUERY_OPTION);
        let accept = headers.get(ACCEPT).and_then(|v| v.to_str().ok());
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
            let content_type = negotiate(
                format.as_deref(),
                accept,
                RepresentationKind::Error,
                self.content_types.as_deref(),
            )
            .unwrap_or_else(|_| ContentType::json());
            self.error_processor.process_error(error, &content_type)
        }));
        rendered.unwrap_or_else(|panic| {
            warn!(
                panic = panic_message(&*panic),
                "error rendering panicked, using default JSON body"
            );
            DefaultProcessor.process_error(error, &ContentType::json())
        })
    }

    async fn dispatch(
        &self,
        request: &ODataRequest,
        debugger: &mut RuntimeDebugger,
        route_out: &mut Option<ResourceRoute>,
    ) -> Result<ODataResponse, ODataError> {
        let span = debugger.start_span("UriParser", "resolve_route");
        let resolved = resolve_route(
            &request.raw_odata_path,
            &self.metadata,
            self.config.key_as_segment,
        );
        debugger.stop_span(span);
        let route: &ResourceRoute = route_out.insert(resolved?);

        if !route.kind.allows(request.method) {
            return Err(DispatchError::MethodNotAllowed {
                method: request.method,
                resource: route.kind,
            }
            .into());
        }
        self.check_preconditions(request, route)?;
        self.check_request_content_type(request, route.kind)?;

        let content_type = negotiate(
            request.query_option(FORMAT_QUERY_OPTION).as_deref(),
            request.header(&ACCEPT),
            route.kind.into(),
            self.content_types.as_deref(),
        )?;

        let processor = self
            .processors
            .get(route.kind)
            .ok_or(DispatchError::ProcessorNotImplemented { kind: route.kind })?;
        debug!(
            method = %request.method,
            kind = ?route.kind,
            processor = processor.name(),
            content_type = %content_type,
            "dispatching"
        );

        let ctx = ProcessContext {
            request,
            route,
            content_type: &content_type,
            metadata: &self.metadata,
        };
        let span = debugger.start_span(processor.name(), "process");
        let result = processor.process(ctx).await;
        debugger.stop_span(span);
        result
    }

    /// Modifying an entity of an ETag-protected set requires a precondition header.
    fn check_preconditions(
        &self,
        request: &ODataRequest,
        route: &ResourceRoute,
    ) -> Result<(), LibraryError> {
        let Some(etags) = &self.etags else {
            return Ok(());
        };
        let modifying = matches!(
            request.method,
            HttpMethod::Put | HttpMethod::Patch | HttpMethod::Merge | HttpMethod::Delete
        );
        if !modifying || !matches!(route.kind, ResourceKind::Entity | ResourceKind::Property) {
            return Ok(());
        }
        let Some(entity_set) = route.entity_set.as_deref() else {
            return Ok(());
        };
        let has_precondition =
            request.headers.contains_key(IF_MATCH) || request.headers.contains_key(IF_NONE_MATCH);
        if etags.has_etag(entity_set) && !has_precondition {
            return Err(LibraryError::PreconditionMissingHeader { header: "If-Match" });
        }
        Ok(())
    }

    /// A non-empty body must declare a content type the target kind accepts.
    fn check_request_content_type(
        &self,
        request: &ODataRequest,
        kind: ResourceKind,
    ) -> Result<(), DispatchError> {
        if !request.method.has_body() || request.body.is_empty() {
            return Ok(());
        }
        let raw = request
            .header(&CONTENT_TYPE)
            .ok_or(DispatchError::MissingContentType)?;
        let unsupported = || DispatchError::UnsupportedContentType {
            content_type: raw.to_string(),
        };
        let parsed: ContentType = raw.parse().map_err(|_| unsupported())?;
        let supported = supported_content_types(kind.into(), self.content_types.as_deref());
        if supported.iter().any(|s| s.is_compatible(&parsed)) {
            Ok(())
        } else {
            Err(unsupported())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
