//! Per-request runtime diagnostics.
//!
//! A [`RuntimeDebugger`] is resolved once per request from the `odata-debug`
//! query option. When armed it records timed spans; after dispatch the
//! registered [`DebugSupport`] turns a [`DebugInformation`] snapshot into a
//! response that replaces the real one.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::error::{ODataError, ServerError};
use super::request::{query_option, ODataResponse};
use super::route::ResourceRoute;

pub const DEBUG_QUERY_OPTION: &str = "odata-debug";

const UNREADABLE_BODY: &str = "Could not parse Body for Debug Output";

/// Output formats a [`DebugSupport`] can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugFormat {
    Json,
}

impl DebugFormat {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.eq_ignore_ascii_case("json").then_some(Self::Json)
    }
}

// ---------------------------------------------------------------------------
// RuntimeDebugger
// ---------------------------------------------------------------------------

/// One timed interval of work. Offsets are relative to the debugger's creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeMeasurement {
    pub component: &'static str,
    pub operation: &'static str,
    /// Number of spans open when this one started.
    pub depth: usize,
    #[serde(rename = "start_micros", serialize_with = "micros")]
    pub start: Duration,
    #[serde(rename = "stop_micros", serialize_with = "optional_micros")]
    pub stop: Option<Duration>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}

#[allow(clippy::ref_option)]
fn optional_micros<S: serde::Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => micros(d, s),
        None => s.serialize_none(),
    }
}

/// Handle for a started span. Not `Clone`: stopping consumes it, so a span
/// can be stopped at most once.
#[derive(Debug)]
#[must_use = "a started span must be passed to stop_span"]
pub struct SpanHandle(Option<usize>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebugState {
    Disabled,
    Armed(DebugFormat),
}

/// Request-scoped span recorder. Disabled debuggers record nothing.
#[derive(Debug)]
pub struct RuntimeDebugger {
    state: DebugState,
    origin: Instant,
    open: usize,
    spans: Vec<RuntimeMeasurement>,
}

impl RuntimeDebugger {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            state: DebugState::Disabled,
            origin: Instant::now(),
            open: 0,
            spans: Vec::new(),
        }
    }

    #[must_use]
    pub fn armed(format: DebugFormat) -> Self {
        Self {
            state: DebugState::Armed(format),
            ..Self::disabled()
        }
    }

    /// Arms the debugger when the request asks for a known debug format and
    /// a registered `support` authorizes it.
    #[must_use]
    pub fn resolve(
        raw_query: Option<&str>,
        headers: &HeaderMap,
        support: Option<&dyn DebugSupport>,
    ) -> Self {
        let requested = query_option(raw_query, DEBUG_QUERY_OPTION)
            .as_deref()
            .and_then(DebugFormat::parse);
        match (requested, support) {
            (Some(format), Some(support)) if support.is_user_authorized(headers) => {
                Self::armed(format)
            }
            _ => Self::disabled(),
        }
    }

    #[must_use]
    pub fn format(&self) -> Option<DebugFormat> {
        match self.state {
            DebugState::Armed(format) => Some(format),
            DebugState::Disabled => None,
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.format().is_some()
    }

    pub fn start_span(&mut self, component: &'static str, operation: &'static str) -> SpanHandle {
        if !self.is_armed() {
            return SpanHandle(None);
        }
        self.spans.push(RuntimeMeasurement {
            component,
            operation,
            depth: self.open,
            start: self.origin.elapsed(),
            stop: None,
        });
        self.open += 1;
        SpanHandle(Some(self.spans.len() - 1))
    }

    pub fn stop_span(&mut self, handle: SpanHandle) {
        let Some(index) = handle.0 else {
            return;
        };
        if let Some(span) = self.spans.get_mut(index) {
            if span.stop.is_none() {
                span.stop = Some(self.origin.elapsed());
                self.open = self.open.saturating_sub(1);
            }
        }
    }

    /// Stops the spans from index `first` on that are still open, e.g. after
    /// an unwind skipped their `stop_span` calls. Earlier spans are untouched.
    pub fn close_spans_since(&mut self, first: usize) {
        let now = self.origin.elapsed();
        for span in self.spans.iter_mut().skip(first) {
            if span.stop.is_none() {
                span.stop = Some(now);
                self.open = self.open.saturating_sub(1);
            }
        }
    }

    /// Recorded spans in start order.
    #[must_use]
    pub fn spans(&self) -> &[RuntimeMeasurement] {
        &self.spans
    }

    #[must_use]
    pub fn into_spans(self) -> Vec<RuntimeMeasurement> {
        self.spans
    }
}

// ---------------------------------------------------------------------------
// Debug information snapshot
// ---------------------------------------------------------------------------

/// Transport details exposed in debug output. Every field is optional since
/// not every transport knows all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportEnvironment {
    pub auth_type: Option<String>,
    pub local_addr: Option<String>,
    pub local_name: Option<String>,
    pub local_port: Option<u16>,
    pub path_info: Option<String>,
    pub path_translated: Option<String>,
    pub remote_addr: Option<String>,
    pub remote_host: Option<String>,
    pub remote_port: Option<u16>,
    pub remote_user: Option<String>,
    pub scheme: Option<String>,
    pub server_name: Option<String>,
    pub server_port: Option<u16>,
    pub servlet_path: Option<String>,
}

impl TransportEnvironment {
    /// Name/value pairs in a fixed order. Absent or zero ports render as `unknown`.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, Option<String>)> {
        let port = |p: Option<u16>| {
            Some(p.filter(|&p| p != 0).map_or_else(|| "unknown".to_string(), |p| p.to_string()))
        };
        vec![
            ("authType", self.auth_type.clone()),
            ("localAddr", self.local_addr.clone()),
            ("localName", self.local_name.clone()),
            ("localPort", port(self.local_port)),
            ("pathInfo", self.path_info.clone()),
            ("pathTranslated", self.path_translated.clone()),
            ("remoteAddr", self.remote_addr.clone()),
            ("remoteHost", self.remote_host.clone()),
            ("remotePort", port(self.remote_port)),
            ("remoteUser", self.remote_user.clone()),
            ("scheme", self.scheme.clone()),
            ("serverName", self.server_name.clone()),
            ("serverPort", port(self.server_port)),
            ("servletPath", self.servlet_path.clone()),
        ]
    }
}

/// Request line and headers as received.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: String,
    pub uri: String,
    pub protocol: String,
    pub headers: HeaderMap,
}

/// The real response, with its body fully read.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the response had no body; `Err` when it could not be read.
    pub body: Option<Result<Bytes, String>>,
}

impl ResponseSnapshot {
    /// Drains the content of `response`.
    pub async fn capture(mut response: ODataResponse) -> Self {
        let body = match response.content.take() {
            None => None,
            Some(mut content) => {
                let mut buffer = Vec::new();
                Some(
                    tokio::io::AsyncReadExt::read_to_end(&mut content, &mut buffer)
                        .await
                        .map(|_| Bytes::from(buffer))
                        .map_err(|e| e.to_string()),
                )
            }
        };
        Self {
            status: response.status,
            headers: response.headers,
            body,
        }
    }
}

/// Everything a [`DebugSupport`] may render for one request.
#[derive(Debug)]
pub struct DebugInformation {
    pub request: RequestSummary,
    pub response: ResponseSnapshot,
    pub error: Option<ODataError>,
    pub route: Option<ResourceRoute>,
    pub environment: TransportEnvironment,
    pub runtime: Vec<RuntimeMeasurement>,
}

// ---------------------------------------------------------------------------
// Response body classification
// ---------------------------------------------------------------------------

/// How a response body is shown in debug output, sniffed from its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseContent {
    Json,
    Xml,
    Text,
    Image,
}

impl ResponseContent {
    #[must_use]
    pub fn classify(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.starts_with("application/json") => Self::Json,
            Some(ct) if ct.starts_with("image/") => Self::Image,
            Some(ct) if ct.contains("xml") => Self::Xml,
            _ => Self::Text,
        }
    }

    /// Renders `body` for embedding in a JSON debug document.
    #[must_use]
    pub fn render(self, body: &[u8]) -> Value {
        match self {
            Self::Json => serde_json::from_slice(body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned())),
            Self::Xml | Self::Text => Value::String(String::from_utf8_lossy(body).into_owned()),
            Self::Image => Value::String(STANDARD.encode(body)),
        }
    }
}

// ---------------------------------------------------------------------------
// DebugSupport
// ---------------------------------------------------------------------------

/// Renders debug output. Debugging is only possible when one is registered.
pub trait DebugSupport: Send + Sync {
    /// Whether the caller may see debug output.
    fn is_user_authorized(&self, _headers: &HeaderMap) -> bool {
        true
    }

    fn create_debug_response(&self, format: DebugFormat, info: DebugInformation) -> ODataResponse;
}

/// Renders [`DebugInformation`] as a single JSON document.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDebugSupport;

impl DebugSupport for JsonDebugSupport {
    fn create_debug_response(&self, _format: DebugFormat, info: DebugInformation) -> ODataResponse {
        let document = debug_document(&info);
        ODataResponse::with_body(StatusCode::OK, "application/json", document.to_string())
    }
}

fn debug_document(info: &DebugInformation) -> Value {
    let content = ResponseContent::classify(
        info.response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );
    let body = match &info.response.body {
        None => Value::Null,
        Some(Ok(bytes)) => content.render(bytes),
        Some(Err(_)) => json!(UNREADABLE_BODY),
    };

    let environment: Map<String, Value> = info
        .environment
        .entries()
        .into_iter()
        .map(|(name, value)| (name.to_string(), json!(value)))
        .collect();

    json!({
        "request": {
            "method": info.request.method,
            "uri": info.request.uri,
            "protocol": info.request.protocol,
            "headers": headers_json(&info.request.headers),
        },
        "response": {
            "status": {
                "code": info.response.status.as_u16(),
                "info": info.response.status.canonical_reason().unwrap_or_default(),
            },
            "headers": headers_json(&info.response.headers),
            "body": body,
        },
        "server": {
            "version": concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            "environment": environment,
        },
        "uri": info.route,
        "runtime": info.runtime,
        "exception": info.error.as_ref().map(exception_json),
    })
}

/// Single-valued headers render as a string, repeated ones as an array.
fn headers_json(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for name in headers.keys() {
        let values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|v| json!(String::from_utf8_lossy(v.as_bytes())))
            .collect();
        let value = match <[Value; 1]>::try_from(values) {
            Ok([single]) => single,
            Err(many) => Value::Array(many),
        };
        out.insert(name.as_str().to_string(), value);
    }
    Value::Object(out)
}

fn exception_json(error: &ODataError) -> Value {
    let mapped = ServerError::from(error);
    let mut chain = Vec::new();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    json!({
        "code": mapped.code,
        "status": mapped.status.as_u16(),
        "message": error.to_string(),
        "causes": chain,
    })
}
