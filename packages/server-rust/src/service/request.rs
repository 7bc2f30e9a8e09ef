//! Protocol-neutral request and response values passed through dispatch.

use std::fmt;
use std::io::Cursor;
use std::pin::Pin;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use tokio::io::AsyncRead;

use super::method::HttpMethod;

/// Body stream of a response.
pub type Content = Pin<Box<dyn AsyncRead + Send>>;

pub const FORMAT_QUERY_OPTION: &str = "$format";

/// Looks up a query option by name, percent-decoding names and values.
///
/// The first occurrence wins.
#[must_use]
pub fn query_option(raw_query: Option<&str>, name: &str) -> Option<String> {
    let query = raw_query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

// ---------------------------------------------------------------------------
// ODataRequest
// ---------------------------------------------------------------------------

/// An inbound request, independent of the transport it arrived on.
#[derive(Debug, Clone)]
pub struct ODataRequest {
    pub method: HttpMethod,
    /// Protocol version string, e.g. `HTTP/1.1`.
    pub protocol: String,
    /// All header values in arrival order.
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Request URL including `?query` when present.
    pub raw_request_uri: String,
    pub raw_base_uri: String,
    pub raw_odata_path: String,
    pub raw_query_path: Option<String>,
    pub raw_service_resolution_uri: Option<String>,
}

impl ODataRequest {
    /// First value of header `name`, if it is valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn query_option(&self, name: &str) -> Option<String> {
        query_option(self.raw_query_path.as_deref(), name)
    }
}

// ---------------------------------------------------------------------------
// ODataResponse
// ---------------------------------------------------------------------------

/// A response produced by a processor or by error handling.
pub struct ODataResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content: Option<Content>,
}

impl ODataResponse {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content: None,
        }
    }

    /// Response with a fully buffered body and the given content type.
    #[must_use]
    pub fn with_body(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(status);
        response.set_header(CONTENT_TYPE, content_type);
        response.set_body(body);
        response
    }

    /// Replaces every value of `name`. Values that are not valid header text
    /// are dropped.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
    }

    /// Appends one more value to `name`.
    pub fn add_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.content = Some(Box::pin(Cursor::new(body.into())));
    }

    pub fn set_content(&mut self, content: Content) {
        self.content = Some(content);
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

impl fmt::Debug for ODataResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ODataResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content", &self.content.as_ref().map(|_| "<stream>"))
            .finish()
    }
}
