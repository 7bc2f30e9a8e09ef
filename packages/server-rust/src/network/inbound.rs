//! Adapts an axum request into the protocol-neutral [`ODataRequest`].

use std::net::SocketAddr;

use axum::body::Body;
use http::header::{AUTHORIZATION, HOST};
use http::{HeaderMap, Request, Uri, Version};

use crate::service::debug::{RequestSummary, TransportEnvironment};
use crate::service::error::{LibraryError, ODataError};
use crate::service::method::resolve_method_from_headers;
use crate::service::path::split_path;
use crate::service::request::ODataRequest;
use crate::service::ServerConfig;

/// A request as received from the transport, before normalization.
#[derive(Debug)]
pub struct InboundRequest {
    method: String,
    version: Version,
    uri: Uri,
    headers: HeaderMap,
    body: Option<Body>,
    /// `scheme://host/path`, no query.
    request_url: String,
    servlet_path: String,
    context_path: String,
    environment: TransportEnvironment,
}

impl InboundRequest {
    /// Captures `request` together with what the transport knows about the
    /// connection it arrived on.
    #[must_use]
    pub fn from_http(
        request: Request<Body>,
        config: &ServerConfig,
        remote: Option<SocketAddr>,
        local: Option<SocketAddr>,
    ) -> Self {
        let (parts, body) = request.into_parts();
        let scheme = parts.uri.scheme_str().unwrap_or("http").to_string();
        let host = parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(ToString::to_string))
            .or_else(|| local.map(|addr| addr.to_string()))
            .unwrap_or_else(|| "localhost".to_string());
        let path = parts.uri.path();
        let request_url = format!("{scheme}://{host}{path}");

        let (server_name, server_port) = split_host(&host);
        let mount = format!("{}{}", config.context_path, config.service_path);
        let environment = TransportEnvironment {
            auth_type: parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split_whitespace().next())
                .map(str::to_string),
            local_addr: local.map(|addr| addr.ip().to_string()),
            local_name: Some(server_name.to_string()),
            local_port: local.map(|addr| addr.port()),
            path_info: path.strip_prefix(mount.as_str()).map(str::to_string),
            path_translated: None,
            remote_addr: remote.map(|addr| addr.ip().to_string()),
            remote_host: remote.map(|addr| addr.ip().to_string()),
            remote_port: remote.map(|addr| addr.port()),
            remote_user: None,
            scheme: Some(scheme),
            server_name: Some(server_name.to_string()),
            server_port: server_port.or_else(|| local.map(|addr| addr.port())),
            servlet_path: Some(config.service_path.clone()),
        };

        Self {
            method: parts.method.as_str().to_string(),
            version: parts.version,
            uri: parts.uri,
            headers: parts.headers,
            body: Some(body),
            request_url,
            servlet_path: config.service_path.clone(),
            context_path: config.context_path.clone(),
            environment,
        }
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn environment(&self) -> &TransportEnvironment {
        &self.environment
    }

    /// Request URL including `?query` when present.
    #[must_use]
    pub fn raw_request_uri(&self) -> String {
        match self.query() {
            Some(query) => format!("{}?{query}", self.request_url),
            None => self.request_url.clone(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            method: self.method.clone(),
            uri: self.raw_request_uri(),
            protocol: protocol(self.version),
            headers: self.headers.clone(),
        }
    }

    /// Builds the protocol-neutral request: effective method, URI parts and
    /// a body of at most `max_body_bytes`.
    ///
    /// The body is consumed; normalizing twice yields an empty body.
    ///
    /// # Errors
    ///
    /// - [`DispatchError`](crate::service::DispatchError) for an unknown verb
    ///   or conflicting override headers.
    /// - [`LibraryError::Io`] when the body cannot be read or exceeds the limit.
    pub async fn normalize(
        &mut self,
        split: usize,
        max_body_bytes: usize,
    ) -> Result<ODataRequest, ODataError> {
        let method = resolve_method_from_headers(&self.method, &self.headers)?;
        let parts = split_path(
            &self.request_url,
            &self.servlet_path,
            &self.context_path,
            self.uri.path(),
            split,
        );

        let body = match self.body.take() {
            Some(body) => axum::body::to_bytes(body, max_body_bytes)
                .await
                .map_err(|e| LibraryError::Io {
                    message: e.to_string(),
                })?,
            None => bytes::Bytes::new(),
        };

        Ok(ODataRequest {
            method,
            protocol: protocol(self.version),
            headers: self.headers.clone(),
            body,
            raw_request_uri: self.raw_request_uri(),
            raw_base_uri: parts.raw_base_uri,
            raw_odata_path: parts.raw_odata_path,
            raw_query_path: self.query().map(str::to_string),
            raw_service_resolution_uri: parts.raw_service_resolution_uri,
        })
    }
}

fn protocol(version: Version) -> String {
    format!("{version:?}")
}

/// `example.com:8080` -> (`example.com`, `Some(8080)`). Bracketed IPv6 hosts
/// keep their brackets.
fn split_host(host: &str) -> (&str, Option<u16>) {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.contains(']') => (name, port.parse().ok()),
        _ => (host, None),
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderValue, Method};

    use super::*;
    use crate::service::{DispatchError, HttpMethod};

    fn inbound(request: Request<Body>, config: &ServerConfig) -> InboundRequest {
        InboundRequest::from_http(
            request,
            config,
            Some("10.0.0.7:50123".parse().unwrap()),
            Some("127.0.0.1:8080".parse().unwrap()),
        )
    }

    #[tokio::test]
    async fn normalizes_uri_parts_and_body() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/odata/People?$format=json")
            .header(HOST, "example.com:8080")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"Name":"Ada"}"#))
            .unwrap();
        let mut inbound = inbound(request, &ServerConfig::default());

        let normalized = inbound.normalize(0, 1024).await.unwrap();
        assert_eq!(normalized.method, HttpMethod::Post);
        assert_eq!(normalized.protocol, "HTTP/1.1");
        assert_eq!(normalized.raw_base_uri, "http://example.com:8080/odata");
        assert_eq!(normalized.raw_odata_path, "/People");
        assert_eq!(normalized.raw_query_path.as_deref(), Some("$format=json"));
        assert_eq!(
            normalized.raw_request_uri,
            "http://example.com:8080/odata/People?$format=json"
        );
        assert_eq!(&normalized.body[..], br#"{"Name":"Ada"}"#);
        assert!(normalized.raw_service_resolution_uri.is_none());
    }

    #[tokio::test]
    async fn split_moves_leading_segments_out_of_resource_path() {
        let request = Request::builder()
            .uri("/odata/tenant-a/People")
            .header(HOST, "example.com")
            .body(Body::empty())
            .unwrap();
        let mut inbound = inbound(request, &ServerConfig::default());

        let normalized = inbound.normalize(1, 1024).await.unwrap();
        assert_eq!(normalized.raw_odata_path, "/People");
        assert_eq!(
            normalized.raw_service_resolution_uri.as_deref(),
            Some("/tenant-a")
        );
        assert_eq!(normalized.raw_base_uri, "http://example.com/odata/tenant-a");
    }

    #[tokio::test]
    async fn every_header_value_is_kept_in_order() {
        let request = Request::builder()
            .uri("/odata/")
            .header("x-trace", "one")
            .header("x-trace", "two")
            .body(Body::empty())
            .unwrap();
        let mut inbound = inbound(request, &ServerConfig::default());

        let normalized = inbound.normalize(0, 1024).await.unwrap();
        let values: Vec<&HeaderValue> = normalized.headers.get_all("x-trace").iter().collect();
        assert_eq!(values, ["one", "two"]);
    }

    #[tokio::test]
    async fn tunneled_method_applies_to_post() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/odata/People(1)")
            .header("x-http-method", "merge")
            .body(Body::empty())
            .unwrap();
        let mut inbound = inbound(request, &ServerConfig::default());

        let normalized = inbound.normalize(0, 1024).await.unwrap();
        assert_eq!(normalized.method, HttpMethod::Merge);
    }

    #[tokio::test]
    async fn unknown_verb_fails_before_body_is_read() {
        let request = Request::builder()
            .method(Method::from_bytes(b"BREW").unwrap())
            .uri("/odata/People")
            .body(Body::from("ignored"))
            .unwrap();
        let mut inbound = inbound(request, &ServerConfig::default());

        let error = inbound.normalize(0, 1024).await.unwrap_err();
        assert!(matches!(
            error,
            ODataError::Dispatch(DispatchError::InvalidMethod { ref method }) if method == "BREW"
        ));
    }

    #[tokio::test]
    async fn oversized_body_is_an_io_error() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/odata/People")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let mut inbound = inbound(request, &ServerConfig::default());

        let error = inbound.normalize(0, 16).await.unwrap_err();
        assert!(matches!(error, ODataError::Library(LibraryError::Io { .. })));
    }

    #[test]
    fn environment_reflects_connection() {
        let request = Request::builder()
            .uri("/odata/People")
            .header(HOST, "example.com:9000")
            .header(AUTHORIZATION, "Bearer abc")
            .body(Body::empty())
            .unwrap();
        let inbound = inbound(request, &ServerConfig::default());
        let env = inbound.environment();

        assert_eq!(env.auth_type.as_deref(), Some("Bearer"));
        assert_eq!(env.remote_addr.as_deref(), Some("10.0.0.7"));
        assert_eq!(env.remote_port, Some(50123));
        assert_eq!(env.local_port, Some(8080));
        assert_eq!(env.server_name.as_deref(), Some("example.com"));
        assert_eq!(env.server_port, Some(9000));
        assert_eq!(env.path_info.as_deref(), Some("/People"));
        assert_eq!(env.servlet_path.as_deref(), Some("/odata"));
    }

    #[test]
    fn host_split_handles_ipv6() {
        assert_eq!(split_host("example.com"), ("example.com", None));
        assert_eq!(split_host("[::1]:8080"), ("[::1]", Some(8080)));
        assert_eq!(split_host("[::1]"), ("[::1]", None));
    }
}
