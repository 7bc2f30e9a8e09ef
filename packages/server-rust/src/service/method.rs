//! Effective HTTP method resolution, including `X-HTTP-Method` overrides.

use std::fmt;

use http::header::HeaderName;
use http::HeaderMap;
use serde::Serialize;

use super::error::DispatchError;

pub const X_HTTP_METHOD: HeaderName = HeaderName::from_static("x-http-method");
pub const X_HTTP_METHOD_OVERRIDE: HeaderName = HeaderName::from_static("x-http-method-override");

/// Verbs understood by the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Merge,
}

impl HttpMethod {
    pub const ALL: [Self; 6] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Merge,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Merge => "MERGE",
        }
    }

    /// Exact match; request-line methods are case-sensitive.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == raw)
    }

    /// Case-insensitive match, used for override header values.
    #[must_use]
    pub fn parse_ignore_case(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(raw))
    }

    /// Whether requests with this method normally carry a body.
    #[must_use]
    pub const fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Merge)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Determines the effective method of a request.
///
/// Only `POST` may be overridden. With both override headers present they must
/// agree (ignoring case), otherwise the request is ambiguous.
///
/// # Errors
///
/// - [`DispatchError::InvalidMethod`] if the raw method or the override value
///   is not a known verb.
/// - [`DispatchError::AmbiguousOverride`] if the two override headers disagree.
pub fn resolve_method(
    raw: &str,
    x_http_method: Option<&str>,
    x_http_method_override: Option<&str>,
) -> Result<HttpMethod, DispatchError> {
    let method = HttpMethod::parse(raw).ok_or_else(|| invalid(raw))?;
    if method != HttpMethod::Post {
        return Ok(method);
    }

    match (x_http_method, x_http_method_override) {
        (None, None) => Ok(method),
        (Some(value), None) | (None, Some(value)) => parse_override(value),
        (Some(x_http_method), Some(x_http_method_override)) => {
            if !x_http_method.eq_ignore_ascii_case(x_http_method_override) {
                return Err(DispatchError::AmbiguousOverride {
                    x_http_method: x_http_method.to_string(),
                    x_http_method_override: x_http_method_override.to_string(),
                });
            }
            parse_override(x_http_method)
        }
    }
}

/// Reads the override headers from `headers` and resolves as [`resolve_method`].
///
/// A header value that is not valid UTF-8 cannot name a verb and is reported
/// as an invalid method.
///
/// # Errors
///
/// Same as [`resolve_method`].
pub fn resolve_method_from_headers(
    raw: &str,
    headers: &HeaderMap,
) -> Result<HttpMethod, DispatchError> {
    let x_http_method = header_str(headers, &X_HTTP_METHOD)?;
    let x_http_method_override = header_str(headers, &X_HTTP_METHOD_OVERRIDE)?;
    resolve_method(raw, x_http_method, x_http_method_override)
}

fn header_str<'a>(
    headers: &'a HeaderMap,
    name: &HeaderName,
) -> Result<Option<&'a str>, DispatchError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| invalid(&String::from_utf8_lossy(value.as_bytes())))
        })
        .transpose()
}

fn parse_override(value: &str) -> Result<HttpMethod, DispatchError> {
    HttpMethod::parse_ignore_case(value).ok_or_else(|| invalid(value))
}

fn invalid(method: &str) -> DispatchError {
    DispatchError::InvalidMethod {
        method: method.to_string(),
    }
}
