//! Error taxonomy for request dispatch and its mapping to [`ServerError`].
//!
//! Three disjoint families reach the mapper: [`DispatchError`] raised by the
//! handler itself, [`LibraryError`] raised by deeper protocol layers, and
//! anything else wrapped in [`ODataError::Internal`].

use http::StatusCode;
use serde::Serialize;

use super::method::HttpMethod;
use super::route::ResourceKind;

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Failures detected by the dispatch handler.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid HTTP method: '{method}'")]
    InvalidMethod { method: String },
    #[error(
        "ambiguous method override: X-HTTP-Method '{x_http_method}' and \
         X-HTTP-Method-Override '{x_http_method_override}'"
    )]
    AmbiguousOverride {
        x_http_method: String,
        x_http_method_override: String,
    },
    #[error("HTTP method {method} is not allowed on {resource:?}")]
    MethodNotAllowed {
        method: HttpMethod,
        resource: ResourceKind,
    },
    #[error("no processor registered for {kind:?}")]
    ProcessorNotImplemented { kind: ResourceKind },
    #[error("request body requires a Content-Type header")]
    MissingContentType,
    #[error("unsupported request content type: '{content_type}'")]
    UnsupportedContentType { content_type: String },
}

impl DispatchError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidMethod { .. } => "INVALID_HTTP_METHOD",
            Self::AmbiguousOverride { .. } => "AMBIGUOUS_XHTTP_METHOD",
            Self::MethodNotAllowed { .. } => "HTTP_METHOD_NOT_ALLOWED",
            Self::ProcessorNotImplemented { .. } => "PROCESSOR_NOT_IMPLEMENTED",
            Self::MissingContentType => "MISSING_CONTENT_TYPE",
            Self::UnsupportedContentType { .. } => "UNSUPPORTED_CONTENT_TYPE",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidMethod { .. }
            | Self::AmbiguousOverride { .. }
            | Self::MissingContentType => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::ProcessorNotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::UnsupportedContentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

// ---------------------------------------------------------------------------
// LibraryError
// ---------------------------------------------------------------------------

/// Failures raised by protocol layers below the handler: body I/O, URI
/// parsing, content negotiation and concurrency preconditions. Processors
/// raise these too.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("I/O error while reading or writing content: {message}")]
    Io { message: String },
    #[error("could not serialize response: {message}")]
    Serializer { message: String },
    #[error("malformed request body: {message}")]
    Deserializer { message: String },
    #[error("malformed resource path '{path}': {reason}")]
    UriSyntax { path: String, reason: String },
    #[error("resource '{segment}' not found")]
    ResourceNotFound { segment: String },
    #[error("unsupported $format value '{format}'")]
    UnsupportedFormat { format: String },
    #[error("none of the accepted types '{accept}' is supported")]
    UnsupportedAcceptTypes { accept: String },
    #[error("required header {header} is missing")]
    PreconditionMissingHeader { header: &'static str },
    #[error("precondition failed for '{target}'")]
    PreconditionFailed { target: String },
}

impl LibraryError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "IO_EXCEPTION",
            Self::Serializer { .. } => "SERIALIZER_ERROR",
            Self::Deserializer { .. } => "DESERIALIZER_ERROR",
            Self::UriSyntax { .. } => "URI_SYNTAX",
            Self::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT_OPTION",
            Self::UnsupportedAcceptTypes { .. } => "UNSUPPORTED_ACCEPT_TYPES",
            Self::PreconditionMissingHeader { .. } => "MISSING_HEADER",
            Self::PreconditionFailed { .. } => "FAILED",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Serializer { .. } | Self::Deserializer { .. } | Self::UriSyntax { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::UnsupportedFormat { .. } | Self::UnsupportedAcceptTypes { .. } => {
                StatusCode::NOT_ACCEPTABLE
            }
            Self::PreconditionMissingHeader { .. } => StatusCode::PRECONDITION_REQUIRED,
            Self::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
        }
    }

    /// The URI segment or header the error refers to, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::UriSyntax { path, .. } => Some(path.as_str()),
            Self::ResourceNotFound { segment } => Some(segment.as_str()),
            Self::PreconditionMissingHeader { header } => Some(*header),
            Self::PreconditionFailed { target } => Some(target.as_str()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ODataError
// ---------------------------------------------------------------------------

/// Everything that may fail while handling one request.
#[derive(Debug, thiserror::Error)]
pub enum ODataError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// ServerError
// ---------------------------------------------------------------------------

pub const INTERNAL_SERVER_ERROR_CODE: &str = "INTERNAL_SERVER_ERROR";

/// Structured error rendered into an error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Full error chain. Only surfaced in debug output, never in error bodies.
    #[serde(skip)]
    pub cause: Option<String>,
}

impl ServerError {
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            target: None,
            cause: None,
        }
    }

    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_SERVER_ERROR_CODE,
            "An internal server error occurred.",
        )
    }
}

impl From<&ODataError> for ServerError {
    fn from(error: &ODataError) -> Self {
        match error {
            ODataError::Dispatch(e) => Self::new(e.status(), e.code(), e.to_string()),
            ODataError::Library(e) => Self {
                target: e.target().map(str::to_string),
                ..Self::new(e.status(), e.code(), e.to_string())
            },
            ODataError::Internal(e) => Self {
                cause: Some(format!("{e:#}")),
                ..Self::internal()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_errors() -> Vec<ODataError> {
        vec![
            DispatchError::InvalidMethod { method: "FOO".into() }.into(),
            DispatchError::AmbiguousOverride {
                x_http_method: "PUT".into(),
                x_http_method_override: "PATCH".into(),
            }
            .into(),
            DispatchError::MethodNotAllowed {
                method: HttpMethod::Delete,
                resource: ResourceKind::Metadata,
            }
            .into(),
            DispatchError::ProcessorNotImplemented { kind: ResourceKind::Entity }.into(),
            DispatchError::MissingContentType.into(),
            DispatchError::UnsupportedContentType { content_type: "text/csv".into() }.into(),
            LibraryError::Io { message: "reset".into() }.into(),
            LibraryError::Serializer { message: "x".into() }.into(),
            LibraryError::Deserializer { message: "x".into() }.into(),
            LibraryError::UriSyntax { path: "/A(".into(), reason: "x".into() }.into(),
            LibraryError::ResourceNotFound { segment: "Nope".into() }.into(),
            LibraryError::UnsupportedFormat { format: "csv".into() }.into(),
            LibraryError::UnsupportedAcceptTypes { accept: "text/csv".into() }.into(),
            LibraryError::PreconditionMissingHeader { header: "If-Match" }.into(),
            LibraryError::PreconditionFailed { target: "People(1)".into() }.into(),
            anyhow::anyhow!("database unreachable").into(),
        ]
    }

    #[test]
    fn every_error_maps_to_a_code_and_error_status() {
        for error in all_errors() {
            let mapped = ServerError::from(&error);
            assert!(!mapped.code.is_empty(), "{error:?}");
            assert!(!mapped.message.is_empty(), "{error:?}");
            assert!(
                mapped.status.is_client_error() || mapped.status.is_server_error(),
                "{error:?} -> {}",
                mapped.status
            );
        }
    }

    #[test]
    fn dispatch_codes_and_statuses() {
        let mapped = ServerError::from(&ODataError::from(DispatchError::AmbiguousOverride {
            x_http_method: "PUT".into(),
            x_http_method_override: "PATCH".into(),
        }));
        assert_eq!(mapped.status, StatusCode::BAD_REQUEST);
        assert_eq!(mapped.code, "AMBIGUOUS_XHTTP_METHOD");
        assert!(mapped.message.contains("PUT") && mapped.message.contains("PATCH"));

        let mapped = ServerError::from(&ODataError::from(
            DispatchError::ProcessorNotImplemented { kind: ResourceKind::Count },
        ));
        assert_eq!(mapped.status, StatusCode::NOT_IMPLEMENTED);

        let mapped = ServerError::from(&ODataError::from(DispatchError::MissingContentType));
        assert_eq!(mapped.status, StatusCode::BAD_REQUEST);
        assert_eq!(mapped.code, "MISSING_CONTENT_TYPE");
    }

    #[test]
    fn library_errors_carry_target() {
        let mapped = ServerError::from(&ODataError::from(LibraryError::ResourceNotFound {
            segment: "Nope".into(),
        }));
        assert_eq!(mapped.status, StatusCode::NOT_FOUND);
        assert_eq!(mapped.target.as_deref(), Some("Nope"));

        let mapped = ServerError::from(&ODataError::from(
            LibraryError::PreconditionMissingHeader { header: "If-Match" },
        ));
        assert_eq!(mapped.status, StatusCode::PRECONDITION_REQUIRED);
        assert_eq!(mapped.code, "MISSING_HEADER");
    }

    #[test]
    fn unexpected_errors_are_internal_and_hide_details() {
        let error = ODataError::from(anyhow::anyhow!("secret connection string"));
        let mapped = ServerError::from(&error);
        assert_eq!(mapped.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mapped.code, INTERNAL_SERVER_ERROR_CODE);
        assert!(!mapped.message.contains("secret"));
        assert!(mapped.cause.as_deref().unwrap().contains("secret"));
    }

    #[test]
    fn serialized_error_omits_status_and_cause() {
        let mapped = ServerError::from(&ODataError::from(anyhow::anyhow!("boom")));
        let json = serde_json::to_value(&mapped).unwrap();
        assert_eq!(json["code"], INTERNAL_SERVER_ERROR_CODE);
        assert!(json.get("status").is_none());
        assert!(json.get("cause").is_none());
        assert!(json.get("target").is_none());
    }
}
