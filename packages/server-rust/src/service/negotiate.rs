//! Media types and content negotiation from `$format` and `Accept`.

use std::fmt;
use std::str::FromStr;

use super::error::LibraryError;
use super::route::ResourceKind;

// ---------------------------------------------------------------------------
// ContentType
// ---------------------------------------------------------------------------

/// A parsed media type. Type, subtype and parameter names compare
/// case-insensitively; they are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    type_: String,
    subtype: String,
    parameters: Vec<(String, String)>,
}

impl ContentType {
    #[must_use]
    pub fn new(type_: &str, subtype: &str) -> Self {
        Self {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn json() -> Self {
        Self::new("application", "json")
    }

    #[must_use]
    pub fn xml() -> Self {
        Self::new("application", "xml")
    }

    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    #[must_use]
    pub fn multipart_mixed() -> Self {
        Self::new("multipart", "mixed")
    }

    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    #[must_use]
    pub fn type_(&self) -> &str {
        &self.type_
    }

    #[must_use]
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn without_parameter(mut self, name: &str) -> Self {
        self.parameters.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self
    }

    /// Same type and subtype; parameters are ignored.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.type_ == other.type_ && self.subtype == other.subtype
    }

    /// Whether this (possibly wildcard) media range covers `concrete`.
    #[must_use]
    pub fn matches(&self, concrete: &Self) -> bool {
        (self.type_ == "*" || self.type_ == concrete.type_)
            && (self.subtype == "*" || self.subtype == concrete.subtype)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

/// Error returned when text is not a `type/subtype[;name=value]*` media type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed media type: '{0}'")]
pub struct MediaTypeError(pub String);

impl FromStr for ContentType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MediaTypeError(s.to_string());
        let mut parts = s.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (type_, subtype) = essence.split_once('/').ok_or_else(malformed)?;
        if !is_token(type_) || !is_token(subtype) {
            return Err(malformed());
        }

        let mut content_type = Self::new(type_, subtype);
        for parameter in parts {
            let parameter = parameter.trim();
            if parameter.is_empty() {
                continue;
            }
            let (name, value) = parameter.split_once('=').ok_or_else(malformed)?;
            let name = name.trim();
            if !is_token(name) {
                return Err(malformed());
            }
            content_type = content_type.with_parameter(name, value.trim().trim_matches('"'));
        }
        Ok(content_type)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

// ---------------------------------------------------------------------------
// Representation kinds and supported types
// ---------------------------------------------------------------------------

/// What is being rendered; selects the list of supported media types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepresentationKind {
    ServiceDocument,
    Metadata,
    Batch,
    EntityCollection,
    Entity,
    Count,
    Property,
    Error,
}

impl From<ResourceKind> for RepresentationKind {
    fn from(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::ServiceDocument => Self::ServiceDocument,
            ResourceKind::Metadata => Self::Metadata,
            ResourceKind::Batch => Self::Batch,
            ResourceKind::EntityCollection => Self::EntityCollection,
            ResourceKind::Entity => Self::Entity,
            ResourceKind::Count => Self::Count,
            ResourceKind::Property => Self::Property,
        }
    }
}

/// Overrides the media types supported per representation kind.
pub trait CustomContentTypeSupport: Send + Sync {
    /// Supported types, most preferred first. Must not be empty.
    fn supported_content_types(&self, kind: RepresentationKind) -> Vec<ContentType>;
}

/// Built-in list of supported media types, most preferred first.
#[must_use]
pub fn default_content_types(kind: RepresentationKind) -> Vec<ContentType> {
    match kind {
        RepresentationKind::Error => vec![ContentType::json(), ContentType::xml()],
        RepresentationKind::Count => vec![ContentType::text_plain()],
        RepresentationKind::Batch => vec![ContentType::multipart_mixed()],
        RepresentationKind::ServiceDocument
        | RepresentationKind::Metadata
        | RepresentationKind::EntityCollection
        | RepresentationKind::Entity
        | RepresentationKind::Property => vec![ContentType::json()],
    }
}

#[must_use]
pub fn supported_content_types(
    kind: RepresentationKind,
    custom: Option<&dyn CustomContentTypeSupport>,
) -> Vec<ContentType> {
    custom.map_or_else(
        || default_content_types(kind),
        |support| support.supported_content_types(kind),
    )
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Picks the response media type.
///
/// `$format` wins over `Accept`. `$format` may be `json`, `xml` or a full
/// media type; `Accept` ranges are tried in descending q-value order, ties
/// keeping header order. Without either, the first supported type is used.
///
/// # Errors
///
/// - [`LibraryError::UnsupportedFormat`] if `$format` is malformed or not supported.
/// - [`LibraryError::UnsupportedAcceptTypes`] if no `Accept` range matches a
///   supported type.
pub fn negotiate(
    format: Option<&str>,
    accept: Option<&str>,
    kind: RepresentationKind,
    custom: Option<&dyn CustomContentTypeSupport>,
) -> Result<ContentType, LibraryError> {
    let supported = supported_content_types(kind, custom);

    if let Some(format) = format {
        let unsupported = || LibraryError::UnsupportedFormat {
            format: format.to_string(),
        };
        let requested = match format.to_ascii_lowercase().as_str() {
            "json" => ContentType::json(),
            "xml" => ContentType::xml(),
            "atom" => ContentType::new("application", "atom+xml"),
            _ => format.parse().map_err(|_| unsupported())?,
        };
        return supported
            .iter()
            .find(|s| s.is_compatible(&requested))
            .map(|_| requested.clone())
            .ok_or_else(unsupported);
    }

    let unacceptable = || LibraryError::UnsupportedAcceptTypes {
        accept: accept.unwrap_or_default().to_string(),
    };
    let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
        return supported.into_iter().next().ok_or_else(unacceptable);
    };

    for range in accept_ranges(accept) {
        if let Some(found) = supported.iter().find(|s| range.matches(s)) {
            return Ok(if range.is_compatible(found) {
                range
            } else {
                found.clone()
            });
        }
    }
    Err(unacceptable())
}

/// Parses an `Accept` header into media ranges sorted by q-value.
/// Malformed ranges and ranges with `q=0` are skipped.
fn accept_ranges(accept: &str) -> Vec<ContentType> {
    let mut ranges: Vec<(u16, ContentType)> = accept
        .split(',')
        .filter_map(|item| item.trim().parse::<ContentType>().ok())
        .filter_map(|range| {
            let quality = range.parameter("q").map_or(Some(1000), parse_quality)?;
            (quality > 0).then(|| (quality, range.without_parameter("q")))
        })
        .collect();
    ranges.sort_by(|a, b| b.0.cmp(&a.0));
    ranges.into_iter().map(|(_, range)| range).collect()
}

/// q-value in thousandths; `None` when out of range or malformed.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_quality(raw: &str) -> Option<u16> {
    let value: f32 = raw.parse().ok()?;
    if !(0.0..=1.0).contains(&value) {
        return None;
    }
    Some((value * 1000.0).round() as u16)
}
