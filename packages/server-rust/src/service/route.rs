//! Resource-path classification: turns the raw OData path into a typed
//! [`ResourceRoute`] using the default entity container.

use odata_core::{EntityContainer, MetadataCache, QualifiedName};
use serde::Serialize;

use super::error::LibraryError;
use super::method::HttpMethod;

pub const METADATA_SEGMENT: &str = "$metadata";
pub const BATCH_SEGMENT: &str = "$batch";
pub const COUNT_SEGMENT: &str = "$count";

/// Kind of resource a request addresses. Processors register per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    ServiceDocument,
    Metadata,
    Batch,
    EntityCollection,
    Entity,
    Count,
    Property,
}

impl ResourceKind {
    /// Methods a request against this kind of resource may use.
    #[must_use]
    pub const fn allowed_methods(self) -> &'static [HttpMethod] {
        match self {
            Self::ServiceDocument | Self::Metadata | Self::Count => &[HttpMethod::Get],
            Self::Batch => &[HttpMethod::Post],
            Self::EntityCollection => &[HttpMethod::Get, HttpMethod::Post],
            Self::Entity | Self::Property => &[
                HttpMethod::Get,
                HttpMethod::Put,
                HttpMethod::Patch,
                HttpMethod::Merge,
                HttpMethod::Delete,
            ],
        }
    }

    #[must_use]
    pub fn allows(self, method: HttpMethod) -> bool {
        self.allowed_methods().contains(&method)
    }
}

/// A classified resource path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRoute {
    pub kind: ResourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_set: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<QualifiedName>,
    /// Key predicate text without parentheses, e.g. `1` or `'ALFKI'`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

impl ResourceRoute {
    #[must_use]
    pub const fn of_kind(kind: ResourceKind) -> Self {
        Self {
            kind,
            entity_set: None,
            entity_type: None,
            key: None,
            property: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Classifies `raw_odata_path`.
///
/// # Errors
///
/// - [`LibraryError::UriSyntax`] for malformed key predicates or trailing
///   segments the route grammar does not cover.
/// - [`LibraryError::ResourceNotFound`] when an entity set or property is not
///   part of the model, or the model has no default container.
pub fn resolve_route(
    raw_odata_path: &str,
    metadata: &MetadataCache,
    key_as_segment: bool,
) -> Result<ResourceRoute, LibraryError> {
    let trimmed = raw_odata_path.trim_start_matches('/');
    let segments = path_segments(trimmed);

    let Some((&first, rest)) = segments.split_first() else {
        return Ok(ResourceRoute::of_kind(ResourceKind::ServiceDocument));
    };
    let rest = trailing_slash_trimmed(rest);

    match first {
        METADATA_SEGMENT | BATCH_SEGMENT => {
            if !rest.is_empty() {
                return Err(syntax(raw_odata_path, "no segments may follow"));
            }
            let kind = if first == METADATA_SEGMENT {
                ResourceKind::Metadata
            } else {
                ResourceKind::Batch
            };
            Ok(ResourceRoute::of_kind(kind))
        }
        _ => {
            let container = metadata
                .get_entity_container(None)
                .ok_or_else(|| not_found(first))?;
            resolve_entity_path(raw_odata_path, first, rest, &container, metadata, key_as_segment)
        }
    }
}

fn resolve_entity_path(
    raw_odata_path: &str,
    first: &str,
    rest: &[&str],
    container: &EntityContainer,
    metadata: &MetadataCache,
    key_as_segment: bool,
) -> Result<ResourceRoute, LibraryError> {
    let (name, predicate) = split_key_predicate(raw_odata_path, first)?;

    let (entity_set, entity_type, is_singleton) = if let Some(set) = container.entity_set(name) {
        (set.name.clone(), set.entity_type.clone(), false)
    } else if let Some(singleton) = container.singleton(name) {
        (singleton.name.clone(), singleton.type_name.clone(), true)
    } else {
        return Err(not_found(name));
    };
    let entity_type = metadata.resolve(Some(&entity_type)).unwrap_or(entity_type);

    let mut route = ResourceRoute {
        kind: ResourceKind::EntityCollection,
        entity_set: Some(entity_set),
        entity_type: Some(entity_type),
        key: predicate.map(str::to_string),
        property: None,
    };

    let mut rest = rest;
    if route.key.is_none() && key_as_segment && !is_singleton {
        if let Some((&key, tail)) = rest.split_first() {
            if key != COUNT_SEGMENT {
                route.key = Some(key.to_string());
                rest = tail;
            }
        }
    }
    let addresses_entity = route.key.is_some() || is_singleton;
    if route.key.is_some() && is_singleton {
        return Err(syntax(raw_odata_path, "singletons take no key"));
    }

    match rest {
        [] if addresses_entity => route.kind = ResourceKind::Entity,
        [] => {}
        [COUNT_SEGMENT] if !addresses_entity => route.kind = ResourceKind::Count,
        [property] if addresses_entity => {
            resolve_property(&mut route, property, metadata)?;
        }
        _ => return Err(syntax(raw_odata_path, "unsupported segment sequence")),
    }
    Ok(route)
}

fn resolve_property(
    route: &mut ResourceRoute,
    property: &str,
    metadata: &MetadataCache,
) -> Result<(), LibraryError> {
    let entity_type = route
        .entity_type
        .as_ref()
        .and_then(|name| metadata.get_entity_type(name))
        .ok_or_else(|| not_found(property))?;

    if entity_type.property(property).is_some() {
        route.kind = ResourceKind::Property;
        route.property = Some(property.to_string());
        return Ok(());
    }

    let navigation = entity_type
        .navigation_property(property)
        .ok_or_else(|| not_found(property))?;
    route.kind = if navigation.collection {
        ResourceKind::EntityCollection
    } else {
        ResourceKind::Entity
    };
    route.property = Some(property.to_string());
    route.entity_type = metadata.resolve(Some(&navigation.type_name));
    Ok(())
}

/// Splits `Name(key)` into the name and the key text.
fn split_key_predicate<'a>(
    raw_odata_path: &str,
    segment: &'a str,
) -> Result<(&'a str, Option<&'a str>), LibraryError> {
    let Some(open) = segment.find('(') else {
        return Ok((segment, None));
    };
    let key = segment[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| syntax(raw_odata_path, "unterminated key predicate"))?;
    if key.is_empty() {
        return Err(syntax(raw_odata_path, "empty key predicate"));
    }
    Ok((&segment[..open], Some(key)))
}

/// Splits on `/` outside single-quoted literals, so `People('a/b')` stays
/// one segment. A doubled quote inside a literal toggles twice and is kept.
fn path_segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (index, c) in path.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '/' if !quoted => {
                segments.push(&path[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    segments.push(&path[start..]);
    segments
}

fn trailing_slash_trimmed<'a, 'b>(rest: &'a [&'b str]) -> &'a [&'b str] {
    match rest.split_last() {
        Some((&"", init)) => init,
        _ => rest,
    }
}

fn syntax(path: &str, reason: &str) -> LibraryError {
    LibraryError::UriSyntax {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn not_found(segment: &str) -> LibraryError {
    LibraryError::ResourceNotFound {
        segment: segment.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::metadata;

    fn route(path: &str) -> ResourceRoute {
        resolve_route(path, &metadata(), false).unwrap()
    }

    #[test]
    fn empty_path_is_service_document() {
        assert_eq!(route("").kind, ResourceKind::ServiceDocument);
        assert_eq!(route("/").kind, ResourceKind::ServiceDocument);
    }

    #[test]
    fn reserved_segments() {
        assert_eq!(route("/$metadata").kind, ResourceKind::Metadata);
        assert_eq!(route("/$batch").kind, ResourceKind::Batch);
        assert!(matches!(
            resolve_route("/$metadata/x", &metadata(), false),
            Err(LibraryError::UriSyntax { .. })
        ));
    }

    #[test]
    fn entity_set_and_entity() {
        let collection = route("/People");
        assert_eq!(collection.kind, ResourceKind::EntityCollection);
        assert_eq!(collection.entity_set.as_deref(), Some("People"));
        assert_eq!(
            collection.entity_type,
            Some(QualifiedName::new("Demo.Model", "Person"))
        );

        let entity = route("/People(7)");
        assert_eq!(entity.kind, ResourceKind::Entity);
        assert_eq!(entity.key.as_deref(), Some("7"));
    }

    #[test]
    fn count_and_property() {
        assert_eq!(route("/People/$count").kind, ResourceKind::Count);

        let property = route("/People(7)/Name");
        assert_eq!(property.kind, ResourceKind::Property);
        assert_eq!(property.property.as_deref(), Some("Name"));
    }

    #[test]
    fn navigation_property_switches_entity_type() {
        let friends = route("/People(7)/Friends");
        assert_eq!(friends.kind, ResourceKind::EntityCollection);
        assert_eq!(
            friends.entity_type,
            Some(QualifiedName::new("Demo.Model", "Person"))
        );
    }

    #[test]
    fn singleton_addresses_an_entity() {
        let me = route("/Me");
        assert_eq!(me.kind, ResourceKind::Entity);
        assert_eq!(route("/Me/Name").kind, ResourceKind::Property);
    }

    #[test]
    fn key_as_segment_is_opt_in() {
        let cache = metadata();
        let entity = resolve_route("/People/7", &cache, true).unwrap();
        assert_eq!(entity.kind, ResourceKind::Entity);
        assert_eq!(entity.key.as_deref(), Some("7"));

        let count = resolve_route("/People/$count", &cache, true).unwrap();
        assert_eq!(count.kind, ResourceKind::Count);

        assert!(resolve_route("/People/7", &cache, false).is_err());
    }

    #[test]
    fn unknown_names_are_not_found() {
        let cache = metadata();
        assert!(matches!(
            resolve_route("/Nope", &cache, false),
            Err(LibraryError::ResourceNotFound { ref segment }) if segment == "Nope"
        ));
        assert!(matches!(
            resolve_route("/People(1)/Nope", &cache, false),
            Err(LibraryError::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn malformed_key_predicates_are_syntax_errors() {
        let cache = metadata();
        assert!(matches!(
            resolve_route("/People(1", &cache, false),
            Err(LibraryError::UriSyntax { .. })
        ));
        assert!(matches!(
            resolve_route("/People()", &cache, false),
            Err(LibraryError::UriSyntax { .. })
        ));
        assert!(matches!(
            resolve_route("/People/$count/x", &cache, false),
            Err(LibraryError::UriSyntax { .. })
        ));
    }

    #[test]
    fn quoted_keys_may_contain_slashes() {
        let entity = route("/People('a/b')");
        assert_eq!(entity.kind, ResourceKind::Entity);
        assert_eq!(entity.key.as_deref(), Some("'a/b'"));

        let property = route("/People('it''s/x')/Name");
        assert_eq!(property.kind, ResourceKind::Property);
        assert_eq!(property.key.as_deref(), Some("'it''s/x'"));
    }

    #[test]
    fn segments_split_outside_quotes_only() {
        assert!(path_segments("").is_empty());
        assert_eq!(path_segments("People/"), ["People", ""]);
        assert_eq!(path_segments("People('a/b')/Name"), ["People('a/b')", "Name"]);
    }

    #[test]
    fn allowed_methods_per_kind() {
        assert!(ResourceKind::Metadata.allows(HttpMethod::Get));
        assert!(!ResourceKind::Metadata.allows(HttpMethod::Delete));
        assert!(ResourceKind::Batch.allows(HttpMethod::Post));
        assert!(ResourceKind::Entity.allows(HttpMethod::Merge));
        assert!(!ResourceKind::EntityCollection.allows(HttpMethod::Delete));
    }
}
