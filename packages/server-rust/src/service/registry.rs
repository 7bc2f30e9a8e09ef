use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use odata_core::MetadataCache;
use tracing::debug;

use super::error::{ODataError, ServerError};
use super::negotiate::ContentType;
use super::request::{ODataRequest, ODataResponse};
use super::route::{ResourceKind, ResourceRoute};

// ---------------------------------------------------------------------------
// ProcessContext
// ---------------------------------------------------------------------------

/// Everything a processor needs to answer one request.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    pub request: &'a ODataRequest,
    pub route: &'a ResourceRoute,
    /// Negotiated response media type.
    pub content_type: &'a ContentType,
    pub metadata: &'a MetadataCache,
}

// ---------------------------------------------------------------------------
// Extension traits
// ---------------------------------------------------------------------------

/// Handles requests for the resource kinds it declares.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used in logs and debug spans.
    fn name(&self) -> &'static str;

    /// Resource kinds this processor serves.
    fn kinds(&self) -> &'static [ResourceKind];

    /// Produce the response for one request.
    async fn process(&self, ctx: ProcessContext<'_>) -> Result<ODataResponse, ODataError>;
}

/// Renders a mapped error into a response body.
pub trait ErrorProcessor: Send + Sync {
    fn process_error(&self, error: &ServerError, content_type: &ContentType) -> ODataResponse;
}

/// Declares which entity sets use optimistic concurrency.
pub trait CustomETagSupport: Send + Sync {
    /// Whether modifying requests on `entity_set` must carry `If-Match` or `If-None-Match`.
    fn has_etag(&self, entity_set: &str) -> bool;
}

// ---------------------------------------------------------------------------
// ProcessorRegistry
// ---------------------------------------------------------------------------

/// Processors keyed by the resource kinds they declare.
///
/// Registering a processor for a kind that is already served replaces the
/// earlier one. Registration needs `&mut self`, so it completes before the
/// owning handler is shared across requests.
#[derive(Default)]
pub struct ProcessorRegistry {
    by_kind: HashMap<ResourceKind, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        for &kind in processor.kinds() {
            if let Some(previous) = self.by_kind.insert(kind, Arc::clone(&processor)) {
                debug!(
                    ?kind,
                    replaced = previous.name(),
                    by = processor.name(),
                    "processor replaced"
                );
            }
        }
        debug!(processor = processor.name(), kinds = ?processor.kinds(), "processor registered");
    }

    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn Processor>> {
        self.by_kind.get(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    struct StubProcessor {
        name: &'static str,
        kinds: &'static [ResourceKind],
    }

    #[async_trait]
    impl Processor for StubProcessor {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kinds(&self) -> &'static [ResourceKind] {
            self.kinds
        }

        async fn process(&self, _ctx: ProcessContext<'_>) -> Result<ODataResponse, ODataError> {
            Ok(ODataResponse::new(StatusCode::NO_CONTENT))
        }
    }

    #[test]
    fn lookup_by_declared_kind() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor {
            name: "people",
            kinds: &[ResourceKind::Entity, ResourceKind::EntityCollection],
        }));

        assert_eq!(registry.get(ResourceKind::Entity).unwrap().name(), "people");
        assert_eq!(
            registry.get(ResourceKind::EntityCollection).unwrap().name(),
            "people"
        );
        assert!(registry.get(ResourceKind::Count).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn later_registration_wins_per_kind() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor {
            name: "first",
            kinds: &[ResourceKind::Entity, ResourceKind::Count],
        }));
        registry.register(Arc::new(StubProcessor {
            name: "second",
            kinds: &[ResourceKind::Entity],
        }));

        assert_eq!(registry.get(ResourceKind::Entity).unwrap().name(), "second");
        assert_eq!(registry.get(ResourceKind::Count).unwrap().name(), "first");
    }

    #[test]
    fn empty_registry() {
        let registry = ProcessorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(ResourceKind::ServiceDocument).is_none());
    }
}
