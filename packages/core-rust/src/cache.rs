//! Lazy, memoizing metadata cache in front of a [`MetadataProvider`].
//!
//! Every `get_*` call follows the same triad: resolve aliases, look up the
//! kind-specific map, and on a miss ask the provider and store what it returns.
//! Stored values are never evicted or replaced; absent results are never stored.
//!
//! Population is lock-free with respect to the provider: the provider runs
//! outside any map shard lock, and concurrent first accesses may construct a
//! definition redundantly. The first value inserted wins and every caller,
//! including the racers, gets that same `Arc`.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::alias::AliasResolver;
use crate::name::{ActionKey, FunctionKey, QualifiedName};
use crate::schema::{
    Action, ComplexType, EntityContainer, EntityType, EnumType, Function, ServiceMetadata,
    TypeDefinition,
};
use crate::traits::MetadataProvider;

/// Number of cached definitions per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entity_containers: usize,
    pub enum_types: usize,
    pub type_definitions: usize,
    pub entity_types: usize,
    pub complex_types: usize,
    pub actions: usize,
    pub functions: usize,
}

/// The per-model metadata graph (the "Edm").
///
/// Lives as long as the model; share it as `Arc<MetadataCache>`.
pub struct MetadataCache {
    provider: Arc<dyn MetadataProvider>,
    aliases: OnceLock<AliasResolver>,
    service_metadata: OnceLock<Arc<ServiceMetadata>>,
    /// `None` is the default container.
    entity_containers: DashMap<Option<QualifiedName>, Arc<EntityContainer>>,
    enum_types: DashMap<QualifiedName, Arc<EnumType>>,
    type_definitions: DashMap<QualifiedName, Arc<TypeDefinition>>,
    entity_types: DashMap<QualifiedName, Arc<EntityType>>,
    complex_types: DashMap<QualifiedName, Arc<ComplexType>>,
    actions: DashMap<ActionKey, Arc<Action>>,
    functions: DashMap<FunctionKey, Arc<Function>>,
}

impl MetadataCache {
    #[must_use]
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            aliases: OnceLock::new(),
            service_metadata: OnceLock::new(),
            entity_containers: DashMap::new(),
            enum_types: DashMap::new(),
            type_definitions: DashMap::new(),
            entity_types: DashMap::new(),
            complex_types: DashMap::new(),
            actions: DashMap::new(),
            functions: DashMap::new(),
        }
    }

    /// Alias table, built from the provider on first use.
    pub fn aliases(&self) -> &AliasResolver {
        self.aliases.get_or_init(|| {
            let resolver = AliasResolver::new(self.provider.create_alias_to_namespace_info());
            debug!(aliases = resolver.len(), "alias table built");
            resolver
        })
    }

    /// Resolves a possibly aliased name to its canonical form. Absent stays absent.
    pub fn resolve(&self, name: Option<&QualifiedName>) -> Option<QualifiedName> {
        self.aliases().resolve_opt(name)
    }

    /// Returns the named entity container, or the default one when `name` is `None`.
    ///
    /// A default-container hit is also cached under the container's own
    /// qualified name, so a later explicit lookup does not reach the provider.
    pub fn get_entity_container(
        &self,
        name: Option<&QualifiedName>,
    ) -> Option<Arc<EntityContainer>> {
        let key = self.resolve(name);
        if let Some(hit) = self.entity_containers.get(&key) {
            return Some(Arc::clone(hit.value()));
        }

        let created = Arc::new(self.provider.create_entity_container(key.as_ref())?);
        trace!(kind = "entity_container", key = ?key, "metadata cache populated");
        let stored = Arc::clone(self.entity_containers.entry(key.clone()).or_insert(created).value());
        if key.is_none() {
            self.entity_containers
                .entry(Some(stored.qualified_name()))
                .or_insert_with(|| Arc::clone(&stored));
        }
        Some(stored)
    }

    pub fn get_enum_type(&self, name: &QualifiedName) -> Option<Arc<EnumType>> {
        let key = self.aliases().resolve(name);
        get_or_create(&self.enum_types, "enum_type", key, |k| {
            self.provider.create_enum_type(k)
        })
    }

    pub fn get_type_definition(&self, name: &QualifiedName) -> Option<Arc<TypeDefinition>> {
        let key = self.aliases().resolve(name);
        get_or_create(&self.type_definitions, "type_definition", key, |k| {
            self.provider.create_type_definition(k)
        })
    }

    pub fn get_entity_type(&self, name: &QualifiedName) -> Option<Arc<EntityType>> {
        let key = self.aliases().resolve(name);
        get_or_create(&self.entity_types, "entity_type", key, |k| {
            self.provider.create_entity_type(k)
        })
    }

    pub fn get_complex_type(&self, name: &QualifiedName) -> Option<Arc<ComplexType>> {
        let key = self.aliases().resolve(name);
        get_or_create(&self.complex_types, "complex_type", key, |k| {
            self.provider.create_complex_type(k)
        })
    }

    /// Both the action name and the binding type are alias-resolved before
    /// the composite key is built.
    pub fn get_action(
        &self,
        name: &QualifiedName,
        binding_type: Option<&QualifiedName>,
        is_collection: Option<bool>,
    ) -> Option<Arc<Action>> {
        let aliases = self.aliases();
        let key = ActionKey::new(
            aliases.resolve(name),
            aliases.resolve_opt(binding_type),
            is_collection,
        );
        get_or_create(&self.actions, "action", key, |k| {
            self.provider
                .create_action(&k.name, k.binding_type.as_ref(), k.is_collection)
        })
    }

    pub fn get_function(
        &self,
        name: &QualifiedName,
        binding_type: Option<&QualifiedName>,
        is_collection: Option<bool>,
        parameter_names: &[String],
    ) -> Option<Arc<Function>> {
        let aliases = self.aliases();
        let key = FunctionKey::new(
            aliases.resolve(name),
            aliases.resolve_opt(binding_type),
            is_collection,
            parameter_names.to_vec(),
        );
        get_or_create(&self.functions, "function", key, |k| {
            self.provider.create_function(
                &k.name,
                k.binding_type.as_ref(),
                k.is_collection,
                &k.parameter_names,
            )
        })
    }

    /// Service-level metadata, computed once.
    pub fn service_metadata(&self) -> Arc<ServiceMetadata> {
        Arc::clone(
            self.service_metadata
                .get_or_init(|| Arc::new(self.provider.create_service_metadata())),
        )
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entity_containers: self.entity_containers.len(),
            enum_types: self.enum_types.len(),
            type_definitions: self.type_definitions.len(),
            entity_types: self.entity_types.len(),
            complex_types: self.complex_types.len(),
            actions: self.actions.len(),
            functions: self.functions.len(),
        }
    }
}

impl Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn get_or_create<K, V>(
    cache: &DashMap<K, Arc<V>>,
    kind: &'static str,
    key: K,
    create: impl FnOnce(&K) -> Option<V>,
) -> Option<Arc<V>>
where
    K: Eq + Hash + Debug,
{
    if let Some(hit) = cache.get(&key) {
        return Some(Arc::clone(hit.value()));
    }

    let created = Arc::new(create(&key)?);
    trace!(kind, key = ?key, "metadata cache populated");
    let stored = cache.entry(key).or_insert(created);
    Some(Arc::clone(stored.value()))
}
