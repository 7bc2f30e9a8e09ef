use std::collections::HashMap;

use crate::name::QualifiedName;
use crate::schema::{
    Action, ComplexType, EntityContainer, EntityType, EnumType, Function, ServiceMetadata,
    TypeDefinition,
};

/// Supplies schema definitions to a [`MetadataCache`](crate::MetadataCache) on cache miss.
///
/// Implementations are pure construction functions: they are called with names
/// that have already been alias-resolved, and return `None` when the element
/// does not exist. A `None` result is never cached, so a provider whose backing
/// data grows over time will be asked again on the next lookup.
///
/// Used as `Arc<dyn MetadataProvider>`; calls may arrive concurrently.
pub trait MetadataProvider: Send + Sync {
    /// Alias to namespace mapping for every schema the provider knows about.
    /// Called once per cache.
    fn create_alias_to_namespace_info(&self) -> HashMap<String, String>;

    /// `None` for `name` requests the default entity container.
    fn create_entity_container(&self, name: Option<&QualifiedName>) -> Option<EntityContainer>;

    fn create_enum_type(&self, name: &QualifiedName) -> Option<EnumType>;

    fn create_type_definition(&self, name: &QualifiedName) -> Option<TypeDefinition>;

    fn create_entity_type(&self, name: &QualifiedName) -> Option<EntityType>;

    fn create_complex_type(&self, name: &QualifiedName) -> Option<ComplexType>;

    /// Finds the action overload for the given binding. `binding_type == None`
    /// selects the unbound overload.
    fn create_action(
        &self,
        name: &QualifiedName,
        binding_type: Option<&QualifiedName>,
        is_collection: Option<bool>,
    ) -> Option<Action>;

    /// Finds the function overload for the given binding and parameter names.
    fn create_function(
        &self,
        name: &QualifiedName,
        binding_type: Option<&QualifiedName>,
        is_collection: Option<bool>,
        parameter_names: &[String],
    ) -> Option<Function>;

    fn create_service_metadata(&self) -> ServiceMetadata;
}
