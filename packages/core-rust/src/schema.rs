//! Entity Data Model definitions.
//!
//! These are plain, immutable values produced by a
//! [`MetadataProvider`](crate::MetadataProvider) and shared through the
//! [`MetadataCache`](crate::MetadataCache) as `Arc<T>`. They serialize to a
//! JSON shape close to CSDL JSON so schemas can be loaded from files.

use serde::{Deserialize, Serialize};

use crate::name::QualifiedName;

/// OData protocol version advertised when a provider does not override it.
pub const DEFAULT_PROTOCOL_VERSION: &str = "4.0";

/// A term applied to a schema element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub term: QualifiedName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
}

/// Structural property of an entity or complex type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: QualifiedName,
    #[serde(default)]
    pub collection: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

/// Navigation property between entity types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: QualifiedName,
    #[serde(default)]
    pub collection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
    #[serde(default)]
    pub contains_target: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<QualifiedName>,
    #[serde(default)]
    pub key: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub navigation_properties: Vec<NavigationProperty>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub has_stream: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl EntityType {
    /// Looks up a structural property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn navigation_property(&self, name: &str) -> Option<&NavigationProperty> {
        self.navigation_properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<QualifiedName>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub navigation_properties: Vec<NavigationProperty>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumType {
    pub name: String,
    #[serde(default = "default_enum_underlying_type")]
    pub underlying_type: QualifiedName,
    #[serde(default)]
    pub is_flags: bool,
    #[serde(default)]
    pub members: Vec<EnumMember>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl EnumType {
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// A named alias of a primitive type with optional facets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    pub name: String,
    pub underlying_type: QualifiedName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: QualifiedName,
    #[serde(default)]
    pub collection: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnType {
    #[serde(rename = "type")]
    pub type_name: QualifiedName,
    #[serde(default)]
    pub collection: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub is_bound: bool,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<ReturnType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_set_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl Action {
    /// The binding parameter is the first parameter of a bound operation.
    #[must_use]
    pub fn binding_parameter(&self) -> Option<&Parameter> {
        binding_parameter(self.is_bound, &self.parameters)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub is_bound: bool,
    #[serde(default)]
    pub is_composable: bool,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub return_type: ReturnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_set_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl Function {
    #[must_use]
    pub fn binding_parameter(&self) -> Option<&Parameter> {
        binding_parameter(self.is_bound, &self.parameters)
    }

    /// Names of the parameters a caller supplies (binding parameter excluded).
    pub fn non_binding_parameter_names(&self) -> impl Iterator<Item = &str> {
        let skip = usize::from(self.is_bound);
        self.parameters.iter().skip(skip).map(|p| p.name.as_str())
    }
}

fn binding_parameter(is_bound: bool, parameters: &[Parameter]) -> Option<&Parameter> {
    if is_bound {
        parameters.first()
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Entity container
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySet {
    pub name: String,
    pub entity_type: QualifiedName,
    #[serde(default = "default_true")]
    pub include_in_service_document: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Singleton {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: QualifiedName,
}

/// Exposes an unbound action or function at the service root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationImport {
    pub name: String,
    pub operation: QualifiedName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_set: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityContainer {
    /// Filled in by the provider from the declaring schema.
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub entity_sets: Vec<EntitySet>,
    #[serde(default)]
    pub singletons: Vec<Singleton>,
    #[serde(default)]
    pub action_imports: Vec<OperationImport>,
    #[serde(default)]
    pub function_imports: Vec<OperationImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl EntityContainer {
    #[must_use]
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.namespace.clone(), self.name.clone())
    }

    #[must_use]
    pub fn entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.entity_sets.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn singleton(&self, name: &str) -> Option<&Singleton> {
        self.singletons.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// Service-level metadata
// ---------------------------------------------------------------------------

/// Namespace (and alias) of one schema contributing to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Reference to an external CSDL document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub uri: String,
    #[serde(default)]
    pub includes: Vec<SchemaInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    pub protocol_version: String,
    pub schemas: Vec<SchemaInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
}

impl Default for ServiceMetadata {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            schemas: Vec::new(),
            references: Vec::new(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_enum_underlying_type() -> QualifiedName {
    QualifiedName::new("Edm", "Int32")
}
