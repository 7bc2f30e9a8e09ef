//! In-memory [`MetadataProvider`] backed by schema documents.
//!
//! A [`ModelDocument`] is a JSON file holding one or more [`Schema`]s. The
//! provider answers factory calls by scanning those schemas; caching is left
//! entirely to [`MetadataCache`](crate::MetadataCache).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::alias::AliasResolver;
use crate::name::QualifiedName;
use crate::schema::{
    Action, ComplexType, EntityContainer, EntityType, EnumType, Function, Parameter, Reference,
    SchemaInfo, ServiceMetadata, TypeDefinition, DEFAULT_PROTOCOL_VERSION,
};
use crate::traits::MetadataProvider;

/// Errors raised while loading or validating a model document.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("namespace declared more than once: {0}")]
    DuplicateNamespace(String),
    #[error("alias '{alias}' is already used as a namespace or alias")]
    DuplicateAlias { alias: String },
}

/// One schema: a namespace and the elements declared in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
    #[serde(default)]
    pub complex_types: Vec<ComplexType>,
    #[serde(default)]
    pub enum_types: Vec<EnumType>,
    #[serde(default)]
    pub type_definitions: Vec<TypeDefinition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_container: Option<EntityContainer>,
}

/// Top-level model file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDocument {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    pub schemas: Vec<Schema>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

/// Answers metadata factory calls from a fixed set of schemas.
#[derive(Debug, Clone)]
pub struct SchemaProvider {
    document: ModelDocument,
    /// Alias table used to compare binding parameter types, which schemas
    /// may write with an alias.
    aliases: AliasResolver,
}

impl SchemaProvider {
    /// Validates the document and fills in container namespaces.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if a namespace is declared twice or an alias
    /// collides with another namespace or alias.
    pub fn new(mut document: ModelDocument) -> Result<Self, ModelError> {
        let mut seen = HashSet::new();
        for schema in &document.schemas {
            if !seen.insert(schema.namespace.clone()) {
                return Err(ModelError::DuplicateNamespace(schema.namespace.clone()));
            }
        }
        for schema in &document.schemas {
            if let Some(alias) = &schema.alias {
                if !seen.insert(alias.clone()) {
                    return Err(ModelError::DuplicateAlias {
                        alias: alias.clone(),
                    });
                }
            }
        }

        for schema in &mut document.schemas {
            if let Some(container) = &mut schema.entity_container {
                container.namespace.clone_from(&schema.namespace);
            }
        }

        let aliases = AliasResolver::new(alias_table(&document.schemas));
        Ok(Self { document, aliases })
    }

    /// Parses a JSON model document.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Parse`] for malformed JSON and the validation
    /// errors of [`SchemaProvider::new`].
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON model document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Io`] if the file cannot be read, plus the errors
    /// of [`SchemaProvider::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    #[must_use]
    pub fn document(&self) -> &ModelDocument {
        &self.document
    }

    fn schema(&self, namespace: &str) -> Option<&Schema> {
        self.document
            .schemas
            .iter()
            .find(|s| s.namespace == namespace)
    }

    fn binding_matches(
        &self,
        binding: Option<&Parameter>,
        binding_type: &QualifiedName,
        is_collection: Option<bool>,
    ) -> bool {
        binding.is_some_and(|p| {
            self.aliases.resolve(&p.type_name) == *binding_type
                && is_collection.map_or(true, |c| c == p.collection)
        })
    }
}

impl MetadataProvider for SchemaProvider {
    fn create_alias_to_namespace_info(&self) -> HashMap<String, String> {
        alias_table(&self.document.schemas)
    }

    fn create_entity_container(&self, name: Option<&QualifiedName>) -> Option<EntityContainer> {
        match name {
            None => self
                .document
                .schemas
                .iter()
                .find_map(|s| s.entity_container.clone()),
            Some(name) => self
                .schema(name.namespace())?
                .entity_container
                .as_ref()
                .filter(|c| c.name == name.name())
                .cloned(),
        }
    }

    fn create_enum_type(&self, name: &QualifiedName) -> Option<EnumType> {
        self.schema(name.namespace())?
            .enum_types
            .iter()
            .find(|t| t.name == name.name())
            .cloned()
    }

    fn create_type_definition(&self, name: &QualifiedName) -> Option<TypeDefinition> {
        self.schema(name.namespace())?
            .type_definitions
            .iter()
            .find(|t| t.name == name.name())
            .cloned()
    }

    fn create_entity_type(&self, name: &QualifiedName) -> Option<EntityType> {
        self.schema(name.namespace())?
            .entity_types
            .iter()
            .find(|t| t.name == name.name())
            .cloned()
    }

    fn create_complex_type(&self, name: &QualifiedName) -> Option<ComplexType> {
        self.schema(name.namespace())?
            .complex_types
            .iter()
            .find(|t| t.name == name.name())
            .cloned()
    }

    fn create_action(
        &self,
        name: &QualifiedName,
        binding_type: Option<&QualifiedName>,
        is_collection: Option<bool>,
    ) -> Option<Action> {
        self.schema(name.namespace())?
            .actions
            .iter()
            .filter(|a| a.name == name.name())
            .find(|a| match binding_type {
                None => !a.is_bound,
                Some(binding_type) => {
                    self.binding_matches(a.binding_parameter(), binding_type, is_collection)
                }
            })
            .cloned()
    }

    /// Parameter names are compared as a set; the binding parameter is not
    /// part of the comparison.
    fn create_function(
        &self,
        name: &QualifiedName,
        binding_type: Option<&QualifiedName>,
        is_collection: Option<bool>,
        parameter_names: &[String],
    ) -> Option<Function> {
        let wanted: HashSet<&str> = parameter_names.iter().map(String::as_str).collect();
        self.schema(name.namespace())?
            .functions
            .iter()
            .filter(|f| f.name == name.name())
            .filter(|f| match binding_type {
                None => !f.is_bound,
                Some(binding_type) => {
                    self.binding_matches(f.binding_parameter(), binding_type, is_collection)
                }
            })
            .find(|f| {
                let declared: HashSet<&str> = f.non_binding_parameter_names().collect();
                declared == wanted
            })
            .cloned()
    }

    fn create_service_metadata(&self) -> ServiceMetadata {
        ServiceMetadata {
            protocol_version: self.document.protocol_version.clone(),
            schemas: self
                .document
                .schemas
                .iter()
                .map(|s| SchemaInfo {
                    namespace: s.namespace.clone(),
                    alias: s.alias.clone(),
                })
                .collect(),
            references: self.document.references.clone(),
        }
    }
}

fn alias_table(schemas: &[Schema]) -> HashMap<String, String> {
    schemas
        .iter()
        .filter_map(|s| s.alias.clone().map(|alias| (alias, s.namespace.clone())))
        .collect()
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::cache::MetadataCache;

    const MODEL: &str = r#"{
        "schemas": [
            {
                "namespace": "Org.Example",
                "alias": "ex",
                "entityTypes": [
                    {"name": "Customer", "key": ["Id"],
                     "properties": [{"name": "Id", "type": "Edm.Int32", "nullable": false}]},
                    {"name": "VipCustomer", "baseType": "ex.Customer"}
                ],
                "enumTypes": [{"name": "Tier", "members": [{"name": "Gold", "value": 1}]}],
                "typeDefinitions": [{"name": "Email", "underlyingType": "Edm.String", "maxLength": 320}],
                "complexTypes": [{"name": "Address", "properties": [{"name": "City", "type": "Edm.String"}]}],
                "actions": [
                    {"name": "Promote"},
                    {"name": "Promote", "isBound": true,
                     "parameters": [{"name": "customer", "type": "ex.Customer"}]},
                    {"name": "Promote", "isBound": true,
                     "parameters": [{"name": "customers", "type": "ex.Customer", "collection": true}]}
                ],
                "functions": [
                    {"name": "Top", "parameters": [{"name": "count", "type": "Edm.Int32"}],
                     "returnType": {"type": "ex.Customer", "collection": true}},
                    {"name": "Top", "parameters": [{"name": "count", "type": "Edm.Int32"},
                                                   {"name": "tier", "type": "ex.Tier"}],
                     "returnType": {"type": "ex.Customer", "collection": true}}
                ],
                "entityContainer": {
                    "name": "Container",
                    "entitySets": [{"name": "Customers", "entityType": "ex.Customer"}]
                }
            },
            {"namespace": "Org.Other"}
        ]
    }"#;

    fn provider() -> SchemaProvider {
        SchemaProvider::from_json_str(MODEL).unwrap()
    }

    #[test]
    fn builds_alias_table_from_schemas() {
        let aliases = provider().create_alias_to_namespace_info();
        assert_eq!(aliases.get("ex").map(String::as_str), Some("Org.Example"));
        assert_eq!(aliases.len(), 1);
    }

    #[test]
    fn default_container_is_first_declared_and_namespaced() {
        let container = provider().create_entity_container(None).unwrap();
        assert_eq!(container.namespace, "Org.Example");
        assert_eq!(
            container.qualified_name(),
            QualifiedName::new("Org.Example", "Container")
        );
        assert!(container.entity_set("Customers").is_some());
    }

    #[test]
    fn explicit_container_requires_matching_name() {
        let p = provider();
        assert!(p
            .create_entity_container(Some(&QualifiedName::new("Org.Example", "Container")))
            .is_some());
        assert!(p
            .create_entity_container(Some(&QualifiedName::new("Org.Example", "Other")))
            .is_none());
        assert!(p
            .create_entity_container(Some(&QualifiedName::new("Org.Other", "Container")))
            .is_none());
    }

    #[test]
    fn finds_types_of_every_kind() {
        let p = provider();
        let ns = |n: &str| QualifiedName::new("Org.Example", n);
        assert!(p.create_entity_type(&ns("Customer")).is_some());
        assert!(p.create_complex_type(&ns("Address")).is_some());
        assert!(p.create_enum_type(&ns("Tier")).is_some());
        assert_eq!(
            p.create_type_definition(&ns("Email")).unwrap().max_length,
            Some(320)
        );
        assert!(p.create_entity_type(&ns("Address")).is_none());
    }

    #[test]
    fn action_overloads_are_selected_by_binding() {
        let p = provider();
        let name = QualifiedName::new("Org.Example", "Promote");
        let customer = QualifiedName::new("Org.Example", "Customer");

        let unbound = p.create_action(&name, None, None).unwrap();
        assert!(!unbound.is_bound);

        let single = p.create_action(&name, Some(&customer), Some(false)).unwrap();
        assert_eq!(single.parameters[0].name, "customer");

        let collection = p.create_action(&name, Some(&customer), Some(true)).unwrap();
        assert_eq!(collection.parameters[0].name, "customers");

        let unspecified = p.create_action(&name, Some(&customer), None).unwrap();
        assert!(unspecified.is_bound);

        let other = QualifiedName::new("Org.Example", "Order");
        assert!(p.create_action(&name, Some(&other), None).is_none());
    }

    #[test]
    fn function_overloads_match_parameter_names_as_set() {
        let p = provider();
        let name = QualifiedName::new("Org.Example", "Top");

        let one = p
            .create_function(&name, None, None, &["count".to_string()])
            .unwrap();
        assert_eq!(one.parameters.len(), 1);

        let two = p
            .create_function(&name, None, None, &["tier".to_string(), "count".to_string()])
            .unwrap();
        assert_eq!(two.parameters.len(), 2);

        assert!(p.create_function(&name, None, None, &[]).is_none());
    }

    #[test]
    fn service_metadata_lists_schemas_and_aliases() {
        let metadata = provider().create_service_metadata();
        assert_eq!(metadata.protocol_version, "4.0");
        assert_eq!(metadata.schemas.len(), 2);
        assert_eq!(metadata.schemas[0].alias.as_deref(), Some("ex"));
    }

    #[test]
    fn rejects_duplicate_namespaces_and_aliases() {
        let dup_ns = r#"{"schemas": [{"namespace": "A"}, {"namespace": "A"}]}"#;
        assert!(matches!(
            SchemaProvider::from_json_str(dup_ns),
            Err(ModelError::DuplicateNamespace(ns)) if ns == "A"
        ));

        let alias_clash = r#"{"schemas": [{"namespace": "A"}, {"namespace": "B", "alias": "A"}]}"#;
        assert!(matches!(
            SchemaProvider::from_json_str(alias_clash),
            Err(ModelError::DuplicateAlias { alias }) if alias == "A"
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MODEL.as_bytes()).unwrap();
        let p = SchemaProvider::from_path(file.path()).unwrap();
        assert_eq!(p.document().schemas.len(), 2);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            SchemaProvider::from_path("/nonexistent/model.json"),
            Err(ModelError::Io(_))
        ));
    }

    #[test]
    fn cache_over_schema_provider_resolves_aliases() {
        let cache = MetadataCache::new(Arc::new(provider()));
        let via_alias = cache
            .get_entity_type(&QualifiedName::new("ex", "VipCustomer"))
            .unwrap();
        assert_eq!(
            via_alias.base_type.as_ref().map(ToString::to_string),
            Some("ex.Customer".to_string())
        );
        let bound = cache
            .get_action(
                &QualifiedName::new("ex", "Promote"),
                Some(&QualifiedName::new("ex", "Customer")),
                Some(true),
            )
            .unwrap();
        assert_eq!(bound.parameters[0].name, "customers");
    }
}
