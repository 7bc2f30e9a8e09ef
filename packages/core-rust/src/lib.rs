//! OData core: qualified names, Entity Data Model definitions, metadata
//! providers, and the lazy metadata cache.

pub mod alias;
pub mod cache;
pub mod name;
pub mod provider;
pub mod schema;
pub mod traits;

pub use alias::AliasResolver;
pub use cache::{CacheStats, MetadataCache};
pub use name::{ActionKey, FunctionKey, NameError, QualifiedName};
pub use provider::{ModelDocument, ModelError, Schema, SchemaProvider};
pub use schema::{
    Action, Annotation, ComplexType, EntityContainer, EntitySet, EntityType, EnumMember, EnumType,
    Function, NavigationProperty, OperationImport, Parameter, Property, Reference, ReturnType,
    SchemaInfo, ServiceMetadata, Singleton, TypeDefinition, DEFAULT_PROTOCOL_VERSION,
};
pub use traits::MetadataProvider;
