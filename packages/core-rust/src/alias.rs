//! Namespace alias resolution.

use std::collections::HashMap;

use crate::name::QualifiedName;

/// Immutable alias → namespace mapping.
///
/// A lookup miss is not an error: it means the input already uses a
/// canonical namespace.
#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    aliases: HashMap<String, String>,
}

impl AliasResolver {
    #[must_use]
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Returns the canonical namespace for `alias_or_namespace`.
    #[must_use]
    pub fn namespace<'a>(&'a self, alias_or_namespace: &'a str) -> &'a str {
        self.aliases
            .get(alias_or_namespace)
            .map_or(alias_or_namespace, String::as_str)
    }

    /// Replaces an aliased namespace with its canonical one, keeping the local name.
    #[must_use]
    pub fn resolve(&self, name: &QualifiedName) -> QualifiedName {
        match self.aliases.get(name.namespace()) {
            Some(namespace) => name.with_namespace(namespace.clone()),
            None => name.clone(),
        }
    }

    /// Absent input stays absent.
    #[must_use]
    pub fn resolve_opt(&self, name: Option<&QualifiedName>) -> Option<QualifiedName> {
        name.map(|n| self.resolve(n))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
