//! Qualified names and composite operation keys.
//!
//! A [`QualifiedName`] is the sole key used for schema lookups. Operations are
//! overloadable, so actions and functions are additionally keyed by their
//! binding parameter ([`ActionKey`], [`FunctionKey`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors produced when parsing a dotted qualified name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("qualified name must contain a namespace and a name separated by '.': {input}")]
    MissingSeparator { input: String },
    #[error("qualified name has an empty namespace or name: {input}")]
    EmptyPart { input: String },
}

/// Identifies a schema element by `(namespace, name)`.
///
/// Equality and hashing use both fields. The namespace may itself be an alias
/// until it has been passed through an [`AliasResolver`](crate::AliasResolver).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    namespace: String,
    name: String,
}

impl QualifiedName {
    /// Creates a qualified name from its two parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a copy of this name with the namespace replaced.
    #[must_use]
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self::new(namespace, self.name.clone())
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = NameError;

    /// Splits at the last `.` because namespaces are themselves dotted
    /// (`Org.Example.Customer` is `Org.Example` + `Customer`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((namespace, name)) = s.rsplit_once('.') else {
            return Err(NameError::MissingSeparator {
                input: s.to_string(),
            });
        };
        if namespace.is_empty() || name.is_empty() {
            return Err(NameError::EmptyPart {
                input: s.to_string(),
            });
        }
        Ok(Self::new(namespace, name))
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QualifiedName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Operation keys
// ---------------------------------------------------------------------------

/// Cache key for an action overload.
///
/// `binding_type == None` is the unbound bucket. `is_collection == None` means
/// "not specified" and is a distinct bucket from `Some(false)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub name: QualifiedName,
    pub binding_type: Option<QualifiedName>,
    pub is_collection: Option<bool>,
}

impl ActionKey {
    #[must_use]
    pub fn new(
        name: QualifiedName,
        binding_type: Option<QualifiedName>,
        is_collection: Option<bool>,
    ) -> Self {
        Self {
            name,
            binding_type,
            is_collection,
        }
    }
}

/// Cache key for a function overload. Parameter names are order-significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    pub name: QualifiedName,
    pub binding_type: Option<QualifiedName>,
    pub is_collection: Option<bool>,
    pub parameter_names: Vec<String>,
}

impl FunctionKey {
    #[must_use]
    pub fn new(
        name: QualifiedName,
        binding_type: Option<QualifiedName>,
        is_collection: Option<bool>,
        parameter_names: Vec<String>,
    ) -> Self {
        Self {
            name,
            binding_type,
            is_collection,
            parameter_names,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn parses_at_last_dot() {
        let fqn: QualifiedName = "Org.Example.Customer".parse().unwrap();
        assert_eq!(fqn.namespace(), "Org.Example");
        assert_eq!(fqn.name(), "Customer");
        assert_eq!(fqn.to_string(), "Org.Example.Customer");
    }

    #[test]
    fn rejects_names_without_namespace() {
        assert!(matches!(
            "Customer".parse::<QualifiedName>(),
            Err(NameError::MissingSeparator { .. })
        ));
        assert!(matches!(
            "Org.".parse::<QualifiedName>(),
            Err(NameError::EmptyPart { .. })
        ));
        assert!(matches!(
            ".Customer".parse::<QualifiedName>(),
            Err(NameError::EmptyPart { .. })
        ));
    }

    #[test]
    fn serde_uses_dotted_form() {
        let fqn = QualifiedName::new("NS", "Type");
        let json = serde_json::to_string(&fqn).unwrap();
        assert_eq!(json, "\"NS.Type\"");
        let back: QualifiedName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fqn);
    }

    #[test]
    fn action_keys_distinguish_unspecified_collection_flag() {
        let name = QualifiedName::new("NS", "Act");
        let binding = Some(QualifiedName::new("NS", "Customer"));
        let unspecified = ActionKey::new(name.clone(), binding.clone(), None);
        let single = ActionKey::new(name.clone(), binding, Some(false));
        let unbound = ActionKey::new(name, None, None);

        let set: HashSet<_> = [unspecified.clone(), single.clone(), unbound.clone()]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 3);
        assert_ne!(unspecified, single);
        assert_ne!(unspecified, unbound);
    }

    #[test]
    fn function_key_parameter_order_is_significant() {
        let name = QualifiedName::new("NS", "Fn");
        let ab = FunctionKey::new(name.clone(), None, None, vec!["a".into(), "b".into()]);
        let ba = FunctionKey::new(name, None, None, vec!["b".into(), "a".into()]);
        assert_ne!(ab, ba);
    }
}
