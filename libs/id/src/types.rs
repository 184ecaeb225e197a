//! Identity types for stored objects.

use serde::{Deserialize, Serialize};

use crate::{define_id, IdError};

define_id!(
    /// Store-assigned unique id of one object incarnation.
    Uid,
    "uid"
);

define_id!(
    /// Correlation id attached to a single reconcile invocation.
    ReconcileId,
    "rec"
);

/// Maximum length of a namespace or name segment.
pub const MAX_NAME_LEN: usize = 253;

// =============================================================================
// Object Key
// =============================================================================

/// Identity of a namespaced object: `namespace/name`.
///
/// Keys are immutable for the lifetime of an object and are the unit of
/// deduplication in the work queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Builds a key after validating both segments.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, IdError> {
        let namespace = namespace.into();
        let name = name.into();
        validate_segment("namespace", &namespace)?;
        validate_segment("name", &name)?;
        Ok(Self { namespace, name })
    }

    /// Parses a key in the `namespace/name` format.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let (namespace, name) = s.split_once('/').ok_or(IdError::MissingSeparator('/'))?;
        Self::new(namespace, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a sibling key in the same namespace.
    pub fn sibling(&self, name: impl Into<String>) -> Result<Self, IdError> {
        Self::new(self.namespace.clone(), name)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Lowercase alphanumerics, `-` and `.`, starting and ending alphanumeric.
fn validate_segment(segment: &'static str, value: &str) -> Result<(), IdError> {
    let invalid = |reason| IdError::InvalidName {
        segment,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(invalid("longer than 253 characters"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid("only lowercase alphanumerics, '-' and '.' are allowed"));
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(value.chars().next()) || !alnum(value.chars().last()) {
        return Err(invalid("must start and end with an alphanumeric character"));
    }
    Ok(())
}

// =============================================================================
// Resource Version
// =============================================================================

/// Opaque optimistic-concurrency token issued by the object store.
///
/// Callers compare tokens for equality only; ordering carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ResourceVersion {
    fn from(counter: u64) -> Self {
        Self(counter.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_object_key_parse() {
        let key: ObjectKey = "team-a/llama-7b".parse().unwrap();
        assert_eq!(key.namespace(), "team-a");
        assert_eq!(key.name(), "llama-7b");
        assert_eq!(key.to_string(), "team-a/llama-7b");
    }

    #[test]
    fn test_object_key_missing_separator() {
        let result = ObjectKey::parse("llama-7b");
        assert!(matches!(result, Err(IdError::MissingSeparator('/'))));
    }

    #[test]
    fn test_object_key_empty() {
        assert!(ObjectKey::parse("").unwrap_err().is_empty());
    }

    #[test]
    fn test_object_key_rejects_uppercase() {
        let result = ObjectKey::new("default", "Llama");
        assert!(matches!(
            result,
            Err(IdError::InvalidName { segment: "name", .. })
        ));
    }

    #[test]
    fn test_object_key_rejects_trailing_dash() {
        assert!(ObjectKey::new("default-", "llama").is_err());
        assert!(ObjectKey::new("default", "-llama").is_err());
    }

    #[test]
    fn test_object_key_rejects_extra_slash() {
        assert!(ObjectKey::parse("a/b/c").is_err());
    }

    #[test]
    fn test_sibling_keeps_namespace() {
        let key = ObjectKey::new("team-a", "llama").unwrap();
        let sibling = key.sibling("llama-worker").unwrap();
        assert_eq!(sibling.namespace(), "team-a");
        assert_eq!(sibling.name(), "llama-worker");
    }

    #[test]
    fn test_object_key_json() {
        let key = ObjectKey::new("default", "bge").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"default/bge\"");
        let parsed: ObjectKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_uid_prefix() {
        let uid = Uid::new();
        assert!(uid.to_string().starts_with("uid_"));
        let parsed: Uid = uid.to_string().parse().unwrap();
        assert_eq!(parsed, uid);
    }

    #[test]
    fn test_uid_rejects_reconcile_id() {
        let rec = ReconcileId::new().to_string();
        assert!(matches!(
            Uid::parse(&rec),
            Err(IdError::InvalidPrefix { expected: "uid", .. })
        ));
    }

    #[test]
    fn test_uid_invalid_ulid() {
        assert!(matches!(Uid::parse("uid_nope"), Err(IdError::InvalidUlid(_))));
    }

    #[test]
    fn test_resource_version_is_transparent() {
        let rv = ResourceVersion::from(42);
        assert_eq!(serde_json::to_string(&rv).unwrap(), "\"42\"");
        assert_eq!(rv.as_str(), "42");
    }

    proptest! {
        #[test]
        fn prop_valid_keys_reparse(ns in "[a-z0-9]([a-z0-9-]{0,20}[a-z0-9])?", name in "[a-z0-9]([a-z0-9.-]{0,40}[a-z0-9])?") {
            let key = ObjectKey::new(ns.clone(), name.clone()).unwrap();
            let reparsed = ObjectKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(reparsed.namespace(), ns.as_str());
            prop_assert_eq!(reparsed.name(), name.as_str());
        }

        #[test]
        fn prop_parse_never_panics(s in ".{0,64}") {
            let _ = ObjectKey::parse(&s);
        }
    }
}
