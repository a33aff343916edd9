//! Authenticated principal produced by a session lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The authenticated identity making a request.
///
/// Principals are produced by the session store after token validation.
/// The `attributes` map is what policy conditions are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Session identifier.
    pub session_id: String,
    /// Principal identifier (user or agent name).
    pub id: String,
    /// When the session was created, unix seconds.
    pub created_at: u64,
    /// When the session expires, unix seconds.
    pub expires_at: u64,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Arbitrary attributes used for policy condition matching.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Principal {
    /// Create a principal with no scopes or attributes.
    pub fn new(session_id: impl Into<String>, id: impl Into<String>, expires_at: u64) -> Self {
        Self {
            session_id: session_id.into(),
            id: id.into(),
            created_at: 0,
            expires_at,
            scopes: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Whether the session has expired at `now` (unix seconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at <= now
    }

    /// Whether the principal holds the given scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Look up an attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_exclusive() {
        let principal = Principal::new("s1", "alice", 1000);
        assert!(!principal.is_expired_at(999));
        assert!(principal.is_expired_at(1000));
        assert!(principal.is_expired_at(1001));
    }

    #[test]
    fn test_builder_helpers() {
        let principal = Principal::new("s1", "alice", 1000)
            .with_scope("read")
            .with_attribute("team", "finance")
            .with_attribute("level", 3);

        assert!(principal.has_scope("read"));
        assert!(!principal.has_scope("write"));
        assert_eq!(principal.attribute("team"), Some(&Value::from("finance")));
        assert_eq!(principal.attribute("level"), Some(&Value::from(3)));
        assert_eq!(principal.attribute("missing"), None);
    }

    #[test]
    fn test_missing_collections_default() {
        let json = r#"{"session_id":"s","id":"bob","created_at":1,"expires_at":2}"#;
        let principal: Principal = serde_json::from_str(json).unwrap();
        assert!(principal.scopes.is_empty());
        assert!(principal.attributes.is_empty());
    }
}
