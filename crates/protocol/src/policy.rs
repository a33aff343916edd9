//! Serializable access policy documents.
//!
//! A policy grants a set of actions on matching resources to matching
//! principals, optionally gated on principal attributes. Patterns are
//! shell-style globs; resources have the form `file:<path>` or
//! `directory:<path>`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An access policy as stored in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Policy identifier.
    #[serde(default)]
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Principal glob patterns. Any match satisfies the principal check.
    pub principals: Vec<String>,
    /// Resource glob patterns. Any match satisfies the resource check.
    pub resources: Vec<String>,
    /// Permitted actions (e.g. `read`, `list`).
    pub actions: Vec<String>,
    /// Required attributes. Every key must be present with an equal value.
    #[serde(default)]
    pub conditions: BTreeMap<String, Value>,
    /// Creation time, unix seconds.
    #[serde(default)]
    pub created_at: u64,
    /// Last update time, unix seconds.
    #[serde(default)]
    pub updated_at: u64,
}

impl PolicyDocument {
    /// Create a policy with no conditions.
    pub fn new(
        id: impl Into<String>,
        principals: Vec<String>,
        resources: Vec<String>,
        actions: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            principals,
            resources,
            actions,
            conditions: BTreeMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Add a required attribute condition.
    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_policy_deserializes() {
        let json = r#"{
            "principals": ["alice"],
            "resources": ["file:reports/*"],
            "actions": ["read"]
        }"#;
        let policy: PolicyDocument = serde_json::from_str(json).unwrap();
        assert_eq!(policy.principals, vec!["alice"]);
        assert!(policy.conditions.is_empty());
        assert!(policy.id.is_empty());
    }

    #[test]
    fn test_with_condition() {
        let policy = PolicyDocument::new(
            "p1",
            vec!["*".to_string()],
            vec!["directory:*".to_string()],
            vec!["list".to_string()],
        )
        .with_condition("department", "finance");

        assert_eq!(
            policy.conditions.get("department"),
            Some(&Value::from("finance"))
        );
    }
}
