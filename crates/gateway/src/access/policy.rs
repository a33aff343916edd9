//! Policies compiled for evaluation.

use std::collections::HashSet;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use protocol::{PolicyDocument, Principal};
use thiserror::Error;

/// Errors raised while compiling a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A principal or resource pattern is not a valid glob.
    #[error("policy {policy:?}: invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        policy: String,
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// A policy whose patterns have been compiled once, at load time.
///
/// `*` matches across `/`, so `file:reports/*` covers the whole subtree.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    document: PolicyDocument,
    principals: GlobSet,
    resources: GlobSet,
    actions: HashSet<String>,
}

impl CompiledPolicy {
    /// Compile a policy document.
    pub fn compile(document: PolicyDocument) -> Result<Self, PolicyError> {
        let principals = compile_patterns(&document.id, &document.principals)?;
        let resources = compile_patterns(&document.id, &document.resources)?;
        let actions = document.actions.iter().cloned().collect();

        Ok(Self {
            document,
            principals,
            resources,
            actions,
        })
    }

    /// The source document.
    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    /// Policy identifier.
    pub fn id(&self) -> &str {
        &self.document.id
    }

    /// Whether this policy grants `action` on `resource` to `principal`.
    pub fn matches(&self, principal: &Principal, resource: &str, action: &str) -> bool {
        self.principals.is_match(&principal.id)
            && self.resources.is_match(resource)
            && self.actions.contains(action)
            && self.conditions_met(principal)
    }

    fn conditions_met(&self, principal: &Principal) -> bool {
        self.document
            .conditions
            .iter()
            .all(|(key, expected)| principal.attribute(key) == Some(expected))
    }
}

fn compile_patterns(policy: &str, patterns: &[String]) -> Result<GlobSet, PolicyError> {
    let invalid = |pattern: &str, source| PolicyError::InvalidPattern {
        policy: policy.to_string(),
        pattern: pattern.to_string(),
        source,
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| invalid(pattern, e))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| invalid(&patterns.join(", "), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(principals: &[&str], resources: &[&str], actions: &[&str]) -> PolicyDocument {
        PolicyDocument::new(
            "test",
            principals.iter().map(|s| s.to_string()).collect(),
            resources.iter().map(|s| s.to_string()).collect(),
            actions.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn alice() -> Principal {
        Principal::new("s1", "alice", u64::MAX)
    }

    #[test]
    fn test_exact_match() {
        let compiled =
            CompiledPolicy::compile(policy(&["alice"], &["file:reports/q1.txt"], &["read"]))
                .unwrap();

        assert!(compiled.matches(&alice(), "file:reports/q1.txt", "read"));
        assert!(!compiled.matches(&alice(), "file:reports/q2.txt", "read"));
        assert!(!compiled.matches(&alice(), "file:reports/q1.txt", "list"));
        assert!(!compiled.matches(
            &Principal::new("s2", "bob", u64::MAX),
            "file:reports/q1.txt",
            "read"
        ));
    }

    #[test]
    fn test_star_crosses_separators() {
        let compiled =
            CompiledPolicy::compile(policy(&["*"], &["file:reports/*"], &["read"])).unwrap();

        assert!(compiled.matches(&alice(), "file:reports/q1.txt", "read"));
        assert!(compiled.matches(&alice(), "file:reports/2024/q1.txt", "read"));
        assert!(!compiled.matches(&alice(), "file:secrets/key.pem", "read"));
        assert!(!compiled.matches(&alice(), "directory:reports/2024", "read"));
    }

    #[test]
    fn test_character_classes_and_single_wildcards() {
        let compiled = CompiledPolicy::compile(policy(
            &["agent-?", "user-[abc]*"],
            &["directory:*"],
            &["list"],
        ))
        .unwrap();

        let agent = Principal::new("s", "agent-7", u64::MAX);
        let user = Principal::new("s", "user-bob", u64::MAX);
        let other = Principal::new("s", "user-dave", u64::MAX);

        assert!(compiled.matches(&agent, "directory:.", "list"));
        assert!(compiled.matches(&user, "directory:.", "list"));
        assert!(!compiled.matches(&other, "directory:.", "list"));
    }

    #[test]
    fn test_conditions_are_conjunctive() {
        let compiled = CompiledPolicy::compile(
            policy(&["*"], &["file:*"], &["read"])
                .with_condition("department", "finance")
                .with_condition("clearance", 2),
        )
        .unwrap();

        let both = alice()
            .with_attribute("department", "finance")
            .with_attribute("clearance", 2);
        let missing = alice().with_attribute("department", "finance");
        let mismatch = alice()
            .with_attribute("department", "finance")
            .with_attribute("clearance", 3);
        let wrong_type = alice()
            .with_attribute("department", "finance")
            .with_attribute("clearance", "2");

        assert!(compiled.matches(&both, "file:a.txt", "read"));
        assert!(!compiled.matches(&missing, "file:a.txt", "read"));
        assert!(!compiled.matches(&mismatch, "file:a.txt", "read"));
        assert!(!compiled.matches(&wrong_type, "file:a.txt", "read"));
    }

    #[test]
    fn test_empty_patterns_match_nothing() {
        let compiled = CompiledPolicy::compile(policy(&[], &["file:*"], &["read"])).unwrap();
        assert!(!compiled.matches(&alice(), "file:a.txt", "read"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = CompiledPolicy::compile(policy(&["alice"], &["file:[reports"], &["read"]))
            .unwrap_err();
        let PolicyError::InvalidPattern { policy, pattern, .. } = err;
        assert_eq!(policy, "test");
        assert_eq!(pattern, "file:[reports");
    }
}
