//! Ordered, first-match policy evaluation.

use std::sync::{Arc, PoisonError, RwLock};

use protocol::{PolicyDocument, Principal};
use tracing::{debug, info};

use super::policy::{CompiledPolicy, PolicyError};

/// Evaluates access requests against an ordered list of policies.
///
/// The first policy that fully matches grants access; if none matches the
/// request is denied. Policies are immutable once added. Additions swap in
/// a new list, so evaluation works on a snapshot and never waits on a
/// writer for longer than an `Arc` clone.
#[derive(Debug, Default)]
pub struct AccessControl {
    policies: RwLock<Arc<Vec<Arc<CompiledPolicy>>>>,
}

impl AccessControl {
    /// Creates an engine with no policies, which denies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and load policies in order.
    pub fn from_documents<I>(documents: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = PolicyDocument>,
    {
        let policies = documents
            .into_iter()
            .map(|doc| CompiledPolicy::compile(doc).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            policies: RwLock::new(Arc::new(policies)),
        })
    }

    /// Append a policy after the existing ones.
    pub fn add_policy(&self, document: PolicyDocument) -> Result<(), PolicyError> {
        let compiled = Arc::new(CompiledPolicy::compile(document)?);
        let id = compiled.id().to_string();

        let mut guard = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(compiled);
        *guard = Arc::new(next);

        info!(policy = %id, count = guard.len(), "Added access policy");
        Ok(())
    }

    /// Whether `principal` may perform `action` on `resource`.
    pub fn check_access(&self, principal: &Principal, resource: &str, action: &str) -> bool {
        self.matching_policy(principal, resource, action).is_some()
    }

    /// The first policy granting the request, if any.
    pub fn matching_policy(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
    ) -> Option<Arc<CompiledPolicy>> {
        let found = self
            .snapshot()
            .iter()
            .find(|policy| policy.matches(principal, resource, action))
            .cloned();

        match &found {
            Some(policy) => debug!(
                principal = %principal.id,
                resource,
                action,
                policy = %policy.id(),
                "Access granted"
            ),
            None => debug!(principal = %principal.id, resource, action, "No policy matched"),
        }
        found
    }

    /// Number of loaded policies.
    pub fn policy_count(&self) -> usize {
        self.snapshot().len()
    }

    /// The loaded policy documents, in evaluation order.
    pub fn documents(&self) -> Vec<PolicyDocument> {
        self.snapshot()
            .iter()
            .map(|policy| policy.document().clone())
            .collect()
    }

    fn snapshot(&self) -> Arc<Vec<Arc<CompiledPolicy>>> {
        Arc::clone(&self.policies.read().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn policy(id: &str, principals: &[&str], resources: &[&str], actions: &[&str]) -> PolicyDocument {
        PolicyDocument::new(
            id,
            principals.iter().map(|s| s.to_string()).collect(),
            resources.iter().map(|s| s.to_string()).collect(),
            actions.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn principal(id: &str) -> Principal {
        Principal::new("session", id, u64::MAX)
    }

    #[test]
    fn test_default_deny() {
        let engine = AccessControl::new();

        for who in ["alice", "bob", "*", ""] {
            for resource in ["file:a.txt", "directory:.", "file:reports/q1.txt", ""] {
                for action in ["read", "list", "write", ""] {
                    assert!(!engine.check_access(&principal(who), resource, action));
                }
            }
        }
        assert_eq!(engine.policy_count(), 0);
    }

    #[test]
    fn test_alice_reports_scenario() {
        let engine = AccessControl::from_documents([policy(
            "reports",
            &["alice"],
            &["file:reports/*"],
            &["read"],
        )])
        .unwrap();

        let alice = principal("alice");
        assert!(engine.check_access(&alice, "file:reports/q1.txt", "read"));
        assert!(!engine.check_access(&alice, "file:secrets/key.pem", "read"));
        assert!(!engine.check_access(&alice, "file:reports/q1.txt", "list"));
        assert!(!engine.check_access(&principal("bob"), "file:reports/q1.txt", "read"));
    }

    #[test]
    fn test_first_match_wins() {
        let a = policy("a", &["bob"], &["file:*"], &["read"]);
        let b = policy("b", &["alice"], &["file:*"], &["read"]);
        let b2 = policy("b2", &["*"], &["file:*"], &["read"]);

        let engine = AccessControl::from_documents([b.clone(), a.clone(), b2.clone()]).unwrap();
        let granted = engine
            .matching_policy(&principal("alice"), "file:x", "read")
            .unwrap();
        assert_eq!(granted.id(), "b");

        let engine = AccessControl::from_documents([a, b2, b]).unwrap();
        let granted = engine
            .matching_policy(&principal("alice"), "file:x", "read")
            .unwrap();
        assert_eq!(granted.id(), "b2");
    }

    #[test]
    fn test_non_matching_policy_does_not_change_outcome() {
        let a = policy("a", &["bob"], &["file:*"], &["read"]);
        let b = policy("b", &["alice"], &["file:reports/*"], &["read"]);
        let noise = policy("noise", &["carol"], &["directory:*"], &["list"]);
        let alice = principal("alice");

        let orders = [
            vec![b.clone(), a.clone()],
            vec![noise.clone(), b.clone(), a.clone()],
            vec![b.clone(), noise.clone(), a.clone()],
            vec![b.clone(), a.clone(), noise.clone()],
        ];
        for order in orders {
            let engine = AccessControl::from_documents(order).unwrap();
            assert!(engine.check_access(&alice, "file:reports/q1.txt", "read"));
            assert!(!engine.check_access(&alice, "file:secrets/key.pem", "read"));
        }
    }

    #[test]
    fn test_conditions_gate_access() {
        let engine = AccessControl::from_documents([policy(
            "finance",
            &["*"],
            &["directory:finance*"],
            &["list"],
        )
        .with_condition("department", "finance")])
        .unwrap();

        let member = principal("alice").with_attribute("department", "finance");
        let outsider = principal("bob").with_attribute("department", "sales");

        assert!(engine.check_access(&member, "directory:finance/2024", "list"));
        assert!(!engine.check_access(&outsider, "directory:finance/2024", "list"));
        assert!(!engine.check_access(&principal("carol"), "directory:finance", "list"));
    }

    #[test]
    fn test_add_policy_appends() {
        let engine = AccessControl::from_documents([policy(
            "first",
            &["*"],
            &["file:*"],
            &["read"],
        )])
        .unwrap();

        engine
            .add_policy(policy("second", &["alice"], &["directory:*"], &["list"]))
            .unwrap();

        assert_eq!(engine.policy_count(), 2);
        let ids: Vec<String> = engine.documents().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert!(engine.check_access(&principal("alice"), "directory:.", "list"));

        // Later additions never take precedence over earlier matches.
        engine
            .add_policy(policy("third", &["*"], &["file:*"], &["read"]))
            .unwrap();
        let granted = engine
            .matching_policy(&principal("alice"), "file:a", "read")
            .unwrap();
        assert_eq!(granted.id(), "first");
    }

    #[test]
    fn test_add_invalid_policy_leaves_engine_unchanged() {
        let engine = AccessControl::new();
        assert!(engine
            .add_policy(policy("bad", &["["], &["file:*"], &["read"]))
            .is_err());
        assert_eq!(engine.policy_count(), 0);
    }

    #[test]
    fn test_from_documents_rejects_invalid() {
        let result = AccessControl::from_documents([
            policy("good", &["*"], &["file:*"], &["read"]),
            policy("bad", &["*"], &["file:[x"], &["read"]),
        ]);
        assert!(matches!(
            result,
            Err(PolicyError::InvalidPattern { ref policy, .. }) if policy == "bad"
        ));
    }

    #[test]
    fn test_concurrent_checks() {
        let engine = Arc::new(
            AccessControl::from_documents([policy("all", &["*"], &["file:*"], &["read"])])
                .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for j in 0..100 {
                        let who = principal(&format!("agent-{i}"));
                        assert!(engine.check_access(&who, &format!("file:{j}.txt"), "read"));
                        assert!(!engine.check_access(&who, &format!("file:{j}.txt"), "write"));
                    }
                })
            })
            .collect();

        engine
            .add_policy(policy("late", &["*"], &["directory:*"], &["list"]))
            .unwrap();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(engine.policy_count(), 2);
    }
}
