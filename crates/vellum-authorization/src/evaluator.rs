//! Permission Evaluator
//!
//! Resolves the effective ACL of an object by walking its folder ancestry and
//! checks a caller against the permission mapping. The object graph itself is
//! owned by the storage layer and reached through [`AclGraph`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use vellum_core::{ObjectId, PrincipalId, RepositoryConfig, Result, VellumError};

use crate::mapping::{Action, PermissionMapping};
use crate::permission::{Ace, Acl, Permission};

/// ACL-relevant view of one object in the graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclNode {
    /// Entries set directly on the object
    pub aces: Vec<Ace>,
    /// Whether the object inherits entries from its parent
    pub inherits: bool,
    /// Parent folder, `None` for the root and for unfiled objects
    pub parent: Option<ObjectId>,
}

/// Folder ancestry supplied by the storage layer
pub trait AclGraph {
    /// ACL node for `id`, or `None` when the object does not exist
    fn acl_node(&self, id: &ObjectId) -> Option<AclNode>;
}

/// Access decision result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    /// Access is allowed
    Allow,
    /// Access is denied with reason
    Deny(String),
}

/// Evaluates ACLs against the permission mapping
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    default_ace: Ace,
    admin: PrincipalId,
    anyone: PrincipalId,
    mapping: PermissionMapping,
}

impl PermissionEvaluator {
    /// Create an evaluator from explicit values
    pub fn new(
        default_ace: Ace,
        admin: impl Into<PrincipalId>,
        anyone: impl Into<PrincipalId>,
        mapping: PermissionMapping,
    ) -> Self {
        Self {
            default_ace,
            admin: admin.into(),
            anyone: anyone.into(),
            mapping,
        }
    }

    /// Create an evaluator with the standard mapping from repository configuration
    pub fn from_config(config: &RepositoryConfig) -> Result<Self> {
        let permission: Permission = config.default_ace.permission.parse()?;
        Ok(Self::new(
            Ace::new(config.default_ace.principal.as_str(), permission),
            config.admin_principal.as_str(),
            config.anyone_principal.as_str(),
            PermissionMapping::standard(),
        ))
    }

    /// The entry used for objects without any entries
    pub fn default_ace(&self) -> &Ace {
        &self.default_ace
    }

    /// The mapping table in use
    pub fn mapping(&self) -> &PermissionMapping {
        &self.mapping
    }

    /// Whether `principal` is the administrator
    pub fn is_admin(&self, principal: &PrincipalId) -> bool {
        *principal == self.admin
    }

    /// Resolve the effective ACL of `id`
    ///
    /// Direct entries come first. Ancestor entries follow, tagged inherited,
    /// for principals that no closer object already names. The walk stops at
    /// the root or at the first object that does not inherit.
    pub fn effective_acl(&self, graph: &impl AclGraph, id: &ObjectId) -> Result<Acl> {
        let node = graph
            .acl_node(id)
            .ok_or_else(|| VellumError::object_not_found(id.as_str()))?;

        let mut acl = Acl::new();
        let mut named: HashSet<PrincipalId> = HashSet::new();
        for ace in &node.aces {
            named.insert(ace.principal.clone());
            acl.push(ace.direct());
        }

        let mut visited: BTreeSet<ObjectId> = BTreeSet::new();
        visited.insert(id.clone());
        let mut inherits = node.inherits;
        let mut next = node.parent;

        while inherits {
            let Some(parent_id) = next else { break };
            if !visited.insert(parent_id.clone()) {
                return Err(VellumError::internal(format!(
                    "folder ancestry of '{id}' contains a cycle at '{parent_id}'"
                )));
            }
            let parent = graph
                .acl_node(&parent_id)
                .ok_or_else(|| VellumError::object_not_found(parent_id.as_str()))?;

            let mut newly_named = Vec::new();
            for ace in parent.aces.iter().filter(|ace| !named.contains(&ace.principal)) {
                newly_named.push(ace.principal.clone());
                acl.push(ace.inherited());
            }
            named.extend(newly_named);

            inherits = parent.inherits;
            next = parent.parent;
        }

        if acl.is_empty() {
            acl.push(self.default_ace.clone());
        }

        tracing::trace!(object = %id, entries = acl.len(), "Resolved effective ACL");
        Ok(acl)
    }

    /// Highest permission `principal` holds through `acl`
    pub fn permission_of(&self, principal: &PrincipalId, acl: &Acl) -> Permission {
        acl.aces()
            .iter()
            .filter(|ace| ace.principal == *principal || ace.principal == self.anyone)
            .map(|ace| ace.permission)
            .max()
            .unwrap_or(Permission::None)
    }

    /// Whether `principal` holds at least `required` through `acl`
    pub fn has_access(&self, principal: &PrincipalId, acl: &Acl, required: Permission) -> bool {
        if self.is_admin(principal) {
            return true;
        }
        self.permission_of(principal, acl).satisfies(required)
    }

    /// Decide whether `principal` may perform `action`
    pub fn decide(&self, principal: &PrincipalId, acl: &Acl, action: Action) -> AccessDecision {
        let required = self.mapping.required(action);
        if self.has_access(principal, acl, required) {
            tracing::trace!(principal = %principal, action = %action, "Access granted");
            AccessDecision::Allow
        } else {
            let held = self.permission_of(principal, acl);
            AccessDecision::Deny(format!(
                "'{principal}' holds {held} but {action} requires {required}"
            ))
        }
    }

    /// Require that `principal` may perform `action`
    pub fn check(&self, principal: &PrincipalId, acl: &Acl, action: Action) -> Result<()> {
        match self.decide(principal, acl, action) {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny(reason) => {
                tracing::warn!(principal = %principal, action = %action, "Permission denied");
                Err(VellumError::permission_denied(reason))
            }
        }
    }

    /// Subset of `candidates` that `principal` may perform
    pub fn allowable_actions(
        &self,
        principal: &PrincipalId,
        acl: &Acl,
        candidates: &[Action],
    ) -> BTreeSet<Action> {
        candidates
            .iter()
            .copied()
            .filter(|action| self.has_access(principal, acl, self.mapping.required(*action)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vellum_core::{principal_ids, ErrorKind};

    #[derive(Default)]
    struct Graph {
        nodes: HashMap<ObjectId, AclNode>,
    }

    impl Graph {
        fn add(&mut self, id: &str, parent: Option<&str>, inherits: bool, aces: Vec<Ace>) {
            self.nodes.insert(
                ObjectId::new(id),
                AclNode {
                    aces,
                    inherits,
                    parent: parent.map(ObjectId::new),
                },
            );
        }
    }

    impl AclGraph for Graph {
        fn acl_node(&self, id: &ObjectId) -> Option<AclNode> {
            self.nodes.get(id).cloned()
        }
    }

    fn evaluator() -> PermissionEvaluator {
        PermissionEvaluator::from_config(&RepositoryConfig::default()).unwrap()
    }

    #[test]
    fn test_inherited_entries_for_unnamed_principals() {
        let mut graph = Graph::default();
        graph.add(
            "root",
            None,
            false,
            vec![Ace::new("alice", Permission::All), Ace::new("bob", Permission::Write)],
        );
        graph.add("docs", Some("root"), true, vec![Ace::new("bob", Permission::Read)]);
        graph.add("doc", Some("docs"), true, vec![]);

        let acl = evaluator().effective_acl(&graph, &ObjectId::new("doc")).unwrap();
        let entries: Vec<_> = acl
            .aces()
            .iter()
            .map(|a| (a.principal.as_str(), a.permission, a.is_direct))
            .collect();
        assert_eq!(
            entries,
            vec![("bob", Permission::Read, false), ("alice", Permission::All, false)]
        );
    }

    #[test]
    fn test_non_inheriting_object_stops_walk() {
        let mut graph = Graph::default();
        graph.add("root", None, false, vec![Ace::new("alice", Permission::All)]);
        graph.add("doc", Some("root"), false, vec![Ace::new("bob", Permission::Read)]);

        let acl = evaluator().effective_acl(&graph, &ObjectId::new("doc")).unwrap();
        assert_eq!(acl.len(), 1);
        assert!(acl.aces()[0].is_direct);
    }

    #[test]
    fn test_empty_acl_uses_default_entry() {
        let mut graph = Graph::default();
        graph.add("lonely", None, true, vec![]);

        let acl = evaluator().effective_acl(&graph, &ObjectId::new("lonely")).unwrap();
        assert_eq!(acl.aces(), &[Ace::new(principal_ids::ANYONE, Permission::All)]);
    }

    #[test]
    fn test_cycle_is_internal_error() {
        let mut graph = Graph::default();
        graph.add("a", Some("b"), true, vec![]);
        graph.add("b", Some("a"), true, vec![]);

        let err = evaluator().effective_acl(&graph, &ObjectId::new("a")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_missing_object() {
        let err = evaluator()
            .effective_acl(&Graph::default(), &ObjectId::new("ghost"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_anyone_and_admin() {
        let eval = evaluator();
        let acl = Acl::from_aces(vec![
            Ace::new(principal_ids::ANYONE, Permission::Read),
            Ace::new("carol", Permission::Write),
        ]);
        let carol = PrincipalId::new("carol");
        let dave = PrincipalId::new("dave");
        let admin = PrincipalId::new(principal_ids::ADMIN);

        assert_eq!(eval.permission_of(&carol, &acl), Permission::Write);
        assert_eq!(eval.permission_of(&dave, &acl), Permission::Read);
        assert!(eval.check(&dave, &acl, Action::GetPropertiesObject).is_ok());
        assert!(eval.check(&dave, &acl, Action::DeleteObject).is_err());
        assert!(eval.check(&admin, &Acl::new(), Action::ApplyAclObject).is_ok());
    }

    #[test]
    fn test_decide_names_held_and_required_levels() {
        let eval = evaluator();
        let acl = Acl::from_aces(vec![Ace::new("dave", Permission::Read)]);
        let dave = PrincipalId::new("dave");

        assert_eq!(
            eval.decide(&dave, &acl, Action::GetPropertiesObject),
            AccessDecision::Allow
        );
        assert_eq!(
            eval.decide(&dave, &acl, Action::DeleteObject),
            AccessDecision::Deny(
                "'dave' holds cmis:read but canDelete.Object requires cmis:write".to_string()
            )
        );
    }

    #[test]
    fn test_allowable_actions() {
        let eval = evaluator();
        let acl = Acl::from_aces(vec![Ace::new("erin", Permission::Write)]);
        let actions = eval.allowable_actions(&PrincipalId::new("erin"), &acl, &Action::ALL);
        assert!(actions.contains(&Action::CheckoutDocument));
        assert!(actions.contains(&Action::GetChildrenFolder));
        assert!(!actions.contains(&Action::ApplyAclObject));
    }
}
