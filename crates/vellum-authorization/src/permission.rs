//! Permission levels and access control entries
//!
//! Each ACE grants exactly one permission level to one principal. Levels form a
//! total order, so holding a level implies every level below it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use vellum_core::{principal_ids, InvalidArgument, PrincipalId, VellumError};

/// Permission levels (ordered from least to most permissive)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Permission {
    /// No access
    #[default]
    #[serde(rename = "cmis:none")]
    None,
    /// Read-only access
    #[serde(rename = "cmis:read")]
    Read,
    /// Read and write access
    #[serde(rename = "cmis:write")]
    Write,
    /// Full access, including ACL changes
    #[serde(rename = "cmis:all")]
    All,
}

impl Permission {
    /// Every level, lowest first
    pub const ALL_LEVELS: [Permission; 4] = [
        Permission::None,
        Permission::Read,
        Permission::Write,
        Permission::All,
    ];

    /// Check if this permission level satisfies a required level
    pub fn satisfies(self, required: Permission) -> bool {
        self >= required
    }

    /// Protocol spelling of the level
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::None => "cmis:none",
            Permission::Read => "cmis:read",
            Permission::Write => "cmis:write",
            Permission::All => "cmis:all",
        }
    }
}

/// Whether `held` grants at least `required`
pub fn has_permission(held: Permission, required: Permission) -> bool {
    held.satisfies(required)
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = VellumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cmis:none" => Ok(Permission::None),
            "cmis:read" => Ok(Permission::Read),
            "cmis:write" => Ok(Permission::Write),
            "cmis:all" => Ok(Permission::All),
            other => Err(VellumError::invalid(InvalidArgument::UnknownPermission {
                permission: other.to_string(),
            })),
        }
    }
}

/// Access control entry: one principal, one permission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ace {
    /// Principal the entry applies to
    pub principal: PrincipalId,
    /// Granted permission
    pub permission: Permission,
    /// `true` when set on the object itself, `false` when inherited
    pub is_direct: bool,
}

impl Ace {
    /// Create a direct entry
    pub fn new(principal: impl Into<PrincipalId>, permission: Permission) -> Self {
        Self {
            principal: principal.into(),
            permission,
            is_direct: true,
        }
    }

    /// Copy of this entry tagged as inherited
    pub fn inherited(&self) -> Self {
        Self {
            is_direct: false,
            ..self.clone()
        }
    }

    /// Copy of this entry tagged as direct
    pub fn direct(&self) -> Self {
        Self {
            is_direct: true,
            ..self.clone()
        }
    }

    /// Entries are compared by principal and permission, ignoring origin
    pub fn same_grant(&self, other: &Ace) -> bool {
        self.principal == other.principal && self.permission == other.permission
    }
}

/// Ordered list of access control entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    aces: Vec<Ace>,
}

impl Acl {
    /// Create an empty ACL
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from entries, keeping their order
    pub fn from_aces(aces: Vec<Ace>) -> Self {
        Self { aces }
    }

    /// All entries in order
    pub fn aces(&self) -> &[Ace] {
        &self.aces
    }

    /// Entries set on the object itself
    pub fn direct_aces(&self) -> impl Iterator<Item = &Ace> {
        self.aces.iter().filter(|ace| ace.is_direct)
    }

    /// Entries inherited from ancestors
    pub fn inherited_aces(&self) -> impl Iterator<Item = &Ace> {
        self.aces.iter().filter(|ace| !ace.is_direct)
    }

    /// Whether the list has no entries
    pub fn is_empty(&self) -> bool {
        self.aces.is_empty()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.aces.len()
    }

    /// Append an entry unless an equal grant is already present
    pub fn push(&mut self, ace: Ace) {
        if !self.aces.iter().any(|existing| existing.same_grant(&ace)) {
            self.aces.push(ace);
        }
    }

    /// Apply an add-set and a remove-set to the direct entries
    ///
    /// Inherited entries are dropped from the result; they are recomputed from
    /// the ancestry on every read. Removing an entry that is not present is a
    /// no-op.
    pub fn apply(&self, add: &[Ace], remove: &[Ace]) -> Acl {
        let mut result = Acl::new();
        for ace in self.direct_aces() {
            result.push(ace.clone());
        }
        for ace in add {
            result.push(ace.direct());
        }
        result
            .aces
            .retain(|ace| !remove.iter().any(|removed| removed.same_grant(ace)));
        result
    }

    /// Replace the `cmis:user` macro with the calling principal
    pub fn expand_user_macro(aces: &[Ace], user: &PrincipalId) -> Vec<Ace> {
        aces.iter()
            .map(|ace| {
                if ace.principal.as_str() == principal_ids::CMIS_USER {
                    Ace {
                        principal: user.clone(),
                        ..ace.clone()
                    }
                } else {
                    ace.clone()
                }
            })
            .collect()
    }
}

impl FromIterator<Ace> for Acl {
    fn from_iter<T: IntoIterator<Item = Ace>>(iter: T) -> Self {
        let mut acl = Acl::new();
        for ace in iter {
            acl.push(ace);
        }
        acl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_ordering() {
        assert!(Permission::All > Permission::Write);
        assert!(Permission::Write > Permission::Read);
        assert!(Permission::Read > Permission::None);

        assert!(Permission::All.satisfies(Permission::Read));
        assert!(!Permission::Read.satisfies(Permission::Write));
    }

    #[test]
    fn test_permission_spelling_round_trips() {
        for level in Permission::ALL_LEVELS {
            assert_eq!(level.as_str().parse::<Permission>().unwrap(), level);
        }
        assert!("cmis:admin".parse::<Permission>().is_err());
    }

    #[test]
    fn test_apply_union_and_difference() {
        let acl = Acl::from_aces(vec![
            Ace::new("alice", Permission::All),
            Ace::new("bob", Permission::Read),
            Ace::new("staff", Permission::Read).inherited(),
        ]);

        let updated = acl.apply(
            &[Ace::new("carol", Permission::Write), Ace::new("alice", Permission::All)],
            &[Ace::new("bob", Permission::Read), Ace::new("nobody", Permission::Read)],
        );

        let principals: Vec<_> = updated.aces().iter().map(|a| a.principal.as_str()).collect();
        assert_eq!(principals, vec!["alice", "carol"]);
        assert!(updated.aces().iter().all(|a| a.is_direct));
    }

    #[test]
    fn test_user_macro_expansion() {
        let aces = vec![
            Ace::new(principal_ids::CMIS_USER, Permission::All),
            Ace::new("bob", Permission::Read),
        ];
        let expanded = Acl::expand_user_macro(&aces, &PrincipalId::new("alice"));
        assert_eq!(expanded[0].principal.as_str(), "alice");
        assert_eq!(expanded[1].principal.as_str(), "bob");
    }
}
