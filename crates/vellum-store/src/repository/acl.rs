//! ACL query and apply

use vellum_authorization::{Ace, Acl, Action};
use vellum_core::{ObjectId, PrincipalId, Result, VellumError};

use super::{expand_aces, Repository};

impl Repository {
    /// Effective ACL of an object
    pub fn get_acl(&self, id: &ObjectId, user: &PrincipalId) -> Result<Acl> {
        let table = self.state.read();
        self.authorize(&table, id, user, Action::GetAclObject)
    }

    /// Add and remove direct entries, returning the new effective ACL
    ///
    /// The `cmis:user` macro names the caller. Removing an entry that is not
    /// present is not an error. Inherited entries are never touched.
    pub fn apply_acl(
        &self,
        id: &ObjectId,
        add: &[Ace],
        remove: &[Ace],
        user: &PrincipalId,
    ) -> Result<Acl> {
        let mut table = self.state.write();
        self.authorize(&table, id, user, Action::ApplyAclObject)?;

        let object = table.get(id)?;
        let object_type = self.resolve_type(object.type_id.as_str())?;
        if !object_type.controllable_acl {
            return Err(VellumError::constraint_message(format!(
                "type '{}' does not allow ACL control",
                object_type.id
            )));
        }
        let key = object.id.clone();

        let (add, remove) = expand_aces(add, remove, user);
        let object = table.get_mut(&key)?;
        let direct = Acl::from_aces(object.acl.clone()).apply(&add, &remove);
        object.acl = direct.aces().to_vec();

        tracing::debug!(
            object = %key,
            added = add.len(),
            removed = remove.len(),
            user = %user,
            "Applied ACL"
        );
        self.evaluator.effective_acl(&*table, &key)
    }

    /// Stop or resume inheriting entries from the parent folder
    pub fn set_acl_inheritance(
        &self,
        id: &ObjectId,
        inherited: bool,
        user: &PrincipalId,
    ) -> Result<Acl> {
        let mut table = self.state.write();
        self.authorize(&table, id, user, Action::ApplyAclObject)?;
        let key = table.get(id)?.id.clone();
        table.get_mut(&key)?.acl_inherited = inherited;
        self.evaluator.effective_acl(&*table, &key)
    }
}
