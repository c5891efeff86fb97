//! Type management
//!
//! Type mutation is reserved for the administrator; reads are open.

use std::sync::Arc;

use vellum_core::{ConstraintViolation, PrincipalId, Result, TypeId, VellumError};
use vellum_types::{BaseTypes, TypeDefinition, TypeSource};

use super::Repository;

impl Repository {
    fn require_admin(&self, user: &PrincipalId, operation: &str) -> Result<()> {
        if self.evaluator.is_admin(user) {
            return Ok(());
        }
        tracing::warn!(principal = %user, operation, "Type management denied");
        Err(VellumError::permission_denied(format!(
            "'{user}' may not {operation} types"
        )))
    }

    /// Register a new type
    pub fn create_type(
        &self,
        definition: TypeDefinition,
        user: &PrincipalId,
    ) -> Result<Arc<TypeDefinition>> {
        self.require_admin(user, "create")?;
        self.types.register(definition)
    }

    /// Replace a type with a backward compatible update
    pub fn update_type(
        &self,
        definition: TypeDefinition,
        user: &PrincipalId,
    ) -> Result<Arc<TypeDefinition>> {
        self.require_admin(user, "update")?;
        let updated = self.types.update_type(definition)?;

        let mut refreshed: Vec<TypeId> = vec![updated.id.clone()];
        refreshed.extend(
            self.types
                .descendants(updated.id.as_str(), None)?
                .iter()
                .map(|t| t.id.clone()),
        );
        let refreshed: Vec<&str> = refreshed.iter().map(TypeId::as_str).collect();
        self.type_cache.reload(&refreshed);
        Ok(updated)
    }

    /// Delete a type that has neither subtypes nor instances
    pub fn delete_type(&self, type_id: &str, user: &PrincipalId) -> Result<()> {
        self.require_admin(user, "delete")?;
        // held until the cache is reloaded so no create can slip in
        let table = self.state.write();
        if table.has_instances(type_id) {
            return Err(VellumError::constraint(ConstraintViolation::TypeInUse {
                type_id: type_id.to_string(),
                message: "objects of this type exist".to_string(),
            }));
        }
        self.types.delete_type(type_id)?;
        self.type_cache.reload(&[type_id]);
        drop(table);
        tracing::info!(type_id, user = %user, "Deleted type");
        Ok(())
    }

    /// Definition of a type
    pub fn get_type(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        self.types.resolve(type_id)
    }

    /// Direct subtypes of `type_id`, or the base types when absent
    pub fn get_type_children(&self, type_id: Option<&str>) -> Result<Vec<Arc<TypeDefinition>>> {
        match type_id {
            Some(type_id) => self.types.children(type_id),
            None => BaseTypes::available(self.types.protocol_version())
                .into_iter()
                .map(|base| self.types.resolve(base.type_id()))
                .collect(),
        }
    }

    /// Subtypes of `type_id` down to `depth` levels
    pub fn get_type_descendants(
        &self,
        type_id: &str,
        depth: Option<usize>,
    ) -> Result<Vec<Arc<TypeDefinition>>> {
        self.types.descendants(type_id, depth)
    }
}
