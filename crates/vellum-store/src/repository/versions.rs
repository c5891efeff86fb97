//! Checkout, checkin and version history

use std::sync::Arc;

use vellum_authorization::{Ace, Acl, Action};
use vellum_core::{
    property_ids as ids, ConstraintViolation, NotFound, ObjectId, PrincipalId, Result,
    VellumError,
};
use vellum_types::{validate_property_set, BaseType, PropertyBag, TypeDefinition, Updatability};

use super::objects::{
    check_content, check_name, check_policies, ensure_unique_name, resolve_version,
};
use super::{expand_aces, secondary_ids_in, strip_maintained, ObjectData, ReadOptions, Repository};
use crate::content::ContentStream;
use crate::object::ObjectTable;
use crate::versioning::CheckInChanges;

/// Inbound checkin call
#[derive(Debug, Clone, Default)]
pub struct CheckIn {
    /// Major version flag; major when absent
    pub major: Option<bool>,
    /// Property updates, restricted to read-write and when-checked-out
    pub properties: Option<PropertyBag>,
    /// Replacement content
    pub content: Option<ContentStream>,
    /// Checkin comment
    pub comment: Option<String>,
    /// Policies to apply to the document
    pub policy_ids: Vec<ObjectId>,
    /// Entries to add to the direct ACL
    pub add_aces: Vec<Ace>,
    /// Entries to remove from the direct ACL
    pub remove_aces: Vec<Ace>,
}

impl CheckIn {
    /// Major checkin with a comment
    pub fn major(comment: impl Into<String>) -> Self {
        Self {
            major: Some(true),
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Minor checkin with a comment
    pub fn minor(comment: impl Into<String>) -> Self {
        Self {
            major: Some(false),
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Update properties on checkin
    pub fn with_properties(mut self, properties: PropertyBag) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Replace content on checkin
    pub fn with_content(mut self, content: ContentStream) -> Self {
        self.content = Some(content);
        self
    }
}

impl Repository {
    fn versionable_type(&self, table: &ObjectTable, id: &ObjectId) -> Result<Arc<TypeDefinition>> {
        let object = table.get(id)?;
        let object_type = self.resolve_type(object.type_id.as_str())?;
        if object_type.base_type != BaseType::Document || !object_type.versionable {
            return Err(VellumError::constraint(ConstraintViolation::NotVersionable {
                type_id: object_type.id.to_string(),
            }));
        }
        Ok(object_type)
    }

    /// Check out the series of `id` and return the id of the private working copy
    pub fn check_out(&self, id: &ObjectId, user: &PrincipalId) -> Result<ObjectId> {
        let mut table = self.state.write();
        self.versionable_type(&table, id)?;
        self.authorize(&table, id, user, Action::CheckoutDocument)?;

        let object = table.get(id)?;
        let key = object.id.clone();
        let series = object
            .kind
            .series()
            .cloned()
            .ok_or_else(|| VellumError::internal("versionable object without a series"))?;

        let pwc_id = series.lock().check_out(ObjectId::generate(), user)?;
        table.index_version(pwc_id.clone(), key.clone());

        tracing::info!(series = %key, pwc = %pwc_id, user = %user, "Checked out document");
        Ok(pwc_id)
    }

    /// Commit the private working copy `pwc_id` as a new version
    ///
    /// Returns the id of the new version. Nothing changes when any part of
    /// the request is rejected.
    pub fn check_in(
        &self,
        pwc_id: &ObjectId,
        request: CheckIn,
        user: &PrincipalId,
    ) -> Result<ObjectId> {
        let mut table = self.state.write();
        let object_type = self.versionable_type(&table, pwc_id)?;
        self.authorize(&table, pwc_id, user, Action::CheckinDocument)?;

        let object = table.get(pwc_id)?;
        let key = object.id.clone();
        let parent = object.parent.clone();
        let series = object
            .kind
            .series()
            .cloned()
            .ok_or_else(|| VellumError::internal("versionable object without a series"))?;

        let current_secondaries = {
            let series = series.lock();
            series.verify_check_in(pwc_id, user)?;
            resolve_version(&series, pwc_id)?
                .payload
                .secondary_type_ids
                .clone()
        };

        let (properties, secondary_type_ids) = match &request.properties {
            Some(bag) => {
                let explicit = if bag.contains_key(ids::SECONDARY_OBJECT_TYPE_IDS) {
                    None
                } else {
                    Some(current_secondaries.as_slice())
                };
                let mut updates = self.marshaller().marshal(
                    bag,
                    Some(object_type.id.as_str()),
                    explicit,
                    Some(Updatability::CHECKIN),
                )?;
                validate_property_set(&object_type, &updates, false)?;
                if let (Some(name), Some(folder)) = (check_name(&updates)?, &parent) {
                    ensure_unique_name(&table, folder, &name, Some(&key))?;
                }
                let secondaries = secondary_ids_in(&updates);
                strip_maintained(&mut updates);
                (Some(updates), secondaries)
            }
            None => (None, None),
        };

        check_content(
            &object_type,
            request.content.as_ref(),
            self.config.max_content_length,
            false,
        )?;
        check_policies(&table, &request.policy_ids)?;
        let (add, remove) = expand_aces(&request.add_aces, &request.remove_aces, user);
        let acl_change = !(add.is_empty() && remove.is_empty());
        if acl_change && !object_type.controllable_acl {
            return Err(VellumError::constraint_message(format!(
                "type '{}' does not allow ACL control",
                object_type.id
            )));
        }

        let is_major = request.major.unwrap_or(true);
        let version_id = series
            .lock()
            .check_in(
                pwc_id,
                user,
                CheckInChanges {
                    is_major,
                    properties,
                    secondary_type_ids,
                    content: request.content,
                    comment: request.comment,
                },
            )?
            .id
            .clone();

        let object = table.get_mut(&key)?;
        object.policies.extend(request.policy_ids);
        if acl_change {
            object.acl = Acl::from_aces(object.acl.clone())
                .apply(&add, &remove)
                .aces()
                .to_vec();
        }

        tracing::info!(
            series = %key,
            version = %version_id,
            major = is_major,
            user = %user,
            "Checked in document"
        );
        Ok(version_id)
    }

    /// Discard the private working copy of the series of `id`
    pub fn cancel_check_out(&self, id: &ObjectId, user: &PrincipalId) -> Result<()> {
        let mut table = self.state.write();
        self.versionable_type(&table, id)?;
        self.authorize(&table, id, user, Action::CancelCheckoutDocument)?;

        let object = table.get(id)?;
        let key = object.id.clone();
        let series = object
            .kind
            .series()
            .cloned()
            .ok_or_else(|| VellumError::internal("versionable object without a series"))?;

        let mut series = series.lock();
        let pwc_id = series.pwc().map(|pwc| pwc.id.clone());
        let remaining = series.cancel_check_out()?;
        drop(series);

        if let Some(pwc_id) = &pwc_id {
            table.unindex_version(pwc_id);
        }
        if !remaining {
            table.remove(&key);
        }
        tracing::info!(series = %key, remaining, user = %user, "Cancelled checkout");
        Ok(())
    }

    /// Remove one version; removing the private working copy cancels the checkout
    pub fn delete_version(&self, version_id: &ObjectId, user: &PrincipalId) -> Result<()> {
        let mut table = self.state.write();
        self.authorize(&table, version_id, user, Action::DeleteObject)?;

        let object = table.get(version_id)?;
        let key = object.id.clone();
        let series = object.kind.series().cloned().ok_or_else(|| {
            VellumError::constraint_message(format!("'{version_id}' is not a document"))
        })?;

        let remaining = series.lock().delete_version(version_id)?;
        table.unindex_version(version_id);
        if !remaining {
            table.remove(&key);
        }
        tracing::info!(
            series = %key,
            version = %version_id,
            remaining,
            user = %user,
            "Deleted version"
        );
        Ok(())
    }

    /// Every version of the series of `id`, latest first
    pub fn get_all_versions(
        &self,
        id: &ObjectId,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<Vec<ObjectData>> {
        let table = self.state.read();
        self.authorize(&table, id, user, Action::GetAllVersionsVersionSeries)?;
        let object = table.get(id)?;
        let version_ids: Vec<ObjectId> = match object.kind.series() {
            Some(series) => series.lock().all_versions().map(|v| v.id.clone()).collect(),
            None => vec![object.id.clone()],
        };
        version_ids
            .iter()
            .map(|version_id| self.object_data(&table, version_id, options, user))
            .collect()
    }

    /// Latest version of a series, or the latest major version with `major`
    pub fn get_object_of_latest_version(
        &self,
        id: &ObjectId,
        major: bool,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<ObjectData> {
        let table = self.state.read();
        let object = table.get(id)?;
        let series = object.kind.series().ok_or_else(|| {
            VellumError::constraint_message(format!("'{id}' is not a document"))
        })?;
        let latest = series
            .lock()
            .latest_version(major)
            .map(|version| version.id.clone())
            .ok_or_else(|| {
                VellumError::not_found(NotFound::VersionNotFound {
                    series: object.id.to_string(),
                    version: if major { "latest major" } else { "latest" }.to_string(),
                })
            })?;
        self.object_data(&table, &latest, options, user)
    }
}
