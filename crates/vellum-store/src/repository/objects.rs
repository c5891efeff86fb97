//! Object creation, reads, updates and deletion

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use std::collections::BTreeSet;

use vellum_authorization::{Acl, Action};
use vellum_core::{
    property_ids as ids, ConstraintViolation, InvalidArgument, NotFound, ObjectId, PrincipalId,
    Result, TypeId, VellumError,
};
use vellum_types::{
    validate_object_name, validate_property_set, BagValue, BaseType, ContentStreamAllowed,
    Property, PropertyBag, PropertySet, PropertyValue, RawProperty, TypeDefinition, Updatability,
};

use super::{
    expand_aces, secondary_ids_in, strip_maintained, BulkUpdate, CreateObject, ObjectData,
    ReadOptions, Repository,
};
use crate::content::ContentStream;
use crate::object::{AuditInfo, ObjectKind, ObjectRecord, ObjectTable, StoredObject};
use crate::versioning::{DocumentVersion, VersionContent, VersionSeries, VersioningState};

fn raw(id: &str, value: PropertyValue) -> RawProperty {
    RawProperty::new(id, vec![value])
}

fn datetime(value: &DateTime<Utc>) -> PropertyValue {
    PropertyValue::DateTime(*value)
}

/// Version addressed by `id`; the series id falls back to the latest version
pub(super) fn resolve_version<'s>(
    series: &'s VersionSeries,
    id: &ObjectId,
) -> Result<&'s DocumentVersion> {
    if let Some(version) = series.version(id) {
        return Ok(version);
    }
    if id == series.id() {
        if let Some(version) = series.latest_version(false).or_else(|| series.pwc()) {
            return Ok(version);
        }
    }
    Err(VellumError::not_found(NotFound::VersionNotFound {
        series: series.id().to_string(),
        version: id.to_string(),
    }))
}

/// Display name of a stored object
pub(super) fn object_name(object: &StoredObject) -> String {
    match &object.kind {
        ObjectKind::Document(series) => series.lock().name().to_string(),
        ObjectKind::Folder(record)
        | ObjectKind::Policy(record)
        | ObjectKind::Relationship(record)
        | ObjectKind::Item(record) => record
            .properties
            .text(ids::NAME)
            .unwrap_or_default()
            .to_string(),
    }
}

/// Fail when `folder` already holds another object called `name`
pub(super) fn ensure_unique_name(
    table: &ObjectTable,
    folder: &ObjectId,
    name: &str,
    except: Option<&ObjectId>,
) -> Result<()> {
    for child in table.children(folder) {
        if Some(&child.id) == except {
            continue;
        }
        if object_name(child) == name {
            return Err(VellumError::constraint_message(format!(
                "an object named '{name}' already exists in folder '{folder}'"
            )));
        }
    }
    Ok(())
}

fn folder_path(table: &ObjectTable, id: &ObjectId) -> Result<String> {
    let mut segments = Vec::new();
    let mut current = table.get(id)?;
    while let Some(parent) = &current.parent {
        if segments.len() > table.len() {
            return Err(VellumError::internal(format!(
                "folder ancestry of '{id}' contains a cycle"
            )));
        }
        segments.push(object_name(current));
        current = table.get(parent)?;
    }
    segments.reverse();
    Ok(format!("/{}", segments.join("/")))
}

fn audit_properties(out: &mut Vec<RawProperty>, audit: &AuditInfo) {
    out.push(raw(ids::CREATED_BY, PropertyValue::String(audit.created_by.to_string())));
    out.push(raw(ids::CREATION_DATE, datetime(&audit.creation_date)));
    out.push(raw(
        ids::LAST_MODIFIED_BY,
        PropertyValue::String(audit.last_modified_by.to_string()),
    ));
    out.push(raw(ids::LAST_MODIFICATION_DATE, datetime(&audit.last_modification_date)));
    out.push(raw(ids::CHANGE_TOKEN, PropertyValue::String(audit.change_token.to_string())));
}

fn identity_properties(
    out: &mut Vec<RawProperty>,
    object_id: &ObjectId,
    object: &StoredObject,
    secondary_type_ids: &[TypeId],
) {
    out.push(raw(ids::OBJECT_ID, PropertyValue::Id(object_id.to_string())));
    out.push(raw(
        ids::BASE_TYPE_ID,
        PropertyValue::Id(object.base_type().type_id().to_string()),
    ));
    out.push(raw(ids::OBJECT_TYPE_ID, PropertyValue::Id(object.type_id.to_string())));
    if !secondary_type_ids.is_empty() {
        out.push(RawProperty::new(
            ids::SECONDARY_OBJECT_TYPE_IDS,
            secondary_type_ids
                .iter()
                .map(|id| PropertyValue::Id(id.to_string()))
                .collect(),
        ));
    }
}

fn version_properties(out: &mut Vec<RawProperty>, series: &VersionSeries, version: &DocumentVersion) {
    let is = |candidate: Option<&DocumentVersion>| candidate.is_some_and(|c| c.id == version.id);

    out.push(raw(ids::IS_IMMUTABLE, PropertyValue::Boolean(false)));
    out.push(raw(
        ids::IS_LATEST_VERSION,
        PropertyValue::Boolean(is(series.latest_version(false))),
    ));
    out.push(raw(ids::IS_MAJOR_VERSION, PropertyValue::Boolean(version.is_major)));
    out.push(raw(
        ids::IS_LATEST_MAJOR_VERSION,
        PropertyValue::Boolean(is(series.latest_version(true))),
    ));
    out.push(raw(ids::IS_PRIVATE_WORKING_COPY, PropertyValue::Boolean(version.is_pwc)));
    out.push(raw(ids::VERSION_LABEL, PropertyValue::String(version.label.to_string())));
    out.push(raw(ids::VERSION_SERIES_ID, PropertyValue::Id(series.id().to_string())));
    out.push(raw(
        ids::IS_VERSION_SERIES_CHECKED_OUT,
        PropertyValue::Boolean(series.is_checked_out()),
    ));
    if let (Some(owner), Some(pwc)) = (series.checked_out_by(), series.pwc()) {
        out.push(raw(
            ids::VERSION_SERIES_CHECKED_OUT_BY,
            PropertyValue::String(owner.to_string()),
        ));
        out.push(raw(
            ids::VERSION_SERIES_CHECKED_OUT_ID,
            PropertyValue::Id(pwc.id.to_string()),
        ));
    }
    if let Some(comment) = &version.comment {
        out.push(raw(ids::CHECKIN_COMMENT, PropertyValue::String(comment.clone())));
    }
    if let Some(content) = &version.payload.content {
        out.push(raw(
            ids::CONTENT_STREAM_LENGTH,
            PropertyValue::Integer(BigInt::from(content.length())),
        ));
        out.push(raw(
            ids::CONTENT_STREAM_MIME_TYPE,
            PropertyValue::String(content.mime_type().to_string()),
        ));
        out.push(raw(
            ids::CONTENT_STREAM_FILE_NAME,
            PropertyValue::String(content.filename().to_string()),
        ));
        out.push(raw(
            ids::CONTENT_STREAM_ID,
            PropertyValue::Id(format!("{}-content", version.id)),
        ));
    }
}

fn stored_properties(properties: &PropertySet) -> Vec<RawProperty> {
    properties
        .iter()
        .map(|p| RawProperty::new(p.id().clone(), p.values().to_vec()))
        .collect()
}

/// Check that `content` fits the type and the configured limit
pub(super) fn check_content(
    object_type: &TypeDefinition,
    content: Option<&ContentStream>,
    limit: u64,
    on_create: bool,
) -> Result<()> {
    match (object_type.content_stream_allowed, content) {
        (ContentStreamAllowed::NotAllowed, Some(_)) => Err(VellumError::constraint_message(
            format!("type '{}' does not allow content", object_type.id),
        )),
        (ContentStreamAllowed::Required, None) if on_create => Err(
            VellumError::constraint_message(format!("type '{}' requires content", object_type.id)),
        ),
        (_, Some(stream)) => stream.ensure_within(limit),
        _ => Ok(()),
    }
}

/// Secondary types have no instances; other types must be creatable
fn ensure_instantiable(object_type: &TypeDefinition) -> Result<()> {
    if object_type.base_type == BaseType::Secondary {
        return Err(VellumError::invalid(InvalidArgument::NotInstantiable {
            base_type: object_type.base_type.type_id().to_string(),
        }));
    }
    if !object_type.creatable {
        return Err(VellumError::constraint_message(format!(
            "type '{}' is not creatable",
            object_type.id
        )));
    }
    Ok(())
}

/// Check that every id names a policy
pub(super) fn check_policies(table: &ObjectTable, policy_ids: &[ObjectId]) -> Result<()> {
    for policy_id in policy_ids {
        let policy = table.get(policy_id)?;
        if policy.base_type() != BaseType::Policy {
            return Err(VellumError::invalid_message(format!(
                "'{policy_id}' is not a policy"
            )));
        }
    }
    Ok(())
}

/// Require a set name to be a legal object name
pub(super) fn check_name(properties: &PropertySet) -> Result<Option<String>> {
    let Some(property) = properties.get(ids::NAME) else {
        return Ok(None);
    };
    let Some(name) = property.first_value().and_then(PropertyValue::as_str) else {
        return Err(VellumError::constraint(
            ConstraintViolation::RequiredPropertyMissing {
                property: ids::NAME.to_string(),
            },
        ));
    };
    validate_object_name(name)?;
    Ok(Some(name.to_string()))
}

/// Drop properties that neither the type nor an attached secondary defines
fn prune_undefined(
    properties: &mut PropertySet,
    object_type: &TypeDefinition,
    secondaries: &[std::sync::Arc<TypeDefinition>],
) {
    let undefined: Vec<String> = properties
        .ids()
        .filter(|id| {
            object_type.property_definition(id.as_str()).is_none()
                && secondaries
                    .iter()
                    .all(|s| s.property_definition(id.as_str()).is_none())
        })
        .map(|id| id.to_string())
        .collect();
    for id in undefined {
        properties.remove(&id);
    }
}

/// Attached secondary types and change token of an object or version
fn secondaries_and_token(table: &ObjectTable, id: &ObjectId) -> Result<(Vec<TypeId>, String)> {
    let object = table.get(id)?;
    match &object.kind {
        ObjectKind::Document(series) => {
            let series = series.lock();
            let version = resolve_version(&series, id)?;
            Ok((
                version.payload.secondary_type_ids.clone(),
                version.change_token.to_string(),
            ))
        }
        ObjectKind::Folder(record)
        | ObjectKind::Policy(record)
        | ObjectKind::Relationship(record)
        | ObjectKind::Item(record) => Ok((
            record.secondary_type_ids.clone(),
            record.audit.change_token.to_string(),
        )),
    }
}

struct TreeDeletion<'a> {
    all_versions: bool,
    continue_on_failure: bool,
    user: &'a PrincipalId,
}

impl Repository {
    /// Create an object and return its id
    ///
    /// Documents return the id of their first version, which is also the id
    /// of the version series.
    pub fn create_object(&self, request: CreateObject, user: &PrincipalId) -> Result<ObjectId> {
        if let Some(type_id) = &request.type_id {
            ensure_instantiable(&*self.resolve_type(type_id.as_str())?)?;
        }
        let mut properties = self.marshaller().marshal(
            &request.properties,
            request.type_id.as_ref().map(TypeId::as_str),
            request.secondary_type_ids.as_deref(),
            Some(Updatability::CREATE),
        )?;

        let type_id = match &request.type_id {
            Some(type_id) => type_id.clone(),
            None => properties
                .text(ids::OBJECT_TYPE_ID)
                .map(TypeId::new)
                .ok_or_else(|| {
                    VellumError::invalid(InvalidArgument::MissingTypeId)
                })?,
        };
        let object_type = self.resolve_type(type_id.as_str())?;
        ensure_instantiable(&object_type)?;

        let secondary_type_ids = request
            .secondary_type_ids
            .clone()
            .or_else(|| secondary_ids_in(&properties))
            .unwrap_or_default();

        if let Some(definition) = object_type.property_definition(ids::OBJECT_TYPE_ID) {
            properties.insert(Property::single(
                definition.clone(),
                PropertyValue::Id(type_id.to_string()),
            )?);
        }
        validate_property_set(&object_type, &properties, true)?;
        let name = check_name(&properties)?.unwrap_or_default();
        strip_maintained(&mut properties);

        check_content(
            &object_type,
            request.content.as_ref(),
            self.config.max_content_length,
            true,
        )?;

        let versioning_state = if object_type.base_type == BaseType::Document {
            match (object_type.versionable, request.versioning_state) {
                (true, None) => VersioningState::Major,
                (true, Some(VersioningState::None)) => {
                    return Err(VellumError::constraint_message(format!(
                        "versionable type '{type_id}' cannot be created without versioning"
                    )))
                }
                (true, Some(state)) => state,
                (false, None | Some(VersioningState::None)) => VersioningState::None,
                (false, Some(_)) => {
                    return Err(VellumError::constraint(ConstraintViolation::NotVersionable {
                        type_id: type_id.to_string(),
                    }))
                }
            }
        } else {
            VersioningState::None
        };

        let (add, remove) = expand_aces(&request.add_aces, &request.remove_aces, user);
        if !(add.is_empty() && remove.is_empty()) && !object_type.controllable_acl {
            return Err(VellumError::constraint_message(format!(
                "type '{type_id}' does not allow ACL control"
            )));
        }
        if !request.policy_ids.is_empty() && !object_type.controllable_policy {
            return Err(VellumError::constraint_message(format!(
                "type '{type_id}' does not allow policies"
            )));
        }

        let mut table = self.state.write();

        // types may have been deleted since they were resolved
        let object_type = self.types.resolve(type_id.as_str())?;
        for secondary in &secondary_type_ids {
            self.types.resolve(secondary.as_str())?;
        }

        let parent = match &request.folder_id {
            Some(folder_id) => {
                if !object_type.fileable {
                    return Err(VellumError::constraint_message(format!(
                        "objects of type '{type_id}' cannot be filed"
                    )));
                }
                let folder = table.get(folder_id)?;
                if folder.base_type() != BaseType::Folder {
                    return Err(VellumError::invalid_message(format!(
                        "'{folder_id}' is not a folder"
                    )));
                }
                let action = match object_type.base_type {
                    BaseType::Folder => Action::CreateFolderFolder,
                    BaseType::Policy => Action::CreatePolicyFolder,
                    _ => Action::CreateDocumentFolder,
                };
                self.authorize(&table, folder_id, user, action)?;
                ensure_unique_name(&table, &folder.id, &name, None)?;
                Some(folder.id.clone())
            }
            None if object_type.base_type == BaseType::Folder => {
                return Err(VellumError::invalid_message(
                    "folders must be created inside a parent folder",
                ))
            }
            None => None,
        };

        if object_type.base_type == BaseType::Relationship {
            for (property, action) in [
                (ids::SOURCE_ID, Action::CreateRelationshipSource),
                (ids::TARGET_ID, Action::CreateRelationshipTarget),
            ] {
                let endpoint = properties.text(property).map(ObjectId::new).ok_or_else(|| {
                    VellumError::constraint(ConstraintViolation::RequiredPropertyMissing {
                        property: property.to_string(),
                    })
                })?;
                self.authorize(&table, &endpoint, user, action)?;
            }
        }

        check_policies(&table, &request.policy_ids)?;

        let id = ObjectId::generate();
        let record = ObjectRecord {
            secondary_type_ids,
            properties,
            audit: AuditInfo::new(user),
        };
        let content = request.content;
        let series_id = id.clone();
        let kind = ObjectKind::for_base(object_type.base_type, record, |record| {
            VersionSeries::create(
                series_id,
                VersionContent {
                    secondary_type_ids: record.secondary_type_ids,
                    properties: record.properties,
                    content,
                },
                versioning_state,
                user,
            )
        })?;

        let acl = Acl::new().apply(&add, &remove);
        table.insert(StoredObject {
            id: id.clone(),
            type_id: object_type.id.clone(),
            parent,
            acl: acl.aces().to_vec(),
            acl_inherited: self.config.inherit_acl_by_default,
            policies: request.policy_ids.into_iter().collect(),
            kind,
        });

        tracing::info!(
            object = %id,
            object_type = %object_type.id,
            base = %object_type.base_type.type_id(),
            user = %user,
            "Created object"
        );
        Ok(id)
    }

    /// Read an object
    pub fn get_object(
        &self,
        id: &ObjectId,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<ObjectData> {
        let table = self.state.read();
        self.object_data(&table, id, options, user)
    }

    pub(super) fn object_data(
        &self,
        table: &ObjectTable,
        id: &ObjectId,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<ObjectData> {
        let acl = self.authorize(table, id, user, Action::GetPropertiesObject)?;
        let object = table.get(id)?;
        let object_type = self.resolve_type(object.type_id.as_str())?;

        let mut raw_properties = Vec::new();
        let mut checkout_state = None;
        let (object_id, secondary_type_ids) = match &object.kind {
            ObjectKind::Document(series) => {
                let series = series.lock();
                let version = resolve_version(&series, id)?;
                raw_properties.extend(stored_properties(&version.payload.properties));
                identity_properties(
                    &mut raw_properties,
                    &version.id,
                    object,
                    &version.payload.secondary_type_ids,
                );
                audit_properties(
                    &mut raw_properties,
                    &AuditInfo {
                        created_by: version.created_by.clone(),
                        creation_date: version.created_at,
                        last_modified_by: version.modified_by.clone(),
                        last_modification_date: version.modified_at,
                        change_token: version.change_token,
                    },
                );
                version_properties(&mut raw_properties, &series, version);
                checkout_state = Some((series.is_checked_out(), version.is_pwc));
                (version.id.clone(), version.payload.secondary_type_ids.clone())
            }
            ObjectKind::Folder(record)
            | ObjectKind::Policy(record)
            | ObjectKind::Relationship(record)
            | ObjectKind::Item(record) => {
                raw_properties.extend(stored_properties(&record.properties));
                identity_properties(
                    &mut raw_properties,
                    &object.id,
                    object,
                    &record.secondary_type_ids,
                );
                audit_properties(&mut raw_properties, &record.audit);
                if object.base_type() == BaseType::Folder {
                    if let Some(parent) = &object.parent {
                        raw_properties.push(raw(ids::PARENT_ID, PropertyValue::Id(parent.to_string())));
                    }
                    raw_properties.push(raw(
                        ids::PATH,
                        PropertyValue::String(folder_path(table, &object.id)?),
                    ));
                }
                (object.id.clone(), record.secondary_type_ids.clone())
            }
        };

        // system properties the protocol version does not define are dropped
        raw_properties.retain(|p| {
            p.id.as_ref().is_some_and(|id| {
                object_type.property_definition(id.as_str()).is_some()
                    || !is_system_property(id.as_str())
            })
        });

        let properties: PropertySet = self
            .marshaller()
            .convert(object.type_id.as_str(), &secondary_type_ids, raw_properties)?
            .into_iter()
            .filter(|property| options.filter.matches(property.definition()))
            .collect();

        let allowable_actions = options.include_allowable_actions.then(|| {
            let mut candidates = object_type.candidate_actions();
            if let Some((checked_out, is_pwc)) = checkout_state {
                candidates.retain(|action| match action {
                    Action::CheckoutDocument => !checked_out,
                    Action::CheckinDocument | Action::CancelCheckoutDocument => is_pwc,
                    _ => true,
                });
            }
            if object.id == self.root_id {
                candidates.retain(|action| {
                    !matches!(
                        action,
                        Action::DeleteObject
                            | Action::DeleteTreeFolder
                            | Action::MoveObject
                            | Action::GetFolderParentObject
                    )
                });
            }
            self.evaluator.allowable_actions(user, &acl, &candidates)
        });

        Ok(ObjectData {
            id: object_id,
            base_type: object.base_type(),
            type_id: object.type_id.clone(),
            properties,
            acl: options.include_acl.then_some(acl),
            allowable_actions,
        })
    }

    /// Content of a document version
    pub fn get_content_stream(&self, id: &ObjectId, user: &PrincipalId) -> Result<ContentStream> {
        let table = self.state.read();
        self.authorize(&table, id, user, Action::ViewContentObject)?;
        let object = table.get(id)?;
        let series = object.kind.series().ok_or_else(|| {
            VellumError::constraint_message(format!("'{id}' is not a document"))
        })?;
        let series = series.lock();
        resolve_version(&series, id)?
            .payload
            .content
            .clone()
            .ok_or_else(|| VellumError::constraint_message(format!("'{id}' has no content")))
    }

    /// Update the writable properties of an object
    ///
    /// On a private working copy, properties updatable when checked out are
    /// writable too. A stale `change_token` fails with `UpdateConflict`.
    pub fn update_properties(
        &self,
        id: &ObjectId,
        bag: &PropertyBag,
        change_token: Option<&str>,
        user: &PrincipalId,
    ) -> Result<ObjectId> {
        let mut table = self.state.write();
        self.apply_update(&mut table, id, bag, change_token, user)
    }

    fn apply_update(
        &self,
        table: &mut ObjectTable,
        id: &ObjectId,
        bag: &PropertyBag,
        change_token: Option<&str>,
        user: &PrincipalId,
    ) -> Result<ObjectId> {
        self.authorize(table, id, user, Action::UpdatePropertiesObject)?;
        let object = table.get(id)?;
        let object_type = self.resolve_type(object.type_id.as_str())?;
        let key = object.id.clone();
        let parent = object.parent.clone();

        let (version_id, current_secondaries, current_token, is_pwc) = match &object.kind {
            ObjectKind::Document(series) => {
                let series = series.lock();
                let version = resolve_version(&series, id)?;
                let is_latest = series
                    .latest_version(false)
                    .is_some_and(|latest| latest.id == version.id);
                if !version.is_pwc && !is_latest {
                    return Err(VellumError::constraint_message(format!(
                        "'{}' is not the latest version",
                        version.id
                    )));
                }
                (
                    Some(version.id.clone()),
                    version.payload.secondary_type_ids.clone(),
                    version.change_token,
                    version.is_pwc,
                )
            }
            ObjectKind::Folder(record)
            | ObjectKind::Policy(record)
            | ObjectKind::Relationship(record)
            | ObjectKind::Item(record) => (
                None,
                record.secondary_type_ids.clone(),
                record.audit.change_token,
                false,
            ),
        };

        if let Some(token) = change_token {
            if token != current_token.to_string() {
                return Err(VellumError::constraint(ConstraintViolation::UpdateConflict {
                    object: id.to_string(),
                }));
            }
        }

        let filter = if is_pwc {
            Updatability::CHECKIN
        } else {
            Updatability::UPDATE
        };
        let explicit_secondaries = if bag.contains_key(ids::SECONDARY_OBJECT_TYPE_IDS) {
            None
        } else {
            Some(current_secondaries.as_slice())
        };
        let mut updates = self.marshaller().marshal(
            bag,
            Some(object.type_id.as_str()),
            explicit_secondaries,
            Some(filter),
        )?;
        validate_property_set(&object_type, &updates, false)?;
        let new_name = check_name(&updates)?;
        let secondaries = secondary_ids_in(&updates).unwrap_or(current_secondaries);
        strip_maintained(&mut updates);

        if let (Some(name), Some(folder)) = (&new_name, &parent) {
            ensure_unique_name(table, folder, name, Some(&key))?;
        }

        let secondary_types = secondaries
            .iter()
            .map(|secondary| self.resolve_type(secondary.as_str()))
            .collect::<Result<Vec<_>>>()?;

        let object = table.get_mut(&key)?;
        let updated = match (&mut object.kind, version_id) {
            (ObjectKind::Document(series), Some(version_id)) => {
                let mut series = series.lock();
                let version = series
                    .version_mut(&version_id)
                    .ok_or_else(|| VellumError::object_not_found(version_id.as_str()))?;
                version.payload.properties.merge(updates);
                prune_undefined(&mut version.payload.properties, &object_type, &secondary_types);
                version.payload.secondary_type_ids = secondaries;
                version.touch(user);
                series.refresh_name();
                version_id
            }
            (kind, _) => {
                let record = kind
                    .record_mut()
                    .ok_or_else(|| VellumError::internal("document without a version"))?;
                record.properties.merge(updates);
                prune_undefined(&mut record.properties, &object_type, &secondary_types);
                record.secondary_type_ids = secondaries;
                record.audit.touch(user);
                key
            }
        };

        tracing::debug!(object = %updated, user = %user, "Updated properties");
        Ok(updated)
    }

    /// Delete an object
    ///
    /// For documents, `all_versions` removes the whole series; otherwise only
    /// the addressed version goes and the series is deleted with its last
    /// version.
    pub fn delete_object(&self, id: &ObjectId, all_versions: bool, user: &PrincipalId) -> Result<()> {
        let mut table = self.state.write();
        self.authorize(&table, id, user, Action::DeleteObject)?;
        self.remove_object(&mut table, id, all_versions, user)
    }

    fn remove_object(
        &self,
        table: &mut ObjectTable,
        id: &ObjectId,
        all_versions: bool,
        user: &PrincipalId,
    ) -> Result<()> {
        let object = table.get(id)?;
        let key = object.id.clone();

        if key == self.root_id {
            return Err(VellumError::constraint_message("the root folder cannot be deleted"));
        }
        match &object.kind {
            ObjectKind::Folder(_) => {
                if table.children(&key).next().is_some() {
                    return Err(VellumError::constraint(ConstraintViolation::FolderNotEmpty {
                        folder: key.to_string(),
                    }));
                }
            }
            ObjectKind::Policy(_) => {
                if table.is_policy_applied(&key) {
                    return Err(VellumError::constraint_message(format!(
                        "policy '{key}' is still applied"
                    )));
                }
            }
            ObjectKind::Document(series) if !all_versions => {
                let series = series.clone();
                let mut series = series.lock();
                let version_id = resolve_version(&series, id)?.id.clone();
                let remaining = series.delete_version(&version_id)?;
                drop(series);
                table.unindex_version(&version_id);
                if !remaining {
                    table.remove(&key);
                }
                tracing::info!(object = %key, version = %version_id, user = %user, "Deleted version");
                return Ok(());
            }
            _ => {}
        }

        table.remove(&key);
        tracing::info!(object = %key, user = %user, "Deleted object");
        Ok(())
    }

    /// Move a filed object from `source_folder_id` into `target_folder_id`
    ///
    /// A folder cannot be moved into its own subtree.
    pub fn move_object(
        &self,
        id: &ObjectId,
        source_folder_id: &ObjectId,
        target_folder_id: &ObjectId,
        user: &PrincipalId,
    ) -> Result<ObjectId> {
        let mut table = self.state.write();
        self.authorize(&table, id, user, Action::MoveObject)?;
        self.authorize(&table, source_folder_id, user, Action::MoveSource)?;
        self.authorize(&table, target_folder_id, user, Action::MoveTarget)?;

        let object = table.get(id)?;
        let key = object.id.clone();
        if key == self.root_id {
            return Err(VellumError::constraint_message("the root folder cannot be moved"));
        }
        let source = table.get(source_folder_id)?.id.clone();
        if object.parent.as_ref() != Some(&source) {
            return Err(VellumError::invalid_message(format!(
                "'{id}' is not filed in '{source_folder_id}'"
            )));
        }
        let target = table.get(target_folder_id)?;
        if target.base_type() != BaseType::Folder {
            return Err(VellumError::invalid_message(format!(
                "'{target_folder_id}' is not a folder"
            )));
        }
        let target = target.id.clone();

        if object.base_type() == BaseType::Folder {
            let mut ancestor = Some(target.clone());
            let mut steps = 0;
            while let Some(current) = ancestor {
                if current == key {
                    return Err(VellumError::constraint_message(format!(
                        "folder '{key}' cannot be moved into its own subtree"
                    )));
                }
                steps += 1;
                if steps > table.len() {
                    return Err(VellumError::internal(format!(
                        "folder ancestry of '{target}' contains a cycle"
                    )));
                }
                ancestor = table.get(&current)?.parent.clone();
            }
        }
        ensure_unique_name(&table, &target, &object_name(object), Some(&key))?;

        table.get_mut(&key)?.parent = Some(target.clone());
        tracing::info!(object = %key, source = %source, target = %target, user = %user, "Moved object");
        Ok(id.clone())
    }

    /// Delete a folder and everything filed below it
    ///
    /// Children go before their folder, each level in name order. Returns the
    /// ids that could not be deleted. Unless `continue_on_failure` is set the
    /// walk stops at the first failure.
    pub fn delete_tree(
        &self,
        folder_id: &ObjectId,
        all_versions: bool,
        continue_on_failure: bool,
        user: &PrincipalId,
    ) -> Result<Vec<ObjectId>> {
        let mut table = self.state.write();
        self.authorize(&table, folder_id, user, Action::DeleteTreeFolder)?;
        let folder = table.get(folder_id)?;
        if folder.base_type() != BaseType::Folder {
            return Err(VellumError::invalid_message(format!("'{folder_id}' is not a folder")));
        }
        let key = folder.id.clone();
        if key == self.root_id {
            return Err(VellumError::constraint_message("the root folder cannot be deleted"));
        }

        let mut failed = Vec::new();
        let walk = TreeDeletion {
            all_versions,
            continue_on_failure,
            user,
        };
        self.delete_subtree(&mut table, &key, &walk, &mut failed);
        tracing::info!(folder = %key, failed = failed.len(), user = %user, "Deleted folder tree");
        Ok(failed)
    }

    /// Returns false once the walk has to stop
    fn delete_subtree(
        &self,
        table: &mut ObjectTable,
        folder: &ObjectId,
        walk: &TreeDeletion<'_>,
        failed: &mut Vec<ObjectId>,
    ) -> bool {
        let mut children: Vec<(String, ObjectId, bool)> = table
            .children(folder)
            .map(|child| {
                (
                    object_name(child),
                    child.id.clone(),
                    child.base_type() == BaseType::Folder,
                )
            })
            .collect();
        children.sort();

        for (_, child, is_folder) in children {
            let done = if is_folder {
                self.delete_subtree(table, &child, walk, failed)
            } else {
                self.delete_tree_entry(table, &child, walk, failed)
            };
            if !done && !walk.continue_on_failure {
                return false;
            }
        }
        self.delete_tree_entry(table, folder, walk, failed)
    }

    fn delete_tree_entry(
        &self,
        table: &mut ObjectTable,
        id: &ObjectId,
        walk: &TreeDeletion<'_>,
        failed: &mut Vec<ObjectId>,
    ) -> bool {
        let outcome = self
            .authorize(table, id, walk.user, Action::DeleteObject)
            .and_then(|_| self.remove_object(table, id, walk.all_versions, walk.user));
        match outcome {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(object = %id, error = %err, "Could not delete tree entry");
                failed.push(id.clone());
                false
            }
        }
    }

    /// Set the content of a document
    ///
    /// A private working copy or a document of a non-versionable type changes
    /// in place. Otherwise the content goes into a new minor version, whose id
    /// is returned. Existing content is replaced only with `overwrite`.
    pub fn set_content_stream(
        &self,
        id: &ObjectId,
        content: ContentStream,
        overwrite: bool,
        change_token: Option<&str>,
        user: &PrincipalId,
    ) -> Result<ObjectId> {
        self.replace_content(
            id,
            Some(content),
            overwrite,
            change_token,
            user,
            Action::SetContentDocument,
        )
    }

    /// Remove the content of a document
    ///
    /// Versioning follows [`Repository::set_content_stream`]. A document
    /// without content is left as it is.
    pub fn delete_content_stream(
        &self,
        id: &ObjectId,
        change_token: Option<&str>,
        user: &PrincipalId,
    ) -> Result<ObjectId> {
        self.replace_content(id, None, true, change_token, user, Action::DeleteContentDocument)
    }

    fn replace_content(
        &self,
        id: &ObjectId,
        content: Option<ContentStream>,
        overwrite: bool,
        change_token: Option<&str>,
        user: &PrincipalId,
        action: Action,
    ) -> Result<ObjectId> {
        let mut table = self.state.write();
        self.authorize(&table, id, user, action)?;
        let object = table.get(id)?;
        let key = object.id.clone();
        let object_type = self.resolve_type(object.type_id.as_str())?;
        let series = object.kind.series().cloned().ok_or_else(|| {
            VellumError::constraint_message(format!("'{id}' is not a document"))
        })?;
        // a type requiring content never loses it
        check_content(
            &object_type,
            content.as_ref(),
            self.config.max_content_length,
            true,
        )?;

        let mut series = series.lock();
        let (version_id, is_pwc, has_content, current_token) = {
            let version = resolve_version(&series, id)?;
            (
                version.id.clone(),
                version.is_pwc,
                version.payload.content.is_some(),
                version.change_token,
            )
        };
        let is_latest = series
            .latest_version(false)
            .is_some_and(|latest| latest.id == version_id);
        if !is_pwc && !is_latest && !self.evaluator.is_admin(user) {
            return Err(VellumError::constraint_message(format!(
                "'{version_id}' is not the latest version"
            )));
        }
        if let Some(token) = change_token {
            if token != current_token.to_string() {
                return Err(VellumError::constraint(ConstraintViolation::UpdateConflict {
                    object: id.to_string(),
                }));
            }
        }
        match (&content, has_content) {
            (Some(_), true) if !overwrite => {
                return Err(VellumError::constraint_message(format!(
                    "'{version_id}' already has content"
                )))
            }
            (None, false) => return Ok(version_id),
            _ => {}
        }

        let updated = if is_pwc || !object_type.versionable {
            let version = series
                .version_mut(&version_id)
                .ok_or_else(|| VellumError::object_not_found(version_id.as_str()))?;
            version.payload.content = content;
            version.touch(user);
            version_id
        } else {
            let mut payload = resolve_version(&series, &version_id)?.payload.clone();
            payload.content = content;
            series
                .add_version(ObjectId::generate(), payload, VersioningState::Minor, user)?
                .id
                .clone()
        };
        drop(series);
        table.index_version(updated.clone(), key.clone());

        tracing::info!(object = %key, version = %updated, user = %user, "Replaced content");
        Ok(updated)
    }

    /// Apply the same property update to several objects
    ///
    /// `targets` pairs each object with an optional change token. Types in
    /// `add_secondary` are attached and those in `remove_secondary` detached.
    /// Objects whose update fails are left out of the result.
    pub fn bulk_update_properties(
        &self,
        targets: &[(ObjectId, Option<String>)],
        bag: &PropertyBag,
        add_secondary: &[TypeId],
        remove_secondary: &[TypeId],
        user: &PrincipalId,
    ) -> Result<Vec<BulkUpdate>> {
        if targets.is_empty() {
            return Err(VellumError::invalid_message("no objects to update"));
        }
        for type_id in add_secondary {
            if self.resolve_type(type_id.as_str())?.base_type != BaseType::Secondary {
                return Err(VellumError::invalid_message(format!(
                    "'{type_id}' is not a secondary type"
                )));
            }
        }

        let mut table = self.state.write();
        let mut updated = Vec::new();
        for (id, change_token) in targets {
            let outcome = self.bulk_update_one(
                &mut table,
                id,
                change_token.as_deref(),
                bag,
                (add_secondary, remove_secondary),
                user,
            );
            match outcome {
                Ok(done) => updated.push(done),
                Err(err) => {
                    tracing::debug!(object = %id, error = %err, "Skipped object in bulk update");
                }
            }
        }
        tracing::info!(
            requested = targets.len(),
            updated = updated.len(),
            user = %user,
            "Bulk updated properties"
        );
        Ok(updated)
    }

    fn bulk_update_one(
        &self,
        table: &mut ObjectTable,
        id: &ObjectId,
        change_token: Option<&str>,
        bag: &PropertyBag,
        (add, remove): (&[TypeId], &[TypeId]),
        user: &PrincipalId,
    ) -> Result<BulkUpdate> {
        let mut bag = bag.clone();
        if !(add.is_empty() && remove.is_empty()) {
            let (mut secondaries, _) = secondaries_and_token(table, id)?;
            secondaries.retain(|secondary| !remove.contains(secondary));
            for secondary in add {
                if !secondaries.contains(secondary) {
                    secondaries.push(secondary.clone());
                }
            }
            bag.insert(
                ids::SECONDARY_OBJECT_TYPE_IDS.to_string(),
                BagValue::from(secondaries.iter().map(TypeId::as_str).collect::<Vec<_>>()),
            );
        }
        let new_id = self.apply_update(table, id, &bag, change_token, user)?;
        let (_, change_token) = secondaries_and_token(table, &new_id)?;
        Ok(BulkUpdate {
            id: id.clone(),
            new_id,
            change_token,
        })
    }

    /// Objects filed in `folder_id`, documents as their latest version
    ///
    /// Children the caller may not read are left out. The result is sorted
    /// by name.
    pub fn get_children(
        &self,
        folder_id: &ObjectId,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<Vec<ObjectData>> {
        let table = self.state.read();
        self.authorize(&table, folder_id, user, Action::GetChildrenFolder)?;
        let folder = table.get(folder_id)?;
        if folder.base_type() != BaseType::Folder {
            return Err(VellumError::invalid_message(format!("'{folder_id}' is not a folder")));
        }
        Ok(self
            .readable_children(&table, &folder.id, options, user)?
            .into_iter()
            .map(|(_, data)| data)
            .collect())
    }

    /// Children of `folder` the caller may read, with their table keys,
    /// sorted by name
    pub(super) fn readable_children(
        &self,
        table: &ObjectTable,
        folder: &ObjectId,
        options: &ReadOptions,
        user: &PrincipalId,
    ) -> Result<Vec<(ObjectId, ObjectData)>> {
        let required = self.evaluator.mapping().required(Action::GetPropertiesObject);
        let mut children = Vec::new();
        for child in table.children(folder) {
            let acl = self.evaluator.effective_acl(table, &child.id)?;
            if !self.evaluator.has_access(user, &acl, required) {
                continue;
            }
            let data = self.object_data(table, &child.id, options, user)?;
            children.push((object_name(child), child.id.clone(), data));
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children
            .into_iter()
            .map(|(_, key, data)| (key, data))
            .collect())
    }

    /// Policies applied to an object
    pub fn get_applied_policies(&self, id: &ObjectId, user: &PrincipalId) -> Result<Vec<ObjectId>> {
        let table = self.state.read();
        self.authorize(&table, id, user, Action::GetAppliedPoliciesObject)?;
        Ok(table.get(id)?.policies.iter().cloned().collect())
    }

    /// Apply a policy to an object
    pub fn apply_policy(&self, policy_id: &ObjectId, id: &ObjectId, user: &PrincipalId) -> Result<()> {
        self.change_policy(policy_id, id, user, true)
    }

    /// Remove a policy from an object
    pub fn remove_policy(&self, policy_id: &ObjectId, id: &ObjectId, user: &PrincipalId) -> Result<()> {
        self.change_policy(policy_id, id, user, false)
    }

    fn change_policy(
        &self,
        policy_id: &ObjectId,
        id: &ObjectId,
        user: &PrincipalId,
        apply: bool,
    ) -> Result<()> {
        let mut table = self.state.write();
        let (object_action, policy_action) = if apply {
            (Action::AddPolicyObject, Action::AddPolicyPolicy)
        } else {
            (Action::RemovePolicyObject, Action::RemovePolicyPolicy)
        };
        self.authorize(&table, id, user, object_action)?;
        self.authorize(&table, policy_id, user, policy_action)?;
        check_policies(&table, std::slice::from_ref(policy_id))?;

        let object = table.get(id)?;
        let object_type = self.resolve_type(object.type_id.as_str())?;
        if !object_type.controllable_policy {
            return Err(VellumError::constraint_message(format!(
                "type '{}' does not allow policies",
                object_type.id
            )));
        }

        let object = table.get_mut(id)?;
        let policies: &mut BTreeSet<ObjectId> = &mut object.policies;
        if apply {
            policies.insert(policy_id.clone());
        } else {
            policies.remove(policy_id);
        }
        tracing::debug!(object = %id, policy = %policy_id, apply, "Changed applied policies");
        Ok(())
    }
}

fn is_system_property(id: &str) -> bool {
    id.starts_with("cmis:")
}
