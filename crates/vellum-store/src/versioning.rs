//! Version Series State Machine
//!
//! A series is an append-ordered list of versions. At most one entry is the
//! private working copy (PWC), and the series is checked out exactly when that
//! entry exists. Operations here are pure state transitions; the repository
//! serializes them with one mutex per series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use vellum_core::{
    ConstraintViolation, NotFound, ObjectId, PrincipalId, Result, TypeId, VellumError,
};
use vellum_types::PropertySet;

use crate::content::ContentStream;

/// Versioning state requested when a document is created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningState {
    /// Not versionable; a single major version
    None,
    /// First version is major (`1.0`)
    #[default]
    Major,
    /// First version is minor (`0.1`)
    Minor,
    /// First version is a private working copy
    CheckedOut,
}

/// Label of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionLabel {
    /// Committed version `major.minor`
    Number {
        /// Major component
        major: u32,
        /// Minor component
        minor: u32,
    },
    /// The private working copy
    WorkingCopy,
}

impl VersionLabel {
    fn next(previous: Option<VersionLabel>, is_major: bool) -> VersionLabel {
        let (major, minor) = match previous {
            Some(VersionLabel::Number { major, minor }) => (major, minor),
            _ => (0, 0),
        };
        if is_major {
            VersionLabel::Number {
                major: major + 1,
                minor: 0,
            }
        } else {
            VersionLabel::Number {
                major,
                minor: minor + 1,
            }
        }
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionLabel::Number { major, minor } => write!(f, "{major}.{minor}"),
            VersionLabel::WorkingCopy => f.write_str("pwc"),
        }
    }
}

/// Mutable payload of a version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionContent {
    /// Attached secondary types, in attach order
    pub secondary_type_ids: Vec<TypeId>,
    /// Caller-visible properties
    pub properties: PropertySet,
    /// Optional content stream
    pub content: Option<ContentStream>,
}

/// One entry of a version series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVersion {
    /// Version id
    pub id: ObjectId,
    /// Properties, secondary types and content
    pub payload: VersionContent,
    /// Major version flag
    pub is_major: bool,
    /// Private working copy flag
    pub is_pwc: bool,
    /// Version label
    pub label: VersionLabel,
    /// Checkin comment
    pub comment: Option<String>,
    /// Creator
    pub created_by: PrincipalId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modifier
    pub modified_by: PrincipalId,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
    /// Incremented on every modification
    pub change_token: u64,
}

impl DocumentVersion {
    fn new(id: ObjectId, payload: VersionContent, label: VersionLabel, user: &PrincipalId) -> Self {
        let now = Utc::now();
        Self {
            id,
            payload,
            is_major: matches!(label, VersionLabel::Number { minor: 0, .. }),
            is_pwc: label == VersionLabel::WorkingCopy,
            label,
            comment: None,
            created_by: user.clone(),
            created_at: now,
            modified_by: user.clone(),
            modified_at: now,
            change_token: 1,
        }
    }

    /// Record a modification
    pub fn touch(&mut self, user: &PrincipalId) {
        self.modified_by = user.clone();
        self.modified_at = Utc::now();
        self.change_token += 1;
    }

    /// Name property of this version
    pub fn name(&self) -> Option<&str> {
        self.payload.properties.text(vellum_core::property_ids::NAME)
    }
}

/// Checkin arguments that survive validation
#[derive(Debug, Clone, Default)]
pub struct CheckInChanges {
    /// Major version flag
    pub is_major: bool,
    /// Marshalled property updates, overlaid on the PWC properties
    pub properties: Option<PropertySet>,
    /// Replacement secondary types
    pub secondary_type_ids: Option<Vec<TypeId>>,
    /// Replacement content
    pub content: Option<ContentStream>,
    /// Checkin comment
    pub comment: Option<String>,
}

/// Ordered history of a versionable document
#[derive(Debug, Clone)]
pub struct VersionSeries {
    id: ObjectId,
    name: String,
    versions: Vec<DocumentVersion>,
    checked_out_by: Option<PrincipalId>,
}

impl VersionSeries {
    /// Create a series from its first version
    ///
    /// The series takes the id of its first version.
    pub fn create(
        first_id: ObjectId,
        payload: VersionContent,
        state: VersioningState,
        user: &PrincipalId,
    ) -> Self {
        let name = payload
            .properties
            .text(vellum_core::property_ids::NAME)
            .unwrap_or_default()
            .to_string();
        let mut series = Self {
            id: first_id.clone(),
            name,
            versions: Vec::new(),
            checked_out_by: None,
        };
        let label = match state {
            VersioningState::None | VersioningState::Major => VersionLabel::next(None, true),
            VersioningState::Minor => VersionLabel::next(None, false),
            VersioningState::CheckedOut => {
                series.checked_out_by = Some(user.clone());
                VersionLabel::WorkingCopy
            }
        };
        series
            .versions
            .push(DocumentVersion::new(first_id, payload, label, user));
        series
    }

    /// Series id
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Display name of the document
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Versions in append order (oldest first)
    pub fn versions(&self) -> &[DocumentVersion] {
        &self.versions
    }

    /// Versions latest first, including the PWC
    pub fn all_versions(&self) -> impl Iterator<Item = &DocumentVersion> {
        self.versions.iter().rev()
    }

    /// Number of versions
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether the series has no versions left
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Whether a PWC exists
    pub fn is_checked_out(&self) -> bool {
        self.checked_out_by.is_some()
    }

    /// Principal holding the checkout
    pub fn checked_out_by(&self) -> Option<&PrincipalId> {
        self.checked_out_by.as_ref()
    }

    /// The private working copy, if any
    pub fn pwc(&self) -> Option<&DocumentVersion> {
        self.versions.iter().find(|v| v.is_pwc)
    }

    /// Look up a version by id
    pub fn version(&self, id: &ObjectId) -> Option<&DocumentVersion> {
        self.versions.iter().find(|v| v.id == *id)
    }

    /// Mutable access to a version by id
    pub fn version_mut(&mut self, id: &ObjectId) -> Option<&mut DocumentVersion> {
        self.versions.iter_mut().find(|v| v.id == *id)
    }

    /// Latest version
    ///
    /// With `major`, the last appended major version that is not the PWC.
    /// Without, the last entry, skipping a trailing PWC; `None` when the PWC
    /// is the only entry.
    pub fn latest_version(&self, major: bool) -> Option<&DocumentVersion> {
        if major {
            let mut latest = None;
            for version in &self.versions {
                if version.is_major && !version.is_pwc {
                    latest = Some(version);
                }
            }
            return latest;
        }

        if !self.is_checked_out() {
            return self.versions.last();
        }
        if self.versions.len() > 1 {
            self.versions.get(self.versions.len() - 2)
        } else {
            None
        }
    }

    fn last_committed_label(&self) -> Option<VersionLabel> {
        self.versions
            .iter()
            .rev()
            .find(|v| !v.is_pwc)
            .map(|v| v.label)
    }

    /// Append a version
    ///
    /// `CheckedOut` appends a PWC owned by `user`; any other state appends a
    /// committed version with the next label.
    pub fn add_version(
        &mut self,
        id: ObjectId,
        payload: VersionContent,
        state: VersioningState,
        user: &PrincipalId,
    ) -> Result<&DocumentVersion> {
        if self.is_checked_out() {
            return Err(VellumError::constraint(
                ConstraintViolation::CheckedOutConstraintViolation {
                    series: self.id.to_string(),
                },
            ));
        }
        let label = match state {
            VersioningState::CheckedOut => {
                self.checked_out_by = Some(user.clone());
                VersionLabel::WorkingCopy
            }
            VersioningState::Minor => VersionLabel::next(self.last_committed_label(), false),
            VersioningState::None | VersioningState::Major => {
                VersionLabel::next(self.last_committed_label(), true)
            }
        };
        self.versions
            .push(DocumentVersion::new(id, payload, label, user));
        let index = self.versions.len() - 1;
        Ok(&self.versions[index])
    }

    /// Check the series out to `user`
    ///
    /// The PWC starts as a copy of the latest version.
    pub fn check_out(&mut self, pwc_id: ObjectId, user: &PrincipalId) -> Result<ObjectId> {
        if let Some(owner) = &self.checked_out_by {
            tracing::debug!(series = %self.id, owner = %owner, "Series already checked out");
            return Err(VellumError::constraint(ConstraintViolation::AlreadyCheckedOut {
                series: self.id.to_string(),
            }));
        }
        let payload = self
            .latest_version(false)
            .map(|latest| latest.payload.clone())
            .unwrap_or_default();
        let pwc = self.add_version(pwc_id, payload, VersioningState::CheckedOut, user)?;
        Ok(pwc.id.clone())
    }

    /// Verify that `user` may check in `pwc_id` without changing anything
    pub fn verify_check_in(&self, pwc_id: &ObjectId, user: &PrincipalId) -> Result<()> {
        let Some(owner) = &self.checked_out_by else {
            return Err(VellumError::constraint(ConstraintViolation::NotCheckedOut {
                series: self.id.to_string(),
            }));
        };
        if owner != user {
            return Err(VellumError::constraint(
                ConstraintViolation::CheckedOutByAnotherUser {
                    series: self.id.to_string(),
                    owner: owner.to_string(),
                    user: user.to_string(),
                },
            ));
        }
        match self.version(pwc_id) {
            None => Err(self.version_not_found(pwc_id)),
            Some(version) if !version.is_pwc => Err(VellumError::constraint(
                ConstraintViolation::NotAPrivateWorkingCopy {
                    object: pwc_id.to_string(),
                },
            )),
            Some(_) => Ok(()),
        }
    }

    /// Commit the PWC as an ordinary version
    ///
    /// Either every change is applied or, on error, none is.
    pub fn check_in(
        &mut self,
        pwc_id: &ObjectId,
        user: &PrincipalId,
        changes: CheckInChanges,
    ) -> Result<&DocumentVersion> {
        self.verify_check_in(pwc_id, user)?;
        let label = VersionLabel::next(self.last_committed_label(), changes.is_major);

        let index = self
            .versions
            .iter()
            .position(|v| v.id == *pwc_id)
            .ok_or_else(|| self.version_not_found(pwc_id))?;
        let version = &mut self.versions[index];
        if let Some(updates) = changes.properties {
            version.payload.properties.merge(updates);
        }
        if let Some(secondary_type_ids) = changes.secondary_type_ids {
            version.payload.secondary_type_ids = secondary_type_ids;
        }
        if let Some(content) = changes.content {
            version.payload.content = Some(content);
        }
        version.comment = changes.comment;
        version.is_major = changes.is_major;
        version.is_pwc = false;
        version.label = label;
        version.touch(user);

        if let Some(name) = version.name() {
            self.name = name.to_string();
        }
        self.checked_out_by = None;
        Ok(&self.versions[index])
    }

    /// Discard the PWC
    ///
    /// Returns whether the series still has versions. The document name is
    /// restored from the new latest version.
    pub fn cancel_check_out(&mut self) -> Result<bool> {
        if !self.is_checked_out() {
            return Err(VellumError::constraint(ConstraintViolation::NotCheckedOut {
                series: self.id.to_string(),
            }));
        }
        self.versions.retain(|v| !v.is_pwc);
        self.checked_out_by = None;
        self.refresh_name();
        Ok(!self.versions.is_empty())
    }

    /// Remove one version
    ///
    /// Removing the PWC cancels the checkout. Returns whether the series still
    /// has versions; the caller deletes an empty series.
    pub fn delete_version(&mut self, id: &ObjectId) -> Result<bool> {
        let index = self
            .versions
            .iter()
            .position(|v| v.id == *id)
            .ok_or_else(|| self.version_not_found(id))?;
        if self.versions[index].is_pwc {
            return self.cancel_check_out();
        }
        self.versions.remove(index);
        self.refresh_name();
        Ok(!self.versions.is_empty())
    }

    /// Re-read the document name from the PWC, or the latest version when
    /// the series is not checked out
    pub fn refresh_name(&mut self) {
        let current = self.pwc().or_else(|| self.latest_version(false));
        if let Some(name) = current.and_then(DocumentVersion::name) {
            self.name = name.to_string();
        }
    }

    fn version_not_found(&self, version: &ObjectId) -> VellumError {
        VellumError::not_found(NotFound::VersionNotFound {
            series: self.id.to_string(),
            version: version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn user(name: &str) -> PrincipalId {
        PrincipalId::new(name)
    }

    fn series(state: VersioningState) -> VersionSeries {
        VersionSeries::create(
            ObjectId::new("v1"),
            VersionContent::default(),
            state,
            &user("alice"),
        )
    }

    #[test]
    fn test_initial_labels() {
        let major = series(VersioningState::Major);
        assert_eq!(major.versions()[0].label.to_string(), "1.0");
        assert!(major.versions()[0].is_major);

        let minor = series(VersioningState::Minor);
        assert_eq!(minor.versions()[0].label.to_string(), "0.1");
        assert!(!minor.versions()[0].is_major);

        let checked_out = series(VersioningState::CheckedOut);
        assert!(checked_out.is_checked_out());
        assert!(checked_out.latest_version(false).is_none());
    }

    #[test]
    fn test_checkout_then_checkin_labels() {
        let mut s = series(VersioningState::Major);
        let alice = user("alice");

        let pwc = s.check_out(ObjectId::new("v2"), &alice).unwrap();
        assert_eq!(s.pwc().unwrap().label, VersionLabel::WorkingCopy);
        s.check_in(
            &pwc,
            &alice,
            CheckInChanges {
                is_major: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(s.latest_version(false).unwrap().label.to_string(), "1.1");

        let pwc = s.check_out(ObjectId::new("v3"), &alice).unwrap();
        s.check_in(
            &pwc,
            &alice,
            CheckInChanges {
                is_major: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(s.latest_version(true).unwrap().label.to_string(), "2.0");
    }

    #[test]
    fn test_add_version_while_checked_out() {
        let mut s = series(VersioningState::Major);
        s.check_out(ObjectId::new("v2"), &user("alice")).unwrap();
        assert_matches!(
            s.add_version(
                ObjectId::new("v3"),
                VersionContent::default(),
                VersioningState::Major,
                &user("alice")
            ),
            Err(VellumError::Constraint {
                reason: ConstraintViolation::CheckedOutConstraintViolation { .. }
            })
        );
    }

    #[test]
    fn test_checkin_requires_pwc_target() {
        let mut s = series(VersioningState::Major);
        let alice = user("alice");
        s.check_out(ObjectId::new("v2"), &alice).unwrap();
        assert_matches!(
            s.check_in(&ObjectId::new("v1"), &alice, CheckInChanges::default()),
            Err(VellumError::Constraint {
                reason: ConstraintViolation::NotAPrivateWorkingCopy { .. }
            })
        );
        assert_matches!(
            s.check_in(&ObjectId::new("nope"), &alice, CheckInChanges::default()),
            Err(VellumError::NotFound {
                reason: NotFound::VersionNotFound { .. }
            })
        );
        assert!(s.is_checked_out());
    }

    #[test]
    fn test_latest_major_is_last_appended() {
        let mut s = series(VersioningState::Major);
        let alice = user("alice");
        for id in ["v2", "v3"] {
            s.add_version(
                ObjectId::new(id),
                VersionContent::default(),
                VersioningState::Major,
                &alice,
            )
            .unwrap();
        }
        assert_eq!(s.latest_version(true).unwrap().id.as_str(), "v3");
    }

    #[test]
    fn test_delete_versions_until_empty() {
        let mut s = series(VersioningState::Major);
        let alice = user("alice");
        s.add_version(
            ObjectId::new("v2"),
            VersionContent::default(),
            VersioningState::Minor,
            &alice,
        )
        .unwrap();

        assert!(s.delete_version(&ObjectId::new("v2")).unwrap());
        assert_matches!(
            s.delete_version(&ObjectId::new("v2")),
            Err(VellumError::NotFound { .. })
        );
        assert!(!s.delete_version(&ObjectId::new("v1")).unwrap());
        assert!(s.is_empty());
    }

    #[test]
    fn test_deleting_pwc_cancels_checkout() {
        let mut s = series(VersioningState::Major);
        s.check_out(ObjectId::new("v2"), &user("alice")).unwrap();
        assert!(s.delete_version(&ObjectId::new("v2")).unwrap());
        assert!(!s.is_checked_out());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_cancel_on_pwc_only_series_empties_it() {
        let mut s = series(VersioningState::CheckedOut);
        assert!(!s.cancel_check_out().unwrap());
        assert!(s.is_empty());
    }

    #[test]
    fn test_all_versions_latest_first() {
        let mut s = series(VersioningState::Major);
        s.check_out(ObjectId::new("v2"), &user("alice")).unwrap();
        let ids: Vec<_> = s.all_versions().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v2", "v1"]);
    }
}
