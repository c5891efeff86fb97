//! Standard permission mapping
//!
//! Maps every protocol action key to the permission level that must be held on
//! the object the action targets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::permission::Permission;

/// Action keys of the standard permission mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Action {
    GetDescendantsFolder,
    GetChildrenFolder,
    GetParentsFolder,
    GetFolderParentObject,
    CreateDocumentFolder,
    CreateFolderFolder,
    CreatePolicyFolder,
    CreateRelationshipSource,
    CreateRelationshipTarget,
    GetPropertiesObject,
    ViewContentObject,
    UpdatePropertiesObject,
    MoveObject,
    MoveTarget,
    MoveSource,
    DeleteObject,
    DeleteTreeFolder,
    SetContentDocument,
    DeleteContentDocument,
    AddToFolderObject,
    AddToFolderFolder,
    RemoveFromFolderObject,
    RemoveFromFolderFolder,
    CheckoutDocument,
    CancelCheckoutDocument,
    CheckinDocument,
    GetAllVersionsVersionSeries,
    GetObjectRelationshipsObject,
    AddPolicyObject,
    AddPolicyPolicy,
    RemovePolicyObject,
    RemovePolicyPolicy,
    GetAppliedPoliciesObject,
    GetAclObject,
    ApplyAclObject,
}

impl Action {
    /// Every action, in mapping-table order
    pub const ALL: [Action; 35] = [
        Action::GetDescendantsFolder,
        Action::GetChildrenFolder,
        Action::GetParentsFolder,
        Action::GetFolderParentObject,
        Action::CreateDocumentFolder,
        Action::CreateFolderFolder,
        Action::CreatePolicyFolder,
        Action::CreateRelationshipSource,
        Action::CreateRelationshipTarget,
        Action::GetPropertiesObject,
        Action::ViewContentObject,
        Action::UpdatePropertiesObject,
        Action::MoveObject,
        Action::MoveTarget,
        Action::MoveSource,
        Action::DeleteObject,
        Action::DeleteTreeFolder,
        Action::SetContentDocument,
        Action::DeleteContentDocument,
        Action::AddToFolderObject,
        Action::AddToFolderFolder,
        Action::RemoveFromFolderObject,
        Action::RemoveFromFolderFolder,
        Action::CheckoutDocument,
        Action::CancelCheckoutDocument,
        Action::CheckinDocument,
        Action::GetAllVersionsVersionSeries,
        Action::GetObjectRelationshipsObject,
        Action::AddPolicyObject,
        Action::AddPolicyPolicy,
        Action::RemovePolicyObject,
        Action::RemovePolicyPolicy,
        Action::GetAppliedPoliciesObject,
        Action::GetAclObject,
        Action::ApplyAclObject,
    ];

    /// Protocol key of the action
    pub fn key(self) -> &'static str {
        match self {
            Action::GetDescendantsFolder => "canGetDescendents.Folder",
            Action::GetChildrenFolder => "canGetChildren.Folder",
            Action::GetParentsFolder => "canGetParents.Folder",
            Action::GetFolderParentObject => "canGetFolderParent.Object",
            Action::CreateDocumentFolder => "canCreateDocument.Folder",
            Action::CreateFolderFolder => "canCreateFolder.Folder",
            Action::CreatePolicyFolder => "canCreatePolicy.Folder",
            Action::CreateRelationshipSource => "canCreateRelationship.Source",
            Action::CreateRelationshipTarget => "canCreateRelationship.Target",
            Action::GetPropertiesObject => "canGetProperties.Object",
            Action::ViewContentObject => "canViewContent.Object",
            Action::UpdatePropertiesObject => "canUpdateProperties.Object",
            Action::MoveObject => "canMove.Object",
            Action::MoveTarget => "canMove.Target",
            Action::MoveSource => "canMove.Source",
            Action::DeleteObject => "canDelete.Object",
            Action::DeleteTreeFolder => "canDeleteTree.Folder",
            Action::SetContentDocument => "canSetContent.Document",
            Action::DeleteContentDocument => "canDeleteContent.Document",
            Action::AddToFolderObject => "canAddToFolder.Object",
            Action::AddToFolderFolder => "canAddToFolder.Folder",
            Action::RemoveFromFolderObject => "canRemoveFromFolder.Object",
            Action::RemoveFromFolderFolder => "canRemoveFromFolder.Folder",
            Action::CheckoutDocument => "canCheckout.Document",
            Action::CancelCheckoutDocument => "canCancelCheckout.Document",
            Action::CheckinDocument => "canCheckin.Document",
            Action::GetAllVersionsVersionSeries => "canGetAllVersions.VersionSeries",
            Action::GetObjectRelationshipsObject => "canGetObjectRelationships.Object",
            Action::AddPolicyObject => "canAddPolicy.Object",
            Action::AddPolicyPolicy => "canAddPolicy.Policy",
            Action::RemovePolicyObject => "canRemovePolicy.Object",
            Action::RemovePolicyPolicy => "canRemovePolicy.Policy",
            Action::GetAppliedPoliciesObject => "canGetAppliedPolicies.Object",
            Action::GetAclObject => "canGetACL.Object",
            Action::ApplyAclObject => "canApplyACL.Object",
        }
    }

    /// Look an action up by its protocol key
    pub fn from_key(key: &str) -> Option<Action> {
        Action::ALL.iter().copied().find(|action| action.key() == key)
    }

    fn standard_permission(self) -> Permission {
        match self {
            Action::GetDescendantsFolder
            | Action::GetChildrenFolder
            | Action::GetParentsFolder
            | Action::GetFolderParentObject
            | Action::CreateRelationshipSource
            | Action::CreateRelationshipTarget
            | Action::GetPropertiesObject
            | Action::ViewContentObject
            | Action::GetAllVersionsVersionSeries
            | Action::GetObjectRelationshipsObject
            | Action::AddPolicyPolicy
            | Action::RemovePolicyPolicy
            | Action::GetAppliedPoliciesObject
            | Action::GetAclObject => Permission::Read,

            Action::CreateDocumentFolder
            | Action::CreateFolderFolder
            | Action::CreatePolicyFolder
            | Action::UpdatePropertiesObject
            | Action::MoveObject
            | Action::MoveTarget
            | Action::MoveSource
            | Action::DeleteObject
            | Action::DeleteTreeFolder
            | Action::SetContentDocument
            | Action::DeleteContentDocument
            | Action::AddToFolderObject
            | Action::AddToFolderFolder
            | Action::RemoveFromFolderObject
            | Action::RemoveFromFolderFolder
            | Action::CheckoutDocument
            | Action::CancelCheckoutDocument
            | Action::CheckinDocument
            | Action::AddPolicyObject
            | Action::RemovePolicyObject => Permission::Write,

            Action::ApplyAclObject => Permission::All,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Action → required permission table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMapping {
    entries: BTreeMap<Action, Permission>,
}

impl PermissionMapping {
    /// The standard mapping
    pub fn standard() -> Self {
        Self {
            entries: Action::ALL
                .iter()
                .map(|action| (*action, action.standard_permission()))
                .collect(),
        }
    }

    /// Override the permission required for one action
    pub fn with_override(mut self, action: Action, permission: Permission) -> Self {
        self.entries.insert(action, permission);
        self
    }

    /// Permission required to perform `action`
    pub fn required(&self, action: Action) -> Permission {
        self.entries
            .get(&action)
            .copied()
            .unwrap_or_else(|| action.standard_permission())
    }

    /// Iterate over `(action, permission)` pairs in table order
    pub fn iter(&self) -> impl Iterator<Item = (Action, Permission)> + '_ {
        self.entries.iter().map(|(a, p)| (*a, *p))
    }
}

impl Default for PermissionMapping {
    fn default() -> Self {
        Self::standard()
    }
}
