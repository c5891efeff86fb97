//! Strongly typed repository identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the underlying string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a type definition.
    TypeId
);

string_id!(
    /// Identifier of a property definition.
    PropertyId
);

string_id!(
    /// Identifier of a stored object, version or version series.
    ObjectId
);

string_id!(
    /// Identifier of a principal (user or group).
    PrincipalId
);

impl ObjectId {
    /// Generate a fresh random object id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Property ids defined by the protocol for the base types.
pub mod property_ids {
    #![allow(missing_docs)]

    pub const NAME: &str = "cmis:name";
    pub const DESCRIPTION: &str = "cmis:description";
    pub const OBJECT_ID: &str = "cmis:objectId";
    pub const BASE_TYPE_ID: &str = "cmis:baseTypeId";
    pub const OBJECT_TYPE_ID: &str = "cmis:objectTypeId";
    pub const SECONDARY_OBJECT_TYPE_IDS: &str = "cmis:secondaryObjectTypeIds";
    pub const CREATED_BY: &str = "cmis:createdBy";
    pub const CREATION_DATE: &str = "cmis:creationDate";
    pub const LAST_MODIFIED_BY: &str = "cmis:lastModifiedBy";
    pub const LAST_MODIFICATION_DATE: &str = "cmis:lastModificationDate";
    pub const CHANGE_TOKEN: &str = "cmis:changeToken";

    pub const IS_IMMUTABLE: &str = "cmis:isImmutable";
    pub const IS_LATEST_VERSION: &str = "cmis:isLatestVersion";
    pub const IS_MAJOR_VERSION: &str = "cmis:isMajorVersion";
    pub const IS_LATEST_MAJOR_VERSION: &str = "cmis:isLatestMajorVersion";
    pub const IS_PRIVATE_WORKING_COPY: &str = "cmis:isPrivateWorkingCopy";
    pub const VERSION_LABEL: &str = "cmis:versionLabel";
    pub const VERSION_SERIES_ID: &str = "cmis:versionSeriesId";
    pub const IS_VERSION_SERIES_CHECKED_OUT: &str = "cmis:isVersionSeriesCheckedOut";
    pub const VERSION_SERIES_CHECKED_OUT_BY: &str = "cmis:versionSeriesCheckedOutBy";
    pub const VERSION_SERIES_CHECKED_OUT_ID: &str = "cmis:versionSeriesCheckedOutId";
    pub const CHECKIN_COMMENT: &str = "cmis:checkinComment";
    pub const CONTENT_STREAM_LENGTH: &str = "cmis:contentStreamLength";
    pub const CONTENT_STREAM_MIME_TYPE: &str = "cmis:contentStreamMimeType";
    pub const CONTENT_STREAM_FILE_NAME: &str = "cmis:contentStreamFileName";
    pub const CONTENT_STREAM_ID: &str = "cmis:contentStreamId";

    pub const PARENT_ID: &str = "cmis:parentId";
    pub const PATH: &str = "cmis:path";
    pub const ALLOWED_CHILD_OBJECT_TYPE_IDS: &str = "cmis:allowedChildObjectTypeIds";

    pub const SOURCE_ID: &str = "cmis:sourceId";
    pub const TARGET_ID: &str = "cmis:targetId";

    pub const POLICY_TEXT: &str = "cmis:policyText";
}

/// Principal ids with special meaning.
pub mod principal_ids {
    /// Macro in supplied ACEs that stands for the calling user.
    pub const CMIS_USER: &str = "cmis:user";
    /// Default principal matching every caller.
    pub const ANYONE: &str = "cmis:anyone";
    /// Default administrator principal.
    pub const ADMIN: &str = "admin";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_serde_transparent() {
        let id = TypeId::new("cmis:document");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cmis:document\"");
    }
}
