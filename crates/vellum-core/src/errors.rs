//! Unified error system for Vellum
//!
//! One error type for every crate in the workspace. The top-level variants are
//! the error *kinds* callers branch on; the nested reason enums name the exact
//! condition so tests and bindings can match on it without parsing messages.

use serde::{Deserialize, Serialize};

/// Coarse classification of a [`VellumError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller-correctable input problem
    InvalidArgument,
    /// State precondition failed; may succeed after re-reading state
    Constraint,
    /// Referenced entity does not exist
    NotFound,
    /// Caller lacks the required permission
    PermissionDenied,
    /// Programming-contract violation
    Internal,
}

/// Unified error type for all Vellum operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum VellumError {
    /// Invalid input supplied by the caller
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// The specific invalid-argument condition
        reason: InvalidArgument,
    },

    /// A state-machine or schema constraint was violated
    #[error("Constraint violation: {reason}")]
    Constraint {
        /// The specific constraint that failed
        reason: ConstraintViolation,
    },

    /// Resource not found
    #[error("Not found: {reason}")]
    NotFound {
        /// What was not found
        reason: NotFound,
    },

    /// Permission denied
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Error message describing the permission issue
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

/// Invalid-argument conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum InvalidArgument {
    /// Neither an explicit type nor the object-type-id key was supplied
    #[error("type or type property must be set")]
    MissingTypeId,

    /// A value does not match the datatype of its definition
    #[error("property '{property}' expects {expected} but got {actual}")]
    WrongPropertyType {
        /// Property id
        property: String,
        /// Accepted runtime value types
        expected: String,
        /// Runtime type that was supplied
        actual: String,
    },

    /// A list was supplied for a single-valued property
    #[error("property '{property}' is not a multi value property")]
    NotMultiValued {
        /// Property id
        property: String,
    },

    /// A scalar was supplied for a multi-valued property
    #[error("property '{property}' is not a single value property")]
    NotSingleValued {
        /// Property id
        property: String,
    },

    /// List elements have different runtime types
    #[error("property '{property}' is inhomogeneous")]
    InhomogeneousValues {
        /// Property id
        property: String,
    },

    /// A list contains a null element
    #[error("property '{property}' contains null values")]
    NullValueNotAllowed {
        /// Property id
        property: String,
    },

    /// A secondary-type id resolved to a type that is not a secondary type
    #[error("type '{type_id}' is not a secondary type")]
    NotASecondaryType {
        /// Offending type id
        type_id: String,
    },

    /// The secondary type id list contains something other than text
    #[error("secondary types property contains an invalid entry: {entry}")]
    InvalidSecondaryTypeEntry {
        /// Rendered offending entry
        entry: String,
    },

    /// A resolved property was placed under a different key
    #[error("property id mismatch: '{key}' != '{property}'")]
    PropertyIdMismatch {
        /// Bag key
        key: String,
        /// Id carried by the property
        property: String,
    },

    /// A raw property on the read path carries no id
    #[error("cannot convert a property without id; it is supposed to be part of type '{type_id}'{secondary}")]
    AnonymousProperty {
        /// Owning object type
        type_id: String,
        /// Rendered candidate secondary types (may be empty)
        secondary: String,
    },

    /// The parent type of a new type is not registered
    #[error("parent type '{parent}' of '{type_id}' is unknown")]
    DanglingParent {
        /// Type being registered
        type_id: String,
        /// Missing parent
        parent: String,
    },

    /// A type definition is malformed
    #[error("invalid type definition '{type_id}': {message}")]
    InvalidTypeDefinition {
        /// Type id
        type_id: String,
        /// What is wrong
        message: String,
    },

    /// A base type without instances was asked to create one
    #[error("objects of base type '{base_type}' cannot be created")]
    NotInstantiable {
        /// Base type tag
        base_type: String,
    },

    /// Name or id contains illegal characters or is empty
    #[error("illegal name: '{name}'")]
    InvalidName {
        /// Offending name
        name: String,
    },

    /// A permission string could not be parsed
    #[error("unknown permission '{permission}'")]
    UnknownPermission {
        /// Offending permission string
        permission: String,
    },

    /// Content stream exceeds the configured limit
    #[error("content stream exceeds {limit} bytes")]
    ContentTooLarge {
        /// Configured byte limit
        limit: u64,
    },

    /// Generic invalid input
    #[error("{message}")]
    Other {
        /// Description
        message: String,
    },
}

/// Constraint-violation conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ConstraintViolation {
    /// The series is already checked out
    #[error("document '{series}' is already checked out")]
    AlreadyCheckedOut {
        /// Version series id
        series: String,
    },

    /// Checkin or cancel on a series that is not checked out
    #[error("document '{series}' is not checked out")]
    NotCheckedOut {
        /// Version series id
        series: String,
    },

    /// Checkin by a principal other than the one holding the checkout
    #[error("document '{series}' is checked out by '{owner}', not '{user}'")]
    CheckedOutByAnotherUser {
        /// Version series id
        series: String,
        /// Principal holding the checkout
        owner: String,
        /// Principal attempting the operation
        user: String,
    },

    /// A version was added while the series is checked out
    #[error("cannot add a version to '{series}' while it is checked out")]
    CheckedOutConstraintViolation {
        /// Version series id
        series: String,
    },

    /// A type with the same id already exists
    #[error("type '{type_id}' already exists")]
    DuplicateType {
        /// Type id
        type_id: String,
    },

    /// The document type is not versionable
    #[error("type '{type_id}' is not versionable")]
    NotVersionable {
        /// Type id
        type_id: String,
    },

    /// Checkin targeted a version that is not the private working copy
    #[error("'{object}' is not a private working copy")]
    NotAPrivateWorkingCopy {
        /// Object id
        object: String,
    },

    /// A value violates a property constraint
    #[error("property '{property}': {message}")]
    ValueOutOfRange {
        /// Property id
        property: String,
        /// Description of the violated constraint
        message: String,
    },

    /// A required property has no value
    #[error("required property '{property}' is not set")]
    RequiredPropertyMissing {
        /// Property id
        property: String,
    },

    /// A type is still referenced by subtypes or instances
    #[error("type '{type_id}' is in use: {message}")]
    TypeInUse {
        /// Type id
        type_id: String,
        /// What still references it
        message: String,
    },

    /// The type's mutability record forbids the operation
    #[error("type '{type_id}' does not allow {operation}")]
    TypeNotMutable {
        /// Type id
        type_id: String,
        /// Refused operation
        operation: String,
    },

    /// A type update is not backward compatible
    #[error("incompatible update of type '{type_id}': {message}")]
    IncompatibleTypeUpdate {
        /// Type id
        type_id: String,
        /// Why the update was refused
        message: String,
    },

    /// A folder still has children
    #[error("folder '{folder}' is not empty")]
    FolderNotEmpty {
        /// Folder id
        folder: String,
    },

    /// The change token supplied by the caller is outdated
    #[error("object '{object}' was modified concurrently")]
    UpdateConflict {
        /// Object id
        object: String,
    },

    /// Feature not available under the configured protocol version
    #[error("{feature} requires protocol version {required}")]
    UnsupportedProtocolVersion {
        /// Feature name
        feature: String,
        /// Minimum protocol version
        required: String,
    },

    /// Generic constraint failure
    #[error("{message}")]
    Other {
        /// Description
        message: String,
    },
}

/// Not-found conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum NotFound {
    /// Type id is not registered
    #[error("type '{type_id}' is unknown")]
    UnknownType {
        /// Type id
        type_id: String,
    },

    /// No definition for a property in the primary or secondary types
    #[error("property '{property}' is not valid for type '{type_id}'{secondary}")]
    PropertyNotDefinedForType {
        /// Property id
        property: String,
        /// Primary type id
        type_id: String,
        /// Rendered secondary types that were searched (may be empty)
        secondary: String,
    },

    /// Version is not a member of the series
    #[error("version '{version}' is not part of series '{series}'")]
    VersionNotFound {
        /// Version series id
        series: String,
        /// Version id
        version: String,
    },

    /// Object id does not exist
    #[error("object '{object}' does not exist")]
    ObjectNotFound {
        /// Object id
        object: String,
    },
}

impl VellumError {
    /// Create an invalid-argument error from a reason
    pub fn invalid(reason: InvalidArgument) -> Self {
        Self::InvalidArgument { reason }
    }

    /// Create a free-form invalid-argument error
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: InvalidArgument::Other {
                message: message.into(),
            },
        }
    }

    /// Create a constraint-violation error from a reason
    pub fn constraint(reason: ConstraintViolation) -> Self {
        Self::Constraint { reason }
    }

    /// Create a free-form constraint-violation error
    pub fn constraint_message(message: impl Into<String>) -> Self {
        Self::Constraint {
            reason: ConstraintViolation::Other {
                message: message.into(),
            },
        }
    }

    /// Create a not-found error from a reason
    pub fn not_found(reason: NotFound) -> Self {
        Self::NotFound { reason }
    }

    /// Create an object-not-found error
    pub fn object_not_found(object: impl Into<String>) -> Self {
        Self::NotFound {
            reason: NotFound::ObjectNotFound {
                object: object.into(),
            },
        }
    }

    /// Create an unknown-type error
    pub fn unknown_type(type_id: impl Into<String>) -> Self {
        Self::NotFound {
            reason: NotFound::UnknownType {
                type_id: type_id.into(),
            },
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Constraint { .. } => ErrorKind::Constraint,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry after re-reading state
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Constraint
    }
}

impl From<InvalidArgument> for VellumError {
    fn from(reason: InvalidArgument) -> Self {
        Self::invalid(reason)
    }
}

impl From<ConstraintViolation> for VellumError {
    fn from(reason: ConstraintViolation) -> Self {
        Self::constraint(reason)
    }
}

impl From<NotFound> for VellumError {
    fn from(reason: NotFound) -> Self {
        Self::not_found(reason)
    }
}

impl From<std::io::Error> for VellumError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::internal(format!("file not found: {err}")),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

/// Standard Result type for Vellum operations
pub type Result<T> = std::result::Result<T, VellumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = VellumError::invalid(InvalidArgument::MissingTypeId);
        assert!(matches!(err, VellumError::InvalidArgument { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid argument: type or type property must be set"
        );
    }

    #[test]
    fn test_kind_and_retry() {
        let err: VellumError = ConstraintViolation::AlreadyCheckedOut {
            series: "doc-1".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert!(err.is_retryable());

        let err = VellumError::unknown_type("cmis:nope");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let err = VellumError::from(io_err);
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }
}
