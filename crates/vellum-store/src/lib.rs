//! # Vellum Store - Layer 3: Object Service
//!
//! **Purpose**: Objects, content and version series, and the in-process
//! object service that ties them to the type registry and the permission
//! evaluator.
//!
//! # Architecture Constraints
//!
//! **Layer 3 depends on vellum-core, vellum-authorization and vellum-types**.
//! - YES Exhaustive object kinds over the instantiable base types
//! - YES Version series state machine with at most one private working copy
//! - YES Bounded content streams
//! - YES Permission-gated create, read, update, delete, versioning and ACL calls
//! - YES Folder navigation by path, parent and descendant tree
//! - NO persistence (the object table lives in memory)
//! - NO protocol bindings or query
//!
//! ## Core Concepts
//!
//! - **Series id**: a document series is addressed by the id of its first
//!   version; every version id resolves to the same series
//! - **Lock order**: object table, then series mutex
//!
//! ## What's NOT in this crate
//!
//! - Property conversion rules (belong in `vellum-types`)
//! - Permission scale and mapping table (belong in `vellum-authorization`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Content streams
pub mod content;

/// Stored objects and the object table
pub mod object;

/// Object service
pub mod repository;

/// Version series state machine
pub mod versioning;

pub use content::ContentStream;
pub use object::{AuditInfo, ObjectKind, ObjectRecord, ObjectTable, StoredObject};
pub use repository::{
    BulkUpdate, CheckIn, CreateObject, ObjectData, ObjectParent, ObjectTree, PropertyFilter,
    ReadOptions, Repository,
};
pub use versioning::{
    CheckInChanges, DocumentVersion, VersionContent, VersionLabel, VersionSeries, VersioningState,
};
