//! # Vellum Authorization - Layer 2: Permission Model
//!
//! **Purpose**: Decide who may do what to a repository object.
//!
//! # Architecture Constraints
//!
//! **Layer 2 depends only on vellum-core** (foundation).
//! - YES Totally ordered permission scale and access control entries
//! - YES ACL apply (add-set / remove-set against direct entries)
//! - YES Operation → permission mapping table
//! - YES Effective ACL resolution over an abstract folder ancestry
//! - NO object storage (the graph is supplied through [`AclGraph`])
//!
//! ## What's NOT in this crate
//!
//! - Type definitions (belong in `vellum-types`)
//! - Objects, folders and versions (belong in `vellum-store`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Effective ACL resolution and access checks
pub mod evaluator;

/// Operation → permission mapping table
pub mod mapping;

/// Permission levels, ACEs and ACLs
pub mod permission;

pub use evaluator::{AccessDecision, AclGraph, AclNode, PermissionEvaluator};
pub use mapping::{Action, PermissionMapping};
pub use permission::{has_permission, Ace, Acl, Permission};
