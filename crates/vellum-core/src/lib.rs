//! # Vellum Core - Layer 1: Foundation
//!
//! **Purpose**: Shared vocabulary for every Vellum crate.
//!
//! - Unified error type ([`VellumError`]) with the kinds callers branch on
//! - Strongly typed identifiers for types, properties, objects and principals
//! - Well-known protocol property and principal ids
//! - Protocol version gating
//! - Repository configuration loading and validation
//!
//! ## What's NOT in this crate
//!
//! - Permission model (belongs in `vellum-authorization`)
//! - Type registry and property marshalling (belong in `vellum-types`)
//! - Object storage and versioning (belong in `vellum-store`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Repository configuration
pub mod config;

/// Unified error handling
pub mod errors;

/// Type, property, object and principal identifiers
pub mod identifiers;

/// Protocol version gating
pub mod version;

pub use config::{DefaultAceConfig, RepositoryConfig, VellumConfig};
pub use errors::{
    ConstraintViolation, ErrorKind, InvalidArgument, NotFound, Result, VellumError,
};
pub use identifiers::{property_ids, principal_ids, ObjectId, PrincipalId, PropertyId, TypeId};
pub use version::ProtocolVersion;
