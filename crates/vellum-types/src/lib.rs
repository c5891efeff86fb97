//! # Vellum Types - Layer 2: Schema
//!
//! **Purpose**: Type definitions and the conversion of raw property bags into
//! schema-validated property sets.
//!
//! # Architecture Constraints
//!
//! **Layer 2 depends on vellum-core and vellum-authorization**.
//! - YES Type and property definition model
//! - YES Copy-on-write type registry with base-type bootstrap
//! - YES Property marshalling with a per-datatype coercion table
//! - YES Constraint validation
//! - NO object storage or versioning (that's vellum-store)
//!
//! ## Core Concepts
//!
//! - **Type Registry**: readers see an immutable snapshot; mutations install a
//!   new one atomically
//! - **Secondary types**: mixins whose property definitions are searched after
//!   the primary type, first attached wins
//! - **Stale caches**: a definition miss reloads the involved types once
//!   before failing
//!
//! ## What's NOT in this crate
//!
//! - Objects, content and version series (belong in `vellum-store`)
//! - Permission evaluation (belongs in `vellum-authorization`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Base type bootstrap
pub mod builtin;

/// Per-datatype coercion table
pub mod coerce;

/// Type and property definitions
pub mod definitions;

/// Property marshalling
pub mod marshal;

/// Type registry and type sources
pub mod registry;

/// Constraint and definition validation
pub mod validation;

/// Raw and resolved property values
pub mod value;

pub use builtin::BaseTypes;
pub use definitions::{
    BaseType, Cardinality, Choice, Choices, ContentStreamAllowed, Datatype, DateTimeResolution,
    PropertyConstraints, PropertyDefinition, TypeDefinition, TypeMutability, Updatability,
};
pub use marshal::{PropertyMarshaller, RawProperty};
pub use registry::{CachedTypeSource, TypeRegistry, TypeSnapshot, TypeSource};
pub use validation::{
    is_valid_object_name, validate_object_name, validate_property_set, validate_values,
};
pub use value::{BagValue, Property, PropertyBag, PropertySet, PropertyValue};
