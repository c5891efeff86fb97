//! Vellum Testing Infrastructure
//!
//! Shared fixtures for the integration tests of the Vellum crates: a small
//! type system that exercises every datatype, a repository built on it, bag
//! helpers, proptest strategies and tracing setup.

//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! vellum-testkit = { path = "../vellum-testkit" }
//! ```
//!
//! ```rust,no_run
//! use vellum_testkit::*;
//!
//! let repository = test_repository();
//! let id = create_document(&repository, "a.txt", &alice());
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod logging;
pub mod strategies;

pub use fixtures::*;
pub use logging::init_test_tracing;
