//! Property test strategies for Vellum types
//!
//! Strategies generate principals, ACL entries and sequences of version
//! series operations. Principals are drawn from a small pool so that
//! generated operations collide on the same users often.

use proptest::prelude::*;

// Re-export proptest for convenience
pub use proptest;

use vellum_authorization::{Ace, Permission};
use vellum_core::PrincipalId;

/// Names of the generated principals
pub const PRINCIPAL_POOL: [&str; 3] = ["alice", "bob", "carol"];

/// Strategy for a principal from [`PRINCIPAL_POOL`]
pub fn arb_principal() -> impl Strategy<Value = PrincipalId> {
    prop::sample::select(PRINCIPAL_POOL.to_vec()).prop_map(PrincipalId::new)
}

/// Strategy for any permission, including `cmis:none`
pub fn arb_permission() -> impl Strategy<Value = Permission> {
    prop_oneof![
        Just(Permission::None),
        Just(Permission::Read),
        Just(Permission::Write),
        Just(Permission::All),
    ]
}

/// Strategy for a direct entry over the principal pool
pub fn arb_ace() -> impl Strategy<Value = Ace> {
    (arb_principal(), arb_permission()).prop_map(|(principal, permission)| {
        Ace::new(principal, permission)
    })
}

/// Strategy for up to `max` direct entries
pub fn arb_aces(max: usize) -> impl Strategy<Value = Vec<Ace>> {
    prop::collection::vec(arb_ace(), 0..=max)
}

/// One step against a version series
#[derive(Debug, Clone)]
pub enum SeriesOp {
    /// Check out as `user`
    CheckOut {
        /// Acting principal
        user: PrincipalId,
    },
    /// Check in the private working copy as `user`
    CheckIn {
        /// Acting principal
        user: PrincipalId,
        /// Major or minor version
        major: bool,
    },
    /// Cancel the checkout
    Cancel,
    /// Delete the version at this position, counted from the oldest and
    /// wrapped around the series length
    DeleteVersion(usize),
}

/// Strategy for a single series operation
///
/// Checkouts and checkins dominate so that sequences build real histories
/// before deletions empty them.
pub fn arb_series_op() -> impl Strategy<Value = SeriesOp> {
    prop_oneof![
        4 => arb_principal().prop_map(|user| SeriesOp::CheckOut { user }),
        4 => (arb_principal(), any::<bool>())
            .prop_map(|(user, major)| SeriesOp::CheckIn { user, major }),
        1 => Just(SeriesOp::Cancel),
        1 => (0usize..8).prop_map(SeriesOp::DeleteVersion),
    ]
}

/// Strategy for a sequence of up to `max` series operations
pub fn arb_series_ops(max: usize) -> impl Strategy<Value = Vec<SeriesOp>> {
    prop::collection::vec(arb_series_op(), 0..=max)
}
