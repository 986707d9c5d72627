//! Errors reported when a sketch definition is invalid.

use crate::constraint::MAX_CONSTRAINT_SLOTS;

/// All errors that can occur while defining a sketch.
///
/// Only definition-time problems are reported this way. Runtime resolution
/// failures (stale handles, slot/type mismatches) deliberately evaluate to 0
/// instead of erroring, so one broken constraint cannot abort a solve.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The slot table backing this kind of object is full.
    #[error("no free slots left for {table} (at most 65535 may be live)")]
    CapacityExhausted {
        /// Which table filled up.
        table: &'static str,
    },
    /// A definition refers to a slot that is dead or was never created.
    #[error("{role} refers to a dead or never-created slot")]
    StaleReference {
        /// The referring field, e.g. a line's endpoint.
        role: &'static str,
    },
    /// A reference that must name a point names some other entity.
    #[error("{role} must be a point, but is a {found}")]
    NotAPoint {
        /// The referring field.
        role: &'static str,
        /// What the reference actually resolved to.
        found: &'static str,
    },
    /// A constraint definition uses more slots than a constraint carries.
    #[error("constraint binds {got} {kind} slots, the maximum is {max}", max = MAX_CONSTRAINT_SLOTS)]
    TooManySlots {
        /// `"entity"` or `"parameter"`.
        kind: &'static str,
        /// How many slots the definition asked for.
        got: usize,
    },
}
