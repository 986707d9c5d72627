#![doc = include_str!("../README.md")]

pub use crate::constraint::{Constraint, ConstraintKind, MAX_CONSTRAINT_SLOTS};
pub use crate::entity::Entity;
pub use crate::error::Error;
pub use crate::expr::Expr;
pub use crate::sketch::{Param, ParamHandle, Sketch};
pub use crate::solver::{SolveConfig, SolveReport};
pub use crate::table::{Handle, MAX_SLOTS, Table};
pub use crate::warnings::{Warning, WarningContent};

/// An entity handle.
pub type EntityHandle = Handle<Entity>;
/// A constraint handle.
pub type ConstraintHandle = Handle<Constraint>;

/// Constraints and their slot arrays.
mod constraint;
/// Geometric data (points, lines, circles, arcs).
mod entity;
mod error;
/// Symbolic expressions over sketch parameters.
mod expr;
/// The sketch store.
mod sketch;
/// Numeric solver: relinking, normal equations, Gaussian elimination.
mod solver;
/// Generational slot tables.
mod table;
/// End-to-end tests.
#[cfg(test)]
mod tests;
mod warnings;
