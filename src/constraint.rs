//! Constraints: equations a sketch must drive to zero.

use crate::expr::Expr;
use crate::{EntityHandle, ParamHandle};

/// Maximum entity slots and maximum parameter slots per constraint.
pub const MAX_CONSTRAINT_SLOTS: usize = 16;

/// Each kind of constraint we support.
///
/// The core only knows the general equation form. Named constraints
/// (horizontal, parallel, tangent, ...) are built by the host from the
/// expression factories on top of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConstraintKind {
    /// An arbitrary equation whose residual must be driven to zero.
    General,
}

/// One equation in a sketch.
///
/// The residual is the value of `eq`; the solver drives it toward zero. The
/// slot arrays give the equation's indexed leaves something to point at: a
/// `point_x(1)` leaf reads the x coordinate of whatever point sits in entity
/// slot 1 of *this* constraint, so the same tree can be cloned across many
/// constraint instances with different slot arrays.
///
/// The core does not check that the tree's indices and the slot arrays
/// agree; a mismatch surfaces as a 0-valued subexpression at evaluation
/// time.
#[derive(Clone, Debug)]
pub struct Constraint {
    pub(crate) kind: ConstraintKind,
    pub(crate) eq: Expr,
    pub(crate) entities: Vec<EntityHandle>,
    pub(crate) params: Vec<ParamHandle>,
    pub(crate) row: SolverRow,
}

impl Constraint {
    /// A general equation constraint with empty slot arrays.
    pub fn general(eq: Expr) -> Self {
        Self {
            kind: ConstraintKind::General,
            eq,
            entities: Vec::new(),
            params: Vec::new(),
            row: SolverRow::default(),
        }
    }

    /// Set the entity slots the equation's `point_x`/`point_y`/`circle_radius`
    /// leaves index into.
    pub fn with_entities(mut self, entities: impl IntoIterator<Item = EntityHandle>) -> Self {
        self.entities = entities.into_iter().collect();
        self
    }

    /// Set the parameter slots the equation's `param_at` leaves index into.
    pub fn with_params(mut self, params: impl IntoIterator<Item = ParamHandle>) -> Self {
        self.params = params.into_iter().collect();
        self
    }

    /// The constraint kind.
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// The equation whose value is this constraint's residual.
    pub fn eq(&self) -> &Expr {
        &self.eq
    }

    /// The entity slot array.
    pub fn entities(&self) -> &[EntityHandle] {
        &self.entities
    }

    /// The parameter slot array.
    pub fn params(&self) -> &[ParamHandle] {
        &self.params
    }

    /// The residual as of the last time the solver evaluated it.
    pub fn residual(&self) -> f64 {
        self.row.residual
    }
}

/// Solver-private working state for one constraint: the current residual,
/// the symbolic partial w.r.t. every live parameter, and the evaluated
/// partials. Rebuilt on every relink.
#[derive(Clone, Debug, Default)]
pub(crate) struct SolverRow {
    pub(crate) residual: f64,
    pub(crate) dervs: Vec<Expr>,
    pub(crate) derv_vals: Vec<f64>,
}
