//! The sketch: parameters, entities and constraints, plus the solver's view
//! of them.

use indexmap::IndexMap;

use crate::constraint::MAX_CONSTRAINT_SLOTS;
use crate::expr::{Expr, Scope};
use crate::solver::Linked;
use crate::table::Table;
use crate::{Constraint, ConstraintHandle, Entity, EntityHandle, Error};

/// A free scalar, driven by the solver.
///
/// The value is the only state the solver ever writes.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Param {
    /// Current value.
    pub value: f64,
}

/// A parameter handle.
pub type ParamHandle = crate::table::Handle<Param>;

/// A self-contained 2D parametric sketch.
///
/// Parameters, entities and constraints live in generational slot tables, so
/// destroying one never invalidates the others: anything still referring to
/// the destroyed slot holds a stale handle, which every lookup reports as
/// "not found" and every expression evaluation reads as 0.
///
/// Adding or removing parameters, entities or constraints marks the solver's
/// internal view outdated; the next [`Sketch::solve`] rebuilds it before
/// iterating.
pub struct Sketch {
    pub(crate) params: Table<Param>,
    pub(crate) entities: Table<Entity>,
    pub(crate) constraints: Table<Constraint>,
    pub(crate) link_outdated: bool,
    pub(crate) linked: Linked,
}

impl Sketch {
    /// An empty sketch.
    pub fn new() -> Self {
        Self::with_capacity(0, 0, 0)
    }

    /// An empty sketch with memory reserved for the given numbers of
    /// parameters, entities and constraints.
    pub fn with_capacity(params: usize, entities: usize, constraints: usize) -> Self {
        Self {
            params: Table::with_capacity(params),
            entities: Table::with_capacity(entities),
            constraints: Table::with_capacity(constraints),
            link_outdated: false,
            linked: Linked::default(),
        }
    }

    /// Whether the solver's internal view must be rebuilt before the next solve.
    pub fn link_outdated(&self) -> bool {
        self.link_outdated
    }

    // ----- parameters -----

    /// Create a parameter with an initial value.
    pub fn add_param(&mut self, value: f64) -> Result<ParamHandle, Error> {
        let h = self
            .params
            .insert(Param { value })
            .ok_or(Error::CapacityExhausted { table: "parameters" })?;
        self.link_outdated = true;
        Ok(h)
    }

    /// Read a parameter's current value.
    pub fn param(&self, h: ParamHandle) -> Option<f64> {
        self.params.get(h).map(|p| p.value)
    }

    /// Mutably borrow a parameter's value.
    ///
    /// Like [`Sketch::set_param`], writing through the borrow does not
    /// outdate the link.
    pub fn param_mut(&mut self, h: ParamHandle) -> Option<&mut f64> {
        self.params.get_mut(h).map(|p| &mut p.value)
    }

    /// Overwrite a parameter's value. Returns false for a stale handle.
    ///
    /// Changing a value does not outdate the link: only membership changes do.
    pub fn set_param(&mut self, h: ParamHandle, value: f64) -> bool {
        match self.params.get_mut(h) {
            Some(p) => {
                p.value = value;
                true
            }
            None => false,
        }
    }

    /// Destroy a parameter. Returns false for a stale handle.
    ///
    /// Entities and constraints referring to it are not touched; their
    /// dangling references read as 0 from now on.
    pub fn remove_param(&mut self, h: ParamHandle) -> bool {
        let removed = self.params.remove(h);
        if removed {
            self.link_outdated = true;
        }
        removed
    }

    /// Number of live parameters.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Iterate over live parameters in slot order.
    pub fn params(&self) -> impl Iterator<Item = (ParamHandle, f64)> {
        self.params.iter().map(|(h, p)| (h, p.value))
    }

    // ----- entities -----

    /// Create an entity, validating its references.
    ///
    /// Entity references must name live points and parameter references must
    /// name live parameters *at creation time*. They may go stale later;
    /// that is tolerated.
    pub fn add_entity(&mut self, entity: Entity) -> Result<EntityHandle, Error> {
        for h in entity.param_refs() {
            if !self.params.contains(h) {
                return Err(Error::StaleReference { role: "parameter reference" });
            }
        }
        for h in entity.entity_refs() {
            let Some(referent) = self.entities.get(h) else {
                return Err(Error::StaleReference { role: "entity reference" });
            };
            if referent.as_point().is_none() {
                return Err(Error::NotAPoint {
                    role: "entity reference",
                    found: referent.kind_name(),
                });
            }
        }
        let h = self
            .entities
            .insert(entity)
            .ok_or(Error::CapacityExhausted { table: "entities" })?;
        self.link_outdated = true;
        Ok(h)
    }

    /// Create a point from two coordinate parameters.
    pub fn add_point(&mut self, x: ParamHandle, y: ParamHandle) -> Result<EntityHandle, Error> {
        self.add_entity(Entity::Point { x, y })
    }

    /// Create a line between two points.
    pub fn add_line(&mut self, p1: EntityHandle, p2: EntityHandle) -> Result<EntityHandle, Error> {
        self.add_entity(Entity::Line { p1, p2 })
    }

    /// Create a circle from a center point and a radius parameter.
    pub fn add_circle(
        &mut self,
        center: EntityHandle,
        radius: ParamHandle,
    ) -> Result<EntityHandle, Error> {
        self.add_entity(Entity::Circle { center, radius })
    }

    /// Create an arc from start, end and center points.
    pub fn add_arc(
        &mut self,
        start: EntityHandle,
        end: EntityHandle,
        center: EntityHandle,
    ) -> Result<EntityHandle, Error> {
        self.add_entity(Entity::Arc { start, end, center })
    }

    /// Look up an entity.
    pub fn entity(&self, h: EntityHandle) -> Option<&Entity> {
        self.entities.get(h)
    }

    /// Destroy an entity. Returns false for a stale handle. Never cascades.
    pub fn remove_entity(&mut self, h: EntityHandle) -> bool {
        let removed = self.entities.remove(h);
        if removed {
            self.link_outdated = true;
        }
        removed
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ----- constraints -----

    /// Add a constraint, validating its slot arrays fit.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintHandle, Error> {
        if constraint.entities.len() > MAX_CONSTRAINT_SLOTS {
            return Err(Error::TooManySlots {
                kind: "entity",
                got: constraint.entities.len(),
            });
        }
        if constraint.params.len() > MAX_CONSTRAINT_SLOTS {
            return Err(Error::TooManySlots {
                kind: "parameter",
                got: constraint.params.len(),
            });
        }
        let h = self
            .constraints
            .insert(constraint)
            .ok_or(Error::CapacityExhausted { table: "constraints" })?;
        self.link_outdated = true;
        Ok(h)
    }

    /// Look up a constraint.
    pub fn constraint(&self, h: ConstraintHandle) -> Option<&Constraint> {
        self.constraints.get(h)
    }

    /// Destroy a constraint, releasing its equation and derivative trees.
    /// Returns false for a stale handle.
    pub fn remove_constraint(&mut self, h: ConstraintHandle) -> bool {
        let removed = self.constraints.remove(h);
        if removed {
            self.link_outdated = true;
        }
        removed
    }

    /// Number of live constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // ----- evaluation -----

    /// Evaluate an expression outside any constraint.
    ///
    /// Only `constant` and `param` leaves resolve; the slot-indexed leaves
    /// read as 0 because there are no slot arrays to index.
    pub fn eval(&self, e: &Expr) -> f64 {
        e.eval(&self.params, &self.entities, &Scope::Free)
    }

    /// Evaluate an expression against a constraint's slot arrays.
    ///
    /// If `c` is stale this degrades to [`Sketch::eval`].
    pub fn eval_scoped(&self, e: &Expr, c: ConstraintHandle) -> f64 {
        match self.constraints.get(c) {
            Some(constraint) => e.eval(&self.params, &self.entities, &Scope::In(constraint)),
            None => self.eval(e),
        }
    }

    /// Current residual of every live constraint, in slot order.
    pub fn residuals(&self) -> IndexMap<ConstraintHandle, f64> {
        self.constraints
            .iter()
            .map(|(h, c)| (h, c.eq.eval(&self.params, &self.entities, &Scope::In(c))))
            .collect()
    }
}

impl Default for Sketch {
    fn default() -> Self {
        Self::new()
    }
}
