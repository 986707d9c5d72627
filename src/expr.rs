// Symbolic rather than closure-based so the solver can differentiate
// analytically and the linker can rewrite slot-indexed leaves.
use std::fmt;
use std::rc::Rc;

use libm::{acos, asin, cos, sin, sqrt};

use crate::constraint::Constraint;
use crate::entity::Entity;
use crate::sketch::Param;
use crate::table::Table;
use crate::{EntityHandle, ParamHandle};

/// A symbolic expression over sketch parameters.
///
/// Expressions are immutable trees. Children are reference-counted, so
/// subtrees can be shared: a derivative produced by [`Expr::derivative`]
/// reuses the operands of the original expression rather than copying them,
/// and dropping either tree releases exactly the nodes it uniquely owns.
///
/// The slot-indexed leaves (`ParamAt`, `PointX`, `PointY`, `CircleRadius`)
/// resolve against the entity/parameter slot arrays of the constraint the
/// expression is evaluated in. They let one expression template serve many
/// constraint instances; outside a constraint they read as 0.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A constant scalar.
    Const(f64),
    /// A parameter referenced directly by handle.
    Param(ParamHandle),
    /// The parameter in slot `i` of the enclosing constraint.
    ParamAt(u16),
    /// X coordinate of the point in entity slot `i` of the enclosing constraint.
    PointX(u16),
    /// Y coordinate of the point in entity slot `i` of the enclosing constraint.
    PointY(u16),
    /// Radius of the circle in entity slot `i` of the enclosing constraint.
    CircleRadius(u16),
    /// Sine (radians).
    Sin(Rc<Expr>),
    /// Cosine (radians).
    Cos(Rc<Expr>),
    /// Inverse sine.
    Asin(Rc<Expr>),
    /// Inverse cosine.
    Acos(Rc<Expr>),
    /// Square root.
    Sqrt(Rc<Expr>),
    /// Square.
    Sqr(Rc<Expr>),
    /// Sum of two expressions.
    Add(Rc<Expr>, Rc<Expr>),
    /// Difference of two expressions.
    Sub(Rc<Expr>, Rc<Expr>),
    /// Product of two expressions.
    Mul(Rc<Expr>, Rc<Expr>),
    /// Quotient of two expressions. Division by zero is not guarded; the
    /// solver pivots around the resulting non-finite values.
    Div(Rc<Expr>, Rc<Expr>),
}

/// What the slot-indexed leaves resolve against.
pub(crate) enum Scope<'a> {
    /// Free evaluation: slot-indexed leaves read as 0.
    Free,
    /// Evaluation inside a constraint, against its slot arrays.
    In(&'a Constraint),
}

impl Expr {
    /// A constant.
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    /// A parameter referenced directly by handle.
    pub fn param(h: ParamHandle) -> Self {
        Expr::Param(h)
    }

    /// The parameter in slot `i` of the enclosing constraint.
    pub fn param_at(i: u16) -> Self {
        Expr::ParamAt(i)
    }

    /// X coordinate of the point in entity slot `i`.
    pub fn point_x(i: u16) -> Self {
        Expr::PointX(i)
    }

    /// Y coordinate of the point in entity slot `i`.
    pub fn point_y(i: u16) -> Self {
        Expr::PointY(i)
    }

    /// Radius of the circle in entity slot `i`.
    pub fn circle_radius(i: u16) -> Self {
        Expr::CircleRadius(i)
    }

    /// Sine of this expression. Assumes radians.
    pub fn sin(self) -> Self {
        Expr::Sin(Rc::new(self))
    }

    /// Cosine of this expression. Assumes radians.
    pub fn cos(self) -> Self {
        Expr::Cos(Rc::new(self))
    }

    /// Inverse sine of this expression.
    pub fn asin(self) -> Self {
        Expr::Asin(Rc::new(self))
    }

    /// Inverse cosine of this expression.
    pub fn acos(self) -> Self {
        Expr::Acos(Rc::new(self))
    }

    /// Square root of this expression.
    pub fn sqrt(self) -> Self {
        Expr::Sqrt(Rc::new(self))
    }

    /// Square of this expression.
    pub fn sqr(self) -> Self {
        Expr::Sqr(Rc::new(self))
    }
}

impl Expr {
    /// Evaluate the tree.
    ///
    /// Evaluation never fails: a stale handle, an out-of-range slot index,
    /// or a slot holding the wrong entity kind reads as 0. One broken
    /// reference therefore cannot abort a solve, at the cost of "really
    /// zero" being indistinguishable from "dangling".
    pub(crate) fn eval(
        &self,
        params: &Table<Param>,
        entities: &Table<Entity>,
        scope: &Scope<'_>,
    ) -> f64 {
        match self {
            Expr::Const(c) => *c,
            Expr::Param(h) => params.get(*h).map_or(0.0, |p| p.value),
            Expr::ParamAt(i) => match scope {
                Scope::In(c) => c
                    .params
                    .get(usize::from(*i))
                    .and_then(|&h| params.get(h))
                    .map_or(0.0, |p| p.value),
                Scope::Free => 0.0,
            },
            Expr::PointX(i) => match point_coords(*i, scope, entities) {
                Some((x, _)) => params.get(x).map_or(0.0, |p| p.value),
                None => 0.0,
            },
            Expr::PointY(i) => match point_coords(*i, scope, entities) {
                Some((_, y)) => params.get(y).map_or(0.0, |p| p.value),
                None => 0.0,
            },
            Expr::CircleRadius(i) => match circle_radius(*i, scope, entities) {
                Some(r) => params.get(r).map_or(0.0, |p| p.value),
                None => 0.0,
            },
            Expr::Sin(a) => sin(a.eval(params, entities, scope)),
            Expr::Cos(a) => cos(a.eval(params, entities, scope)),
            Expr::Asin(a) => asin(a.eval(params, entities, scope)),
            Expr::Acos(a) => acos(a.eval(params, entities, scope)),
            Expr::Sqrt(a) => sqrt(a.eval(params, entities, scope)),
            Expr::Sqr(a) => {
                let v = a.eval(params, entities, scope);
                v * v
            }
            Expr::Add(a, b) => a.eval(params, entities, scope) + b.eval(params, entities, scope),
            Expr::Sub(a, b) => a.eval(params, entities, scope) - b.eval(params, entities, scope),
            Expr::Mul(a, b) => a.eval(params, entities, scope) * b.eval(params, entities, scope),
            Expr::Div(a, b) => a.eval(params, entities, scope) / b.eval(params, entities, scope),
        }
    }

    /// The partial derivative of this tree with respect to `wrt`.
    ///
    /// Standard differentiation rules; operands reused verbatim in the
    /// result (product rule, chain rule) are shared with the original tree
    /// through their `Rc`, not copied.
    ///
    /// Slot-indexed leaves differentiate to 0: their target parameter is not
    /// identifiable without a constraint, so the solver rewrites them to
    /// direct `Param` leaves (see [`Expr::bind`]) before differentiating.
    pub fn derivative(&self, wrt: ParamHandle) -> Expr {
        match self {
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Param(h) => Expr::Const(if *h == wrt { 1.0 } else { 0.0 }),
            Expr::ParamAt(_) | Expr::PointX(_) | Expr::PointY(_) | Expr::CircleRadius(_) => {
                Expr::Const(0.0)
            }
            Expr::Add(a, b) => Expr::Add(
                Rc::new(a.derivative(wrt)),
                Rc::new(b.derivative(wrt)),
            ),
            Expr::Sub(a, b) => Expr::Sub(
                Rc::new(a.derivative(wrt)),
                Rc::new(b.derivative(wrt)),
            ),
            // Product rule: da*b + a*db.
            Expr::Mul(a, b) => Expr::Add(
                Rc::new(Expr::Mul(Rc::new(a.derivative(wrt)), Rc::clone(b))),
                Rc::new(Expr::Mul(Rc::clone(a), Rc::new(b.derivative(wrt)))),
            ),
            // Quotient rule: (da*b - a*db) / b^2.
            Expr::Div(a, b) => {
                let numerator = Expr::Sub(
                    Rc::new(Expr::Mul(Rc::new(a.derivative(wrt)), Rc::clone(b))),
                    Rc::new(Expr::Mul(Rc::clone(a), Rc::new(b.derivative(wrt)))),
                );
                Expr::Div(
                    Rc::new(numerator),
                    Rc::new(Expr::Mul(Rc::clone(b), Rc::clone(b))),
                )
            }
            Expr::Sin(a) => Expr::Mul(
                Rc::new(a.derivative(wrt)),
                Rc::new(Expr::Cos(Rc::clone(a))),
            ),
            Expr::Cos(a) => Expr::Mul(
                Rc::new(negated(Expr::Sin(Rc::clone(a)))),
                Rc::new(a.derivative(wrt)),
            ),
            Expr::Asin(a) => Expr::Div(
                Rc::new(a.derivative(wrt)),
                Rc::new(sqrt_one_minus_sqr(a)),
            ),
            Expr::Acos(a) => Expr::Div(
                Rc::new(negated(a.derivative(wrt))),
                Rc::new(sqrt_one_minus_sqr(a)),
            ),
            Expr::Sqrt(a) => Expr::Div(
                Rc::new(a.derivative(wrt)),
                Rc::new(Expr::Mul(
                    Rc::new(Expr::Const(2.0)),
                    Rc::new(Expr::Sqrt(Rc::clone(a))),
                )),
            ),
            Expr::Sqr(a) => Expr::Mul(
                Rc::new(Expr::Mul(Rc::new(Expr::Const(2.0)), Rc::clone(a))),
                Rc::new(a.derivative(wrt)),
            ),
        }
    }

    /// Rewrite slot-indexed leaves into direct `Param` leaves against `c`'s
    /// slot arrays, so the result can be differentiated by handle.
    ///
    /// A leaf that does not resolve (slot out of range, dead entity, wrong
    /// entity kind) becomes `Const(0)`, matching what evaluation would have
    /// read for it. A resolved leaf may still name a parameter that later
    /// dies; it then evaluates to 0 like any stale `Param`.
    pub(crate) fn bind(&self, entities: &Table<Entity>, c: &Constraint) -> Expr {
        let scope = Scope::In(c);
        match self {
            Expr::Const(_) | Expr::Param(_) => self.clone(),
            Expr::ParamAt(i) => match c.params.get(usize::from(*i)) {
                Some(&h) => Expr::Param(h),
                None => Expr::Const(0.0),
            },
            Expr::PointX(i) => match point_coords(*i, &scope, entities) {
                Some((x, _)) => Expr::Param(x),
                None => Expr::Const(0.0),
            },
            Expr::PointY(i) => match point_coords(*i, &scope, entities) {
                Some((_, y)) => Expr::Param(y),
                None => Expr::Const(0.0),
            },
            Expr::CircleRadius(i) => match circle_radius(*i, &scope, entities) {
                Some(r) => Expr::Param(r),
                None => Expr::Const(0.0),
            },
            Expr::Sin(a) => Expr::Sin(Rc::new(a.bind(entities, c))),
            Expr::Cos(a) => Expr::Cos(Rc::new(a.bind(entities, c))),
            Expr::Asin(a) => Expr::Asin(Rc::new(a.bind(entities, c))),
            Expr::Acos(a) => Expr::Acos(Rc::new(a.bind(entities, c))),
            Expr::Sqrt(a) => Expr::Sqrt(Rc::new(a.bind(entities, c))),
            Expr::Sqr(a) => Expr::Sqr(Rc::new(a.bind(entities, c))),
            Expr::Add(a, b) => Expr::Add(
                Rc::new(a.bind(entities, c)),
                Rc::new(b.bind(entities, c)),
            ),
            Expr::Sub(a, b) => Expr::Sub(
                Rc::new(a.bind(entities, c)),
                Rc::new(b.bind(entities, c)),
            ),
            Expr::Mul(a, b) => Expr::Mul(
                Rc::new(a.bind(entities, c)),
                Rc::new(b.bind(entities, c)),
            ),
            Expr::Div(a, b) => Expr::Div(
                Rc::new(a.bind(entities, c)),
                Rc::new(b.bind(entities, c)),
            ),
        }
    }
}

/// The x/y parameter handles behind entity slot `i`, if it holds a live point.
fn point_coords(
    i: u16,
    scope: &Scope<'_>,
    entities: &Table<Entity>,
) -> Option<(ParamHandle, ParamHandle)> {
    let Scope::In(c) = scope else { return None };
    let h: EntityHandle = *c.entities.get(usize::from(i))?;
    match entities.get(h) {
        Some(Entity::Point { x, y }) => Some((*x, *y)),
        _ => None,
    }
}

/// The radius parameter handle behind entity slot `i`, if it holds a live circle.
fn circle_radius(i: u16, scope: &Scope<'_>, entities: &Table<Entity>) -> Option<ParamHandle> {
    let Scope::In(c) = scope else { return None };
    let h: EntityHandle = *c.entities.get(usize::from(i))?;
    match entities.get(h) {
        Some(Entity::Circle { radius, .. }) => Some(*radius),
        _ => None,
    }
}

/// `0 - e`, the tree form of negation.
fn negated(e: Expr) -> Expr {
    Expr::Sub(Rc::new(Expr::Const(0.0)), Rc::new(e))
}

/// `sqrt(1 - a^2)`, the shared denominator of the inverse-trig derivatives.
fn sqrt_one_minus_sqr(a: &Rc<Expr>) -> Expr {
    Expr::Sqrt(Rc::new(Expr::Sub(
        Rc::new(Expr::Const(1.0)),
        Rc::new(Expr::Sqr(Rc::clone(a))),
    )))
}

impl std::ops::Add for Expr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Expr::Add(Rc::new(self), Rc::new(rhs))
    }
}

impl std::ops::Sub for Expr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Expr::Sub(Rc::new(self), Rc::new(rhs))
    }
}

impl std::ops::Mul for Expr {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Expr::Mul(Rc::new(self), Rc::new(rhs))
    }
}

impl std::ops::Div for Expr {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Expr::Div(Rc::new(self), Rc::new(rhs))
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self::Output {
        negated(self)
    }
}

#[mutants::skip] // Display text has no behavior worth mutating.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Param(h) => write!(f, "p{}", h.index()),
            Expr::ParamAt(i) => write!(f, "par[{i}]"),
            Expr::PointX(i) => write!(f, "ent[{i}].x"),
            Expr::PointY(i) => write!(f, "ent[{i}].y"),
            Expr::CircleRadius(i) => write!(f, "ent[{i}].r"),
            Expr::Sin(a) => write!(f, "sin({a})"),
            Expr::Cos(a) => write!(f, "cos({a})"),
            Expr::Asin(a) => write!(f, "asin({a})"),
            Expr::Acos(a) => write!(f, "acos({a})"),
            Expr::Sqrt(a) => write!(f, "sqrt({a})"),
            Expr::Sqr(a) => write!(f, "sqr({a})"),
            Expr::Add(a, b) => write!(f, "({a} + {b})"),
            Expr::Sub(a, b) => write!(f, "({a} - {b})"),
            Expr::Mul(a, b) => write!(f, "({a} * {b})"),
            Expr::Div(a, b) => write!(f, "({a} / {b})"),
        }
    }
}
