//! Geometric entities: points, lines, circles and arcs.

use crate::{EntityHandle, ParamHandle};

/// A geometric object in a sketch.
///
/// Entities refer to their parameters and to each other by handle, and the
/// references are not exclusive: the same point may be the endpoint of any
/// number of lines. Destroying a referenced entity or parameter does not
/// cascade; the dangling reference simply reads as 0 wherever an expression
/// dereferences it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    /// A point with x/y coordinate parameters.
    Point {
        /// X coordinate.
        x: ParamHandle,
        /// Y coordinate.
        y: ParamHandle,
    },
    /// A line segment between two points.
    Line {
        /// One endpoint. Must refer to a [`Entity::Point`].
        p1: EntityHandle,
        /// The other endpoint. Must refer to a [`Entity::Point`].
        p2: EntityHandle,
    },
    /// A circle around a center point.
    Circle {
        /// The center. Must refer to a [`Entity::Point`].
        center: EntityHandle,
        /// The radius parameter.
        radius: ParamHandle,
    },
    /// An arc on the perimeter of a circle, described by three points.
    Arc {
        /// Where the arc starts. Must refer to a [`Entity::Point`].
        start: EntityHandle,
        /// Where the arc ends. Must refer to a [`Entity::Point`].
        end: EntityHandle,
        /// Center of the circle the arc lies on. Must refer to a [`Entity::Point`].
        center: EntityHandle,
    },
}

impl Entity {
    /// The coordinate parameters, if this is a point.
    pub fn as_point(&self) -> Option<(ParamHandle, ParamHandle)> {
        match self {
            Entity::Point { x, y } => Some((*x, *y)),
            _ => None,
        }
    }

    /// What kind of entity this is, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Entity::Point { .. } => "point",
            Entity::Line { .. } => "line",
            Entity::Circle { .. } => "circle",
            Entity::Arc { .. } => "arc",
        }
    }

    /// Every entity handle this entity refers to. Each must resolve to a point.
    pub(crate) fn entity_refs(&self) -> Vec<EntityHandle> {
        match self {
            Entity::Point { .. } => Vec::new(),
            Entity::Line { p1, p2 } => vec![*p1, *p2],
            Entity::Circle { center, .. } => vec![*center],
            Entity::Arc { start, end, center } => vec![*start, *end, *center],
        }
    }

    /// Every parameter handle this entity refers to directly.
    pub(crate) fn param_refs(&self) -> Vec<ParamHandle> {
        match self {
            Entity::Point { x, y } => vec![*x, *y],
            Entity::Circle { radius, .. } => vec![*radius],
            Entity::Line { .. } | Entity::Arc { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Handle;

    fn h<T>(idx: u16) -> Handle<T> {
        Handle::new(idx, 1)
    }

    #[test]
    fn point_accessor() {
        let p = Entity::Point { x: h(0), y: h(1) };
        assert_eq!(p.as_point(), Some((h(0), h(1))));
        let l = Entity::Line { p1: h(0), p2: h(1) };
        assert!(l.as_point().is_none());
    }

    #[test]
    fn reference_listing() {
        let arc = Entity::Arc {
            start: h(0),
            end: h(1),
            center: h(2),
        };
        assert_eq!(arc.entity_refs(), vec![h(0), h(1), h(2)]);
        assert!(arc.param_refs().is_empty());

        let circle = Entity::Circle {
            center: h(4),
            radius: h(9),
        };
        assert_eq!(circle.entity_refs(), vec![h(4)]);
        assert_eq!(circle.param_refs(), vec![h(9)]);
    }
}
