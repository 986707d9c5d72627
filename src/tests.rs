use super::*;


const TOLERANCE: f64 = 1e-6;
const MAX_STEPS: usize = 32;

#[track_caller]
fn assert_nearly(lhs: f64, rhs: f64) {
    let difference = (lhs - rhs).abs();
    assert!(
        difference <= TOLERANCE,
        "LHS was {lhs}, RHS was {rhs}, difference was {difference}"
    );
}

#[test]
fn two_coincident_points() {
    let mut s = Sketch::new();
    let x1 = s.add_param(0.0).unwrap();
    let y1 = s.add_param(0.0).unwrap();
    let x2 = s.add_param(10.0).unwrap();
    let y2 = s.add_param(0.0).unwrap();
    s.add_constraint(Constraint::general(Expr::param(x1) - Expr::param(x2)))
        .unwrap();
    s.add_constraint(Constraint::general(Expr::param(y1) - Expr::param(y2)))
        .unwrap();

    assert!(s.solve(TOLERANCE, MAX_STEPS));
    assert_nearly(s.param(x1).unwrap(), s.param(x2).unwrap());
    assert_nearly(s.param(y1).unwrap(), s.param(y2).unwrap());
    // Least squares splits the gap symmetrically.
    assert_nearly(s.param(x1).unwrap(), 5.0);
    assert_nearly(s.param(y1).unwrap(), 0.0);
}

#[test]
fn fixed_distance_between_two_points() {
    let mut s = Sketch::new();
    let x1 = s.add_param(0.0).unwrap();
    let y1 = s.add_param(0.0).unwrap();
    let x2 = s.add_param(1.0).unwrap();
    let y2 = s.add_param(0.0).unwrap();
    let dx = Expr::param(x2) - Expr::param(x1);
    let dy = Expr::param(y2) - Expr::param(y1);
    s.add_constraint(Constraint::general(
        (dx.sqr() + dy.sqr()).sqrt() - Expr::constant(5.0),
    ))
    .unwrap();

    assert!(s.solve(TOLERANCE, MAX_STEPS));
    let dx = s.param(x2).unwrap() - s.param(x1).unwrap();
    let dy = s.param(y2).unwrap() - s.param(y1).unwrap();
    assert_nearly((dx * dx + dy * dy).sqrt(), 5.0);
}

#[test]
fn fixed_distance_via_entity_slots() {
    // Same system as above, but the equation is a reusable template over
    // entity slots instead of naming parameters directly.
    let mut s = Sketch::new();
    let x1 = s.add_param(0.0).unwrap();
    let y1 = s.add_param(0.0).unwrap();
    let x2 = s.add_param(1.0).unwrap();
    let y2 = s.add_param(0.0).unwrap();
    let p1 = s.add_point(x1, y1).unwrap();
    let p2 = s.add_point(x2, y2).unwrap();

    let dx = Expr::point_x(1) - Expr::point_x(0);
    let dy = Expr::point_y(1) - Expr::point_y(0);
    let eq = (dx.sqr() + dy.sqr()).sqrt() - Expr::constant(5.0);
    s.add_constraint(Constraint::general(eq).with_entities([p1, p2]))
        .unwrap();

    assert!(s.solve(TOLERANCE, MAX_STEPS));
    let dx = s.param(x2).unwrap() - s.param(x1).unwrap();
    let dy = s.param(y2).unwrap() - s.param(y1).unwrap();
    assert_nearly((dx * dx + dy * dy).sqrt(), 5.0);
}

#[test]
fn horizontal_line() {
    let mut s = Sketch::new();
    let x1 = s.add_param(0.0).unwrap();
    let y1 = s.add_param(0.0).unwrap();
    let x2 = s.add_param(10.0).unwrap();
    let y2 = s.add_param(3.0).unwrap();
    let p1 = s.add_point(x1, y1).unwrap();
    let p2 = s.add_point(x2, y2).unwrap();
    s.add_line(p1, p2).unwrap();

    // "Horizontal" is just equal y values.
    s.add_constraint(
        Constraint::general(Expr::point_y(0) - Expr::point_y(1)).with_entities([p1, p2]),
    )
    .unwrap();

    assert!(s.solve(TOLERANCE, MAX_STEPS));
    assert_nearly(s.param(y1).unwrap(), s.param(y2).unwrap());
    // Both ends meet in the middle.
    assert_nearly(s.param(y1).unwrap(), 1.5);
    // The x coordinates were never involved.
    assert_nearly(s.param(x1).unwrap(), 0.0);
    assert_nearly(s.param(x2).unwrap(), 10.0);
}

#[test]
fn point_on_circle() {
    let mut s = Sketch::new();
    let px = s.add_param(3.0).unwrap();
    let py = s.add_param(4.0).unwrap();
    let cx = s.add_param(0.0).unwrap();
    let cy = s.add_param(0.0).unwrap();
    let r = s.add_param(1.0).unwrap();
    let p = s.add_point(px, py).unwrap();
    let center = s.add_point(cx, cy).unwrap();
    let circle = s.add_circle(center, r).unwrap();

    // (px-cx)^2 + (py-cy)^2 - r^2 = 0
    let eq = (Expr::point_x(0) - Expr::point_x(1)).sqr()
        + (Expr::point_y(0) - Expr::point_y(1)).sqr()
        - Expr::circle_radius(2).sqr();
    s.add_constraint(Constraint::general(eq).with_entities([p, center, circle]))
        .unwrap();

    assert!(s.solve(TOLERANCE, MAX_STEPS));
    let dx = s.param(px).unwrap() - s.param(cx).unwrap();
    let dy = s.param(py).unwrap() - s.param(cy).unwrap();
    let r = s.param(r).unwrap();
    assert_nearly(dx * dx + dy * dy, r * r);
}

#[test]
fn overconstrained_inconsistent_pair() {
    let mut s = Sketch::new();
    let x = s.add_param(0.0).unwrap();
    let c1 = s
        .add_constraint(Constraint::general(Expr::param(x) - Expr::constant(1.0)))
        .unwrap();
    let c2 = s
        .add_constraint(Constraint::general(Expr::param(x) - Expr::constant(2.0)))
        .unwrap();

    let report = s.solve_with(SolveConfig::default());
    assert!(!report.converged());
    assert_eq!(report.iterations(), MAX_STEPS);
    // The redundant direction of the rank-1 normal matrix gets skipped.
    assert!(
        report
            .warnings()
            .iter()
            .any(|w| matches!(w.content, WarningContent::SmallPivot { .. }))
    );
    // The solver pins the pivoted equation exactly; the other is left over.
    assert_nearly(s.param(x).unwrap(), 1.0);
    assert_eq!(report.unsatisfied(), &[c2]);
    assert!(!report.unsatisfied().contains(&c1));
}

#[test]
fn singular_jacobian_row_is_skipped() {
    let mut s = Sketch::new();
    let x = s.add_param(0.0).unwrap();
    // 0 * x = 0: contributes an all-zero Jacobian row.
    s.add_constraint(Constraint::general(
        Expr::constant(0.0) * Expr::param(x),
    ))
    .unwrap();
    s.add_constraint(Constraint::general(Expr::param(x) - Expr::constant(7.0)))
        .unwrap();

    let report = s.solve_with(SolveConfig::default());
    assert!(report.converged());
    assert!(report.unsatisfied().is_empty());
    assert!(
        report
            .warnings()
            .iter()
            .any(|w| matches!(w.content, WarningContent::SmallPivot { row: 0, .. }))
    );
    assert_nearly(s.param(x).unwrap(), 7.0);
}

#[test]
fn empty_sketch_converges_without_iterating() {
    let mut s = Sketch::new();
    assert!(s.solve(TOLERANCE, MAX_STEPS));
    let report = s.solve_with(SolveConfig::default());
    assert!(report.converged());
    assert_eq!(report.iterations(), 0);
}

#[test]
fn constraints_without_parameters_converge_without_iterating() {
    let mut s = Sketch::new();
    // A constraint over nothing: there is no parameter to adjust.
    s.add_constraint(Constraint::general(Expr::constant(3.0))).unwrap();
    let report = s.solve_with(SolveConfig::default());
    assert!(report.converged());
    assert_eq!(report.iterations(), 0);
}

#[test]
fn already_satisfied_sketch_converges_without_stepping() {
    let mut s = Sketch::new();
    let x = s.add_param(5.0).unwrap();
    s.add_constraint(Constraint::general(Expr::param(x) - Expr::constant(5.0)))
        .unwrap();
    let report = s.solve_with(SolveConfig::default());
    assert!(report.converged());
    assert_eq!(report.iterations(), 0);
    assert_nearly(s.param(x).unwrap(), 5.0);
}

#[test]
fn max_steps_zero_only_tests_convergence() {
    let mut s = Sketch::new();
    let x = s.add_param(0.0).unwrap();
    s.add_constraint(Constraint::general(Expr::param(x) - Expr::constant(5.0)))
        .unwrap();
    assert!(!s.solve(TOLERANCE, 0));
    // No step was taken.
    assert_nearly(s.param(x).unwrap(), 0.0);
}

#[test]
fn solving_clears_the_outdated_link() {
    let mut s = Sketch::new();
    let x = s.add_param(0.0).unwrap();
    s.add_constraint(Constraint::general(Expr::param(x) - Expr::constant(1.0)))
        .unwrap();
    assert!(s.link_outdated());
    s.solve(TOLERANCE, MAX_STEPS);
    assert!(!s.link_outdated());
    s.remove_param(x);
    assert!(s.link_outdated());
}

#[test]
fn destroying_a_referenced_param_does_not_crash_the_solve() {
    let mut s = Sketch::new();
    let x = s.add_param(0.0).unwrap();
    let y = s.add_param(10.0).unwrap();
    // x + y - 3 = 0
    s.add_constraint(Constraint::general(
        Expr::param(x) + Expr::param(y) - Expr::constant(3.0),
    ))
    .unwrap();
    s.remove_param(y);

    // The dangling y subtree reads as 0, so this is now x - 3 = 0.
    assert!(s.solve(TOLERANCE, MAX_STEPS));
    assert_nearly(s.param(x).unwrap(), 3.0);
}

#[test]
fn rollback_restores_the_snapshot_on_failure() {
    let mut s = Sketch::new();
    let x = s.add_param(0.25).unwrap();
    s.add_constraint(Constraint::general(Expr::param(x) - Expr::constant(1.0)))
        .unwrap();
    s.add_constraint(Constraint::general(Expr::param(x) - Expr::constant(2.0)))
        .unwrap();

    let report = s.solve_with(SolveConfig {
        rollback_on_failure: true,
        ..SolveConfig::default()
    });
    assert!(!report.converged());
    // The failed solve left no trace on the parameter.
    assert_nearly(s.param(x).unwrap(), 0.25);
}

#[test]
fn solve_converging_implies_all_residuals_within_tolerance() {
    let mut s = Sketch::new();
    let x1 = s.add_param(0.0).unwrap();
    let y1 = s.add_param(2.0).unwrap();
    let x2 = s.add_param(4.0).unwrap();
    let y2 = s.add_param(-1.0).unwrap();
    let dx = Expr::param(x2) - Expr::param(x1);
    let dy = Expr::param(y2) - Expr::param(y1);
    s.add_constraint(Constraint::general(
        (dx.sqr() + dy.sqr()).sqrt() - Expr::constant(2.0),
    ))
    .unwrap();
    s.add_constraint(Constraint::general(Expr::param(y1) - Expr::param(y2)))
        .unwrap();

    assert!(s.solve(TOLERANCE, MAX_STEPS));
    for (_, residual) in s.residuals() {
        assert!(residual.abs() <= TOLERANCE, "residual was {residual}");
    }
}

#[test]
fn a_second_solve_reuses_the_link() {
    let mut s = Sketch::new();
    let x = s.add_param(0.0).unwrap();
    s.add_constraint(Constraint::general(Expr::param(x) - Expr::constant(1.0)))
        .unwrap();
    assert!(s.solve(TOLERANCE, MAX_STEPS));

    // Nudge the value and solve again without touching the structure.
    s.set_param(x, 40.0);
    assert!(!s.link_outdated());
    assert!(s.solve(TOLERANCE, MAX_STEPS));
    assert_nearly(s.param(x).unwrap(), 1.0);
}

#[test]
fn mixed_direct_and_slot_leaves() {
    // Pin a circle's radius to the distance between its center and a point,
    // mixing a direct param leaf with slot-indexed leaves.
    let mut s = Sketch::new();
    let px = s.add_param(6.0).unwrap();
    let py = s.add_param(0.0).unwrap();
    let cx = s.add_param(0.0).unwrap();
    let cy = s.add_param(0.0).unwrap();
    let r = s.add_param(2.0).unwrap();
    let p = s.add_point(px, py).unwrap();
    let center = s.add_point(cx, cy).unwrap();
    s.add_circle(center, r).unwrap();

    let dx = Expr::point_x(0) - Expr::point_x(1);
    let dy = Expr::point_y(0) - Expr::point_y(1);
    let eq = (dx.sqr() + dy.sqr()).sqrt() - Expr::param(r);
    s.add_constraint(Constraint::general(eq).with_entities([p, center]))
        .unwrap();

    assert!(s.solve(TOLERANCE, MAX_STEPS));
    let dx = s.param(px).unwrap() - s.param(cx).unwrap();
    let dy = s.param(py).unwrap() - s.param(cy).unwrap();
    assert_nearly((dx * dx + dy * dy).sqrt(), s.param(r).unwrap());
}
