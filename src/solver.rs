//! The numeric solver: relinking, normal equations, Gauss–Newton iteration.
//!
//! A solve works on a *linked* snapshot of the sketch: dense vectors of the
//! live constraints and live parameters, fixed in slot order, plus one row
//! of symbolic partial derivatives per constraint. The snapshot is rebuilt
//! (relinked) whenever constraints, entities or parameters have been added
//! or removed since the last solve.

use crate::constraint::SolverRow;
use crate::expr::{Expr, Scope};
use crate::warnings::{Warning, WarningContent};
use crate::{ConstraintHandle, ParamHandle, Sketch};

mod gauss;

/// Tuning knobs for [`Sketch::solve_with`].
#[derive(Clone, Copy, Debug)]
pub struct SolveConfig {
    /// A constraint counts as satisfied when `|residual| <= tolerance`.
    pub tolerance: f64,
    /// Inclusive upper bound on Gauss–Newton steps. Zero means "test
    /// convergence only, do not step".
    pub max_steps: usize,
    /// Restore the pre-solve parameter values if the solve does not
    /// converge. Off by default: parameters are then left wherever the last
    /// step put them, which is often a useful least-squares compromise.
    pub rollback_on_failure: bool,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_steps: 32,
            rollback_on_failure: false,
        }
    }
}

/// What a solve did and found.
#[derive(Debug)]
#[non_exhaustive]
pub struct SolveReport {
    pub(crate) converged: bool,
    pub(crate) iterations: usize,
    pub(crate) unsatisfied: Vec<ConstraintHandle>,
    pub(crate) warnings: Vec<Warning>,
}

impl SolveReport {
    /// Did every live constraint end within tolerance?
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// How many Gauss–Newton steps were taken.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Constraints whose final residual exceeds the tolerance.
    pub fn unsatisfied(&self) -> &[ConstraintHandle] {
        &self.unsatisfied
    }

    /// Diagnostics collected while linking and solving.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// The solver-owned scratch, sized at relink time and reused across
/// iterations.
#[derive(Debug, Default)]
pub(crate) struct Linked {
    /// Live constraints in slot order; row i of the system.
    pub(crate) live_constraints: Vec<ConstraintHandle>,
    /// Live parameters in slot order; column j of the Jacobian.
    pub(crate) live_params: Vec<ParamHandle>,
    /// The m×m normal matrix J·Jᵀ, column-major.
    pub(crate) normal: Vec<f64>,
    /// Intermediate solution of the eliminated normal system.
    pub(crate) solution: Vec<f64>,
    /// Residual vector; consumed as the elimination right-hand side.
    pub(crate) rhs: Vec<f64>,
    /// Correction accumulator, one slot per live parameter.
    pub(crate) delta: Vec<f64>,
    /// Parameter snapshot taken at the start of each solve.
    pub(crate) saved_params: Vec<f64>,
    /// Stale-slot diagnostics from the last relink.
    pub(crate) lint: Vec<Warning>,
}

impl Sketch {
    /// Adjust the sketch's parameters until every constraint's residual is
    /// within `tolerance`, taking at most `max_steps` Gauss–Newton steps.
    ///
    /// Returns whether the sketch converged. Parameters are mutated in
    /// place either way; use [`Sketch::solve_with`] for rollback-on-failure
    /// and for the full [`SolveReport`].
    pub fn solve(&mut self, tolerance: f64, max_steps: usize) -> bool {
        self.solve_with(SolveConfig {
            tolerance,
            max_steps,
            ..SolveConfig::default()
        })
        .converged()
    }

    /// Like [`Sketch::solve`], with tuning knobs and a detailed report.
    ///
    /// Each iteration evaluates all residuals, checks convergence, then
    /// evaluates the Jacobian from the symbolic partials, forms the normal
    /// equations `(J·Jᵀ) y = r`, solves them by Gaussian elimination with
    /// partial pivoting (skipping near-zero pivots), and applies the
    /// correction `paramⱼ -= Σᵢ yᵢ·J[i,j]`. There is no damping, line
    /// search or trust region.
    ///
    /// A sketch with no live constraints or no live parameters converges
    /// immediately.
    pub fn solve_with(&mut self, config: SolveConfig) -> SolveReport {
        if self.link_outdated {
            self.relink();
        }
        let mut warnings = self.linked.lint.clone();

        let m = self.linked.live_constraints.len();
        let n = self.linked.live_params.len();

        // Snapshot for a possible rollback.
        {
            let Linked {
                live_params,
                saved_params,
                ..
            } = &mut self.linked;
            for (j, &h) in live_params.iter().enumerate() {
                saved_params[j] = self.params.get(h).map_or(0.0, |p| p.value);
            }
        }

        let mut iterations = 0;
        let mut small_pivot_rows: Vec<usize> = Vec::new();
        let converged = if m == 0 || n == 0 {
            true
        } else {
            loop {
                let worst = self.refresh_residuals();
                if worst <= config.tolerance {
                    break true;
                }
                if iterations == config.max_steps {
                    break false;
                }
                self.refresh_jacobian();
                self.assemble_normal();
                {
                    let Linked {
                        normal,
                        rhs,
                        solution,
                        ..
                    } = &mut self.linked;
                    gauss::eliminate(normal, rhs, m, |row, magnitude| {
                        // Report each degenerate row once per solve, not per step.
                        if !small_pivot_rows.contains(&row) {
                            small_pivot_rows.push(row);
                            warnings.push(Warning {
                                about_constraint: None,
                                content: WarningContent::SmallPivot { row, magnitude },
                            });
                        }
                    });
                    gauss::back_substitute(normal, rhs, solution, m);
                }
                self.apply_correction();
                iterations += 1;
            }
        };

        if !converged && config.rollback_on_failure {
            let Linked {
                live_params,
                saved_params,
                ..
            } = &self.linked;
            for (j, &h) in live_params.iter().enumerate() {
                if let Some(p) = self.params.get_mut(h) {
                    p.value = saved_params[j];
                }
            }
        }

        // Leave the stored residuals describing the final parameter values.
        self.refresh_residuals();
        let unsatisfied = self.collect_unsatisfied(config.tolerance);
        SolveReport {
            converged,
            iterations,
            unsatisfied,
            warnings,
        }
    }

    /// Rebuild the dense solver view: live vectors, symbolic Jacobian rows,
    /// and the scratch buffers, all sized to the current live counts.
    fn relink(&mut self) {
        // Old scratch goes first; the derivative rows are replaced below.
        self.linked = Linked::default();

        let live_constraints: Vec<ConstraintHandle> =
            self.constraints.iter().map(|(h, _)| h).collect();
        let live_params: Vec<ParamHandle> = self.params.iter().map(|(h, _)| h).collect();
        let m = live_constraints.len();
        let n = live_params.len();

        let mut lint = Vec::new();
        for &ch in &live_constraints {
            let Some(c) = self.constraints.get(ch) else {
                continue;
            };
            for (slot, &eh) in c.entities.iter().enumerate() {
                if !self.entities.contains(eh) {
                    lint.push(Warning {
                        about_constraint: Some(ch),
                        content: WarningContent::StaleEntitySlot { slot },
                    });
                }
            }
            for (slot, &ph) in c.params.iter().enumerate() {
                if !self.params.contains(ph) {
                    lint.push(Warning {
                        about_constraint: Some(ch),
                        content: WarningContent::StaleParamSlot { slot },
                    });
                }
            }
            // Bind slot-indexed leaves to the parameters they currently
            // resolve to, so differentiation can see through them.
            let bound = c.eq.bind(&self.entities, c);
            let dervs: Vec<Expr> = live_params.iter().map(|&p| bound.derivative(p)).collect();
            if let Some(c) = self.constraints.get_mut(ch) {
                c.row = SolverRow {
                    residual: 0.0,
                    dervs,
                    derv_vals: vec![0.0; n],
                };
            }
        }

        self.linked = Linked {
            live_constraints,
            live_params,
            normal: vec![0.0; m * m],
            solution: vec![0.0; m],
            rhs: vec![0.0; m],
            delta: vec![0.0; n],
            saved_params: vec![0.0; n],
            lint,
        };
        self.link_outdated = false;
    }

    /// Evaluate every live residual into its row and the rhs vector.
    /// Returns the largest absolute residual.
    fn refresh_residuals(&mut self) -> f64 {
        let mut worst = 0.0f64;
        let Linked {
            live_constraints,
            rhs,
            ..
        } = &mut self.linked;
        for (i, &ch) in live_constraints.iter().enumerate() {
            let r = match self.constraints.get(ch) {
                Some(c) => c.eq.eval(&self.params, &self.entities, &Scope::In(c)),
                None => 0.0,
            };
            if let Some(c) = self.constraints.get_mut(ch) {
                c.row.residual = r;
            }
            if let Some(slot) = rhs.get_mut(i) {
                *slot = r;
            }
            worst = worst.max(r.abs());
        }
        worst
    }

    /// Evaluate every symbolic partial into the per-constraint value rows.
    fn refresh_jacobian(&mut self) {
        for &ch in &self.linked.live_constraints {
            let Some(c) = self.constraints.get_mut(ch) else {
                continue;
            };
            let row = &mut c.row;
            for j in 0..row.dervs.len() {
                // Derivative trees are fully bound: no slot-indexed leaves left.
                let v = row.dervs[j].eval(&self.params, &self.entities, &Scope::Free);
                row.derv_vals[j] = v;
            }
        }
    }

    /// Form the normal matrix `N[r,c] = Σⱼ J[r,j]·J[c,j]`, column-major.
    #[allow(clippy::float_cmp)] // exact-zero short-circuit, not a tolerance test
    fn assemble_normal(&mut self) {
        let Linked {
            live_constraints,
            normal,
            ..
        } = &mut self.linked;
        let m = live_constraints.len();
        normal.fill(0.0);
        for col in 0..m {
            let Some(cc) = self.constraints.get(live_constraints[col]) else {
                continue;
            };
            for row in 0..m {
                let Some(cr) = self.constraints.get(live_constraints[row]) else {
                    continue;
                };
                let mut acc = 0.0;
                for (a, b) in cr.row.derv_vals.iter().zip(&cc.row.derv_vals) {
                    // Jacobians here are sparse in practice; skip exact zeros.
                    if *a == 0.0 || *b == 0.0 {
                        continue;
                    }
                    acc += a * b;
                }
                normal[col * m + row] = acc;
            }
        }
    }

    /// Apply the correction `paramⱼ -= Σᵢ yᵢ·J[i,j]`.
    fn apply_correction(&mut self) {
        let Linked {
            live_constraints,
            live_params,
            solution,
            delta,
            ..
        } = &mut self.linked;
        delta.fill(0.0);
        for (i, &ch) in live_constraints.iter().enumerate() {
            let y = solution[i];
            let Some(c) = self.constraints.get(ch) else {
                continue;
            };
            for (d, v) in delta.iter_mut().zip(&c.row.derv_vals) {
                *d += y * v;
            }
        }
        for (j, &ph) in live_params.iter().enumerate() {
            if let Some(p) = self.params.get_mut(ph) {
                p.value -= delta[j];
            }
        }
    }

    /// Live constraints whose stored residual exceeds `tolerance`.
    fn collect_unsatisfied(&self, tolerance: f64) -> Vec<ConstraintHandle> {
        self.linked
            .live_constraints
            .iter()
            .copied()
            .filter(|&ch| match self.constraints.get(ch) {
                Some(c) => c.row.residual.abs() > tolerance,
                None => false,
            })
            .collect()
    }
}
