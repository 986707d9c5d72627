//! Dense Gaussian elimination with partial pivoting.
//!
//! Matrices are square, stored column-major: entry (row, col) lives at
//! `col * m + row`. Rank deficiency is expected here (redundant constraints
//! produce it routinely), so a pivot below [`PIVOT_EPSILON`] does not abort
//! the solve: the row is skipped, reported through the caller's callback,
//! and its unknown stays zero in back substitution.

/// Pivots smaller than this are treated as zero.
pub(crate) const PIVOT_EPSILON: f64 = 1e-10;

#[inline]
fn at(row: usize, col: usize, m: usize) -> usize {
    col * m + row
}

/// Forward elimination of `a` (m×m, column-major) and `rhs`, with partial
/// pivoting. `on_small_pivot(row, magnitude)` is called for each pivot row
/// that is skipped.
pub(crate) fn eliminate(
    a: &mut [f64],
    rhs: &mut [f64],
    m: usize,
    mut on_small_pivot: impl FnMut(usize, f64),
) {
    debug_assert_eq!(a.len(), m * m);
    debug_assert_eq!(rhs.len(), m);
    for k in 0..m {
        // Pick the largest pivot candidate at or below the diagonal.
        let mut p = k;
        let mut best = a[at(k, k, m)].abs();
        for t in (k + 1)..m {
            let v = a[at(t, k, m)].abs();
            if v > best {
                best = v;
                p = t;
            }
        }
        if best < PIVOT_EPSILON {
            on_small_pivot(k, best);
            continue;
        }
        if p != k {
            for col in 0..m {
                a.swap(at(k, col, m), at(p, col, m));
            }
            rhs.swap(k, p);
        }
        let pivot = a[at(k, k, m)];
        for t in (k + 1)..m {
            let coeff = a[at(t, k, m)] / pivot;
            for col in k..m {
                a[at(t, col, m)] -= coeff * a[at(k, col, m)];
            }
            rhs[t] -= coeff * rhs[k];
        }
    }
}

/// Back substitution over the eliminated system. Rows whose diagonal is
/// below [`PIVOT_EPSILON`] are skipped; their unknown stays zero.
pub(crate) fn back_substitute(a: &[f64], rhs: &[f64], y: &mut [f64], m: usize) {
    debug_assert_eq!(a.len(), m * m);
    debug_assert_eq!(rhs.len(), m);
    debug_assert_eq!(y.len(), m);
    y.fill(0.0);
    for k in (0..m).rev() {
        let pivot = a[at(k, k, m)];
        if pivot.abs() < PIVOT_EPSILON {
            continue;
        }
        let mut acc = rhs[k];
        for l in (k + 1)..m {
            acc -= y[l] * a[at(k, l, m)];
        }
        y[k] = acc / pivot;
    }
}
