//! Diagnostics that do not stop a solve.

use crate::ConstraintHandle;

/// Something suboptimal the solver noticed while linking or solving.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    /// The constraint this warning is about, if it is about one.
    pub about_constraint: Option<ConstraintHandle>,
    /// What was noticed.
    pub content: WarningContent,
}

/// The different things [`Warning`]s can report.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum WarningContent {
    /// Gaussian elimination met a pivot below the rank tolerance and skipped
    /// that row rather than dividing by it. The affected equation did not
    /// contribute to this step.
    SmallPivot {
        /// Which row of the normal matrix was skipped.
        row: usize,
        /// The pivot magnitude that was rejected.
        magnitude: f64,
    },
    /// An entity slot of a constraint no longer resolves to a live entity.
    StaleEntitySlot {
        /// Index into the constraint's entity slot array.
        slot: usize,
    },
    /// A parameter slot of a constraint no longer resolves to a live parameter.
    StaleParamSlot {
        /// Index into the constraint's parameter slot array.
        slot: usize,
    },
}

#[mutants::skip] // Advice text, nothing to mutate meaningfully.
impl std::fmt::Display for WarningContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningContent::SmallPivot { row, magnitude } => write!(
                f,
                "Row {row} of the normal equations has pivot magnitude {magnitude:e}, which is \
                 effectively zero. The row was skipped; the system is likely rank-deficient \
                 (redundant or degenerate constraints)."
            ),
            WarningContent::StaleEntitySlot { slot } => write!(
                f,
                "Entity slot {slot} refers to an entity that has been destroyed. Leaves indexing \
                 it will read as 0; you probably want to destroy or rebuild this constraint."
            ),
            WarningContent::StaleParamSlot { slot } => write!(
                f,
                "Parameter slot {slot} refers to a parameter that has been destroyed. Leaves \
                 indexing it will read as 0; you probably want to destroy or rebuild this \
                 constraint."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_the_slot() {
        let w = WarningContent::StaleEntitySlot { slot: 3 };
        assert!(w.to_string().contains("slot 3"));
        let w = WarningContent::SmallPivot {
            row: 2,
            magnitude: 1e-14,
        };
        assert!(w.to_string().contains("Row 2"));
    }
}
