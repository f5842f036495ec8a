//! Direct solves wrapped in iterative refinement.
//!
//! The matrix is factorized once per solve. Each step computes the residual
//! `r = L x - b`, stops if it meets the tolerance, and otherwise applies the
//! correction `x -= L⁻¹ r` using the cached factor.

use crate::algorithms::{Factorization, Factorizer, StopReason};
use crate::backends;
use crate::convergence::{ConvergenceStatus, Suite};
use crate::error::{LsolverError, Result};
use crate::preconditioner::PreconditionerKind;
use crate::tolerance::{CriterionTable, ScaleRule, ToleranceSpec};
use fvm_core::{ops, LinearSystem, SparseMatrix};
use log::{debug, info, warn};
use std::borrow::Cow;

/// Per-suite behaviour of the correction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionPolicy {
    pub suite: Suite,
    /// Divide `L` and `b` by `max |diag(L)|` before factorizing.
    pub prescale: bool,
    /// Upper bound on correction steps regardless of configuration.
    pub iteration_cap: Option<usize>,
}

#[derive(Debug)]
pub struct ResidualCorrectionSolver<F: Factorizer> {
    name: &'static str,
    factorizer: F,
    policy: CorrectionPolicy,
    tolerance: ToleranceSpec,
    rule: ScaleRule,
    max_iterations: usize,
}

impl<F: Factorizer> ResidualCorrectionSolver<F> {
    /// Checks the criterion against `criteria` and rejects any preconditioner
    /// but the identity.
    pub fn new(
        name: &'static str,
        factorizer: F,
        policy: CorrectionPolicy,
        criteria: &CriterionTable,
        tolerance: ToleranceSpec,
        max_iterations: usize,
        preconditioner: PreconditionerKind,
    ) -> Result<Self> {
        tolerance.validate()?;
        if preconditioner != PreconditionerKind::Identity {
            return Err(LsolverError::UnsupportedPreconditioner {
                preconditioner,
                solver: name,
            });
        }
        let rule = criteria.resolve(tolerance.criterion, name)?;
        Ok(Self {
            name,
            factorizer,
            policy,
            tolerance,
            rule,
            max_iterations,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Correction steps this solver will attempt at most.
    pub fn iteration_limit(&self) -> usize {
        match self.policy.iteration_cap {
            Some(cap) => self.max_iterations.min(cap),
            None => self.max_iterations,
        }
    }

    pub fn solve(&self, system: &mut LinearSystem<'_>) -> Result<ConvergenceStatus> {
        let (matrix, x, b) = system.parts_mut();
        let n = b.len();

        let (l, rhs, unit) = self.prescaled(matrix, b);
        let scale = self.rule.evaluate(&l, x, &rhs)?;
        let threshold = scale.threshold(self.tolerance.tolerance, &rhs);
        let limit = self.iteration_limit();

        let mut r = vec![0.0; n];
        let factor = match self.factorizer.factorize(&l) {
            Ok(factor) => factor,
            Err(e) => {
                warn!("{}: factorization failed: {}", self.name, e);
                ops::residual_into(&l, x, &rhs, &mut r)?;
                let residual = ops::norm2(&r);
                let relative = scale.relative(residual);
                return Ok(self.status(StopReason::Singular, 0, residual, unit, relative));
            }
        };

        let mut delta = vec![0.0; n];
        let mut corrections = 0;
        let (stop, residual) = loop {
            ops::residual_into(&l, x, &rhs, &mut r)?;
            let residual = ops::norm2(&r);
            if !residual.is_finite() {
                break (StopReason::NonFinite, residual);
            }
            // A zero budget ends at the limit even when x₀ already converges.
            if limit == 0 {
                break (StopReason::IterationLimit, residual);
            }
            if residual <= threshold.at(x) {
                break (StopReason::Converged, residual);
            }
            if corrections == limit {
                break (StopReason::IterationLimit, residual);
            }
            if let Err(e) = factor.solve(&r, &mut delta) {
                warn!("{}: back substitution failed: {}", self.name, e);
                break (StopReason::Breakdown, residual);
            }
            ops::axpy(-1.0, &delta, x);
            corrections += 1;
        };

        let status = self.status(stop, corrections, residual, unit, scale.relative(residual));
        debug!("{}: {}", self.name, status);
        Ok(status)
    }

    /// Returns the system to factorize and the factor that converts its
    /// residuals back to the caller's units.
    fn prescaled<'m>(
        &self,
        matrix: &'m SparseMatrix,
        b: &'m [f64],
    ) -> (Cow<'m, SparseMatrix>, Cow<'m, [f64]>, f64) {
        if !self.policy.prescale {
            return (Cow::Borrowed(matrix), Cow::Borrowed(b), 1.0);
        }
        let d = matrix.max_abs_diagonal();
        if !(d > 0.0) || !d.is_finite() {
            warn!(
                "{}: largest diagonal magnitude is {}, skipping prescaling",
                self.name, d
            );
            return (Cow::Borrowed(matrix), Cow::Borrowed(b), 1.0);
        }
        info!("{}: prescaling system by 1/{:e}", self.name, d);
        let scaled_b: Vec<f64> = b.iter().map(|v| v / d).collect();
        (Cow::Owned(matrix.scaled(1.0 / d)), Cow::Owned(scaled_b), d)
    }

    fn status(
        &self,
        stop: StopReason,
        corrections: usize,
        residual: f64,
        unit: f64,
        scaled_residual: f64,
    ) -> ConvergenceStatus {
        let suite = self.policy.suite;
        ConvergenceStatus::from_native(
            suite,
            backends::native_code(suite, stop, corrections),
            corrections,
            residual * unit,
            scaled_residual,
        )
    }
}
