//! Krylov solves through a backend's iterative entry point.

use crate::backends::{self, pysparse, trilinos};
use crate::convergence::{ConvergenceStatus, Suite};
use crate::error::{LsolverError, Result};
use crate::preconditioner::{self, PreconditionerKind};
use crate::tolerance::{CriterionTable, ScaleRule, ToleranceSpec};
use fvm_core::{ops, LinearSystem};
use log::{debug, warn};

/// Which native call runs the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterativeBackend {
    Pysparse(pysparse::Method),
    Trilinos(trilinos::AzSolver),
}

impl IterativeBackend {
    pub fn suite(&self) -> Suite {
        match self {
            IterativeBackend::Pysparse(_) => Suite::Pysparse,
            IterativeBackend::Trilinos(_) => Suite::Trilinos,
        }
    }

    pub fn criteria(&self) -> &'static CriterionTable {
        match self {
            IterativeBackend::Pysparse(_) => &pysparse::KRYLOV_CRITERIA,
            IterativeBackend::Trilinos(trilinos::AzSolver::Cg) => &trilinos::CG_CRITERIA,
            IterativeBackend::Trilinos(trilinos::AzSolver::Gmres) => &trilinos::GMRES_CRITERIA,
        }
    }

    pub fn preconditioners(&self) -> &'static [PreconditionerKind] {
        match self {
            IterativeBackend::Pysparse(_) => pysparse::KRYLOV_PRECONDITIONERS,
            IterativeBackend::Trilinos(_) => trilinos::KRYLOV_PRECONDITIONERS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IterativeSolver {
    name: &'static str,
    backend: IterativeBackend,
    tolerance: ToleranceSpec,
    rule: ScaleRule,
    max_iterations: usize,
    preconditioner: PreconditionerKind,
}

impl IterativeSolver {
    /// Validates the criterion and preconditioner against what the backend
    /// accepts.
    pub fn new(
        name: &'static str,
        backend: IterativeBackend,
        tolerance: ToleranceSpec,
        max_iterations: usize,
        preconditioner: PreconditionerKind,
    ) -> Result<Self> {
        tolerance.validate()?;
        preconditioner.validate()?;
        if !backends::supports(backend.preconditioners(), &preconditioner) {
            return Err(LsolverError::UnsupportedPreconditioner {
                preconditioner,
                solver: name,
            });
        }
        let rule = backend.criteria().resolve(tolerance.criterion, name)?;
        Ok(Self {
            name,
            backend,
            tolerance,
            rule,
            max_iterations,
            preconditioner,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn backend(&self) -> IterativeBackend {
        self.backend
    }

    pub fn preconditioner(&self) -> PreconditionerKind {
        self.preconditioner
    }

    /// One native call. `x` is updated in place.
    pub fn solve(&self, system: &mut LinearSystem<'_>) -> Result<ConvergenceStatus> {
        let suite = self.backend.suite();
        let (matrix, x, b) = system.parts_mut();

        let handle = match preconditioner::acquire(self.preconditioner, matrix) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    "{}: {} preconditioner setup failed: {}",
                    self.name,
                    self.preconditioner.name(),
                    e
                );
                let scale = self.rule.evaluate(matrix, x, b)?;
                let residual = ops::residual_norm(matrix, x, b)?;
                return Ok(ConvergenceStatus::from_native(
                    suite,
                    backends::setup_failure_code(suite),
                    0,
                    residual,
                    scale.relative(residual),
                ));
            }
        };

        let status = match self.backend {
            IterativeBackend::Pysparse(method) => {
                let scale = self.rule.evaluate(matrix, x, b)?;
                let threshold = self.tolerance.tolerance * scale.absolute;
                // itsolvers measure the residual against ‖b‖.
                let b_norm = ops::norm2(b);
                let (native_tol, reference) = if b_norm > 0.0 {
                    (threshold / b_norm, b_norm)
                } else {
                    (threshold, 1.0)
                };
                let out = pysparse::itsolve(
                    method,
                    matrix,
                    b,
                    x,
                    native_tol,
                    self.max_iterations,
                    handle.op(),
                );
                let residual = out.relres * reference;
                ConvergenceStatus::from_native(
                    suite,
                    out.info,
                    out.iter,
                    residual,
                    scale.relative(residual),
                )
            }
            IterativeBackend::Trilinos(solver) => {
                let conv = trilinos::AzConv::from_rule(self.rule);
                let options = trilinos::AztecOptions::new(solver, conv);
                let out = trilinos::iterate(
                    &options,
                    matrix,
                    x,
                    b,
                    self.max_iterations,
                    self.tolerance.tolerance,
                    handle.op(),
                );
                debug!(
                    "{}: AztecOO recursive residual {:e}, true residual {:e}, {} restarts",
                    self.name, out.rec_r, out.r, out.restarts
                );
                ConvergenceStatus::from_native(suite, out.why, out.its, out.r, out.scaled_r)
            }
        };
        handle.release();

        debug!("{}: {}", self.name, status);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::tridiagonal;
    use crate::convergence::StatusKind;
    use crate::preconditioner::handle_counts;
    use crate::tolerance::Criterion;
    use fvm_core::SparseMatrix;

    fn pcg(criterion: Criterion, preconditioner: PreconditionerKind) -> Result<IterativeSolver> {
        IterativeSolver::new(
            "pysparse PCG",
            IterativeBackend::Pysparse(pysparse::Method::Pcg),
            ToleranceSpec::new(1e-8, criterion),
            100,
            preconditioner,
        )
    }

    #[test]
    fn test_pysparse_pcg_with_ssor() {
        let a = tridiagonal(30, 2.5);
        let b = vec![1.0; 30];
        let mut x = vec![0.0; 30];
        let solver = pcg(Criterion::Default, PreconditionerKind::ssor()).unwrap();
        let mut system = LinearSystem::new(&a, &mut x, &b).unwrap();
        let status = solver.solve(&mut system).unwrap();
        assert!(status.is_converged(), "{}", status);
        assert!(status.iterations() > 0);
        assert!(system.residual_norm() <= 1e-8 * ops::norm2(&b) * 1.0001);
    }

    #[test]
    fn test_pysparse_unscaled_criterion_is_absolute() {
        let a = tridiagonal(10, 3.0);
        let b = vec![50.0; 10];
        let mut x = vec![0.0; 10];
        let solver = pcg(Criterion::Unscaled, PreconditionerKind::Jacobi).unwrap();
        let mut system = LinearSystem::new(&a, &mut x, &b).unwrap();
        let status = solver.solve(&mut system).unwrap();
        assert!(status.is_converged());
        assert!(status.residual() <= 1e-8);
        assert_eq!(status.scaled_residual(), status.residual());
    }

    #[test]
    fn test_unsupported_choices_fail_at_construction() {
        assert!(matches!(
            pcg(Criterion::Solution, PreconditionerKind::Identity),
            Err(LsolverError::UnsupportedCriterion { .. })
        ));
        assert!(matches!(
            pcg(Criterion::Default, PreconditionerKind::multilevel_dd()),
            Err(LsolverError::UnsupportedPreconditioner { .. })
        ));
        assert!(matches!(
            IterativeSolver::new(
                "trilinos GMRES",
                IterativeBackend::Trilinos(trilinos::AzSolver::Gmres),
                ToleranceSpec::new(1e-8, Criterion::Legacy),
                10,
                PreconditionerKind::Identity,
            ),
            Err(LsolverError::UnsupportedCriterion { .. })
        ));
    }

    #[test]
    fn test_setup_failure_leaves_x_untouched() {
        let a = SparseMatrix::from_dense(&[vec![0.0, 1.0], vec![1.0, 2.0]]);
        let b = vec![1.0, 1.0];
        let mut x = vec![0.25, 0.5];
        let solver = IterativeSolver::new(
            "trilinos CG",
            IterativeBackend::Trilinos(trilinos::AzSolver::Cg),
            ToleranceSpec::new(1e-8, Criterion::Default),
            10,
            PreconditionerKind::Jacobi,
        )
        .unwrap();
        let before = handle_counts();
        let status = solver
            .solve(&mut LinearSystem::new(&a, &mut x, &b).unwrap())
            .unwrap();
        assert_eq!(status.kind(), StatusKind::IllConditioned);
        assert_eq!(status.iterations(), 0);
        assert_eq!(x, vec![0.25, 0.5]);
        assert_eq!(handle_counts(), before);
    }

    #[test]
    fn test_handles_balance_after_solve() {
        let a = tridiagonal(12, 3.0);
        let b = vec![1.0; 12];
        let mut x = vec![0.0; 12];
        let solver = IterativeSolver::new(
            "trilinos GMRES",
            IterativeBackend::Trilinos(trilinos::AzSolver::Gmres),
            ToleranceSpec::new(1e-10, Criterion::Rhs),
            100,
            PreconditionerKind::MultilevelDd { block_size: 4 },
        )
        .unwrap();
        let before = handle_counts();
        let status = solver
            .solve(&mut LinearSystem::new(&a, &mut x, &b).unwrap())
            .unwrap();
        assert!(status.is_converged());
        let after = handle_counts();
        assert_eq!(after.acquired, before.acquired + 1);
        assert_eq!(after.outstanding(), before.outstanding());
    }
}
