use super::{
    initial_stop, precondition, reject_invalid, true_residual, ConjugateGradient, KrylovRun,
    SolveAlgorithm, StopReason,
};
use crate::preconditioner::PreconditionerOp;
use fvm_core::{ops, SparseMatrix};
use log::{debug, warn};

/// Preconditioned conjugate gradient for symmetric positive definite `A`.
///
/// The residual tracked is the recursive one; callers that need the true
/// residual recompute it.
impl SolveAlgorithm for ConjugateGradient {
    fn name(&self) -> &'static str {
        "CG"
    }

    fn solve(
        &self,
        matrix: &SparseMatrix,
        b: &[f64],
        x: &mut [f64],
        precon: Option<&dyn PreconditionerOp>,
    ) -> KrylovRun {
        if let Some(run) = reject_invalid(b, x) {
            return run;
        }
        let n = b.len();

        let mut r = vec![0.0; n];
        let mut residual = true_residual(matrix, b, x, &mut r);
        debug!("CG initial residual norm: {:e}", residual);
        if let Some(stop) = initial_stop(residual, self.threshold.at(x), self.max_iterations) {
            return KrylovRun::new(0, residual, stop);
        }

        let mut z = vec![0.0; n];
        precondition(precon, &r, &mut z);
        let mut rz = ops::dot(&r, &z);
        if !(rz > 0.0) {
            warn!("CG: preconditioner is not positive definite (r.z = {:e})", rz);
            return KrylovRun::new(0, residual, StopReason::IndefinitePreconditioner);
        }

        let mut p = z.clone();
        let mut q = vec![0.0; n];

        for k in 1..=self.max_iterations {
            // q = A p
            matrix.spmv_unchecked(&p, &mut q);
            let pq = ops::dot(&p, &q);
            if !pq.is_finite() {
                return KrylovRun::new(k - 1, residual, StopReason::NonFinite);
            }
            if pq <= 0.0 {
                warn!("CG: p.Ap = {:e} at iteration {}, matrix is not SPD", pq, k);
                return KrylovRun::new(k - 1, residual, StopReason::IndefiniteMatrix);
            }
            let alpha = rz / pq;

            ops::axpy(alpha, &p, x);
            ops::axpy(-alpha, &q, &mut r);

            residual = ops::norm2(&r);
            if !residual.is_finite() {
                return KrylovRun::new(k, residual, StopReason::NonFinite);
            }
            if residual <= self.threshold.at(x) {
                debug!("CG converged in {} iterations, residual {:e}", k, residual);
                return KrylovRun::new(k, residual, StopReason::Converged);
            }

            precondition(precon, &r, &mut z);
            let rz_new = ops::dot(&r, &z);
            if rz_new == 0.0 {
                return KrylovRun::new(k, residual, StopReason::Breakdown);
            }
            if !(rz_new > 0.0) {
                warn!("CG: preconditioner is not positive definite at iteration {}", k);
                return KrylovRun::new(k, residual, StopReason::IndefinitePreconditioner);
            }
            let beta = rz_new / rz;
            rz = rz_new;

            // p = z + beta * p
            ops::xpby(&z, beta, &mut p);
        }

        debug!(
            "CG reached maximum iterations ({}), residual {:e}",
            self.max_iterations, residual
        );
        KrylovRun::new(self.max_iterations, residual, StopReason::IterationLimit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::{residual, tridiagonal};
    use crate::tolerance::Threshold;
    use fvm_core::SparseMatrix;

    fn cg(max_iterations: usize, threshold: f64) -> ConjugateGradient {
        ConjugateGradient::with_params(Threshold::Fixed(threshold), max_iterations)
    }

    #[test]
    fn test_cg_solves_spd_system() {
        let a = SparseMatrix::from_dense(&[
            vec![4.0, -1.0, 0.0],
            vec![-1.0, 4.0, -1.0],
            vec![0.0, -1.0, 4.0],
        ]);
        let b = vec![1.0, 2.0, 3.0];
        let mut x = vec![0.0; 3];
        let run = cg(100, 1e-12).solve(&a, &b, &mut x, None);
        assert_eq!(run.stop, StopReason::Converged);
        assert!(run.iterations <= 3);
        let expected = [0.4642857142857143, 0.8571428571428571, 0.9642857142857143];
        for (xi, ei) in x.iter().zip(expected.iter()) {
            assert!((xi - ei).abs() < 1e-10, "got {}, expected {}", xi, ei);
        }
    }

    #[test]
    fn test_cg_exact_initial_guess_takes_no_iterations() {
        let a = tridiagonal(5, 3.0);
        let x_true = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut b = vec![0.0; 5];
        a.spmv(&x_true, &mut b).unwrap();
        let mut x = x_true.clone();
        let run = cg(10, 1e-12).solve(&a, &b, &mut x, None);
        assert_eq!(run.iterations, 0);
        assert_eq!(run.stop, StopReason::Converged);
    }

    #[test]
    fn test_cg_zero_budget_stops_at_limit_even_when_exact() {
        let a = tridiagonal(4, 3.0);
        let x_true = vec![1.0, 0.0, 0.0, 1.0];
        let mut b = vec![0.0; 4];
        a.spmv(&x_true, &mut b).unwrap();
        let mut x = x_true.clone();
        let run = cg(0, 1e-12).solve(&a, &b, &mut x, None);
        assert_eq!(run.stop, StopReason::IterationLimit);
        assert_eq!(run.iterations, 0);
        assert_eq!(run.residual, 0.0);
        assert_eq!(x, x_true);
    }

    #[test]
    fn test_cg_defaults() {
        let cg = ConjugateGradient::new();
        assert_eq!(cg.threshold, Threshold::Fixed(1e-6));
        assert_eq!(cg.max_iterations, 1000);
        assert_eq!(cg.name(), "CG");
    }

    #[test]
    fn test_cg_iteration_limit() {
        let a = tridiagonal(50, 2.0);
        let b = vec![1.0; 50];
        let mut x = vec![0.0; 50];
        let run = cg(3, 1e-14).solve(&a, &b, &mut x, None);
        assert_eq!(run.stop, StopReason::IterationLimit);
        assert_eq!(run.iterations, 3);
        assert!(residual(&a, &x, &b) < 50.0_f64.sqrt());
    }

    #[test]
    fn test_cg_detects_indefinite_matrix() {
        let a = SparseMatrix::from_dense(&[vec![1.0, 0.0], vec![0.0, -1.0]]);
        let b = vec![0.0, 1.0];
        let mut x = vec![0.0; 2];
        let run = cg(10, 1e-12).solve(&a, &b, &mut x, None);
        assert_eq!(run.stop, StopReason::IndefiniteMatrix);
    }

    #[test]
    fn test_cg_rejects_nan_rhs() {
        let a = tridiagonal(3, 4.0);
        let mut x = vec![0.0; 3];
        let run = cg(10, 1e-12).solve(&a, &[1.0, f64::NAN, 0.0], &mut x, None);
        assert_eq!(run.stop, StopReason::InvalidInput);
        assert_eq!(x, vec![0.0; 3]);
    }
}
