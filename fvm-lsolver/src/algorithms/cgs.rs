use super::{
    initial_stop, precondition, reject_invalid, true_residual, ConjugateGradientSquared,
    KrylovRun, SolveAlgorithm, StopReason,
};
use crate::preconditioner::PreconditionerOp;
use fvm_core::{ops, SparseMatrix};
use log::{debug, warn};

/// Preconditioned conjugate gradient squared. Works for nonsymmetric `A`.
impl SolveAlgorithm for ConjugateGradientSquared {
    fn name(&self) -> &'static str {
        "CGS"
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
        debug!("CGS initial residual norm: {:e}", residual);
        if let Some(stop) = initial_stop(residual, self.threshold.at(x), self.max_iterations) {
            return KrylovRun::new(0, residual, stop);
        }

        let r_shadow = r.clone();
        let mut u = vec![0.0; n];
        let mut p = vec![0.0; n];
        let mut q = vec![0.0; n];
        let mut p_hat = vec![0.0; n];
        let mut v_hat = vec![0.0; n];
        let mut u_hat = vec![0.0; n];
        let mut q_hat = vec![0.0; n];
        let mut work = vec![0.0; n];
        let mut rho_prev = 1.0;

        for k in 1..=self.max_iterations {
            let rho = ops::dot(&r_shadow, &r);
            if rho == 0.0 || !rho.is_finite() {
                warn!("CGS breakdown at iteration {}: rho = {:e}", k, rho);
                return KrylovRun::new(k - 1, residual, StopReason::Breakdown);
            }

            if k == 1 {
                u.copy_from_slice(&r);
                p.copy_from_slice(&u);
            } else {
                let beta = rho / rho_prev;
                // u = r + beta q
                for i in 0..n {
                    u[i] = r[i] + beta * q[i];
                }
                // p = u + beta (q + beta p)
                for i in 0..n {
                    p[i] = u[i] + beta * (q[i] + beta * p[i]);
                }
            }

            precondition(precon, &p, &mut p_hat);
            matrix.spmv_unchecked(&p_hat, &mut v_hat);
            let sigma = ops::dot(&r_shadow, &v_hat);
            if sigma == 0.0 || !sigma.is_finite() {
                warn!("CGS breakdown at iteration {}: sigma = {:e}", k, sigma);
                return KrylovRun::new(k - 1, residual, StopReason::Breakdown);
            }
            let alpha = rho / sigma;

            // q = u - alpha v_hat
            for i in 0..n {
                q[i] = u[i] - alpha * v_hat[i];
            }
            for i in 0..n {
                work[i] = u[i] + q[i];
            }
            precondition(precon, &work, &mut u_hat);

            ops::axpy(alpha, &u_hat, x);
            matrix.spmv_unchecked(&u_hat, &mut q_hat);
            ops::axpy(-alpha, &q_hat, &mut r);

            residual = ops::norm2(&r);
            if !residual.is_finite() {
                return KrylovRun::new(k, residual, StopReason::NonFinite);
            }
            if residual <= self.threshold.at(x) {
                debug!("CGS converged in {} iterations, residual {:e}", k, residual);
                return KrylovRun::new(k, residual, StopReason::Converged);
            }
            rho_prev = rho;
        }

        debug!(
            "CGS reached maximum iterations ({}), residual {:e}",
            self.max_iterations, residual
        );
        KrylovRun::new(self.max_iterations, residual, StopReason::IterationLimit)
    }
}
