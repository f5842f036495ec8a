use super::{
    initial_stop, precondition, reject_invalid, true_residual, Gmres, KrylovRun, SolveAlgorithm,
    StopReason,
};
use crate::preconditioner::PreconditionerOp;
use fvm_core::{ops, SparseMatrix};
use log::{debug, warn};

/// Below this the next Arnoldi vector is treated as zero (lucky breakdown).
const ARNOLDI_FLOOR: f64 = 1e-300;

/// Restarted GMRES with right preconditioning.
///
/// Each Arnoldi step counts as one iteration. The residual reported at the
/// end of every cycle is the true residual `‖b - A x‖₂`.
impl SolveAlgorithm for Gmres {
    fn name(&self) -> &'static str {
        "GMRES"
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
        let m = self.restart.clamp(1, n.max(1));

        let mut r = vec![0.0; n];
        let mut beta = true_residual(matrix, b, x, &mut r);
        debug!("GMRES initial residual norm: {:e}", beta);
        if let Some(stop) = initial_stop(beta, self.threshold.at(x), self.max_iterations) {
            return KrylovRun::new(0, beta, stop);
        }

        let mut total = 0;
        loop {
            if total >= self.max_iterations {
                return KrylovRun::new(total, beta, StopReason::IterationLimit);
            }
            let threshold = self.threshold.at(x);

            // Arnoldi basis, preconditioned directions and Hessenberg columns.
            let mut v: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
            let mut z: Vec<Vec<f64>> = Vec::with_capacity(m);
            let mut h = vec![vec![0.0; m + 1]; m];
            let mut g = vec![0.0; m + 1];
            let mut cs = vec![0.0; m];
            let mut sn = vec![0.0; m];

            v.push(r.iter().map(|ri| ri / beta).collect());
            g[0] = beta;

            let mut k = 0;
            while k < m && total < self.max_iterations {
                let mut zk = vec![0.0; n];
                precondition(precon, &v[k], &mut zk);
                let mut w = vec![0.0; n];
                matrix.spmv_unchecked(&zk, &mut w);
                z.push(zk);

                // Modified Gram-Schmidt
                for j in 0..=k {
                    let hjk = ops::dot(&v[j], &w);
                    h[k][j] = hjk;
                    ops::axpy(-hjk, &v[j], &mut w);
                }
                let w_norm = ops::norm2(&w);
                h[k][k + 1] = w_norm;

                for j in 0..k {
                    let temp = cs[j] * h[k][j] + sn[j] * h[k][j + 1];
                    h[k][j + 1] = -sn[j] * h[k][j] + cs[j] * h[k][j + 1];
                    h[k][j] = temp;
                }

                let denom = h[k][k].hypot(h[k][k + 1]);
                if denom == 0.0 || !denom.is_finite() {
                    warn!("GMRES breakdown at iteration {}: singular Hessenberg", total + 1);
                    return KrylovRun::new(total, beta, StopReason::Breakdown);
                }
                cs[k] = h[k][k] / denom;
                sn[k] = h[k][k + 1] / denom;
                h[k][k] = denom;
                h[k][k + 1] = 0.0;

                g[k + 1] = -sn[k] * g[k];
                g[k] *= cs[k];

                total += 1;
                k += 1;

                if g[k].abs() <= threshold || w_norm <= ARNOLDI_FLOOR {
                    break;
                }
                v.push(w.iter().map(|wi| wi / w_norm).collect());
            }

            // Solve the upper triangular system H y = g.
            let mut y = vec![0.0; k];
            for i in (0..k).rev() {
                let mut sum = g[i];
                for j in (i + 1)..k {
                    sum -= h[j][i] * y[j];
                }
                y[i] = sum / h[i][i];
            }

            // x = x + Z y
            for (zi, &yi) in z.iter().zip(y.iter()) {
                ops::axpy(yi, zi, x);
            }

            beta = true_residual(matrix, b, x, &mut r);
            if !beta.is_finite() {
                return KrylovRun::new(total, beta, StopReason::NonFinite);
            }
            if beta <= self.threshold.at(x) {
                debug!("GMRES converged in {} iterations, residual {:e}", total, beta);
                return KrylovRun::new(total, beta, StopReason::Converged);
            }
            debug!("GMRES restart after {} iterations, residual {:e}", total, beta);
        }
    }
}
