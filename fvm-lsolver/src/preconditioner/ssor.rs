use super::PreconditionerOp;
use crate::error::PreconditionerError;
use fvm_core::SparseMatrix;

/// Symmetric SOR.
///
/// `M = (D + ωL) D⁻¹ (D + ωU) / (ω (2 - ω))`, applied as a forward sweep,
/// a diagonal scaling and a backward sweep.
#[derive(Debug)]
pub struct Ssor<'a> {
    matrix: &'a SparseMatrix,
    diag: Vec<f64>,
    omega: f64,
}

impl<'a> Ssor<'a> {
    pub fn new(matrix: &'a SparseMatrix, omega: f64) -> Result<Self, PreconditionerError> {
        let diag = matrix.diagonal();
        if let Some(row) = diag.iter().position(|d| *d == 0.0 || !d.is_finite()) {
            return Err(PreconditionerError::ZeroDiagonal { row });
        }
        Ok(Self {
            matrix,
            diag,
            omega,
        })
    }
}

impl PreconditionerOp for Ssor<'_> {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        let n = r.len();
        let w = self.omega;

        // (D + ωL) y = r
        for i in 0..n {
            let mut s = r[i];
            for (c, v) in self.matrix.row(i) {
                if c < i {
                    s -= w * v * z[c];
                }
            }
            z[i] = s / self.diag[i];
        }

        // (D + ωU) z = D y
        for i in (0..n).rev() {
            let mut s = self.diag[i] * z[i];
            for (c, v) in self.matrix.row(i) {
                if c > i {
                    s -= w * v * z[c];
                }
            }
            z[i] = s / self.diag[i];
        }

        let factor = w * (2.0 - w);
        for zi in z.iter_mut() {
            *zi *= factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::tridiagonal;
    use crate::preconditioner::test_support::inverse_columns;

    #[test]
    fn test_ssor_inverts_diagonal_matrix() {
        let a = SparseMatrix::from_dense(&[vec![2.0, 0.0], vec![0.0, 4.0]]);
        let ssor = Ssor::new(&a, 1.0).unwrap();
        let mut z = vec![0.0; 2];
        ssor.apply(&[1.0, 1.0], &mut z);
        assert_eq!(z, vec![0.5, 0.25]);
    }

    #[test]
    fn test_ssor_is_symmetric_for_symmetric_matrix() {
        let a = tridiagonal(5, 3.0);
        let ssor = Ssor::new(&a, 1.3).unwrap();
        let cols = inverse_columns(&ssor, 5);
        for i in 0..5 {
            for j in 0..5 {
                assert!(
                    (cols[j][i] - cols[i][j]).abs() < 1e-12,
                    "M^-1 not symmetric at ({}, {})",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn test_ssor_matches_closed_form_on_2x2() {
        // A = [[2, -1], [-1, 2]], ω = 1: M = (D + L) D⁻¹ (D + U) = [[2, -1], [-1, 2.5]]
        let a = tridiagonal(2, 2.0);
        let ssor = Ssor::new(&a, 1.0).unwrap();
        let mut z = vec![0.0; 2];
        ssor.apply(&[2.0, -1.0], &mut z);
        // M (1, 0) = (2, -1)
        assert!((z[0] - 1.0).abs() < 1e-14);
        assert!(z[1].abs() < 1e-14);
    }
}
