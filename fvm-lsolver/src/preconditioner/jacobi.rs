use super::PreconditionerOp;
use crate::error::PreconditionerError;
use fvm_core::SparseMatrix;

/// Diagonal scaling.
#[derive(Debug, Clone)]
pub struct Jacobi {
    inv_diag: Vec<f64>,
}

impl Jacobi {
    pub fn new(matrix: &SparseMatrix) -> Result<Self, PreconditionerError> {
        let inv_diag = matrix
            .diagonal()
            .into_iter()
            .enumerate()
            .map(|(row, d)| {
                if d == 0.0 || !d.is_finite() {
                    Err(PreconditionerError::ZeroDiagonal { row })
                } else {
                    Ok(1.0 / d)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { inv_diag })
    }
}

impl PreconditionerOp for Jacobi {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        for ((zi, ri), di) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * di;
        }
    }
}
