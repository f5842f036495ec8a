use crate::error::FvmCoreError;
use crate::ops;
use crate::sparse_matrix::SparseMatrix;
use crate::traits::Matrix;

/// An assembled system `L x = b` as handed over by the discretization layer.
///
/// The matrix and right-hand side are borrowed read-only for the duration of
/// a solve. The solution vector is borrowed mutably: it carries the initial
/// guess in and the solution out.
#[derive(Debug)]
pub struct LinearSystem<'a> {
    matrix: &'a SparseMatrix,
    x: &'a mut [f64],
    b: &'a [f64],
}

impl<'a> LinearSystem<'a> {
    /// Bundles the three pieces after checking that `L` is square and that
    /// `x` and `b` match its row count.
    pub fn new(
        matrix: &'a SparseMatrix,
        x: &'a mut [f64],
        b: &'a [f64],
    ) -> Result<Self, FvmCoreError> {
        let (rows, cols) = matrix.dims();
        if !matrix.is_square() {
            return Err(FvmCoreError::InvalidDimensions(format!(
                "Matrix L must be square (dims: {}x{})",
                rows, cols
            )));
        }
        if rows != b.len() {
            return Err(FvmCoreError::InvalidDimensions(format!(
                "Matrix L rows ({}) must match RHS vector b length ({})",
                rows,
                b.len()
            )));
        }
        if rows != x.len() {
            return Err(FvmCoreError::InvalidDimensions(format!(
                "Matrix L rows ({}) must match solution vector x length ({})",
                rows,
                x.len()
            )));
        }
        Ok(Self { matrix, x, b })
    }

    pub fn matrix(&self) -> &SparseMatrix {
        self.matrix
    }

    pub fn x(&self) -> &[f64] {
        &*self.x
    }

    pub fn x_mut(&mut self) -> &mut [f64] {
        &mut *self.x
    }

    pub fn b(&self) -> &[f64] {
        self.b
    }

    /// Number of unknowns.
    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Splits the borrow so a kernel can read `L` and `b` while writing `x`.
    pub fn parts_mut(&mut self) -> (&SparseMatrix, &mut [f64], &[f64]) {
        (self.matrix, &mut *self.x, self.b)
    }

    /// `‖L x - b‖₂` for the current contents of `x`.
    pub fn residual_norm(&self) -> f64 {
        let mut r = vec![0.0; self.len()];
        // Shapes were validated in `new`.
        self.matrix.spmv_unchecked(&*self.x, &mut r);
        ops::axpy(-1.0, self.b, &mut r);
        ops::norm2(&r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_square_matrix() {
        let matrix = SparseMatrix::new(2, 3);
        let mut x = vec![0.0; 2];
        let b = vec![0.0; 2];
        let err = LinearSystem::new(&matrix, &mut x, &b).unwrap_err();
        assert!(matches!(err, FvmCoreError::InvalidDimensions(msg) if msg.contains("square")));
    }

    #[test]
    fn test_rejects_mismatched_vectors() {
        let matrix = SparseMatrix::identity(3);
        let mut x = vec![0.0; 3];
        let b = vec![0.0; 2];
        assert!(LinearSystem::new(&matrix, &mut x, &b).is_err());

        let mut short_x = vec![0.0; 2];
        let b = vec![0.0; 3];
        assert!(LinearSystem::new(&matrix, &mut short_x, &b).is_err());
    }

    #[test]
    fn test_residual_norm_and_in_place_update() {
        let matrix = SparseMatrix::identity(2);
        let mut x = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        {
            let mut system = LinearSystem::new(&matrix, &mut x, &b).unwrap();
            assert_eq!(system.residual_norm(), 5.0);
            system.x_mut().copy_from_slice(&[3.0, 4.0]);
            assert_eq!(system.residual_norm(), 0.0);
        }
        assert_eq!(x, vec![3.0, 4.0]);
    }
}
