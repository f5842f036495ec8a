//! Dense vector kernels shared by the solvers.
//!
//! These are the CPU counterparts of the level-1 operations a Krylov loop
//! needs (`dot`, `axpy`, norms). They are generic over [`Float`] so the same
//! helpers serve `f32` test fixtures and the `f64` solver path.

use crate::error::FvmCoreError;
use crate::sparse_matrix::SparseMatrix;
use num_traits::Float;

/// Inner product `x . y`. Panics in debug builds on length mismatch.
pub fn dot<T: Float>(x: &[T], y: &[T]) -> T {
    debug_assert_eq!(x.len(), y.len());
    x.iter()
        .zip(y.iter())
        .fold(T::zero(), |acc, (&a, &b)| acc + a * b)
}

/// Euclidean norm.
pub fn norm2<T: Float>(x: &[T]) -> T {
    dot(x, x).sqrt()
}

/// Sum of absolute values.
pub fn norm1<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, &v| acc + v.abs())
}

/// Largest absolute value.
pub fn norm_inf<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, &v| acc.max(v.abs()))
}

/// `y = alpha * x + y`
pub fn axpy<T: Float>(alpha: T, x: &[T], y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi = alpha * xi + *yi;
    }
}

/// `y = x + beta * y`
pub fn xpby<T: Float>(x: &[T], beta: T, y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi = xi + beta * *yi;
    }
}

/// `x *= alpha`
pub fn scale<T: Float>(alpha: T, x: &mut [T]) {
    for xi in x.iter_mut() {
        *xi = alpha * *xi;
    }
}

/// Returns the first non-finite entry, if any.
pub fn check_finite(x: &[f64]) -> Result<(), FvmCoreError> {
    match x.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(FvmCoreError::NonFinite {
            index,
            value: x[index],
        }),
        None => Ok(()),
    }
}

/// Residual `r = A x - b`, written into `r`.
///
/// This is the sign convention of the residual-correction loop: the
/// correction `d` solving `A d = r` is *subtracted* from `x`.
pub fn residual_into(
    a: &SparseMatrix,
    x: &[f64],
    b: &[f64],
    r: &mut [f64],
) -> Result<(), FvmCoreError> {
    if b.len() != a.rows() {
        return Err(FvmCoreError::InvalidDimensions(format!(
            "Matrix rows ({}) must match b vector length ({})",
            a.rows(),
            b.len()
        )));
    }
    a.spmv(x, r)?;
    axpy(-1.0, b, r);
    Ok(())
}

/// `‖A x - b‖₂`
pub fn residual_norm(a: &SparseMatrix, x: &[f64], b: &[f64]) -> Result<f64, FvmCoreError> {
    let mut r = vec![0.0; a.rows()];
    residual_into(a, x, b, &mut r)?;
    Ok(norm2(&r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_one_ops() {
        let x = [3.0_f64, -4.0];
        assert_eq!(dot(&x, &x), 25.0);
        assert_eq!(norm2(&x), 5.0);
        assert_eq!(norm1(&x), 7.0);
        assert_eq!(norm_inf(&x), 4.0);

        let mut y = [1.0_f64, 1.0];
        axpy(2.0, &x, &mut y);
        assert_eq!(y, [7.0, -7.0]);
        xpby(&x, 0.5, &mut y);
        assert_eq!(y, [6.5, -7.5]);
        scale(2.0, &mut y);
        assert_eq!(y, [13.0, -15.0]);
    }

    #[test]
    fn test_generic_over_f32() {
        let x = [0.6_f32, 0.8];
        assert!((norm2(&x) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_residual_sign_convention() {
        let a = SparseMatrix::from_dense(&[vec![2.0, 0.0], vec![0.0, 3.0]]);
        let mut r = vec![0.0; 2];
        residual_into(&a, &[1.0, 1.0], &[1.0, 1.0], &mut r).unwrap();
        assert_eq!(r, vec![1.0, 2.0]);
        let norm = residual_norm(&a, &[1.0, 1.0], &[1.0, 1.0]).unwrap();
        assert!((norm - 5.0_f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite(&[1.0, 2.0]).is_ok());
        assert!(matches!(
            check_finite(&[1.0, f64::NAN, 2.0]),
            Err(FvmCoreError::NonFinite { index: 1, .. })
        ));
    }
}
