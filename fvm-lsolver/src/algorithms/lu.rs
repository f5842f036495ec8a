//! Direct factorization.
//!
//! The residual-correction solvers factorize once and back-solve repeatedly,
//! so factorization sits behind a trait pair: [`Factorizer`] produces a
//! [`Factorization`] that can be applied any number of times.
//!
//! [`SparseLu`] is the factorizer behind the direct solvers: a fill-reducing
//! column ordering followed by threshold partial pivoting, via rsparse.
//! [`DenseLu`] uses nalgebra and serves the small subdomain blocks of the
//! multilevel preconditioner, which are dense after extraction anyway.

use crate::error::FactorizationError;
use fvm_core::SparseMatrix;
use log::debug;
use nalgebra::{DMatrix, DVector, Dyn, LU};
use rsparse::{
    data::{self, Symb},
    lsolve, lu, sqr, usolve,
};

/// Produces a reusable factorization of a square matrix.
pub trait Factorizer {
    type Factor: Factorization;

    fn factorize(&self, matrix: &SparseMatrix) -> Result<Self::Factor, FactorizationError>;
}

/// A factorized operator: `solve` computes `out = A⁻¹ rhs`.
pub trait Factorization {
    fn dim(&self) -> usize;

    fn solve(&self, rhs: &[f64], out: &mut [f64]) -> Result<(), FactorizationError>;
}

/// Dense LU with partial pivoting.
#[derive(Debug, Clone, Copy)]
pub struct DenseLu {
    /// A pivot is treated as zero when `|u_ii| <= pivot_tolerance * max_j |u_jj|`.
    pub pivot_tolerance: f64,
}

impl Default for DenseLu {
    fn default() -> Self {
        Self {
            pivot_tolerance: f64::EPSILON,
        }
    }
}

impl DenseLu {
    /// Factorizes an already dense matrix.
    pub fn factorize_dense(
        &self,
        dense: DMatrix<f64>,
    ) -> Result<DenseLuFactor, FactorizationError> {
        if !dense.is_square() {
            return Err(FactorizationError::NotSquare {
                rows: dense.nrows(),
                cols: dense.ncols(),
            });
        }
        let n = dense.nrows();
        let lu = dense.lu();

        let u = lu.u();
        let pivots: Vec<f64> = (0..n).map(|i| u[(i, i)].abs()).collect();
        let largest = pivots.iter().cloned().fold(0.0, f64::max);
        let smallest = pivots.iter().cloned().fold(f64::INFINITY, f64::min);
        if n > 0 && (!(largest > 0.0) || smallest <= self.pivot_tolerance * largest) {
            log::debug!(
                "LU pivot ratio {:e} below tolerance, matrix is singular",
                smallest / largest
            );
            return Err(FactorizationError::Singular);
        }

        Ok(DenseLuFactor { lu, n })
    }
}

impl Factorizer for DenseLu {
    type Factor = DenseLuFactor;

    fn factorize(&self, matrix: &SparseMatrix) -> Result<DenseLuFactor, FactorizationError> {
        if !matrix.is_square() {
            return Err(FactorizationError::NotSquare {
                rows: matrix.rows(),
                cols: matrix.cols(),
            });
        }
        let n = matrix.rows();
        let dense = DMatrix::from_row_slice(n, n, &matrix.to_dense());
        self.factorize_dense(dense)
    }
}

pub struct DenseLuFactor {
    lu: LU<f64, Dyn, Dyn>,
    n: usize,
}

impl std::fmt::Debug for DenseLuFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseLuFactor").field("n", &self.n).finish()
    }
}

impl Factorization for DenseLuFactor {
    fn dim(&self) -> usize {
        self.n
    }

    fn solve(&self, rhs: &[f64], out: &mut [f64]) -> Result<(), FactorizationError> {
        if rhs.len() != self.n || out.len() != self.n {
            return Err(FactorizationError::DimensionMismatch {
                expected: self.n,
                actual: if rhs.len() != self.n { rhs.len() } else { out.len() },
            });
        }
        let solution = self
            .lu
            .solve(&DVector::from_column_slice(rhs))
            .ok_or(FactorizationError::Singular)?;
        out.copy_from_slice(solution.as_slice());
        Ok(())
    }
}

/// Sparse LU with an approximate minimum degree ordering of `A + Aᵀ`.
#[derive(Debug, Clone, Copy)]
pub struct SparseLu {
    /// Partial pivoting threshold in `(0, 1]`. `1.0` always takes the
    /// largest entry of the column; smaller values prefer the diagonal.
    pub pivot_threshold: f64,
    /// A pivot is treated as zero when `|u_kk| <= pivot_tolerance * max_j |u_jj|`.
    pub pivot_tolerance: f64,
}

impl Default for SparseLu {
    fn default() -> Self {
        Self {
            pivot_threshold: 1.0,
            pivot_tolerance: f64::EPSILON,
        }
    }
}

impl Factorizer for SparseLu {
    type Factor = SparseLuFactor;

    fn factorize(&self, matrix: &SparseMatrix) -> Result<SparseLuFactor, FactorizationError> {
        if !matrix.is_square() {
            return Err(FactorizationError::NotSquare {
                rows: matrix.rows(),
                cols: matrix.cols(),
            });
        }
        let n = matrix.rows();
        if n == 0 {
            return Ok(SparseLuFactor::empty());
        }

        // The CSR arrays of Aᵀ are the CSC arrays of A.
        let csc = matrix.transpose();
        let a = data::Sprs {
            m: n,
            n,
            i: csc.col_indices().to_vec(),
            p: csc.row_ptr().iter().map(|&v| v as isize).collect(),
            x: csc.values().to_vec(),
            nzmax: csc.nnz(),
        };

        let mut symbolic: Symb = sqr(&a, 1, false);
        let numeric = lu(&a, &mut symbolic, self.pivot_threshold).map_err(|e| {
            debug!("sparse LU failed: {}", e);
            FactorizationError::Singular
        })?;

        // Each column of U ends with its pivot.
        let u = &numeric.u;
        let pivots: Vec<f64> = (0..n)
            .map(|k| u.x[(u.p[k + 1] - 1) as usize].abs())
            .collect();
        let largest = pivots.iter().cloned().fold(0.0, f64::max);
        let smallest = pivots.iter().cloned().fold(f64::INFINITY, f64::min);
        if !(largest > 0.0) || smallest <= self.pivot_tolerance * largest {
            debug!(
                "sparse LU pivot ratio {:e} below tolerance, matrix is singular",
                smallest / largest
            );
            return Err(FactorizationError::Singular);
        }

        Ok(SparseLuFactor {
            l: Some(numeric.l),
            u: Some(numeric.u),
            pinv: numeric.pinv,
            q: symbolic.q,
            n,
        })
    }
}

/// `P A Q = L U` with the row permutation stored inverted.
pub struct SparseLuFactor {
    l: Option<data::Sprs<f64>>,
    u: Option<data::Sprs<f64>>,
    pinv: Option<Vec<isize>>,
    q: Option<Vec<isize>>,
    n: usize,
}

impl SparseLuFactor {
    fn empty() -> Self {
        Self {
            l: None,
            u: None,
            pinv: None,
            q: None,
            n: 0,
        }
    }
}

impl std::fmt::Debug for SparseLuFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseLuFactor")
            .field("n", &self.n)
            .field("nnz_l", &self.l.as_ref().map_or(0, |l| l.nzmax))
            .field("nnz_u", &self.u.as_ref().map_or(0, |u| u.nzmax))
            .finish()
    }
}

/// `x[p[k]] = b[k]`, or a copy without a permutation.
fn ipvec(p: &Option<Vec<isize>>, b: &[f64], x: &mut [f64]) {
    match p {
        Some(p) => {
            for (k, &bk) in b.iter().enumerate() {
                x[p[k] as usize] = bk;
            }
        }
        None => x.copy_from_slice(b),
    }
}

impl Factorization for SparseLuFactor {
    fn dim(&self) -> usize {
        self.n
    }

    fn solve(&self, rhs: &[f64], out: &mut [f64]) -> Result<(), FactorizationError> {
        if rhs.len() != self.n || out.len() != self.n {
            return Err(FactorizationError::DimensionMismatch {
                expected: self.n,
                actual: if rhs.len() != self.n { rhs.len() } else { out.len() },
            });
        }
        let (Some(l), Some(u)) = (&self.l, &self.u) else {
            return Ok(());
        };
        let mut work = vec![0.0; self.n];
        ipvec(&self.pinv, rhs, &mut work);
        lsolve(l, &mut work);
        usolve(u, &mut work);
        ipvec(&self.q, &work, out);
        Ok(())
    }
}
