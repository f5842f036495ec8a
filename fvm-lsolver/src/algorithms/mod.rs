//! Native numerical kernels.
//!
//! These play the part of the numerical libraries behind each backend: the
//! Krylov loops and the LU factorization. They know nothing about criteria
//! names or status tables; a backend module builds one of the algorithm
//! structs with an absolute [`Threshold`], runs it through
//! [`SolveAlgorithm::solve`] and translates the [`StopReason`] into its own
//! status code.

use crate::preconditioner::PreconditionerOp;
use crate::tolerance::Threshold;
use fvm_core::{ops, SparseMatrix};

pub mod cg;
pub mod cgs;
pub mod gmres;
pub mod lu;

pub use lu::{DenseLu, DenseLuFactor, Factorization, Factorizer, SparseLu, SparseLuFactor};

/// Default Krylov subspace dimension before a GMRES restart.
pub const DEFAULT_RESTART: usize = 30;

/// Why a kernel stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Converged,
    IterationLimit,
    /// A scalar in the recurrence vanished.
    Breakdown,
    /// `p . A p <= 0`: the matrix is not positive definite.
    IndefiniteMatrix,
    /// `r . M r <= 0`: the preconditioner is not positive definite.
    IndefinitePreconditioner,
    /// A factorization or subdomain solve found the matrix singular.
    Singular,
    /// The iteration produced NaN or infinity.
    NonFinite,
    /// The tracked residual met the threshold but `‖b - A x‖` did not.
    TrueResidualMismatch,
    /// Non-finite entries in `b` or the initial guess.
    InvalidInput,
}

/// Result of one kernel run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KrylovRun {
    pub iterations: usize,
    /// Residual norm the kernel tracked (recursive for CG/CGS, true for GMRES).
    pub residual: f64,
    pub stop: StopReason,
}

impl KrylovRun {
    pub fn new(iterations: usize, residual: f64, stop: StopReason) -> Self {
        Self {
            iterations,
            residual,
            stop,
        }
    }
}

// --- Algorithm Trait Definition ---
/// A Krylov method together with its stopping parameters.
pub trait SolveAlgorithm {
    fn name(&self) -> &'static str;

    /// Iterates on `A x = b`. `x` holds the initial guess on entry and the
    /// last iterate on exit. Failures are reported in the returned
    /// [`KrylovRun`], never by panicking.
    fn solve(
        &self,
        matrix: &SparseMatrix,
        b: &[f64],
        x: &mut [f64],
        precon: Option<&dyn PreconditionerOp>,
    ) -> KrylovRun;
}

// --- Algorithm Struct Definitions ---

/// Preconditioned Conjugate Gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConjugateGradient {
    pub threshold: Threshold,
    pub max_iterations: usize,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self {
            threshold: Threshold::Fixed(1e-6),
            max_iterations: 1000,
        }
    }
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(threshold: Threshold, max_iterations: usize) -> Self {
        Self {
            threshold,
            max_iterations,
        }
    }
}

/// Preconditioned Conjugate Gradient Squared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConjugateGradientSquared {
    pub threshold: Threshold,
    pub max_iterations: usize,
}

impl Default for ConjugateGradientSquared {
    fn default() -> Self {
        Self {
            threshold: Threshold::Fixed(1e-6),
            max_iterations: 1000,
        }
    }
}

impl ConjugateGradientSquared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(threshold: Threshold, max_iterations: usize) -> Self {
        Self {
            threshold,
            max_iterations,
        }
    }
}

/// Restarted GMRES with right preconditioning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gmres {
    pub threshold: Threshold,
    pub max_iterations: usize,
    /// Krylov subspace dimension before a restart.
    pub restart: usize,
}

impl Default for Gmres {
    fn default() -> Self {
        Self {
            threshold: Threshold::Fixed(1e-6),
            max_iterations: 1000,
            restart: DEFAULT_RESTART,
        }
    }
}

impl Gmres {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(threshold: Threshold, max_iterations: usize, restart: usize) -> Self {
        Self {
            threshold,
            max_iterations,
            restart,
        }
    }
}

/// Decides whether a run ends before its first iteration. An iteration
/// budget of zero ends at the limit even when `x₀` already meets the
/// threshold.
pub(crate) fn initial_stop(
    residual: f64,
    threshold: f64,
    max_iterations: usize,
) -> Option<StopReason> {
    if max_iterations == 0 {
        Some(StopReason::IterationLimit)
    } else if residual <= threshold {
        Some(StopReason::Converged)
    } else {
        None
    }
}

/// `z = M⁻¹ r`, or a copy when there is no preconditioner.
pub(crate) fn precondition(precon: Option<&dyn PreconditionerOp>, r: &[f64], z: &mut [f64]) {
    match precon {
        Some(p) => p.apply(r, z),
        None => z.copy_from_slice(r),
    }
}

/// Rejects non-finite inputs before any work is done.
pub(crate) fn reject_invalid(b: &[f64], x: &[f64]) -> Option<KrylovRun> {
    if let Err(e) = ops::check_finite(b).and_then(|_| ops::check_finite(x)) {
        log::warn!("Rejecting solve input: {}", e);
        return Some(KrylovRun::new(0, f64::NAN, StopReason::InvalidInput));
    }
    None
}

/// `r = b - A x`
pub(crate) fn true_residual(
    matrix: &SparseMatrix,
    b: &[f64],
    x: &[f64],
    r: &mut [f64],
) -> f64 {
    matrix.spmv_unchecked(x, r);
    for (ri, &bi) in r.iter_mut().zip(b.iter()) {
        *ri = bi - *ri;
    }
    ops::norm2(r)
}
