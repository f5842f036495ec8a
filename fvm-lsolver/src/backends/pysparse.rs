//! Pysparse `itsolvers` and `superlu`.
//!
//! The Krylov entry point takes a tolerance relative to `‖b‖₂` and reports
//! `(info, iter, relres)`.

use crate::algorithms::{
    ConjugateGradient, ConjugateGradientSquared, Gmres, SolveAlgorithm, StopReason, DEFAULT_RESTART,
};
use crate::convergence::{StatusKind, Suite};
use crate::preconditioner::{PreconditionerKind, PreconditionerOp};
use crate::residual_correction::CorrectionPolicy;
use crate::tolerance::{Criterion, CriterionTable, MatrixNorm, Threshold};
use fvm_core::{ops, SparseMatrix};

pub const INFO_CONVERGED: i32 = 0;
pub const INFO_MAXIT: i32 = -1;
/// Preconditioner not positive definite.
pub const INFO_PRECON_NOT_SPD: i32 = -2;
/// Matrix not positive definite or singular.
pub const INFO_MATRIX_NOT_SPD: i32 = -3;
/// Stagnation or recurrence breakdown.
pub const INFO_BREAKDOWN: i32 = -4;
/// A scalar went out of range.
pub const INFO_OUT_OF_RANGE: i32 = -5;
pub const INFO_PARAM: i32 = -6;

pub fn classify(info: i32) -> Option<StatusKind> {
    let kind = match info {
        INFO_CONVERGED => StatusKind::Converged,
        INFO_MAXIT => StatusKind::IterationLimitExceeded,
        INFO_PRECON_NOT_SPD | INFO_MATRIX_NOT_SPD => StatusKind::IllConditioned,
        INFO_BREAKDOWN => StatusKind::Breakdown,
        INFO_OUT_OF_RANGE => StatusKind::LossOfAccuracy,
        INFO_PARAM => StatusKind::ParameterError,
        _ => return None,
    };
    Some(kind)
}

pub(crate) fn status_code(stop: StopReason) -> i32 {
    match stop {
        StopReason::Converged => INFO_CONVERGED,
        StopReason::IterationLimit => INFO_MAXIT,
        StopReason::IndefinitePreconditioner => INFO_PRECON_NOT_SPD,
        StopReason::IndefiniteMatrix | StopReason::Singular => INFO_MATRIX_NOT_SPD,
        StopReason::Breakdown => INFO_BREAKDOWN,
        StopReason::NonFinite | StopReason::TrueResidualMismatch => INFO_OUT_OF_RANGE,
        StopReason::InvalidInput => INFO_PARAM,
    }
}

/// PCG, CGS and GMRES. `default` is the native relative-to-RHS test.
pub const KRYLOV_CRITERIA: CriterionTable = CriterionTable {
    supported: &[
        Criterion::Default,
        Criterion::Unscaled,
        Criterion::Rhs,
        Criterion::Matrix,
        Criterion::Initial,
        Criterion::Legacy,
    ],
    default: Criterion::Rhs,
    matrix_norm: MatrixNorm::Frobenius,
};

pub const LU_CRITERIA: CriterionTable = CriterionTable {
    supported: &[Criterion::Default, Criterion::Initial],
    default: Criterion::Initial,
    matrix_norm: MatrixNorm::Frobenius,
};

pub const KRYLOV_PRECONDITIONERS: &[PreconditionerKind] = &[
    PreconditionerKind::Identity,
    PreconditionerKind::Jacobi,
    PreconditionerKind::Ssor { omega: 1.0 },
];

pub const LU_POLICY: CorrectionPolicy = CorrectionPolicy {
    suite: Suite::Pysparse,
    prescale: true,
    iteration_cap: None,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Pcg,
    Cgs,
    Gmres,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Pcg => "pcg",
            Method::Cgs => "cgs",
            Method::Gmres => "gmres",
        }
    }
}

/// What `itsolvers` hands back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItsolveOutput {
    pub info: i32,
    pub iter: usize,
    /// `‖r‖₂ / ‖b‖₂`, or `‖r‖₂` when `b = 0`.
    pub relres: f64,
}

/// Runs `method` until `‖r‖₂ <= tol ‖b‖₂`. With `b = 0` the tolerance is
/// taken as absolute.
pub fn itsolve(
    method: Method,
    matrix: &SparseMatrix,
    b: &[f64],
    x: &mut [f64],
    tol: f64,
    maxit: usize,
    precon: Option<&dyn PreconditionerOp>,
) -> ItsolveOutput {
    if !(tol >= 0.0) {
        return ItsolveOutput {
            info: INFO_PARAM,
            iter: 0,
            relres: f64::NAN,
        };
    }
    let b_norm = ops::norm2(b);
    let reference = if b_norm > 0.0 { b_norm } else { 1.0 };
    let threshold = Threshold::Fixed(tol * reference);

    let run = match method {
        Method::Pcg => {
            ConjugateGradient::with_params(threshold, maxit).solve(matrix, b, x, precon)
        }
        Method::Cgs => {
            ConjugateGradientSquared::with_params(threshold, maxit).solve(matrix, b, x, precon)
        }
        Method::Gmres => {
            Gmres::with_params(threshold, maxit, DEFAULT_RESTART).solve(matrix, b, x, precon)
        }
    };

    ItsolveOutput {
        info: status_code(run.stop),
        iter: run.iterations,
        relres: run.residual / reference,
    }
}
