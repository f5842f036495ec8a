//! SciPy `splu`.
//!
//! Only the direct solver is exposed. Status codes follow the
//! `scipy.sparse.linalg` convention: zero for success, the iteration count
//! when the limit is hit, negative values for failures.

use crate::algorithms::StopReason;
use crate::convergence::{StatusKind, Suite};
use crate::residual_correction::CorrectionPolicy;
use crate::tolerance::{Criterion, CriterionTable, MatrixNorm};

pub const INFO_CONVERGED: i32 = 0;
pub const INFO_PARAM: i32 = -1;
pub const INFO_BREAKDOWN: i32 = -2;
pub const INFO_ILL_CONDITIONED: i32 = -3;
pub const INFO_LOSS: i32 = -4;

/// SciPy LU never runs more correction steps than this.
pub const MAX_CORRECTIONS: usize = 10;

pub fn classify(info: i32) -> Option<StatusKind> {
    let kind = match info {
        INFO_CONVERGED => StatusKind::Converged,
        i if i > 0 => StatusKind::IterationLimitExceeded,
        INFO_PARAM => StatusKind::ParameterError,
        INFO_BREAKDOWN => StatusKind::Breakdown,
        INFO_ILL_CONDITIONED => StatusKind::IllConditioned,
        INFO_LOSS => StatusKind::LossOfAccuracy,
        _ => return None,
    };
    Some(kind)
}

/// Positive codes carry the number of iterations performed, at least 1.
pub(crate) fn status_code(stop: StopReason, iterations: usize) -> i32 {
    match stop {
        StopReason::Converged => INFO_CONVERGED,
        StopReason::IterationLimit => i32::try_from(iterations.max(1)).unwrap_or(i32::MAX),
        StopReason::Breakdown => INFO_BREAKDOWN,
        StopReason::IndefiniteMatrix
        | StopReason::IndefinitePreconditioner
        | StopReason::Singular => INFO_ILL_CONDITIONED,
        StopReason::NonFinite | StopReason::TrueResidualMismatch => INFO_LOSS,
        StopReason::InvalidInput => INFO_PARAM,
    }
}

pub const LU_CRITERIA: CriterionTable = CriterionTable {
    supported: &[
        Criterion::Default,
        Criterion::Unscaled,
        Criterion::Rhs,
        Criterion::Matrix,
        Criterion::Initial,
        Criterion::Legacy,
    ],
    default: Criterion::Initial,
    matrix_norm: MatrixNorm::One,
};

pub const LU_POLICY: CorrectionPolicy = CorrectionPolicy {
    suite: Suite::Scipy,
    prescale: false,
    iteration_cap: Some(MAX_CORRECTIONS),
};
