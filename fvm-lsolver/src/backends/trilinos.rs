//! Trilinos AztecOO and Amesos KLU.
//!
//! AztecOO is given the convergence test as an option (`AZ_conv`) and
//! computes the residual scale itself. After the recursive residual meets
//! the test the true residual is checked; a miss restarts the iteration from
//! the current iterate, and `AZ_loss` is reported once restarts run out.

use crate::algorithms::{ConjugateGradient, Gmres, SolveAlgorithm, StopReason, DEFAULT_RESTART};
use crate::convergence::{StatusKind, Suite};
use crate::preconditioner::{PreconditionerKind, PreconditionerOp};
use crate::residual_correction::CorrectionPolicy;
use crate::tolerance::{Criterion, CriterionTable, MatrixNorm, ScaleRule};
use fvm_core::{ops, SparseMatrix};
use log::{debug, warn};

pub const AZ_NORMAL: i32 = 0;
pub const AZ_PARAM: i32 = 1;
pub const AZ_BREAKDOWN: i32 = 2;
pub const AZ_LOSS: i32 = 3;
pub const AZ_ILL_COND: i32 = 4;
pub const AZ_MAXITS: i32 = 5;

/// Restarts allowed when the true residual misses a converged test.
const MAX_TRUE_RESIDUAL_RESTARTS: usize = 3;

pub fn classify(why: i32) -> Option<StatusKind> {
    let kind = match why {
        AZ_NORMAL => StatusKind::Converged,
        AZ_PARAM => StatusKind::ParameterError,
        AZ_BREAKDOWN => StatusKind::Breakdown,
        AZ_LOSS => StatusKind::LossOfAccuracy,
        AZ_ILL_COND => StatusKind::IllConditioned,
        AZ_MAXITS => StatusKind::IterationLimitExceeded,
        _ => return None,
    };
    Some(kind)
}

pub(crate) fn status_code(stop: StopReason) -> i32 {
    match stop {
        StopReason::Converged => AZ_NORMAL,
        StopReason::IterationLimit => AZ_MAXITS,
        StopReason::Breakdown => AZ_BREAKDOWN,
        StopReason::IndefiniteMatrix
        | StopReason::IndefinitePreconditioner
        | StopReason::Singular => AZ_ILL_COND,
        StopReason::NonFinite | StopReason::TrueResidualMismatch => AZ_LOSS,
        StopReason::InvalidInput => AZ_PARAM,
    }
}

pub const CG_CRITERIA: CriterionTable = CriterionTable {
    supported: &Criterion::ALL,
    default: Criterion::Initial,
    matrix_norm: MatrixNorm::Infinity,
};

pub const GMRES_CRITERIA: CriterionTable = CriterionTable {
    supported: &[
        Criterion::Default,
        Criterion::Initial,
        Criterion::Unscaled,
        Criterion::Rhs,
        Criterion::Matrix,
        Criterion::Solution,
    ],
    default: Criterion::Initial,
    matrix_norm: MatrixNorm::Infinity,
};

pub const LU_CRITERIA: CriterionTable = CriterionTable {
    supported: &[Criterion::Default, Criterion::Initial],
    default: Criterion::Initial,
    matrix_norm: MatrixNorm::Infinity,
};

pub const KRYLOV_PRECONDITIONERS: &[PreconditionerKind] = &[
    PreconditionerKind::Identity,
    PreconditionerKind::Jacobi,
    PreconditionerKind::MultilevelDd { block_size: 64 },
];

pub const LU_POLICY: CorrectionPolicy = CorrectionPolicy {
    suite: Suite::Trilinos,
    prescale: false,
    iteration_cap: None,
};

/// `AZ_solver`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AzSolver {
    Cg,
    Gmres,
}

/// `AZ_conv`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AzConv {
    /// `‖r‖ / ‖r₀‖`
    R0,
    /// `‖r‖ / ‖b‖`
    Rhs,
    /// `‖r‖ / ‖A‖∞`
    Anorm,
    NoScaled,
    /// `‖r‖ / (‖A‖∞ ‖x‖ + ‖b‖)`
    Sol,
}

impl AzConv {
    pub fn from_rule(rule: ScaleRule) -> Self {
        match rule {
            ScaleRule::Unit => AzConv::NoScaled,
            ScaleRule::InitialResidual => AzConv::R0,
            ScaleRule::RhsNorm => AzConv::Rhs,
            ScaleRule::MatrixNorm(_) => AzConv::Anorm,
            ScaleRule::SolutionNorm(_) => AzConv::Sol,
        }
    }

    fn rule(&self) -> ScaleRule {
        match self {
            AzConv::R0 => ScaleRule::InitialResidual,
            AzConv::Rhs => ScaleRule::RhsNorm,
            AzConv::Anorm => ScaleRule::MatrixNorm(MatrixNorm::Infinity),
            AzConv::NoScaled => ScaleRule::Unit,
            AzConv::Sol => ScaleRule::SolutionNorm(MatrixNorm::Infinity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AztecOptions {
    pub solver: AzSolver,
    pub conv: AzConv,
    /// `AZ_kspace`, the GMRES restart length.
    pub kspace: usize,
}

impl AztecOptions {
    pub fn new(solver: AzSolver, conv: AzConv) -> Self {
        Self {
            solver,
            conv,
            kspace: DEFAULT_RESTART,
        }
    }
}

/// `GetAztecStatus()`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AztecStatus {
    pub why: i32,
    pub its: usize,
    /// True residual `‖b - A x‖₂`.
    pub r: f64,
    /// `r` divided by the convergence scale.
    pub scaled_r: f64,
    /// Residual the iteration itself tracked.
    pub rec_r: f64,
    /// Restarts taken because the true residual missed the test.
    pub restarts: usize,
}

/// `AztecOO::Iterate(maxits, tol)`
pub fn iterate(
    options: &AztecOptions,
    matrix: &SparseMatrix,
    x: &mut [f64],
    b: &[f64],
    max_its: usize,
    tol: f64,
    precon: Option<&dyn PreconditionerOp>,
) -> AztecStatus {
    let scale = match options.conv.rule().evaluate(matrix, x, b) {
        Ok(scale) if tol >= 0.0 => scale,
        _ => {
            warn!("AztecOO rejected the solve parameters (tol = {:e})", tol);
            return AztecStatus {
                why: AZ_PARAM,
                its: 0,
                r: f64::NAN,
                scaled_r: f64::NAN,
                rec_r: f64::NAN,
                restarts: 0,
            };
        }
    };
    let threshold = scale.threshold(tol, b);

    let mut its = 0;
    let mut restarts = 0;
    let (stop, rec_r, r) = loop {
        let remaining = max_its - its;
        let run = match options.solver {
            AzSolver::Cg => {
                ConjugateGradient::with_params(threshold, remaining).solve(matrix, b, x, precon)
            }
            AzSolver::Gmres => Gmres::with_params(threshold, remaining, options.kspace)
                .solve(matrix, b, x, precon),
        };
        its += run.iterations;

        let true_r = ops::residual_norm(matrix, x, b).unwrap_or(f64::NAN);
        if run.stop != StopReason::Converged {
            break (run.stop, run.residual, true_r);
        }
        if true_r <= threshold.at(x) {
            break (StopReason::Converged, run.residual, true_r);
        }
        if restarts == MAX_TRUE_RESIDUAL_RESTARTS || its >= max_its {
            warn!(
                "AztecOO: recursive residual {:e} converged but true residual {:e} did not",
                run.residual, true_r
            );
            break (StopReason::TrueResidualMismatch, run.residual, true_r);
        }
        debug!(
            "AztecOO: true residual {:e} above threshold, restarting at iteration {}",
            true_r, its
        );
        restarts += 1;
    };

    // AZ_sol compares against the scale at the final iterate.
    let final_scale = match scale.auxiliary {
        Some(matrix_norm) => matrix_norm * ops::norm2(x) + ops::norm2(b),
        None => scale.absolute,
    };
    let scaled_r = if final_scale > 0.0 {
        r / final_scale
    } else if r == 0.0 {
        0.0
    } else {
        f64::INFINITY
    };

    AztecStatus {
        why: status_code(stop),
        its,
        r,
        scaled_r,
        rec_r,
        restarts,
    }
}
