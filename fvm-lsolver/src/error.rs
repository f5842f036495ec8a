//! Error types for fvm-lsolver.
//!
//! Only configuration problems and caller contract violations are errors.
//! A solve that runs but does not converge is reported through
//! [`ConvergenceStatus`](crate::convergence::ConvergenceStatus) instead.

use crate::convergence::ConvergenceStatus;
use crate::preconditioner::PreconditionerKind;
use crate::tolerance::Criterion;
use fvm_core::FvmCoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LsolverError {
    #[error("{solver} does not support the '{criterion}' tolerance criterion")]
    UnsupportedCriterion {
        criterion: String,
        solver: &'static str,
    },

    #[error("{solver} does not support the {preconditioner:?} preconditioner")]
    UnsupportedPreconditioner {
        preconditioner: PreconditionerKind,
        solver: &'static str,
    },

    #[error("Invalid solver configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed solver configuration: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fvm core error: {0}")]
    Core(#[from] FvmCoreError),

    /// Only produced when a caller escalates a status with
    /// [`ConvergenceStatus::into_result`].
    #[error("solve did not converge: {0}")]
    NotConverged(ConvergenceStatus),
}

impl LsolverError {
    pub(crate) fn unsupported_criterion(criterion: Criterion, solver: &'static str) -> Self {
        LsolverError::UnsupportedCriterion {
            criterion: criterion.to_string(),
            solver,
        }
    }
}

/// Failures of a factorization kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactorizationError {
    #[error("matrix is singular to working precision")]
    Singular,

    #[error("factorization expects a square matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("right-hand side length {actual} does not match factor size {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failures while building a preconditioner for one solve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreconditionerError {
    #[error("zero diagonal entry in row {row}")]
    ZeroDiagonal { row: usize },

    #[error("subdomain factorization failed: {0}")]
    Factorization(#[from] FactorizationError),
}

pub type Result<T> = std::result::Result<T, LsolverError>;
