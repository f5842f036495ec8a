//! Preconditioners.
//!
//! A [`PreconditionerKind`] is plain configuration. Building the operator for
//! a concrete matrix goes through [`acquire`], which returns a
//! [`PreconditionerHandle`] scoped to one solve.

use crate::error::{LsolverError, PreconditionerError, Result};
use fvm_core::SparseMatrix;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

mod handle;
mod jacobi;
mod multilevel;
mod ssor;

pub use handle::{handle_counts, HandleCounts, PreconditionerHandle};
pub use jacobi::Jacobi;
pub use multilevel::MultilevelDd;
pub use ssor::Ssor;

pub const DEFAULT_SSOR_OMEGA: f64 = 1.0;
pub const DEFAULT_BLOCK_SIZE: usize = 64;

fn default_omega() -> f64 {
    DEFAULT_SSOR_OMEGA
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreconditionerKind {
    Identity,
    /// Inverse of the diagonal.
    Jacobi,
    /// Symmetric successive over-relaxation with relaxation factor `omega`.
    Ssor {
        #[serde(default = "default_omega")]
        omega: f64,
    },
    /// Two-level additive Schwarz style domain decomposition over contiguous
    /// blocks of `block_size` unknowns.
    MultilevelDd {
        #[serde(default = "default_block_size")]
        block_size: usize,
    },
}

impl PreconditionerKind {
    pub fn ssor() -> Self {
        PreconditionerKind::Ssor {
            omega: DEFAULT_SSOR_OMEGA,
        }
    }

    pub fn multilevel_dd() -> Self {
        PreconditionerKind::MultilevelDd {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PreconditionerKind::Identity => "identity",
            PreconditionerKind::Jacobi => "jacobi",
            PreconditionerKind::Ssor { .. } => "ssor",
            PreconditionerKind::MultilevelDd { .. } => "multilevel_dd",
        }
    }

    /// Same variant, parameters ignored.
    pub fn same_family(&self, other: &PreconditionerKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            PreconditionerKind::Ssor { omega } if !(omega > 0.0 && omega < 2.0) => {
                Err(LsolverError::InvalidConfig(format!(
                    "SSOR relaxation factor must lie in (0, 2), got {}",
                    omega
                )))
            }
            PreconditionerKind::MultilevelDd { block_size: 0 } => Err(
                LsolverError::InvalidConfig("multilevel block size must be positive".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Applies `z = M⁻¹ r`.
pub trait PreconditionerOp: Debug {
    fn apply(&self, r: &[f64], z: &mut [f64]);
}

/// Builds the backend state for `kind` on `matrix`.
///
/// The handle borrows the matrix, so it cannot outlive the solve it was
/// acquired for.
pub fn acquire<'a>(
    kind: PreconditionerKind,
    matrix: &'a SparseMatrix,
) -> std::result::Result<PreconditionerHandle<'a>, PreconditionerError> {
    let op: Option<Box<dyn PreconditionerOp + 'a>> = match kind {
        PreconditionerKind::Identity => None,
        PreconditionerKind::Jacobi => Some(Box::new(Jacobi::new(matrix)?)),
        PreconditionerKind::Ssor { omega } => Some(Box::new(Ssor::new(matrix, omega)?)),
        PreconditionerKind::MultilevelDd { block_size } => {
            Some(Box::new(MultilevelDd::new(matrix, block_size)?))
        }
    };
    Ok(PreconditionerHandle::new(kind, op))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::PreconditionerOp;

    /// Dense `M⁻¹` by applying the operator to unit vectors. Column `j` is `M⁻¹ e_j`.
    pub fn inverse_columns(op: &dyn PreconditionerOp, n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|j| {
                let mut e = vec![0.0; n];
                e[j] = 1.0;
                let mut z = vec![0.0; n];
                op.apply(&e, &mut z);
                z
            })
            .collect()
    }
}
