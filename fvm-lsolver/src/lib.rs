//! `fvm-lsolver`: the linear-solver layer of the finite-volume framework.
//!
//! The discretization hands over an assembled `L x = b`; this crate picks one
//! of several solver back ends, interprets the configured tolerance the way
//! that back end would, runs it, and reports a uniform
//! [`ConvergenceStatus`]. Two strategies are offered: a single Krylov call
//! ([`iterative`]) and LU factorization with residual correction
//! ([`residual_correction`]).
//!
//! ```no_run
//! use fvm_lsolver::{solve, SolverConfig, SolverKind, SparseMatrix};
//!
//! let a = SparseMatrix::identity(3);
//! let b = vec![1.0, 2.0, 3.0];
//! let mut x = vec![0.0; 3];
//! let status = solve(&SolverConfig::new(SolverKind::PysparseLu), &a, &mut x, &b)?;
//! assert!(status.is_converged());
//! # Ok::<(), fvm_lsolver::LsolverError>(())
//! ```

pub mod algorithms;
pub mod backends;
pub mod convergence;
pub mod error;
pub mod iterative;
pub mod preconditioner;
pub mod residual_correction;
pub mod solver;
pub mod tolerance;

pub use convergence::{ConvergenceStatus, StatusKind, Suite};
pub use error::{FactorizationError, LsolverError, PreconditionerError, Result};
pub use preconditioner::{handle_counts, PreconditionerKind};
pub use solver::{solve, Solver, SolverConfig, SolverKind};
pub use tolerance::{Criterion, ToleranceSpec};

// Re-export from fvm_core
pub use fvm_core::{FvmCoreError, LinearSystem, Matrix, SparseMatrix, Triplet};
