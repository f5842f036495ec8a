//! # Finite-volume core library
//!
//! Provides the sparse storage and vector kernels shared by the linear
//! solvers: a CSR [`SparseMatrix`], level-1 vector operations, and the
//! [`LinearSystem`] bundle through which the discretization layer hands an
//! assembled `L x = b` to a solver.

pub mod error;
pub mod linear_system;
pub mod ops;
pub mod sparse_matrix;
pub mod traits;

// Re-export public types
pub use error::FvmCoreError;
pub use linear_system::LinearSystem;
pub use sparse_matrix::{SparseMatrix, Triplet};
pub use traits::Matrix;
