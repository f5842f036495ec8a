//! Tolerance criteria.
//!
//! A solver is configured with a nominal tolerance and a named criterion.
//! The criterion decides what the tolerance is relative to: the initial
//! residual, the right-hand side, a matrix norm, and so on. Each backend
//! declares which names it accepts and what `default` means for it through a
//! [`CriterionTable`]; the table turns a name into a [`ScaleRule`], and the
//! rule turns a concrete system into an absolute residual scale.

use crate::error::{LsolverError, Result};
use fvm_core::{ops, SparseMatrix};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interpretation of the nominal tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Criterion {
    /// Whatever the backend uses natively.
    #[default]
    #[serde(rename = "default")]
    Default,
    /// Absolute residual.
    #[serde(rename = "unscaled")]
    Unscaled,
    /// Relative to the residual of the initial guess.
    #[serde(rename = "initial")]
    Initial,
    /// Relative to the right-hand side.
    #[serde(rename = "RHS")]
    Rhs,
    /// Relative to a norm of the matrix.
    #[serde(rename = "matrix")]
    Matrix,
    /// Relative to `‖L‖ ‖x‖ + ‖b‖`, re-evaluated as `x` changes.
    #[serde(rename = "solution")]
    Solution,
    /// Older behaviour of the solver package; same scale as `initial`.
    #[serde(rename = "legacy")]
    Legacy,
}

impl Criterion {
    pub const ALL: [Criterion; 7] = [
        Criterion::Default,
        Criterion::Unscaled,
        Criterion::Initial,
        Criterion::Rhs,
        Criterion::Matrix,
        Criterion::Solution,
        Criterion::Legacy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::Default => "default",
            Criterion::Unscaled => "unscaled",
            Criterion::Initial => "initial",
            Criterion::Rhs => "RHS",
            Criterion::Matrix => "matrix",
            Criterion::Solution => "solution",
            Criterion::Legacy => "legacy",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Criterion {
    type Err = LsolverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Criterion::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| LsolverError::UnsupportedCriterion {
                criterion: s.to_string(),
                solver: "any solver",
            })
    }
}

/// Which induced matrix norm a backend means by the `matrix` criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixNorm {
    /// Maximum absolute column sum.
    One,
    /// Maximum absolute row sum.
    Infinity,
    Frobenius,
}

impl MatrixNorm {
    pub fn of(&self, matrix: &SparseMatrix) -> f64 {
        match self {
            MatrixNorm::One => matrix.norm_one(),
            MatrixNorm::Infinity => matrix.norm_inf(),
            MatrixNorm::Frobenius => matrix.norm_frobenius(),
        }
    }
}

/// Absolute residual scale for one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceScale {
    /// The residual threshold is `tolerance * absolute`.
    pub absolute: f64,
    /// Matrix norm for solution-relative rules, which need it again every
    /// time the iterate changes.
    pub auxiliary: Option<f64>,
}

impl ToleranceScale {
    fn fixed(absolute: f64) -> Self {
        Self {
            absolute,
            auxiliary: None,
        }
    }

    /// Residual threshold a kernel compares `‖L x - b‖₂` against.
    pub fn threshold(&self, tolerance: f64, b: &[f64]) -> Threshold {
        match self.auxiliary {
            Some(matrix_norm) => Threshold::SolutionRelative {
                tolerance,
                matrix_norm,
                rhs_norm: ops::norm2(b),
            },
            None => Threshold::Fixed(tolerance * self.absolute),
        }
    }

    /// `residual / absolute`, with `0 / 0 = 0` and `r / 0 = inf`.
    pub fn relative(&self, residual: f64) -> f64 {
        if self.absolute > 0.0 {
            residual / self.absolute
        } else if residual == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    }
}

/// Stopping threshold for a residual norm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    Fixed(f64),
    SolutionRelative {
        tolerance: f64,
        matrix_norm: f64,
        rhs_norm: f64,
    },
}

impl Threshold {
    /// Threshold for the iterate `x`.
    pub fn at(&self, x: &[f64]) -> f64 {
        match *self {
            Threshold::Fixed(value) => value,
            Threshold::SolutionRelative {
                tolerance,
                matrix_norm,
                rhs_norm,
            } => tolerance * (matrix_norm * ops::norm2(x) + rhs_norm),
        }
    }
}

/// How an absolute scale is computed from `(L, x₀, b)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleRule {
    Unit,
    InitialResidual,
    RhsNorm,
    MatrixNorm(MatrixNorm),
    SolutionNorm(MatrixNorm),
}

impl ScaleRule {
    /// Pure function of its inputs.
    pub fn evaluate(&self, matrix: &SparseMatrix, x: &[f64], b: &[f64]) -> Result<ToleranceScale> {
        let scale = match self {
            ScaleRule::Unit => ToleranceScale::fixed(1.0),
            ScaleRule::InitialResidual => {
                ToleranceScale::fixed(ops::residual_norm(matrix, x, b)?)
            }
            ScaleRule::RhsNorm => ToleranceScale::fixed(ops::norm2(b)),
            ScaleRule::MatrixNorm(norm) => ToleranceScale::fixed(norm.of(matrix)),
            ScaleRule::SolutionNorm(norm) => {
                let matrix_norm = norm.of(matrix);
                ToleranceScale {
                    absolute: matrix_norm * ops::norm2(x) + ops::norm2(b),
                    auxiliary: Some(matrix_norm),
                }
            }
        };
        Ok(scale)
    }
}

/// The criteria a backend accepts, what its `default` means, and which
/// matrix norm it uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriterionTable {
    pub supported: &'static [Criterion],
    pub default: Criterion,
    pub matrix_norm: MatrixNorm,
}

impl CriterionTable {
    pub fn supports(&self, criterion: Criterion) -> bool {
        self.supported.contains(&criterion)
    }

    /// Maps a requested criterion to the rule this backend applies for it.
    pub fn resolve(&self, requested: Criterion, solver: &'static str) -> Result<ScaleRule> {
        if !self.supports(requested) {
            return Err(LsolverError::unsupported_criterion(requested, solver));
        }
        let effective = match requested {
            Criterion::Default => self.default,
            other => other,
        };
        Ok(match effective {
            Criterion::Unscaled => ScaleRule::Unit,
            Criterion::Initial | Criterion::Legacy | Criterion::Default => {
                ScaleRule::InitialResidual
            }
            Criterion::Rhs => ScaleRule::RhsNorm,
            Criterion::Matrix => ScaleRule::MatrixNorm(self.matrix_norm),
            Criterion::Solution => ScaleRule::SolutionNorm(self.matrix_norm),
        })
    }
}

/// `scale(criterion, L, x, b)` for a given backend table.
pub fn scale(
    table: &CriterionTable,
    criterion: Criterion,
    matrix: &SparseMatrix,
    x: &[f64],
    b: &[f64],
) -> Result<ToleranceScale> {
    table.resolve(criterion, "solver")?.evaluate(matrix, x, b)
}

/// Nominal tolerance plus the criterion it is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSpec {
    pub tolerance: f64,
    #[serde(default)]
    pub criterion: Criterion,
}

impl ToleranceSpec {
    pub fn new(tolerance: f64, criterion: Criterion) -> Self {
        Self {
            tolerance,
            criterion,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(LsolverError::InvalidConfig(format!(
                "tolerance must be a positive finite number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: CriterionTable = CriterionTable {
        supported: &Criterion::ALL,
        default: Criterion::Initial,
        matrix_norm: MatrixNorm::Infinity,
    };

    const LU_ONLY: CriterionTable = CriterionTable {
        supported: &[Criterion::Default, Criterion::Initial],
        default: Criterion::Initial,
        matrix_norm: MatrixNorm::One,
    };

    fn system() -> (SparseMatrix, Vec<f64>, Vec<f64>) {
        let a = SparseMatrix::from_dense(&[vec![4.0, -1.0], vec![-2.0, 5.0]]);
        (a, vec![1.0, 1.0], vec![3.0, 4.0])
    }

    #[test]
    fn test_unscaled_is_one_regardless_of_inputs() {
        let (a, x, b) = system();
        let s = scale(&FULL, Criterion::Unscaled, &a, &x, &b).unwrap();
        assert_eq!(s.absolute, 1.0);
        let zeros = SparseMatrix::new(2, 2);
        let s = scale(&FULL, Criterion::Unscaled, &zeros, &[0.0, 0.0], &[0.0, 0.0]).unwrap();
        assert_eq!(s.absolute, 1.0);
    }

    #[test]
    fn test_rhs_scale_is_rhs_norm() {
        let (a, x, b) = system();
        let s = scale(&FULL, Criterion::Rhs, &a, &x, &b).unwrap();
        assert_eq!(s.absolute, 5.0);
        let s = scale(&FULL, Criterion::Rhs, &a, &x, &[0.0, 0.0]).unwrap();
        assert_eq!(s.absolute, 0.0);
        // A zero scale means nothing but an exact residual passes.
        assert_eq!(s.threshold(1e-3, &[0.0, 0.0]).at(&x), 0.0);
    }

    #[test]
    fn test_initial_and_legacy_use_initial_residual() {
        let (a, x, b) = system();
        // A x = (3, 3), r = (0, -1)
        for criterion in [Criterion::Initial, Criterion::Legacy, Criterion::Default] {
            let s = scale(&FULL, criterion, &a, &x, &b).unwrap();
            assert_eq!(s.absolute, 1.0, "criterion {}", criterion);
        }
    }

    #[test]
    fn test_matrix_scale_uses_backend_norm() {
        let (a, x, b) = system();
        assert_eq!(scale(&FULL, Criterion::Matrix, &a, &x, &b).unwrap().absolute, 7.0);
        let one = CriterionTable {
            matrix_norm: MatrixNorm::One,
            ..FULL
        };
        assert_eq!(scale(&one, Criterion::Matrix, &a, &x, &b).unwrap().absolute, 6.0);
    }

    #[test]
    fn test_solution_scale_carries_matrix_norm() {
        let (a, x, b) = system();
        let s = scale(&FULL, Criterion::Solution, &a, &x, &b).unwrap();
        assert_eq!(s.auxiliary, Some(7.0));
        assert!((s.absolute - (7.0 * 2.0_f64.sqrt() + 5.0)).abs() < 1e-12);
        let threshold = s.threshold(0.5, &b);
        assert!((threshold.at(&[0.0, 0.0]) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_scale_is_deterministic() {
        let (a, x, b) = system();
        for criterion in Criterion::ALL {
            let first = scale(&FULL, criterion, &a, &x, &b).unwrap();
            let second = scale(&FULL, criterion, &a, &x, &b).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_unsupported_criterion_is_rejected() {
        let err = LU_ONLY.resolve(Criterion::Rhs, "LinearLUSolver").unwrap_err();
        match err {
            LsolverError::UnsupportedCriterion { criterion, solver } => {
                assert_eq!(criterion, "RHS");
                assert_eq!(solver, "LinearLUSolver");
            }
            other => panic!("Expected UnsupportedCriterion, got {:?}", other),
        }
    }

    #[test]
    fn test_criterion_names_round_trip() {
        for criterion in Criterion::ALL {
            assert_eq!(criterion.name().parse::<Criterion>().unwrap(), criterion);
            let json = serde_json::to_string(&criterion).unwrap();
            assert_eq!(json, format!("\"{}\"", criterion.name()));
        }
        assert!("rhs".parse::<Criterion>().is_err());
    }

    #[test]
    fn test_tolerance_spec_validation() {
        assert!(ToleranceSpec::new(1e-8, Criterion::Default).validate().is_ok());
        assert!(ToleranceSpec::new(0.0, Criterion::Default).validate().is_err());
        assert!(ToleranceSpec::new(f64::NAN, Criterion::Default).validate().is_err());
    }
}
