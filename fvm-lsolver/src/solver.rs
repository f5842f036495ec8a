//! Solver selection.
//!
//! A [`SolverConfig`] names one of the eight supported solvers and optionally
//! overrides its tolerance, criterion, iteration limit and preconditioner.
//! [`Solver::from_config`] validates it and builds the adapter; there is no
//! other way to obtain a [`Solver`].

use crate::algorithms::SparseLu;
use crate::backends::{pysparse, scipy, trilinos};
use crate::convergence::{ConvergenceStatus, Suite};
use crate::error::{LsolverError, Result};
use crate::iterative::{IterativeBackend, IterativeSolver};
use crate::preconditioner::PreconditionerKind;
use crate::residual_correction::{CorrectionPolicy, ResidualCorrectionSolver};
use crate::tolerance::{Criterion, CriterionTable, ToleranceSpec};
use fvm_core::{LinearSystem, SparseMatrix};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    PysparseCg,
    PysparseCgs,
    PysparseGmres,
    PysparseLu,
    ScipyLu,
    TrilinosCg,
    TrilinosGmres,
    TrilinosLu,
}

impl SolverKind {
    pub const ALL: [SolverKind; 8] = [
        SolverKind::PysparseCg,
        SolverKind::PysparseCgs,
        SolverKind::PysparseGmres,
        SolverKind::PysparseLu,
        SolverKind::ScipyLu,
        SolverKind::TrilinosCg,
        SolverKind::TrilinosGmres,
        SolverKind::TrilinosLu,
    ];

    /// Human readable name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            SolverKind::PysparseCg => "pysparse PCG",
            SolverKind::PysparseCgs => "pysparse CGS",
            SolverKind::PysparseGmres => "pysparse GMRES",
            SolverKind::PysparseLu => "pysparse LU",
            SolverKind::ScipyLu => "scipy LU",
            SolverKind::TrilinosCg => "trilinos PCG",
            SolverKind::TrilinosGmres => "trilinos GMRES",
            SolverKind::TrilinosLu => "trilinos LU",
        }
    }

    /// Name as written in configuration files.
    pub fn key(&self) -> &'static str {
        match self {
            SolverKind::PysparseCg => "pysparse_cg",
            SolverKind::PysparseCgs => "pysparse_cgs",
            SolverKind::PysparseGmres => "pysparse_gmres",
            SolverKind::PysparseLu => "pysparse_lu",
            SolverKind::ScipyLu => "scipy_lu",
            SolverKind::TrilinosCg => "trilinos_cg",
            SolverKind::TrilinosGmres => "trilinos_gmres",
            SolverKind::TrilinosLu => "trilinos_lu",
        }
    }

    pub fn suite(&self) -> Suite {
        match self {
            SolverKind::PysparseCg
            | SolverKind::PysparseCgs
            | SolverKind::PysparseGmres
            | SolverKind::PysparseLu => Suite::Pysparse,
            SolverKind::ScipyLu => Suite::Scipy,
            SolverKind::TrilinosCg | SolverKind::TrilinosGmres | SolverKind::TrilinosLu => {
                Suite::Trilinos
            }
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(
            self,
            SolverKind::PysparseLu | SolverKind::ScipyLu | SolverKind::TrilinosLu
        )
    }

    /// CG requires a symmetric matrix.
    pub fn can_solve_asymmetric(&self) -> bool {
        !matches!(self, SolverKind::PysparseCg | SolverKind::TrilinosCg)
    }

    /// PCG for symmetric systems, LU for everything else.
    pub fn default_for(symmetric: bool) -> SolverKind {
        if symmetric {
            SolverKind::PysparseCg
        } else {
            SolverKind::PysparseLu
        }
    }

    pub fn default_tolerance(&self) -> f64 {
        match self {
            SolverKind::PysparseCg | SolverKind::TrilinosCg => 1e-5,
            _ => 1e-10,
        }
    }

    pub fn default_max_iterations(&self) -> usize {
        if self.is_direct() {
            10
        } else {
            1000
        }
    }

    pub fn default_preconditioner(&self) -> PreconditionerKind {
        match self {
            SolverKind::PysparseCg => PreconditionerKind::ssor(),
            SolverKind::PysparseGmres => PreconditionerKind::Jacobi,
            SolverKind::TrilinosCg | SolverKind::TrilinosGmres => {
                PreconditionerKind::multilevel_dd()
            }
            SolverKind::PysparseCgs
            | SolverKind::PysparseLu
            | SolverKind::ScipyLu
            | SolverKind::TrilinosLu => PreconditionerKind::Identity,
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolverKind {
    type Err = LsolverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SolverKind::ALL
            .into_iter()
            .find(|k| k.key() == s)
            .ok_or_else(|| LsolverError::InvalidConfig(format!("unknown solver '{}'", s)))
    }
}

/// Everything needed to build a solver. Unset fields take the solver's
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    pub solver: SolverKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterion: Option<Criterion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preconditioner: Option<PreconditionerKind>,
}

impl SolverConfig {
    pub fn new(solver: SolverKind) -> Self {
        Self {
            solver,
            tolerance: None,
            criterion: None,
            max_iterations: None,
            preconditioner: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = Some(criterion);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_preconditioner(mut self, preconditioner: PreconditionerKind) -> Self {
        self.preconditioner = Some(preconditioner);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn tolerance_spec(&self) -> ToleranceSpec {
        ToleranceSpec::new(
            self.tolerance
                .unwrap_or_else(|| self.solver.default_tolerance()),
            self.criterion.unwrap_or_default(),
        )
    }

    pub fn effective_max_iterations(&self) -> usize {
        self.max_iterations
            .unwrap_or_else(|| self.solver.default_max_iterations())
    }

    pub fn effective_preconditioner(&self) -> PreconditionerKind {
        self.preconditioner
            .unwrap_or_else(|| self.solver.default_preconditioner())
    }
}

impl From<SolverKind> for SolverConfig {
    fn from(kind: SolverKind) -> Self {
        SolverConfig::new(kind)
    }
}

/// A configured solver. It holds no per-solve state: the factor or
/// preconditioner of a solve lives only inside that call. Use [`solve`] to
/// get a fresh solver for each unrelated system.
#[derive(Debug)]
pub enum Solver {
    Iterative(IterativeSolver),
    ResidualCorrection(ResidualCorrectionSolver<SparseLu>),
}

impl Solver {
    pub fn from_config(config: &SolverConfig) -> Result<Solver> {
        let kind = config.solver;
        let tolerance = config.tolerance_spec();
        let max_iterations = config.effective_max_iterations();
        let preconditioner = config.effective_preconditioner();

        let iterative = |backend: IterativeBackend| {
            IterativeSolver::new(
                kind.name(),
                backend,
                tolerance,
                max_iterations,
                preconditioner,
            )
            .map(Solver::Iterative)
        };
        let direct = |policy: CorrectionPolicy, criteria: &CriterionTable| {
            ResidualCorrectionSolver::new(
                kind.name(),
                SparseLu::default(),
                policy,
                criteria,
                tolerance,
                max_iterations,
                preconditioner,
            )
            .map(Solver::ResidualCorrection)
        };

        let solver = match kind {
            SolverKind::PysparseCg => iterative(IterativeBackend::Pysparse(pysparse::Method::Pcg)),
            SolverKind::PysparseCgs => iterative(IterativeBackend::Pysparse(pysparse::Method::Cgs)),
            SolverKind::PysparseGmres => {
                iterative(IterativeBackend::Pysparse(pysparse::Method::Gmres))
            }
            SolverKind::TrilinosCg => iterative(IterativeBackend::Trilinos(trilinos::AzSolver::Cg)),
            SolverKind::TrilinosGmres => {
                iterative(IterativeBackend::Trilinos(trilinos::AzSolver::Gmres))
            }
            SolverKind::PysparseLu => direct(pysparse::LU_POLICY, &pysparse::LU_CRITERIA),
            SolverKind::ScipyLu => direct(scipy::LU_POLICY, &scipy::LU_CRITERIA),
            SolverKind::TrilinosLu => direct(trilinos::LU_POLICY, &trilinos::LU_CRITERIA),
        }?;
        log::info!(
            "Configured {} (tolerance {:e}, criterion {}, max iterations {}, preconditioner {})",
            kind,
            tolerance.tolerance,
            tolerance.criterion,
            max_iterations,
            preconditioner.name()
        );
        Ok(solver)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Solver::Iterative(s) => s.name(),
            Solver::ResidualCorrection(s) => s.name(),
        }
    }

    /// Solves `L x = b` in place. Failing to converge is reported in the
    /// status, not as an error.
    pub fn solve(&self, system: &mut LinearSystem<'_>) -> Result<ConvergenceStatus> {
        match self {
            Solver::Iterative(s) => s.solve(system),
            Solver::ResidualCorrection(s) => s.solve(system),
        }
    }
}

/// Builds a fresh solver from `config` and applies it once.
pub fn solve(
    config: &SolverConfig,
    matrix: &SparseMatrix,
    x: &mut [f64],
    b: &[f64],
) -> Result<ConvergenceStatus> {
    let solver = Solver::from_config(config)?;
    let mut system = LinearSystem::new(matrix, x, b)?;
    solver.solve(&mut system)
}
