//! Normalized solve outcomes.
//!
//! Every backend reports how a solve ended with its own status code. The
//! adapters pass that code through the backend's fixed table
//! ([`Suite::classify`]) so callers only ever see one of the six
//! [`StatusKind`]s.

use crate::backends::{pysparse, scipy, trilinos};
use crate::error::LsolverError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend family a status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suite {
    Pysparse,
    Scipy,
    Trilinos,
}

impl Suite {
    pub fn name(&self) -> &'static str {
        match self {
            Suite::Pysparse => "pysparse",
            Suite::Scipy => "scipy",
            Suite::Trilinos => "trilinos",
        }
    }

    /// Translates a native status code through this suite's table.
    pub fn classify(&self, code: i32) -> StatusKind {
        let kind = match self {
            Suite::Pysparse => pysparse::classify(code),
            Suite::Scipy => scipy::classify(code),
            Suite::Trilinos => trilinos::classify(code),
        };
        kind.unwrap_or_else(|| {
            log::warn!(
                "{}: unknown native status code {}, treating as a parameter error",
                self.name(),
                code
            );
            StatusKind::ParameterError
        })
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    Converged,
    /// The backend rejected an input (non-finite data, bad option).
    ParameterError,
    /// A recurrence broke down or stagnated.
    Breakdown,
    /// The matrix or preconditioner is singular or indefinite.
    IllConditioned,
    IterationLimitExceeded,
    /// The recursive residual converged but the true residual did not, or
    /// the iteration produced non-finite values.
    LossOfAccuracy,
}

impl StatusKind {
    pub fn is_converged(&self) -> bool {
        matches!(self, StatusKind::Converged)
    }

    pub fn description(&self) -> &'static str {
        match self {
            StatusKind::Converged => "normal termination",
            StatusKind::ParameterError => "invalid parameter",
            StatusKind::Breakdown => "breakdown in recurrence",
            StatusKind::IllConditioned => "ill-conditioned matrix detected",
            StatusKind::IterationLimitExceeded => {
                "maximum iterations reached without meeting tolerance"
            }
            StatusKind::LossOfAccuracy => "numerical loss of precision",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one solve. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceStatus {
    kind: StatusKind,
    suite: Suite,
    code: i32,
    iterations: usize,
    residual: f64,
    scaled_residual: f64,
}

impl ConvergenceStatus {
    /// Classifies `code` with the suite's table.
    pub fn from_native(
        suite: Suite,
        code: i32,
        iterations: usize,
        residual: f64,
        scaled_residual: f64,
    ) -> Self {
        Self {
            kind: suite.classify(code),
            suite,
            code,
            iterations,
            residual,
            scaled_residual,
        }
    }

    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    pub fn suite(&self) -> Suite {
        self.suite
    }

    /// The backend's own code, kept for diagnostics.
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Final `‖L x - b‖₂` as reported by the backend.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Residual divided by the criterion's scale.
    pub fn scaled_residual(&self) -> f64 {
        self.scaled_residual
    }

    pub fn is_converged(&self) -> bool {
        self.kind.is_converged()
    }

    /// Logs the outcome: `warn` for anything but convergence, `debug` otherwise.
    /// Nothing in this crate calls it; the caller decides.
    pub fn log(&self) {
        if self.is_converged() {
            log::debug!("{}", self);
        } else {
            log::warn!("{} ({})", self, self.kind.description());
        }
    }

    /// Turns a non-converged status into an error for callers that treat
    /// partial convergence as fatal.
    pub fn into_result(self) -> Result<ConvergenceStatus, LsolverError> {
        if self.is_converged() {
            Ok(self)
        } else {
            Err(LsolverError::NotConverged(self))
        }
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (code {}) after {} iterations, residual {:e}, scaled residual {:e}",
            self.suite,
            self.kind,
            self.code,
            self.iterations,
            self.residual,
            self.scaled_residual
        )
    }
}
