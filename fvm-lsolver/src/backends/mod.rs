//! Native interfaces of the three solver suites.
//!
//! Each suite module owns its conventions: the status codes it reports,
//! the tolerance criteria it accepts and what `default` means for it, the
//! preconditioners it can apply, and the call signature of its iterative
//! entry point. The adapters above this layer only ever go through these
//! modules.

use crate::algorithms::StopReason;
use crate::convergence::Suite;
use crate::preconditioner::PreconditionerKind;

pub mod pysparse;
pub mod scipy;
pub mod trilinos;

/// Native code a suite would report for a kernel outcome.
pub fn native_code(suite: Suite, stop: StopReason, iterations: usize) -> i32 {
    match suite {
        Suite::Pysparse => pysparse::status_code(stop),
        Suite::Scipy => scipy::status_code(stop, iterations),
        Suite::Trilinos => trilinos::status_code(stop),
    }
}

/// Native code for a preconditioner that could not be built.
pub fn setup_failure_code(suite: Suite) -> i32 {
    native_code(suite, StopReason::IndefinitePreconditioner, 0)
}

pub(crate) fn supports(supported: &[PreconditionerKind], kind: &PreconditionerKind) -> bool {
    supported.iter().any(|s| s.same_family(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::StatusKind;

    #[test]
    fn test_every_stop_reason_classifies_consistently() {
        let expected = [
            (StopReason::Converged, StatusKind::Converged),
            (StopReason::IterationLimit, StatusKind::IterationLimitExceeded),
            (StopReason::Breakdown, StatusKind::Breakdown),
            (StopReason::IndefiniteMatrix, StatusKind::IllConditioned),
            (StopReason::IndefinitePreconditioner, StatusKind::IllConditioned),
            (StopReason::Singular, StatusKind::IllConditioned),
            (StopReason::NonFinite, StatusKind::LossOfAccuracy),
            (StopReason::TrueResidualMismatch, StatusKind::LossOfAccuracy),
            (StopReason::InvalidInput, StatusKind::ParameterError),
        ];
        for suite in [Suite::Pysparse, Suite::Scipy, Suite::Trilinos] {
            for (stop, kind) in expected {
                let code = native_code(suite, stop, 0);
                assert_eq!(suite.classify(code), kind, "{} {:?}", suite, stop);
            }
        }
    }

    #[test]
    fn test_setup_failure_is_ill_conditioned() {
        for suite in [Suite::Pysparse, Suite::Scipy, Suite::Trilinos] {
            assert_eq!(
                suite.classify(setup_failure_code(suite)),
                StatusKind::IllConditioned
            );
        }
    }
}
