//! Error taxonomy (§7): the five recoverable/fatal kinds the driver and its
//! public setters can report. Internal invariants that indicate a programmer
//! bug (not a caller mistake) still abort via `assert!`/`debug_assert!`
//! rather than flowing through here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// A setter was called with a value outside its documented range.
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// `update` called before `initialize`, a negative `Δt`, or an
    /// out-of-range index. Fatal at the call site.
    #[error("precondition violated: {0}")]
    PreconditionViolated(String),

    /// The pressure or viscosity PCG solve did not reach its tolerance
    /// within the iteration cap.
    #[error("solver did not converge: {0}")]
    SolverNonConvergence(String),

    /// A degenerate numerical case the driver recovers from by falling back
    /// to a safe default (zero gradient, zero-length velocity, empty input).
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// A bounded resource (the diffuse particle store) is full.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_include_the_detail_string() {
        let e = SimError::ConfigurationInvalid("cfl must be >= 1".to_string());
        assert!(e.to_string().contains("cfl must be >= 1"));
    }
}
