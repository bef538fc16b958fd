use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisaggError {
    #[error("Request was considered invalid due to error: {0}")]
    InvalidRequest(#[from] anyhow::Error),
    #[error("Error identified during reconciliation: {0}")]
    FailureInReconciliation(#[from] ReconciliationError),
    #[error("Reconciliation did not converge after {iterations} iterations (residual {residual:e})")]
    NotConverged { iterations: usize, residual: f64 },
    #[error("Error while writing output: {0}")]
    ErrorInOutput(OutputError),
}

/// Fatal conditions raised by the reconciliation core. Non-fatal conditions are
/// reported as diagnostics on the result instead.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ReconciliationError {
    #[error("Missing input: {0}")]
    MissingInput(MissingInput),
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Reconciliation was cancelled after {iterations} completed iterations")]
    Cancelled { iterations: usize },
    #[error("Result failed conservation check: {0}")]
    ConservationViolated(String),
}

impl ReconciliationError {
    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum MissingInput {
    #[error("sector '{0}' has no national total")]
    NationalTotal(String),
    #[error("sector '{0}' has no employment row")]
    Employment(String),
    #[error("region '{0}' has no regional total")]
    RegionalTotal(String),
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct OutputError {
    error: anyhow::Error,
}

impl OutputError {
    pub(crate) fn new(error: anyhow::Error) -> Self {
        Self { error }
    }
}
