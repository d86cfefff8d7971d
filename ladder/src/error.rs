use crate::{credentials::CredentialError, ledger::LedgerError, market::analysis::AnalysisError};
use ladder_execution::error::ExecutionError;
use thiserror::Error;

/// Faults a worker operation can surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),

    #[error("credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("analysis: {0}")]
    Analysis(#[from] AnalysisError),
}
