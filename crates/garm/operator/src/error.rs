//! Error types for garm-operator

use thiserror::Error;

/// Operator startup and runtime errors
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error in {source_name}: {message}")]
    Manifest {
        source_name: String,
        message: String,
    },

    #[error("GARM client error: {0}")]
    Client(#[from] garm_client::ClientError),

    #[error("Store error: {0}")]
    Store(#[from] garm_store::StoreError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] garm_reconciler::ReconcileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for operator operations
pub type OperatorResult<T> = Result<T, OperatorError>;
