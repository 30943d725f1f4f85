//! Error types for reconciliation passes

use garm_client::ClientError;
use garm_store::StoreError;
use garm_types::{ConditionReason, ObjectKey, ScopeKind, UnknownScopeKind};
use std::time::Duration;
use thiserror::Error;

/// Reasons a reconciliation pass aborts
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Any failed backend call, surfaced verbatim
    #[error(transparent)]
    Garm(#[from] ClientError),

    /// Declarative store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    UnsupportedScopeKind(#[from] UnknownScopeKind),

    #[error("{kind} {key} not found")]
    ScopeNotFound { kind: ScopeKind, key: ObjectKey },

    #[error("Image {0} not found")]
    ImageNotFound(ObjectKey),

    #[error("Unsupported OS type: {0}")]
    UnsupportedOsType(String),

    #[error("Unsupported OS architecture: {0}")]
    UnsupportedOsArch(String),

    #[error("Invalid extra specs: {0}")]
    InvalidExtraSpecs(String),

    #[error("Deletion failed: {0}")]
    DeletionFailed(String),

    #[error("Reconcile pass exceeded deadline of {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    /// Condition reason recorded on `Ready` when this error aborts a pass
    pub fn reason(&self) -> ConditionReason {
        match self {
            ReconcileError::Garm(_) => ConditionReason::GarmApiError,
            ReconcileError::DeletionFailed(_) => ConditionReason::DeletionFailed,
            _ => ConditionReason::ReconcileError,
        }
    }

    /// Input errors that will not clear without a user edit
    ///
    /// They are still re-queued with backoff like everything else.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ReconcileError::UnsupportedScopeKind(_)
                | ReconcileError::UnsupportedOsType(_)
                | ReconcileError::UnsupportedOsArch(_)
                | ReconcileError::InvalidExtraSpecs(_)
        )
    }
}

/// Result type for reconciliation
pub type Result<T> = std::result::Result<T, ReconcileError>;
