//! Error types for package deposit

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DepositError {
    #[error("Deposit failed at {uri}: {reason}")]
    DepositFailure { uri: String, reason: String },

    #[error("Concurrent modification of {uri}: concurrency token is stale")]
    ConcurrentModification { uri: String },

    #[error("Illegal session state: cannot {operation} while session is {state}")]
    IllegalState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Repository did not report a description URI for binary {0}")]
    MissingDescriptionUri(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Invalid URI '{0}'")]
    InvalidUri(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
}

impl DepositError {
    /// Shorthand for a failed repository call
    pub fn failure(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        DepositError::DepositFailure {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error counts as a failed repository interaction.
    ///
    /// A stale concurrency token is handled exactly like any other failed
    /// create or patch call.
    pub fn is_deposit_failure(&self) -> bool {
        matches!(
            self,
            DepositError::DepositFailure { .. }
                | DepositError::ConcurrentModification { .. }
                | DepositError::MissingDescriptionUri(_)
        )
    }

    /// Programming errors bypass rollback
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, DepositError::IllegalState { .. })
    }
}
