//! Application-wide error types.
//!
//! Read-path variants (`Network`, `MalformedResponse`, `ContractCall`) are
//! contained by the coordinator and only logged. Write-path variants
//! (`SignerRejected`, `Submission`, `Confirmation`) reach the caller after the
//! tranche has been reset to `ready`.

use thiserror::Error;

use crate::types::{ClaimTxState, Tranche};

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Contract call failed: {0}")]
    ContractCall(String),

    #[error("Signer rejected the transaction: {0}")]
    SignerRejected(String),

    #[error("No signer connected")]
    SignerUnavailable,

    #[error("Transaction submission failed: {0}")]
    Submission(String),

    #[error("Transaction confirmation failed: {0}")]
    Confirmation(String),

    #[error("{tranche} claim is not ready (current state: {state})")]
    NotReady { tranche: Tranche, state: ClaimTxState },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No verified {0} claim loaded")]
    NotLoaded(Tranche),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClaimError {
    /// Errors raised on the user-initiated write path.
    pub fn is_write_path(&self) -> bool {
        matches!(
            self,
            Self::SignerRejected(_)
                | Self::SignerUnavailable
                | Self::Submission(_)
                | Self::Confirmation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;
