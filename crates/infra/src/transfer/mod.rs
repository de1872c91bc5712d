//! Single-asset transfer: indexer lookup, ownership check, submission.
//!
//! - `TransferExecutor`: performs one transfer end-to-end, never retries
//! - `TransferSubmitter`: the transfer-construction collaborator that builds,
//!   signs and confirms the on-chain instruction
//! - `HttpTransferSubmitter` / `DryRunTransferSubmitter`: the two adapters

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use solburn_core::Address;

use crate::indexer::{AssetDetails, AssetProof, IndexerError};

pub mod executor;
pub mod submitter;

pub use executor::TransferExecutor;
pub use submitter::{DryRunTransferSubmitter, HttpTransferSubmitter};

/// Failure of a single transfer attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// Asset details or proof could not be obtained from the indexer.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// The caller does not own the asset on-chain.
    #[error("ownership mismatch: asset is owned by {actual}, not {expected}")]
    OwnershipMismatch { expected: String, actual: String },

    /// Building, submitting or confirming the transaction failed.
    #[error("transfer submission failed: {0}")]
    Submission(String),

    /// The attempt ended abnormally (e.g. the task panicked).
    #[error("unexpected transfer failure: {0}")]
    Unexpected(String),
}

impl TransferError {
    /// Whether the queue may try this job again.
    ///
    /// An ownership mismatch cannot be fixed by retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransferError::OwnershipMismatch { .. })
    }
}

impl From<IndexerError> for TransferError {
    fn from(err: IndexerError) -> Self {
        TransferError::Lookup(err.to_string())
    }
}

/// Everything the transfer-construction service needs for one transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub owner_address: Address,
    pub destination_address: Address,
    pub asset_id: String,
    pub proof: AssetProof,
    pub asset: AssetDetails,
}

/// Reply of the transfer-construction service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub success: bool,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TransferOutcome {
    pub fn confirmed(signature: impl Into<String>) -> Self {
        Self {
            success: true,
            signature: Some(signature.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            signature: None,
            error: Some(error.into()),
        }
    }
}

/// Successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub signature: Option<String>,
}

/// Builds, submits and confirms the on-chain transfer instruction.
#[async_trait]
pub trait TransferSubmitter: Send + Sync {
    /// `Err` means the service could not be reached. A reachable service that
    /// refuses the transfer answers `Ok` with `success == false`.
    async fn perform_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, TransferError>;
}
