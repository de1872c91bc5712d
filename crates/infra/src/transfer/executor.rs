//! Transfer executor: one asset, one attempt.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use solburn_core::Address;

use crate::indexer::AssetIndexer;
use crate::queue::{Job, JobHandler};

use super::{TransferError, TransferReceipt, TransferRequest, TransferSubmitter};

/// Runs a single transfer end-to-end.
///
/// Every call re-fetches asset and proof, since a proof goes stale as soon as
/// any leaf of the same tree changes. Retrying is left to the queue.
#[derive(Clone)]
pub struct TransferExecutor {
    indexer: Arc<dyn AssetIndexer>,
    submitter: Arc<dyn TransferSubmitter>,
}

impl TransferExecutor {
    pub fn new(indexer: Arc<dyn AssetIndexer>, submitter: Arc<dyn TransferSubmitter>) -> Self {
        Self { indexer, submitter }
    }

    pub async fn execute(
        &self,
        asset_id: &str,
        owner: &Address,
        destination: &Address,
    ) -> Result<TransferReceipt, TransferError> {
        let (asset, proof) = tokio::try_join!(
            self.indexer.fetch_asset(asset_id),
            self.indexer.fetch_asset_proof(asset_id),
        )?;

        if proof.proof.is_none() {
            return Err(TransferError::Lookup(format!(
                "proof for asset {asset_id} has no proof path"
            )));
        }

        if asset.ownership.owner != owner.as_str() {
            return Err(TransferError::OwnershipMismatch {
                expected: owner.to_string(),
                actual: asset.ownership.owner,
            });
        }

        debug!(asset_id, tree = %proof.tree_id, root = %proof.root, "submitting transfer");

        let request = TransferRequest {
            owner_address: owner.clone(),
            destination_address: destination.clone(),
            asset_id: asset_id.to_string(),
            proof,
            asset,
        };

        let outcome = self.submitter.perform_transfer(&request).await?;
        if !outcome.success {
            return Err(TransferError::Submission(
                outcome
                    .error
                    .unwrap_or_else(|| "transfer rejected without a reason".to_string()),
            ));
        }

        info!(asset_id, signature = ?outcome.signature, "transfer confirmed");
        Ok(TransferReceipt {
            signature: outcome.signature,
        })
    }
}

#[async_trait]
impl JobHandler for TransferExecutor {
    async fn handle(&self, job: &Job) -> Result<TransferReceipt, TransferError> {
        self.execute(&job.asset_id, &job.owner_address, &job.destination_address)
            .await
    }
}
