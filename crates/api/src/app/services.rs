use std::sync::Arc;

use anyhow::Context;

use solburn_infra::indexer::{AssetIndexer, HeliusIndexer};
use solburn_infra::queue::{JobHandler, QueueService};
use solburn_infra::transfer::{
    DryRunTransferSubmitter, HttpTransferSubmitter, TransferExecutor, TransferSubmitter,
};

use crate::config::ApiConfig;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppServices {
    pub queue: QueueService,
    pub indexer: Arc<dyn AssetIndexer>,
}

impl AppServices {
    pub fn new(queue: QueueService, indexer: Arc<dyn AssetIndexer>) -> Self {
        Self { queue, indexer }
    }
}

/// Wire the indexer, the transfer adapter and the queue from configuration.
///
/// Must run inside a tokio runtime.
pub fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let indexer: Arc<dyn AssetIndexer> = Arc::new(
        HeliusIndexer::new(config.helius.clone()).context("failed to build indexer client")?,
    );

    let submitter: Arc<dyn TransferSubmitter> = match &config.transfer_endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "using transfer service");
            Arc::new(
                HttpTransferSubmitter::new(endpoint.clone(), config.transfer_timeout)
                    .context("failed to build transfer service client")?,
            )
        }
        None => Arc::new(DryRunTransferSubmitter),
    };

    let handler: Arc<dyn JobHandler> = Arc::new(TransferExecutor::new(indexer.clone(), submitter));
    let queue = QueueService::new(config.queue.clone(), handler);

    Ok(AppServices::new(queue, indexer))
}
