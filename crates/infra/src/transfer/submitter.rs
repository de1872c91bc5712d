//! Transfer-construction adapters.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::{TransferError, TransferOutcome, TransferRequest, TransferSubmitter};

/// Posts transfer requests to an external transfer-construction service.
///
/// The service owns the signing key and the Bubblegum instruction encoding. It
/// answers `{ success, signature?, error? }`.
#[derive(Debug, Clone)]
pub struct HttpTransferSubmitter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransferSubmitter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransferError::Submission(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl TransferSubmitter for HttpTransferSubmitter {
    async fn perform_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, TransferError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransferError::Submission(format!("transfer service unreachable: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            warn!(asset_id = %request.asset_id, %status, "transfer service error");
            return Err(TransferError::Submission(format!(
                "transfer service returned HTTP {status}"
            )));
        }

        // 4xx bodies still carry `{ success: false, error }`.
        response
            .json::<TransferOutcome>()
            .await
            .map_err(|e| TransferError::Submission(format!("invalid transfer service reply ({status}): {e}")))
    }
}

/// Accepts every transfer without touching the chain.
///
/// Used when no transfer service is configured.
#[derive(Debug, Clone, Default)]
pub struct DryRunTransferSubmitter;

#[async_trait]
impl TransferSubmitter for DryRunTransferSubmitter {
    async fn perform_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, TransferError> {
        let signature = format!("dry-run-{}", Uuid::now_v7());
        info!(
            asset_id = %request.asset_id,
            owner = %request.owner_address,
            destination = %request.destination_address,
            tree = %request.proof.tree_id,
            %signature,
            "dry-run transfer accepted"
        );
        Ok(TransferOutcome::confirmed(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{Json, Router, http::StatusCode, routing::post};
    use solburn_core::Address;

    use crate::indexer::{AssetDetails, AssetProof, Ownership};

    fn request(asset_id: &str) -> TransferRequest {
        let owner = Address::parse("So11111111111111111111111111111111111111112").unwrap();
        TransferRequest {
            owner_address: owner.clone(),
            destination_address: Address::parse("11111111111111111111111111111111").unwrap(),
            asset_id: asset_id.to_string(),
            proof: AssetProof {
                root: "root".into(),
                proof: Some(vec!["p".into()]),
                node_index: None,
                leaf: None,
                tree_id: "tree".into(),
            },
            asset: AssetDetails {
                id: asset_id.to_string(),
                interface: None,
                ownership: Ownership {
                    owner: owner.to_string(),
                    delegate: None,
                    delegated: false,
                    frozen: false,
                },
                compression: None,
                content: None,
                burnt: false,
            },
        }
    }

    async fn fake_service(Json(req): Json<serde_json::Value>) -> (StatusCode, Json<serde_json::Value>) {
        match req["assetId"].as_str() {
            Some("ok") => (
                StatusCode::OK,
                Json(serde_json::json!({ "success": true, "signature": "5ig" })),
            ),
            Some("refused") => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "success": false, "error": "stale proof" })),
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({}))),
        }
    }

    async fn spawn_service() -> String {
        let app = Router::new().route("/transfer", post(fake_service));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/transfer")
    }

    #[tokio::test]
    async fn http_submitter_reads_service_reply() {
        let submitter = HttpTransferSubmitter::new(spawn_service().await, Duration::from_secs(5)).unwrap();

        let ok = submitter.perform_transfer(&request("ok")).await.unwrap();
        assert_eq!(ok, TransferOutcome::confirmed("5ig"));

        let refused = submitter.perform_transfer(&request("refused")).await.unwrap();
        assert_eq!(refused, TransferOutcome::rejected("stale proof"));

        let err = submitter.perform_transfer(&request("boom")).await.unwrap_err();
        assert!(matches!(err, TransferError::Submission(_)));
    }

    #[tokio::test]
    async fn dry_run_always_confirms() {
        let outcome = DryRunTransferSubmitter
            .perform_transfer(&request("anything"))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.signature.unwrap().starts_with("dry-run-"));
    }
}
