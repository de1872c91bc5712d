//! Helius DAS client over JSON-RPC.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AssetDetails, AssetIndexer, AssetPage, AssetProof, IndexerError};

pub const DEFAULT_RPC_URL: &str = "https://mainnet.helius-rpc.com";

/// JSON-RPC 2.0 "Method not found".
const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone)]
pub struct HeliusConfig {
    /// DAS endpoint, without the api key.
    pub rpc_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// [`AssetIndexer`] backed by the Helius DAS API.
#[derive(Debug, Clone)]
pub struct HeliusIndexer {
    client: reqwest::Client,
    config: HeliusConfig,
}

impl HeliusIndexer {
    pub fn new(config: HeliusConfig) -> Result<Self, IndexerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IndexerError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        subject: &str,
        params: serde_json::Value,
    ) -> Result<T, IndexerError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: "solburn",
            method,
            params,
        };

        let mut request = self.client.post(&self.config.rpc_url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("api-key", key)]);
        }

        debug!(method, subject, "indexer request");

        let response = request
            .send()
            .await
            .map_err(|e| IndexerError::Transport(format!("{method} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::Transport(format!("{method} returned HTTP {status}")));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| IndexerError::InvalidResponse(format!("{method}: {e}")))?;

        interpret(subject, parsed)
    }
}

/// Turn a JSON-RPC envelope into a result, separating "not found" from other RPC errors.
fn interpret<T>(subject: &str, response: RpcResponse<T>) -> Result<T, IndexerError> {
    if let Some(err) = response.error {
        if err.code != METHOD_NOT_FOUND && err.message.to_ascii_lowercase().contains("not found") {
            return Err(IndexerError::NotFound(subject.to_string()));
        }
        return Err(IndexerError::Rpc {
            code: err.code,
            message: err.message,
        });
    }

    response
        .result
        .ok_or_else(|| IndexerError::NotFound(subject.to_string()))
}

#[async_trait]
impl AssetIndexer for HeliusIndexer {
    async fn fetch_asset(&self, asset_id: &str) -> Result<AssetDetails, IndexerError> {
        self.call("getAsset", asset_id, serde_json::json!({ "id": asset_id }))
            .await
    }

    async fn fetch_asset_proof(&self, asset_id: &str) -> Result<AssetProof, IndexerError> {
        self.call("getAssetProof", asset_id, serde_json::json!({ "id": asset_id }))
            .await
    }

    async fn fetch_assets_by_owner(
        &self,
        owner: &str,
        page: u32,
        limit: u32,
    ) -> Result<AssetPage, IndexerError> {
        self.call(
            "getAssetsByOwner",
            owner,
            serde_json::json!({
                "ownerAddress": owner,
                "page": page.max(1),
                "limit": limit,
            }),
        )
        .await
    }
}
