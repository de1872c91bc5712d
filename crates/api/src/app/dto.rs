use axum::Json;
use serde::{Deserialize, Serialize};

use solburn_core::BatchId;
use solburn_infra::indexer::AssetDetails;

pub const DEFAULT_ASSET_PAGE_LIMIT: u32 = 100;
pub const MAX_ASSET_PAGE_LIMIT: u32 = 1000;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueueRequest {
    #[serde(default)]
    pub owner_address: Option<String>,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
    #[serde(default)]
    pub destination_address: Option<String>,
}

/// One requested asset. Extra client-side fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub asset_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AssetsQuery {
    pub wallet: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl AssetsQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_ASSET_PAGE_LIMIT)
            .clamp(1, MAX_ASSET_PAGE_LIMIT)
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// `{ "success": true, ...body }`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

pub fn ok<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreated {
    pub batch_id: BatchId,
    pub total_jobs: usize,
}

#[derive(Debug, Serialize)]
pub struct AssetsPage {
    pub assets: Vec<AssetDetails>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
