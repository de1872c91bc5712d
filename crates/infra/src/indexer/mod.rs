//! Asset indexer adapter (DAS API).
//!
//! The indexer is an external collaborator: it reports who currently owns a
//! compressed asset and returns the Merkle proof needed to move it. Proofs
//! depend on the tree state, so callers must fetch a fresh one for every
//! transfer attempt and never cache it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod helius;

pub use helius::{HeliusConfig, HeliusIndexer};

/// Indexer error.
///
/// `NotFound` is kept apart from the transient variants so callers can tell
/// a missing asset from a flaky network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexerError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("indexer transport error: {0}")]
    Transport(String),
    #[error("indexer rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid indexer response: {0}")]
    InvalidResponse(String),
}

impl IndexerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexerError::NotFound(_))
    }
}

/// Current ownership of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub owner: String,
    #[serde(default)]
    pub delegate: Option<String>,
    #[serde(default)]
    pub delegated: bool,
    #[serde(default)]
    pub frozen: bool,
}

/// Compression data of a leaf in a concurrent Merkle tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compression {
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub tree: String,
    #[serde(default)]
    pub leaf_id: u64,
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub data_hash: String,
    #[serde(default)]
    pub creator_hash: String,
    #[serde(default)]
    pub asset_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetContent {
    #[serde(default)]
    pub json_uri: Option<String>,
    #[serde(default)]
    pub metadata: Option<AssetMetadata>,
}

/// Asset details as returned by `getAsset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDetails {
    pub id: String,
    #[serde(default)]
    pub interface: Option<String>,
    pub ownership: Ownership,
    #[serde(default)]
    pub compression: Option<Compression>,
    #[serde(default)]
    pub content: Option<AssetContent>,
    #[serde(default)]
    pub burnt: bool,
}

impl AssetDetails {
    pub fn is_compressed(&self) -> bool {
        self.compression.as_ref().is_some_and(|c| c.compressed)
    }

    pub fn name(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .and_then(|m| m.name.as_deref())
    }
}

/// Merkle proof for a compressed asset, as returned by `getAssetProof`.
///
/// `proof` is optional on the wire; a response without it is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProof {
    pub root: String,
    #[serde(default)]
    pub proof: Option<Vec<String>>,
    #[serde(default)]
    pub node_index: Option<u64>,
    #[serde(default)]
    pub leaf: Option<String>,
    pub tree_id: String,
}

/// One page of `getAssetsByOwner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub items: Vec<AssetDetails>,
}

/// Read access to an asset indexer.
#[async_trait]
pub trait AssetIndexer: Send + Sync {
    /// Fetch current details (ownership, compression) of an asset.
    async fn fetch_asset(&self, asset_id: &str) -> Result<AssetDetails, IndexerError>;

    /// Fetch the current Merkle proof of a compressed asset.
    async fn fetch_asset_proof(&self, asset_id: &str) -> Result<AssetProof, IndexerError>;

    /// List assets held by a wallet (1-based pages).
    async fn fetch_assets_by_owner(
        &self,
        owner: &str,
        page: u32,
        limit: u32,
    ) -> Result<AssetPage, IndexerError>;
}
