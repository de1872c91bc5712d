use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// `GET /api/assets?wallet=&page=&limit=`: one page of the wallet's assets.
pub async fn list_assets(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::AssetsQuery>,
) -> axum::response::Response {
    let Some(wallet) = query.wallet.as_deref().map(str::trim).filter(|w| !w.is_empty()) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Wallet address is required",
        );
    };

    let (page, limit) = (query.page(), query.limit());
    match services.indexer.fetch_assets_by_owner(wallet, page, limit).await {
        Ok(found) => dto::ok(dto::AssetsPage {
            assets: found.items,
            total: found.total,
            page,
            limit,
        })
        .into_response(),
        Err(e) => errors::indexer_error_to_response(e),
    }
}
