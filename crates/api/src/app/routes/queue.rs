use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use solburn_core::BatchId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/create", post(create_batch))
        .route("/status", get(queue_status))
        .route("/status/:batch_id", get(batch_status))
        .route("/cancel/:batch_id", post(cancel_batch))
}

pub async fn create_batch(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateQueueRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text());
        }
    };

    let Some(owner) = body.owner_address.filter(|o| !o.trim().is_empty()) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Owner address is required",
        );
    };

    let asset_ids: Vec<String> = body.assets.into_iter().map(|a| a.asset_id).collect();
    let total_jobs = asset_ids.len();

    match services
        .queue
        .submit_batch(&owner, asset_ids, body.destination_address.as_deref())
    {
        Ok(batch_id) => dto::ok(dto::BatchCreated {
            batch_id,
            total_jobs,
        })
        .into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

pub async fn batch_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(batch_id): Path<String>,
) -> axum::response::Response {
    let batch_id = match parse_batch_id(&batch_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.queue.batch_status(batch_id) {
        Ok(view) => dto::ok(view).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

pub async fn queue_status(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    dto::ok(services.queue.queue_status()).into_response()
}

pub async fn cancel_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Path(batch_id): Path<String>,
) -> axum::response::Response {
    let batch_id = match parse_batch_id(&batch_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.queue.cancel_batch(batch_id) {
        Ok(view) => dto::ok(view).into_response(),
        Err(e) => errors::queue_error_to_response(e),
    }
}

/// Malformed ids are reported as unknown batches.
fn parse_batch_id(raw: &str) -> Result<BatchId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("batch not found: {raw}"),
        )
    })
}
