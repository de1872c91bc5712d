use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use solburn_infra::indexer::IndexerError;
use solburn_infra::queue::QueueError;

pub fn queue_error_to_response(err: QueueError) -> axum::response::Response {
    match err {
        QueueError::BatchNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("batch not found: {id}"),
        ),
        QueueError::Validation(e) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
    }
}

pub fn indexer_error_to_response(err: IndexerError) -> axum::response::Response {
    match err {
        IndexerError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        other => {
            tracing::warn!(error = %other, "indexer request failed");
            json_error(StatusCode::BAD_GATEWAY, "indexer_error", other.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
