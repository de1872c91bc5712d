use axum::{Router, routing::get};

pub mod assets;
pub mod queue;
pub mod system;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/assets", get(assets::list_assets))
        .nest("/queue", queue::router())
}
