pub mod app_state;
pub mod cache;
pub mod changes;
pub mod codec;
pub mod config;
pub mod database;
pub mod email;
pub mod error;
pub mod handlers;
pub mod lists;
pub mod main_data;
pub mod models;
pub mod permissions;
pub mod validation;

use app_state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use handlers::{
    changes_handler, health_check, lists_handler, main_data_handler, release_cache_handler,
    reload_cache_handler,
};
use tower_http::cors::CorsLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/lists", get(lists_handler))
        .route("/changes", get(changes_handler))
        .route("/maindata", get(main_data_handler))
        .route("/cache/reload", post(reload_cache_handler))
        .route("/cache/release", post(release_cache_handler))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
}
