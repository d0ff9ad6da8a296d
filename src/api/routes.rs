use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::store::traits::Store;

pub fn create_router<S: Store>() -> Router<Arc<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Page data
        .route("/page/:id", get(handlers::list_page::<S>))
        .route("/page/:id", post(handlers::create_page_item::<S>))
        .route("/page/:id/:item_id", get(handlers::get_page_item::<S>))
        .route("/page/:id/:item_id", put(handlers::update_page_item::<S>))
}
