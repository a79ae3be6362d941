//! Read-only HTTP API over the downstream schema.

pub mod error;
pub mod order;

use crate::store::OrderLookup;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderLookup>,
}

pub fn router(orders: Arc<dyn OrderLookup>) -> Router {
    Router::new()
        .route("/order/:id", get(order::get_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { orders })
}
