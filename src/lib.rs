pub mod adapters;
pub mod chain;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod monitor;
pub mod notify;
pub mod ports;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::chain::ChainClient;
use crate::notify::NotificationDispatcher;
use crate::ports::{RecordStore, UserDirectory};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub store: Arc<dyn RecordStore>,
    pub users: Arc<dyn UserDirectory>,
    pub chains: Arc<HashMap<String, ChainClient>>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub start_time: Instant,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/transactions",
            post(handlers::transactions::submit).get(handlers::transactions::history),
        )
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route("/balance/:address", get(handlers::chain::get_balance))
        .route("/gas/estimate", post(handlers::chain::estimate_gas))
        .route("/ws", get(handlers::ws::ws_handler))
        .layer(axum::middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
