pub mod chain;
pub mod transactions;
pub mod ws;

use axum::{extract::State, Json};

use crate::health::{check_health, HealthResponse, PostgresChecker, RpcChecker};
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let postgres = PostgresChecker::new(state.db.clone());
    let rpc = state
        .chains
        .iter()
        .map(|(network, client)| (network.clone(), RpcChecker::new(client.clone())))
        .collect();

    Json(check_health(postgres, rpc, state.start_time).await)
}
