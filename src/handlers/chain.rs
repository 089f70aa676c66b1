use axum::{
    extract::{Path, Query, State},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::chain::GasEstimate;
use crate::error::AppError;
use crate::validation;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub network: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub network: String,
    pub balance: String,
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, AppError> {
    validation::validate_address("address", &address)?;

    let network = query.network.unwrap_or_else(|| "base".to_string());
    let client = state
        .chains
        .get(&network)
        .ok_or_else(|| AppError::BadRequest(format!("Unsupported network: {}", network)))?;

    let balance = client.get_balance(&address).await?;

    Ok(Json(BalanceResponse {
        address: address.to_lowercase(),
        network,
        balance: balance.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EstimatePayload {
    pub from_address: String,
    pub to_address: String,
    pub amount: BigDecimal,
    pub network: String,
}

/// Gas estimation for a USDC transfer. A reverting estimation (e.g.
/// insufficient balance) surfaces to the submission flow as 422.
pub async fn estimate_gas(
    State(state): State<AppState>,
    Json(payload): Json<EstimatePayload>,
) -> Result<Json<GasEstimate>, AppError> {
    validation::validate_address("from_address", &payload.from_address)?;
    validation::validate_address("to_address", &payload.to_address)?;
    validation::validate_amount(&payload.amount)?;

    let client = state.chains.get(&payload.network).ok_or_else(|| {
        AppError::BadRequest(format!("Unsupported network: {}", payload.network))
    })?;

    let estimate = client
        .estimate_transfer_gas(&payload.from_address, &payload.to_address, &payload.amount)
        .await?;

    Ok(Json(estimate))
}
